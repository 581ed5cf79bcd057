//! Data exchanged with the blob serializer.
//!
//! The serializer moves heap contents directly. Index membership and the
//! cells modified under a marker are handed over through the types here,
//! and rebuilt on the receiving side through `restore_indexed_fs` and
//! `apply_indexed_fs_delta`.
//!
//! Membership lists repeat a record once per occurrence, so bag indexes
//! keep their multiplicity across a blob.

use std::collections::{BTreeSet, HashMap};

use castor_common::{CasError, FeatureCode, FsRef, Result, TypeCode};
use tracing::debug;

use super::marker::Marker;
use super::{Cas, ViewId};
use crate::heap::constants::{
    ARRAY_CONTENT_OFFSET, ARRAY_LENGTH_OFFSET, AUX_ARRAY_CELLS, TYPE_CELL,
};

/// Indexed records of every view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedFs {
    /// Records indexed in the base store, Sofas among them.
    pub base: Vec<FsRef>,
    /// Records indexed in views 1 through n, one entry per view.
    pub views: Vec<Vec<FsRef>>,
}

/// Index membership changes of one view since a marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewDelta {
    /// Records created after the mark and indexed now, once per occurrence.
    pub added: Vec<FsRef>,
    /// Records from before the mark no longer indexed.
    pub removed: Vec<FsRef>,
    /// Records from before the mark whose membership changed, once per
    /// occurrence they have now.
    pub reindexed: Vec<FsRef>,
}

impl ViewDelta {
    /// Returns true if the view did not change.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.reindexed.is_empty()
    }
}

/// Index membership changes of every view since a marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedFsDelta {
    pub base: ViewDelta,
    /// Views 1 through n, one entry per view.
    pub views: Vec<ViewDelta>,
}

/// Cells below a marker written since it was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedCells {
    pub heap: Vec<(u32, i32)>,
    pub bytes: Vec<(u32, i8)>,
    pub shorts: Vec<(u32, i16)>,
    pub longs: Vec<(u32, i64)>,
}

/// Sizes of the data a delta blob appends, known before it is applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaAppend<'a> {
    /// New primary heap cells, starting at the current end of the heap.
    pub cells: &'a [i32],
    /// New string ref entries.
    pub string_refs: usize,
}

impl ModifiedCells {
    /// Returns the total number of modified cells.
    pub fn len(&self) -> usize {
        self.heap.len() + self.bytes.len() + self.shorts.len() + self.longs.len()
    }

    /// Returns true if nothing was modified.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cas {
    // =========================================================================
    // Sending side
    // =========================================================================

    /// Returns the indexed records of the base store and of every view up
    /// to the view count.
    pub fn indexed_fs(&self) -> IndexedFs {
        let base = self.views[ViewId::BASE.index()].repo.member_occurrences();
        let views = (1..=self.view_count as usize)
            .map(|i| {
                self.views
                    .get(i)
                    .map(|state| state.repo.member_occurrences())
                    .unwrap_or_default()
            })
            .collect();
        IndexedFs { base, views }
    }

    /// Returns the index membership changes since `marker`.
    pub fn indexed_fs_delta(&self, marker: &Marker) -> Result<IndexedFsDelta> {
        self.tracking_for(marker)?;
        let delta_of = |i: usize| {
            self.views
                .get(i)
                .map(|state| {
                    let repeated = |fs: &FsRef| {
                        std::iter::repeat(*fs).take(state.repo.occurrences(*fs))
                    };
                    ViewDelta {
                        added: state.log.added.iter().flat_map(repeated).collect(),
                        removed: state.log.removed.iter().copied().collect(),
                        reindexed: state.log.reindexed.iter().flat_map(repeated).collect(),
                    }
                })
                .unwrap_or_default()
        };
        Ok(IndexedFsDelta {
            base: delta_of(ViewId::BASE.index()),
            views: (1..=self.view_count as usize).map(delta_of).collect(),
        })
    }

    /// Returns the cells below `marker` written since it was taken, with
    /// their current values, in address order.
    pub fn modified_cells(&self, marker: &Marker) -> Result<ModifiedCells> {
        let tracking = self.tracking_for(marker)?;
        Ok(ModifiedCells {
            heap: tracking
                .heap
                .iter()
                .map(|a| (*a as u32, self.heaps.heap.get(*a)))
                .collect(),
            bytes: tracking
                .bytes
                .iter()
                .map(|a| (*a as u32, self.heaps.bytes.get(*a)))
                .collect(),
            shorts: tracking
                .shorts
                .iter()
                .map(|a| (*a as u32, self.heaps.shorts.get(*a)))
                .collect(),
            longs: tracking
                .longs
                .iter()
                .map(|a| (*a as u32, self.heaps.longs.get(*a)))
                .collect(),
        })
    }

    // =========================================================================
    // Receiving side
    // =========================================================================

    fn check_loaded_fs(&self, fs: FsRef) -> Result<TypeCode> {
        self.check_fs(fs)
            .map_err(|_| CasError::MalformedBlob(format!("indexed record {} is not a record", fs)))
    }

    /// Rebuilds index membership over freshly loaded heaps.
    ///
    /// Sofas among the base records are registered first so each view exists
    /// before its records are indexed.
    pub fn restore_indexed_fs(&mut self, indexed: &IndexedFs) -> Result<()> {
        for fs in &indexed.base {
            if self.check_loaded_fs(*fs)? == TypeCode::SOFA {
                self.register_sofa(*fs)?;
            }
            self.ll_add_fs_to_indexes(ViewId::BASE, *fs);
        }
        for (i, members) in indexed.views.iter().enumerate() {
            let view = ViewId(i as u32 + 1);
            self.ensure_view_slot(view);
            for fs in members {
                self.check_loaded_fs(*fs)?;
                self.ll_add_fs_to_indexes(view, *fs);
            }
        }
        self.view_count = self.view_count.max(indexed.views.len() as u32);
        debug!(
            base = indexed.base.len(),
            views = indexed.views.len(),
            "indexes restored"
        );
        Ok(())
    }

    fn apply_view_delta(&mut self, view: ViewId, delta: &ViewDelta) -> Result<()> {
        for fs in &delta.removed {
            self.check_loaded_fs(*fs)?;
            self.views[view.index()]
                .repo
                .remove_all_occurrences(&self.heaps, *fs);
            self.log_index_remove(view, *fs);
        }
        let reindexed: BTreeSet<FsRef> = delta.reindexed.iter().copied().collect();
        for fs in &reindexed {
            self.check_loaded_fs(*fs)?;
            self.views[view.index()]
                .repo
                .remove_all_occurrences(&self.heaps, *fs);
        }
        for fs in &delta.reindexed {
            self.ll_add_fs_to_indexes(view, *fs);
        }
        for fs in &delta.added {
            if view.is_base() && self.check_loaded_fs(*fs)? == TypeCode::SOFA {
                self.register_sofa(*fs)?;
            } else {
                self.check_loaded_fs(*fs)?;
            }
            self.ll_add_fs_to_indexes(view, *fs);
        }
        Ok(())
    }

    /// Applies index membership changes read from a delta blob. Heap
    /// contents must already be loaded.
    pub fn apply_indexed_fs_delta(&mut self, delta: &IndexedFsDelta) -> Result<()> {
        self.apply_view_delta(ViewId::BASE, &delta.base)?;
        for (i, view_delta) in delta.views.iter().enumerate() {
            let view = ViewId(i as u32 + 1);
            self.ensure_view_slot(view);
            self.apply_view_delta(view, view_delta)?;
        }
        self.view_count = self.view_count.max(delta.views.len() as u32);
        Ok(())
    }

    /// Checks a parsed delta against this store before any of it is applied.
    ///
    /// Modified cells must lie below the current end of their heap. Every
    /// record the index lists name must be a whole record of a known type
    /// once `append` is added and the modified cells are written. New Sofas
    /// must carry a number and a name. A delta that passes cannot fail to
    /// apply.
    pub fn check_delta(
        &self,
        append: &DeltaAppend<'_>,
        modified: &ModifiedCells,
        indexed: &IndexedFsDelta,
    ) -> Result<()> {
        let malformed = |msg: String| CasError::MalformedBlob(msg);
        let old_end = self.heaps.heap.cells_used();
        let end = old_end + append.cells.len();

        for (addr, _) in &modified.heap {
            if !self.heaps.heap.is_valid_addr(*addr as usize) {
                return Err(malformed(format!("heap cell {} out of range", addr)));
            }
        }
        let aux = [
            ("byte", modified.bytes.iter().map(|c| c.0).max(), self.heaps.bytes.len()),
            ("short", modified.shorts.iter().map(|c| c.0).max(), self.heaps.shorts.len()),
            ("long", modified.longs.iter().map(|c| c.0).max(), self.heaps.longs.len()),
        ];
        for (what, highest, len) in aux {
            if let Some(addr) = highest {
                if addr as usize >= len {
                    return Err(malformed(format!("{} cell {} out of range", what, addr)));
                }
            }
        }

        let overlay: HashMap<usize, i32> = modified
            .heap
            .iter()
            .map(|(addr, value)| (*addr as usize, *value))
            .collect();
        let cell = |addr: usize| -> Option<i32> {
            if addr == 0 || addr >= end {
                return None;
            }
            if let Some(value) = overlay.get(&addr) {
                return Some(*value);
            }
            if addr < old_end {
                Some(self.heaps.heap.get(addr))
            } else {
                append.cells.get(addr - old_end).copied()
            }
        };
        let record = |fs: FsRef| -> Result<TypeCode> {
            let bad = || malformed(format!("indexed record {} is not a record", fs));
            let t = TypeCode(cell(fs.addr() + TYPE_CELL).ok_or_else(bad)? as u32);
            if !self.ts.is_valid_type(t) {
                return Err(bad());
            }
            let class = self.ts.type_class(t);
            let cells = if class.is_inline_array() {
                let len = cell(fs.addr() + ARRAY_LENGTH_OFFSET).ok_or_else(bad)?;
                usize::try_from(len).map_err(|_| bad())? + ARRAY_CONTENT_OFFSET
            } else if class.is_aux_array() {
                AUX_ARRAY_CELLS
            } else {
                self.layout.type_cells(t)
            };
            if fs.addr() + cells > end {
                return Err(bad());
            }
            Ok(t)
        };

        let ref_count = self.heaps.strings.ref_count() + append.string_refs;
        let view_limit = (self.view_count as usize).max(indexed.views.len());
        let all = std::iter::once(&indexed.base).chain(&indexed.views);
        for delta in all {
            for fs in delta.removed.iter().chain(&delta.reindexed) {
                record(*fs)?;
            }
            for fs in &delta.added {
                if record(*fs)? != TypeCode::SOFA {
                    continue;
                }
                let feature = |f: FeatureCode| cell(fs.addr() + self.layout.feature_offset(f));
                let num = feature(FeatureCode::SOFA_NUM).unwrap_or(0);
                if num < 1 || num as usize > view_limit {
                    return Err(malformed(format!("sofa {} has number {}", fs, num)));
                }
                let name = feature(FeatureCode::SOFA_ID).unwrap_or(0);
                if name < 1 || name as usize >= ref_count {
                    return Err(malformed(format!("sofa {} has no name", fs)));
                }
            }
        }
        Ok(())
    }

    /// Writes cell values read from a delta blob. Addresses must lie inside
    /// the loaded heaps.
    pub fn apply_modified_cells(&mut self, cells: &ModifiedCells) -> Result<()> {
        let out_of_range =
            |what: &str, addr: u32| CasError::MalformedBlob(format!("{} cell {} out of range", what, addr));
        for (addr, value) in &cells.heap {
            let addr = *addr as usize;
            if !self.heaps.heap.is_valid_addr(addr) {
                return Err(out_of_range("heap", addr as u32));
            }
            self.heaps.heap.set(addr, *value);
        }
        for (addr, value) in &cells.bytes {
            if *addr as usize >= self.heaps.bytes.len() {
                return Err(out_of_range("byte", *addr));
            }
            self.heaps.bytes.set(*addr as usize, *value);
        }
        for (addr, value) in &cells.shorts {
            if *addr as usize >= self.heaps.shorts.len() {
                return Err(out_of_range("short", *addr));
            }
            self.heaps.shorts.set(*addr as usize, *value);
        }
        for (addr, value) in &cells.longs {
            if *addr as usize >= self.heaps.longs.len() {
                return Err(out_of_range("long", *addr));
            }
            self.heaps.longs.set(*addr as usize, *value);
        }
        Ok(())
    }
}
