//! Delta tracking.
//!
//! A marker snapshots the high-water mark of every heap. While it is live
//! the store records which cells below the mark are written, and how each
//! view's index membership changes, so a delta blob can carry only the
//! appended data plus those updates.

use std::collections::{BTreeSet, HashSet};

use castor_common::{CasError, FsRef, Result, TypeClass};
use tracing::debug;

use super::{Cas, ViewId};
use crate::heap::constants::{ARRAY_CONTENT_OFFSET, ARRAY_LENGTH_OFFSET};

/// High-water marks of every heap at the time the marker was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    generation: u64,
    next_fs: usize,
    string_chars: usize,
    string_refs: usize,
    bytes: usize,
    shorts: usize,
    longs: usize,
}

impl Marker {
    /// Returns true if `fs` was created after the mark.
    pub fn is_new(&self, fs: FsRef) -> bool {
        fs.addr() >= self.next_fs
    }

    /// Primary heap cells in use at the mark.
    pub fn heap_mark(&self) -> usize {
        self.next_fs
    }

    /// String buffer code units at the mark.
    pub fn string_chars_mark(&self) -> usize {
        self.string_chars
    }

    /// String ref entries, including the null entry, at the mark.
    pub fn string_refs_mark(&self) -> usize {
        self.string_refs
    }

    /// Byte heap length at the mark.
    pub fn byte_mark(&self) -> usize {
        self.bytes
    }

    /// Short heap length at the mark.
    pub fn short_mark(&self) -> usize {
        self.shorts
    }

    /// Long heap length at the mark.
    pub fn long_mark(&self) -> usize {
        self.longs
    }
}

/// Auxiliary heap a modified cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuxKind {
    Byte,
    Short,
    Long,
}

/// Live marker plus the cells written below it.
#[derive(Debug, Clone)]
pub(crate) struct Tracking {
    pub(crate) marker: Marker,
    pub(crate) heap: BTreeSet<usize>,
    pub(crate) bytes: BTreeSet<usize>,
    pub(crate) shorts: BTreeSet<usize>,
    pub(crate) longs: BTreeSet<usize>,
}

/// Index membership changes of one view since the mark.
#[derive(Debug, Clone, Default)]
pub(crate) struct IndexLog {
    /// Records created after the mark, in first-added order.
    pub(crate) added: Vec<FsRef>,
    added_set: HashSet<FsRef>,
    /// Records from before the mark that left the indexes.
    pub(crate) removed: BTreeSet<FsRef>,
    /// Records from before the mark whose occurrence count changed and that
    /// are still indexed.
    pub(crate) reindexed: BTreeSet<FsRef>,
}

impl IndexLog {
    pub(crate) fn on_add(&mut self, fs: FsRef, is_new: bool) {
        if is_new {
            if self.added_set.insert(fs) {
                self.added.push(fs);
            }
        } else {
            self.removed.remove(&fs);
            self.reindexed.insert(fs);
        }
    }

    pub(crate) fn on_remove(&mut self, fs: FsRef, is_new: bool, still_indexed: bool) {
        if still_indexed {
            // Occurrence count changed; resend the record's membership.
            if !is_new {
                self.reindexed.insert(fs);
            }
            return;
        }
        if is_new {
            if self.added_set.remove(&fs) {
                self.added.retain(|a| *a != fs);
            }
        } else {
            self.reindexed.remove(&fs);
            self.removed.insert(fs);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.added.clear();
        self.added_set.clear();
        self.removed.clear();
        self.reindexed.clear();
    }
}

impl Cas {
    /// Snapshots the heaps and starts tracking changes below the mark.
    ///
    /// Only one marker may exist between resets.
    pub fn create_marker(&mut self) -> Result<Marker> {
        if self.tracking.is_some() {
            return Err(CasError::MarkerAlreadyCreated);
        }
        let marker = Marker {
            generation: self.generation,
            next_fs: self.heaps.heap.cells_used(),
            string_chars: self.heaps.strings.char_len(),
            string_refs: self.heaps.strings.ref_count(),
            bytes: self.heaps.bytes.len(),
            shorts: self.heaps.shorts.len(),
            longs: self.heaps.longs.len(),
        };
        for view in &mut self.views {
            view.log.clear();
        }
        self.tracking = Some(Tracking {
            marker,
            heap: BTreeSet::new(),
            bytes: BTreeSet::new(),
            shorts: BTreeSet::new(),
            longs: BTreeSet::new(),
        });
        debug!(next_fs = marker.next_fs, "marker created");
        Ok(marker)
    }

    /// Returns the live marker, if any.
    pub fn marker(&self) -> Option<Marker> {
        self.tracking.as_ref().map(|t| t.marker)
    }

    pub(crate) fn tracking_for(&self, marker: &Marker) -> Result<&Tracking> {
        match &self.tracking {
            Some(t) if t.marker == *marker && marker.generation == self.generation => Ok(t),
            _ => Err(CasError::InvalidMarker),
        }
    }

    /// Returns true if `fs` was created after `marker`.
    pub fn is_new_fs(&self, marker: &Marker, fs: FsRef) -> Result<bool> {
        self.tracking_for(marker)?;
        Ok(marker.is_new(fs))
    }

    /// Returns true if `fs` existed at `marker` and any of its cells, or any
    /// of its auxiliary array elements, was written since.
    pub fn is_modified_fs(&self, marker: &Marker, fs: FsRef) -> Result<bool> {
        let tracking = self.tracking_for(marker)?;
        if marker.is_new(fs) || !self.is_valid_fs(fs) {
            return Ok(false);
        }
        let start = fs.addr();
        let cells = self.ll_record_cells(fs);
        if tracking.heap.range(start..start + cells).next().is_some() {
            return Ok(true);
        }
        let class = self.ts.type_class(self.type_of(fs));
        if class.is_aux_array() {
            let len = self.heaps.heap.get(start + ARRAY_LENGTH_OFFSET) as usize;
            let offset = self.heaps.heap.get(start + ARRAY_CONTENT_OFFSET) as usize;
            let set = match class {
                TypeClass::ShortArray => &tracking.shorts,
                TypeClass::LongArray | TypeClass::DoubleArray => {
                    &tracking.longs
                }
                _ => &tracking.bytes,
            };
            return Ok(set.range(offset..offset + len).next().is_some());
        }
        Ok(false)
    }

    /// Records a write to `addr`, a cell of record `fs`.
    #[inline]
    pub(crate) fn log_heap_cell(&mut self, fs: FsRef, addr: usize) {
        if let Some(t) = &mut self.tracking {
            if !t.marker.is_new(fs) {
                t.heap.insert(addr);
            }
        }
    }

    /// Records writes to `len` cells starting at `addr`, all of record `fs`.
    pub(crate) fn log_heap_range(&mut self, fs: FsRef, addr: usize, len: usize) {
        if let Some(t) = &mut self.tracking {
            if !t.marker.is_new(fs) {
                t.heap.extend(addr..addr + len);
            }
        }
    }

    /// Records a write to an auxiliary heap cell.
    #[inline]
    pub(crate) fn log_aux_cell(&mut self, kind: AuxKind, offset: usize) {
        if let Some(t) = &mut self.tracking {
            let (mark, set) = match kind {
                AuxKind::Byte => (t.marker.bytes, &mut t.bytes),
                AuxKind::Short => (t.marker.shorts, &mut t.shorts),
                AuxKind::Long => (t.marker.longs, &mut t.longs),
            };
            if offset < mark {
                set.insert(offset);
            }
        }
    }

    pub(crate) fn log_index_add(&mut self, view: ViewId, fs: FsRef) {
        if let Some(t) = &self.tracking {
            let is_new = t.marker.is_new(fs);
            if let Some(state) = self.views.get_mut(view.index()) {
                state.log.on_add(fs, is_new);
            }
        }
    }

    pub(crate) fn log_index_remove(&mut self, view: ViewId, fs: FsRef) {
        if let Some(t) = &self.tracking {
            let is_new = t.marker.is_new(fs);
            if let Some(state) = self.views.get_mut(view.index()) {
                let still_indexed = state.repo.is_member(fs);
                state.log.on_remove(fs, is_new, still_indexed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_cas;
    use castor_common::{FeatureCode, TypeCode};

    #[test]
    fn test_single_marker() {
        let mut cas = test_cas();
        cas.create_marker().unwrap();
        assert!(matches!(
            cas.create_marker(),
            Err(CasError::MarkerAlreadyCreated)
        ));
    }

    #[test]
    fn test_marker_invalid_after_reset() {
        let mut cas = test_cas();
        let marker = cas.create_marker().unwrap();
        cas.reset().unwrap();
        assert!(cas.marker().is_none());
        assert!(matches!(
            cas.is_new_fs(&marker, FsRef(1)),
            Err(CasError::InvalidMarker)
        ));
        cas.create_marker().unwrap();
    }

    #[test]
    fn test_new_and_modified() {
        let mut cas = test_cas();
        let old = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 0, 1)
            .unwrap();
        let untouched = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 2, 3)
            .unwrap();
        let marker = cas.create_marker().unwrap();
        let fresh = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 4, 5)
            .unwrap();
        cas.set_int_value(old, FeatureCode::END, 9).unwrap();

        assert!(!cas.is_new_fs(&marker, old).unwrap());
        assert!(cas.is_new_fs(&marker, fresh).unwrap());
        assert!(cas.is_modified_fs(&marker, old).unwrap());
        assert!(!cas.is_modified_fs(&marker, untouched).unwrap());
        assert!(!cas.is_modified_fs(&marker, fresh).unwrap());
    }

    #[test]
    fn test_aux_array_modification_tracked() {
        let mut cas = test_cas();
        let bytes = cas.create_array(TypeCode::BYTE_ARRAY, 4).unwrap();
        let marker = cas.create_marker().unwrap();
        assert!(!cas.is_modified_fs(&marker, bytes).unwrap());
        cas.set_byte_array_value(bytes, 2, 7).unwrap();
        assert!(cas.is_modified_fs(&marker, bytes).unwrap());
    }

    #[test]
    fn test_index_log_transitions() {
        let mut log = IndexLog::default();
        let old = FsRef(10);
        let new = FsRef(500);

        log.on_add(new, true);
        log.on_add(new, true);
        assert_eq!(log.added, vec![new]);
        log.on_remove(new, true, false);
        assert!(log.added.is_empty());

        log.on_remove(old, false, false);
        assert!(log.removed.contains(&old));
        log.on_add(old, false);
        assert!(!log.removed.contains(&old));
        assert!(log.reindexed.contains(&old));

        log.on_remove(old, false, true);
        assert!(log.reindexed.contains(&old));
    }
}
