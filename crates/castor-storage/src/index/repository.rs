//! Per-view index repository.
//!
//! A repository instantiates every index definition of its store. Adding a
//! record inserts it into each index whose type subsumes the record's type,
//! and bumps the modification counter of that type. Cursors sum the
//! counters of their index's type and subtypes; counters only grow, so a
//! changed sum means the index changed shape.

use std::collections::HashMap;
use std::sync::Arc;

use castor_common::{CasError, FsRef, Result, TypeCode, TypeSystem};

use super::comparator::Comparator;
use super::leaf::FsIndex;
use super::spec::{IndexKind, IndexSpec};
use crate::heap::constants::TYPE_CELL;
use crate::heap::Heaps;
use crate::layout::Layout;

/// Compiled index definitions shared by every view of a store.
#[derive(Debug)]
pub struct IndexDefinitions {
    specs: Vec<Arc<IndexSpec>>,
    comparators: Vec<Arc<Comparator>>,
    labels: HashMap<String, usize>,
    /// Index slots that accept records of each type code.
    applicable: Vec<Vec<usize>>,
    type_count: usize,
}

impl IndexDefinitions {
    /// Validates and compiles `specs`.
    pub fn new(ts: &TypeSystem, layout: &Layout, specs: Vec<IndexSpec>) -> Result<Self> {
        let mut labels = HashMap::new();
        let mut compiled_specs = Vec::with_capacity(specs.len());
        let mut comparators = Vec::with_capacity(specs.len());
        for (slot, spec) in specs.into_iter().enumerate() {
            if labels.insert(spec.label.clone(), slot).is_some() {
                return Err(CasError::DuplicateIndex(spec.label));
            }
            comparators.push(Arc::new(Comparator::compile(&spec, ts, layout)?));
            compiled_specs.push(Arc::new(spec));
        }

        let mut applicable = vec![Vec::new(); ts.type_count()];
        for (slot, spec) in compiled_specs.iter().enumerate() {
            for t in ts.all_subtypes(spec.type_code) {
                applicable[t.index()].push(slot);
            }
        }

        Ok(Self {
            specs: compiled_specs,
            comparators,
            labels,
            applicable,
            type_count: ts.type_count(),
        })
    }

    /// Returns every definition in slot order.
    pub fn specs(&self) -> impl Iterator<Item = &IndexSpec> {
        self.specs.iter().map(|s| s.as_ref())
    }

    /// Returns the slot of a label.
    pub fn slot(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }
}

/// The indexes of one view.
#[derive(Debug, Clone)]
pub struct IndexRepository {
    defs: Arc<IndexDefinitions>,
    indexes: Vec<FsIndex>,
    counters: Vec<u64>,
    /// Every indexed record in first-added order.
    members: Vec<FsRef>,
    /// Times each member was added and not yet removed.
    occurrences: HashMap<FsRef, usize>,
}

impl IndexRepository {
    /// Creates a repository with one empty instance of every definition.
    pub fn new(defs: Arc<IndexDefinitions>) -> Self {
        let indexes = defs
            .specs
            .iter()
            .zip(&defs.comparators)
            .map(|(spec, cmp)| FsIndex::new(Arc::clone(spec), Arc::clone(cmp)))
            .collect();
        let counters = vec![0; defs.type_count];
        Self {
            defs,
            indexes,
            counters,
            members: Vec::new(),
            occurrences: HashMap::new(),
        }
    }

    fn record_type(heaps: &Heaps, fs: FsRef) -> usize {
        heaps.heap.get(fs.addr() + TYPE_CELL) as usize
    }

    fn bump(&mut self, t: usize) {
        if let Some(c) = self.counters.get_mut(t) {
            *c += 1;
        }
    }

    /// Adds `fs` to every applicable index. Returns true if any index took it.
    pub fn add(&mut self, heaps: &Heaps, fs: FsRef) -> bool {
        let t = Self::record_type(heaps, fs);
        let mut inserted = false;
        if let Some(slots) = self.defs.applicable.get(t) {
            for slot in slots {
                inserted |= self.indexes[*slot].insert(heaps, fs);
            }
        }
        let held = self.occurrences.entry(fs).or_insert(0);
        if *held == 0 {
            self.members.push(fs);
        }
        *held += 1;
        self.bump(t);
        inserted
    }

    /// Removes one occurrence of `fs` from every applicable index.
    /// Returns true if `fs` was indexed.
    ///
    /// Set indexes hold a record once however often it was added, and give
    /// it up only with its last occurrence.
    pub fn remove(&mut self, heaps: &Heaps, fs: FsRef) -> bool {
        let held = match self.occurrences.get(&fs) {
            Some(held) => *held,
            None => return false,
        };
        let t = Self::record_type(heaps, fs);
        if let Some(slots) = self.defs.applicable.get(t) {
            for slot in slots {
                let index = &mut self.indexes[*slot];
                if held > 1 && index.kind() == IndexKind::Set {
                    continue;
                }
                index.remove(heaps, fs);
            }
        }
        if held == 1 {
            self.occurrences.remove(&fs);
            self.members.retain(|m| *m != fs);
        } else {
            self.occurrences.insert(fs, held - 1);
        }
        self.bump(t);
        true
    }

    /// Removes every occurrence of `fs`. Returns true if `fs` was indexed.
    pub fn remove_all_occurrences(&mut self, heaps: &Heaps, fs: FsRef) -> bool {
        let t = Self::record_type(heaps, fs);
        let mut removed = false;
        if let Some(slots) = self.defs.applicable.get(t) {
            for slot in slots {
                removed |= self.indexes[*slot].remove_all(fs) > 0;
            }
        }
        if self.occurrences.remove(&fs).is_some() {
            self.members.retain(|m| *m != fs);
            removed = true;
        }
        self.bump(t);
        removed
    }

    /// Removes every record of type `t` or a subtype. Returns the records
    /// that were indexed.
    pub fn remove_all_of_type(
        &mut self,
        ts: &TypeSystem,
        heaps: &Heaps,
        t: TypeCode,
    ) -> Vec<FsRef> {
        let matches = |fs: FsRef| ts.subsumes(t, TypeCode(Self::record_type(heaps, fs) as u32));
        for index in &mut self.indexes {
            index.remove_where(matches);
        }
        let mut removed = Vec::new();
        self.members.retain(|fs| {
            if matches(*fs) {
                removed.push(*fs);
                false
            } else {
                true
            }
        });
        for fs in &removed {
            self.occurrences.remove(fs);
        }
        for sub in ts.all_subtypes(t) {
            self.bump(sub.index());
        }
        removed
    }

    /// Empties every index. Live cursors over any index become stale.
    pub fn flush(&mut self) {
        for index in &mut self.indexes {
            index.clear();
        }
        self.members.clear();
        self.occurrences.clear();
        for c in &mut self.counters {
            *c += 1;
        }
    }

    /// Returns the slot of the index named `label`.
    pub fn slot(&self, label: &str) -> Result<usize> {
        self.defs
            .slot(label)
            .ok_or_else(|| CasError::IndexNotFound(label.to_string()))
    }

    /// Returns the index named `label`.
    pub fn index(&self, label: &str) -> Result<&FsIndex> {
        let slot = self.slot(label)?;
        Ok(&self.indexes[slot])
    }

    /// Returns the index in `slot`.
    pub fn index_at(&self, slot: usize) -> Option<&FsIndex> {
        self.indexes.get(slot)
    }

    /// Returns every index in slot order.
    pub fn indexes(&self) -> &[FsIndex] {
        &self.indexes
    }

    /// Returns the modification stamp of `t` and its subtypes.
    pub fn stamp(&self, ts: &TypeSystem, t: TypeCode) -> u64 {
        ts.all_subtypes(t)
            .iter()
            .filter_map(|s| self.counters.get(s.index()))
            .sum()
    }

    /// Returns every indexed record in first-added order.
    pub fn members(&self) -> &[FsRef] {
        &self.members
    }

    /// Returns true if `fs` is indexed.
    pub fn is_member(&self, fs: FsRef) -> bool {
        self.occurrences.contains_key(&fs)
    }

    /// Returns how many times `fs` was added and not yet removed.
    pub fn occurrences(&self, fs: FsRef) -> usize {
        self.occurrences.get(&fs).copied().unwrap_or(0)
    }

    /// Returns every indexed record in first-added order, each repeated once
    /// per occurrence. Adding these in order rebuilds the repository.
    pub fn member_occurrences(&self) -> Vec<FsRef> {
        self.members
            .iter()
            .flat_map(|fs| std::iter::repeat(*fs).take(self.occurrences(*fs)))
            .collect()
    }

    /// Returns the indexed records of type `t` or a subtype.
    pub fn all_indexed(&self, ts: &TypeSystem, heaps: &Heaps, t: TypeCode) -> Vec<FsRef> {
        self.members
            .iter()
            .copied()
            .filter(|fs| ts.subsumes(t, TypeCode(Self::record_type(heaps, *fs) as u32)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castor_common::{CasConfig, FeatureCode};

    struct Fixture {
        ts: TypeSystem,
        layout: Layout,
        heaps: Heaps,
        repo: IndexRepository,
    }

    fn fixture() -> Fixture {
        let mut ts = TypeSystem::new();
        ts.commit();
        let layout = Layout::compute(&ts).unwrap();
        let defs = IndexDefinitions::new(
            &ts,
            &layout,
            vec![
                IndexSpec::annotation_index(),
                IndexSpec::bag("all", TypeCode::ANNOTATION_BASE),
            ],
        )
        .unwrap();
        Fixture {
            heaps: Heaps::new(&CasConfig::default().with_page_size(1000)),
            repo: IndexRepository::new(Arc::new(defs)),
            ts,
            layout,
        }
    }

    fn annotation(fx: &mut Fixture, t: TypeCode, begin: i32) -> FsRef {
        let fs = fx
            .heaps
            .heap
            .allocate(fx.layout.type_cells(t), t.0 as i32)
            .unwrap();
        let off = fx.layout.feature_offset(FeatureCode::BEGIN);
        fx.heaps.heap.set(fs.addr() + off, begin);
        fs
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let fx = fixture();
        let err = IndexDefinitions::new(
            &fx.ts,
            &fx.layout,
            vec![IndexSpec::sofa_index(), IndexSpec::sofa_index()],
        )
        .unwrap_err();
        assert!(matches!(err, CasError::DuplicateIndex(_)));
    }

    #[test]
    fn test_add_reaches_every_applicable_index() {
        let mut fx = fixture();
        let a = annotation(&mut fx, TypeCode::ANNOTATION, 0);
        assert!(fx.repo.add(&fx.heaps, a));
        assert_eq!(fx.repo.index("AnnotationIndex").unwrap().len(), 1);
        assert_eq!(fx.repo.index("all").unwrap().len(), 1);
        assert_eq!(fx.repo.members(), &[a]);
    }

    #[test]
    fn test_unindexed_type_still_member() {
        let mut fx = fixture();
        let top = fx.heaps.heap.allocate(1, TypeCode::TOP.0 as i32).unwrap();
        assert!(!fx.repo.add(&fx.heaps, top));
        assert!(fx.repo.is_member(top));
        assert!(fx.repo.remove(&fx.heaps, top));
        assert!(!fx.repo.is_member(top));
    }

    #[test]
    fn test_stamp_changes_on_subtype_update() {
        let mut fx = fixture();
        let before = fx.repo.stamp(&fx.ts, TypeCode::ANNOTATION);
        let d = annotation(&mut fx, TypeCode::DOCUMENT_ANNOTATION, 0);
        fx.repo.add(&fx.heaps, d);
        assert_ne!(fx.repo.stamp(&fx.ts, TypeCode::ANNOTATION), before);

        let sofa_before = fx.repo.stamp(&fx.ts, TypeCode::SOFA);
        let a = annotation(&mut fx, TypeCode::ANNOTATION, 1);
        fx.repo.add(&fx.heaps, a);
        assert_eq!(fx.repo.stamp(&fx.ts, TypeCode::SOFA), sofa_before);
    }

    #[test]
    fn test_remove_keeps_member_while_duplicate_held() {
        let mut fx = fixture();
        let a = annotation(&mut fx, TypeCode::ANNOTATION, 0);
        fx.repo.add(&fx.heaps, a);
        fx.repo.add(&fx.heaps, a);
        assert!(fx.repo.remove(&fx.heaps, a));
        assert!(fx.repo.is_member(a));
        assert!(fx.repo.remove(&fx.heaps, a));
        assert!(!fx.repo.is_member(a));
        assert!(!fx.repo.remove(&fx.heaps, a));
    }

    #[test]
    fn test_occurrences_rebuild_bag() {
        let mut fx = fixture();
        let a = annotation(&mut fx, TypeCode::ANNOTATION, 0);
        let b = annotation(&mut fx, TypeCode::ANNOTATION, 1);
        fx.repo.add(&fx.heaps, a);
        fx.repo.add(&fx.heaps, b);
        fx.repo.add(&fx.heaps, a);
        assert_eq!(fx.repo.members(), &[a, b]);
        assert_eq!(fx.repo.occurrences(a), 2);
        assert_eq!(fx.repo.member_occurrences(), vec![a, a, b]);

        let mut copy = IndexRepository::new(Arc::clone(&fx.repo.defs));
        for fs in fx.repo.member_occurrences() {
            copy.add(&fx.heaps, fs);
        }
        assert_eq!(copy.index("all").unwrap().len(), 3);
        assert_eq!(copy.member_occurrences(), fx.repo.member_occurrences());
    }

    #[test]
    fn test_remove_all_of_type() {
        let mut fx = fixture();
        let a = annotation(&mut fx, TypeCode::ANNOTATION, 0);
        let d = annotation(&mut fx, TypeCode::DOCUMENT_ANNOTATION, 0);
        fx.repo.add(&fx.heaps, a);
        fx.repo.add(&fx.heaps, d);
        let removed = fx
            .repo
            .remove_all_of_type(&fx.ts, &fx.heaps, TypeCode::DOCUMENT_ANNOTATION);
        assert_eq!(removed, vec![d]);
        assert_eq!(fx.repo.members(), &[a]);
        assert_eq!(fx.repo.index("AnnotationIndex").unwrap().entries(), &[a]);
    }

    #[test]
    fn test_flush_bumps_all_stamps() {
        let mut fx = fixture();
        let a = annotation(&mut fx, TypeCode::ANNOTATION, 0);
        fx.repo.add(&fx.heaps, a);
        let stamp = fx.repo.stamp(&fx.ts, TypeCode::SOFA);
        fx.repo.flush();
        assert!(fx.repo.members().is_empty());
        assert!(fx.repo.index("AnnotationIndex").unwrap().is_empty());
        assert_ne!(fx.repo.stamp(&fx.ts, TypeCode::SOFA), stamp);
    }

    #[test]
    fn test_all_indexed_filters_by_type() {
        let mut fx = fixture();
        let a = annotation(&mut fx, TypeCode::ANNOTATION, 0);
        let d = annotation(&mut fx, TypeCode::DOCUMENT_ANNOTATION, 0);
        fx.repo.add(&fx.heaps, a);
        fx.repo.add(&fx.heaps, d);
        assert_eq!(
            fx.repo
                .all_indexed(&fx.ts, &fx.heaps, TypeCode::DOCUMENT_ANNOTATION),
            vec![d]
        );
        assert_eq!(
            fx.repo.all_indexed(&fx.ts, &fx.heaps, TypeCode::TOP),
            vec![a, d]
        );
    }

    #[test]
    fn test_unknown_label() {
        let fx = fixture();
        assert!(matches!(
            fx.repo.index("nope"),
            Err(CasError::IndexNotFound(_))
        ));
    }
}
