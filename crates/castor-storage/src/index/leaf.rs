//! One instantiated index: a comparator plus the addresses it holds.

use std::cmp::Ordering;
use std::sync::Arc;

use castor_common::{FsRef, TypeCode};

use super::comparator::Comparator;
use super::spec::{IndexKind, IndexSpec};
use crate::heap::Heaps;

/// An index of one view.
///
/// Sorted and set indexes keep `entries` ordered by the comparator, equal
/// entries in insertion order. Bags keep insertion order only.
#[derive(Debug, Clone)]
pub struct FsIndex {
    spec: Arc<IndexSpec>,
    comparator: Arc<Comparator>,
    entries: Vec<FsRef>,
}

impl FsIndex {
    /// Creates an empty index.
    pub fn new(spec: Arc<IndexSpec>, comparator: Arc<Comparator>) -> Self {
        Self {
            spec,
            comparator,
            entries: Vec::new(),
        }
    }

    /// Returns the index label.
    pub fn label(&self) -> &str {
        &self.spec.label
    }

    /// Returns the indexed type.
    pub fn type_code(&self) -> TypeCode {
        self.spec.type_code
    }

    /// Returns the index kind.
    pub fn kind(&self) -> IndexKind {
        self.spec.kind
    }

    /// Returns the comparator.
    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry at `pos`.
    pub fn get(&self, pos: usize) -> Option<FsRef> {
        self.entries.get(pos).copied()
    }

    /// Returns every entry in index order.
    pub fn entries(&self) -> &[FsRef] {
        &self.entries
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// First position whose entry is not less than `target`.
    pub fn lower_bound(&self, heaps: &Heaps, target: FsRef) -> usize {
        self.entries
            .partition_point(|e| self.comparator.compare(heaps, *e, target) == Ordering::Less)
    }

    /// First position whose entry is greater than `target`.
    fn upper_bound(&self, heaps: &Heaps, target: FsRef) -> usize {
        self.entries
            .partition_point(|e| self.comparator.compare(heaps, *e, target) != Ordering::Greater)
    }

    /// Adds `fs`. Returns false if a set index already holds an equal entry.
    pub fn insert(&mut self, heaps: &Heaps, fs: FsRef) -> bool {
        match self.spec.kind {
            IndexKind::Bag => {
                self.entries.push(fs);
                true
            }
            IndexKind::Sorted => {
                let pos = self.upper_bound(heaps, fs);
                self.entries.insert(pos, fs);
                true
            }
            IndexKind::Set => {
                let pos = self.lower_bound(heaps, fs);
                if let Some(existing) = self.entries.get(pos) {
                    if self.comparator.compare(heaps, *existing, fs) == Ordering::Equal {
                        return false;
                    }
                }
                self.entries.insert(pos, fs);
                true
            }
        }
    }

    /// Finds the position of `fs` by address.
    ///
    /// Ordered indexes search the run of entries equal to `fs` first and
    /// fall back to a scan, which covers entries whose keys changed while
    /// indexed.
    pub fn find(&self, heaps: &Heaps, fs: FsRef) -> Option<usize> {
        if self.spec.kind != IndexKind::Bag {
            let mut pos = self.lower_bound(heaps, fs);
            while let Some(e) = self.entries.get(pos) {
                if *e == fs {
                    return Some(pos);
                }
                if self.comparator.compare(heaps, *e, fs) != Ordering::Equal {
                    break;
                }
                pos += 1;
            }
        }
        self.entries.iter().position(|e| *e == fs)
    }

    /// Returns true if `fs` is held.
    pub fn contains(&self, heaps: &Heaps, fs: FsRef) -> bool {
        self.find(heaps, fs).is_some()
    }

    /// Removes one occurrence of `fs`. Returns false if absent.
    pub fn remove(&mut self, heaps: &Heaps, fs: FsRef) -> bool {
        match self.find(heaps, fs) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes every occurrence of `fs`. Returns the number removed.
    pub fn remove_all(&mut self, fs: FsRef) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| *e != fs);
        before - self.entries.len()
    }

    /// Removes every entry matching `pred`. Returns the removed entries.
    pub fn remove_where(&mut self, mut pred: impl FnMut(FsRef) -> bool) -> Vec<FsRef> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if pred(*e) {
                removed.push(*e);
                false
            } else {
                true
            }
        });
        removed
    }
}
