//! Fail-fast cursor over one index.

use castor_common::{CasError, FsRef, Result, TypeCode};

use super::FsCursor;
use crate::index::{FsIndex, IndexKind};
use crate::store::{Cas, ViewId};

/// Cursor over one index of one view.
///
/// Positioning calls (`move_to_first`, `move_to_last`, `move_to`) take a
/// fresh stamp. Every other call fails with `ConcurrentModification` if the
/// index's type or one of its subtypes was updated since.
#[derive(Debug, Clone)]
pub struct IndexCursor {
    view: ViewId,
    slot: usize,
    label: String,
    type_code: TypeCode,
    pos: Option<usize>,
    stamp: u64,
}

impl IndexCursor {
    /// Creates a cursor on the first element of index `label` in `view`.
    pub fn new(cas: &Cas, view: ViewId, label: &str) -> Result<Self> {
        let repo = cas.repository(view)?;
        let slot = repo.slot(label)?;
        let type_code = repo.indexes()[slot].type_code();
        let mut cursor = Self {
            view,
            slot,
            label: label.to_string(),
            type_code,
            pos: None,
            stamp: 0,
        };
        cursor.move_to_first(cas)?;
        Ok(cursor)
    }

    /// Returns the view the cursor walks.
    pub fn view(&self) -> ViewId {
        self.view
    }

    /// Returns the label of the index the cursor walks.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn index<'c>(&self, cas: &'c Cas) -> Result<&'c FsIndex> {
        cas.repository(self.view)?
            .index_at(self.slot)
            .ok_or_else(|| CasError::IndexNotFound(self.label.clone()))
    }

    fn current_stamp(&self, cas: &Cas) -> Result<u64> {
        Ok(cas
            .repository(self.view)?
            .stamp(cas.type_system(), self.type_code))
    }

    /// Returns the index if it has not changed since the last stamp.
    fn checked_index<'c>(&self, cas: &'c Cas) -> Result<&'c FsIndex> {
        if self.current_stamp(cas)? != self.stamp {
            return Err(CasError::ConcurrentModification {
                index: self.label.clone(),
            });
        }
        self.index(cas)
    }

    fn restamp<'c>(&mut self, cas: &'c Cas) -> Result<&'c FsIndex> {
        self.stamp = self.current_stamp(cas)?;
        self.index(cas)
    }
}

impl FsCursor for IndexCursor {
    fn is_valid(&self) -> bool {
        self.pos.is_some()
    }

    fn get(&self, cas: &Cas) -> Result<FsRef> {
        let index = self.checked_index(cas)?;
        self.pos
            .and_then(|p| index.get(p))
            .ok_or(CasError::NoSuchElement)
    }

    fn move_to_first(&mut self, cas: &Cas) -> Result<()> {
        let len = self.restamp(cas)?.len();
        self.pos = (len > 0).then_some(0);
        Ok(())
    }

    fn move_to_last(&mut self, cas: &Cas) -> Result<()> {
        let len = self.restamp(cas)?.len();
        self.pos = len.checked_sub(1);
        Ok(())
    }

    fn move_to_next(&mut self, cas: &Cas) -> Result<()> {
        let len = self.checked_index(cas)?.len();
        self.pos = self.pos.map(|p| p + 1).filter(|p| *p < len);
        Ok(())
    }

    fn move_to_previous(&mut self, cas: &Cas) -> Result<()> {
        self.checked_index(cas)?;
        self.pos = self.pos.and_then(|p| p.checked_sub(1));
        Ok(())
    }

    /// Sorted and set indexes land on the first element not less than
    /// `target`. Bags land on `target` itself, or become invalid.
    fn move_to(&mut self, cas: &Cas, target: FsRef) -> Result<()> {
        if !cas.is_valid_fs(target) {
            return Err(CasError::InvalidFsRef(target.0));
        }
        let index = self.restamp(cas)?;
        self.pos = match index.kind() {
            IndexKind::Bag => index.entries().iter().position(|e| *e == target),
            IndexKind::Sorted | IndexKind::Set => {
                let lb = index.lower_bound(cas.heaps(), target);
                (lb < index.len()).then_some(lb)
            }
        };
        Ok(())
    }

    fn copy(&self) -> Box<dyn FsCursor> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ANNOTATION_INDEX;
    use crate::iter::tests::cas_with_spans;
    use castor_common::ErrorKind;

    #[test]
    fn test_walk_both_directions() {
        let (cas, refs) = cas_with_spans(&[(2, 3), (0, 1), (4, 5)]);
        let mut c = cas.annotation_cursor(ViewId::INITIAL).unwrap();
        assert_eq!(c.get(&cas).unwrap(), refs[1]);
        c.move_to_next(&cas).unwrap();
        assert_eq!(c.get(&cas).unwrap(), refs[0]);
        c.move_to_last(&cas).unwrap();
        assert_eq!(c.get(&cas).unwrap(), refs[2]);
        c.move_to_next(&cas).unwrap();
        assert!(!c.is_valid());
        assert!(matches!(c.get(&cas), Err(CasError::NoSuchElement)));

        c.move_to_first(&cas).unwrap();
        c.move_to_previous(&cas).unwrap();
        assert!(!c.is_valid());
    }

    #[test]
    fn test_fail_fast_on_update() {
        let (mut cas, _) = cas_with_spans(&[(0, 1), (2, 3)]);
        let mut c = cas.annotation_cursor(ViewId::INITIAL).unwrap();
        let extra = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 9, 9)
            .unwrap();
        cas.add_fs_to_indexes(ViewId::INITIAL, extra).unwrap();

        let err = c.move_to_next(&cas).unwrap_err();
        assert!(matches!(err, CasError::ConcurrentModification { .. }));
        assert_eq!(err.kind(), ErrorKind::Concurrency);
        assert!(c.get(&cas).is_err());

        c.move_to_first(&cas).unwrap();
        c.move_to_next(&cas).unwrap();
        assert!(c.is_valid());
    }

    #[test]
    fn test_unrelated_type_does_not_break_cursor() {
        let (mut cas, refs) = cas_with_spans(&[(0, 1), (2, 3)]);
        let mut c = cas.annotation_cursor(ViewId::INITIAL).unwrap();
        let top = cas.create_fs(ViewId::INITIAL, TypeCode::TOP).unwrap();
        cas.add_fs_to_indexes(ViewId::INITIAL, top).unwrap();
        c.move_to_next(&cas).unwrap();
        assert_eq!(c.get(&cas).unwrap(), refs[1]);
    }

    #[test]
    fn test_move_to_lower_bound() {
        let (mut cas, refs) = cas_with_spans(&[(0, 1), (4, 5), (8, 9)]);
        let target = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 3, 3)
            .unwrap();
        let mut c = cas.annotation_cursor(ViewId::INITIAL).unwrap();
        c.move_to(&cas, target).unwrap();
        assert_eq!(c.get(&cas).unwrap(), refs[1]);
        c.move_to(&cas, refs[2]).unwrap();
        assert_eq!(c.get(&cas).unwrap(), refs[2]);

        let past = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 20, 20)
            .unwrap();
        c.move_to(&cas, past).unwrap();
        assert!(!c.is_valid());
    }

    #[test]
    fn test_copy_is_independent() {
        let (cas, refs) = cas_with_spans(&[(0, 1), (2, 3)]);
        let mut c = cas.cursor(ViewId::INITIAL, ANNOTATION_INDEX).unwrap();
        let copy = c.copy();
        c.move_to_next(&cas).unwrap();
        assert_eq!(copy.get(&cas).unwrap(), refs[0]);
        assert_eq!(c.get(&cas).unwrap(), refs[1]);
    }

    #[test]
    fn test_reset_invalidates_cursor() {
        let (mut cas, _) = cas_with_spans(&[(0, 1)]);
        let mut c = cas.annotation_cursor(ViewId::INITIAL).unwrap();
        cas.reset().unwrap();
        assert!(matches!(
            c.move_to_next(&cas),
            Err(CasError::ConcurrentModification { .. })
        ));
    }

    #[test]
    fn test_unknown_index() {
        let (cas, _) = cas_with_spans(&[]);
        assert!(matches!(
            cas.cursor(ViewId::INITIAL, "missing"),
            Err(CasError::IndexNotFound(_))
        ));
    }
}
