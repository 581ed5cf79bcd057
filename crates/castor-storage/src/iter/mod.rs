//! Cursors over indexes.
//!
//! A cursor does not borrow the store; every call takes it as an argument.
//! This lets callers mutate the store while a cursor is live, and lets the
//! index cursor detect that mutation: it keeps the modification stamp of
//! its index's type and fails the next step if the stamp moved.
//!
//! ```text
//!   IndexCursor        one index of one view, fail-fast
//!   FilteredCursor     skips positions failing a predicate
//!   AggregateCursor    several cursors end to end
//!   UnambiguousCursor  snapshot of non-overlapping annotations
//! ```

mod aggregate;
mod filtered;
mod index_cursor;
mod unambiguous;

pub use aggregate::AggregateCursor;
pub use filtered::{FilteredCursor, FsPredicate};
pub use index_cursor::IndexCursor;
pub use unambiguous::UnambiguousCursor;

use castor_common::{FsRef, Result, TypeCode};

use crate::index::ANNOTATION_INDEX;
use crate::store::{Cas, ViewId};

/// A bidirectional position over a sequence of records.
pub trait FsCursor {
    /// Returns true if the cursor is on an element.
    fn is_valid(&self) -> bool;

    /// Returns the element under the cursor.
    fn get(&self, cas: &Cas) -> Result<FsRef>;

    /// Moves to the first element.
    fn move_to_first(&mut self, cas: &Cas) -> Result<()>;

    /// Moves to the last element.
    fn move_to_last(&mut self, cas: &Cas) -> Result<()>;

    /// Moves to the next element, or off the end.
    fn move_to_next(&mut self, cas: &Cas) -> Result<()>;

    /// Moves to the previous element, or off the front.
    fn move_to_previous(&mut self, cas: &Cas) -> Result<()>;

    /// Moves to the first element not less than `target`.
    fn move_to(&mut self, cas: &Cas, target: FsRef) -> Result<()>;

    /// Returns an independent cursor at the same position.
    fn copy(&self) -> Box<dyn FsCursor>;
}

impl FsCursor for Box<dyn FsCursor> {
    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn get(&self, cas: &Cas) -> Result<FsRef> {
        (**self).get(cas)
    }

    fn move_to_first(&mut self, cas: &Cas) -> Result<()> {
        (**self).move_to_first(cas)
    }

    fn move_to_last(&mut self, cas: &Cas) -> Result<()> {
        (**self).move_to_last(cas)
    }

    fn move_to_next(&mut self, cas: &Cas) -> Result<()> {
        (**self).move_to_next(cas)
    }

    fn move_to_previous(&mut self, cas: &Cas) -> Result<()> {
        (**self).move_to_previous(cas)
    }

    fn move_to(&mut self, cas: &Cas, target: FsRef) -> Result<()> {
        (**self).move_to(cas, target)
    }

    fn copy(&self) -> Box<dyn FsCursor> {
        (**self).copy()
    }
}

/// Iterator adapter walking a cursor forward from its current position.
///
/// Yields an error, then stops, if the cursor fails.
pub struct FsIter<'a, C: FsCursor> {
    cas: &'a Cas,
    cursor: C,
    failed: bool,
}

impl<'a, C: FsCursor> FsIter<'a, C> {
    pub fn new(cas: &'a Cas, cursor: C) -> Self {
        Self {
            cas,
            cursor,
            failed: false,
        }
    }
}

impl<C: FsCursor> Iterator for FsIter<'_, C> {
    type Item = Result<FsRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.cursor.is_valid() {
            return None;
        }
        let step = self
            .cursor
            .get(self.cas)
            .and_then(|fs| self.cursor.move_to_next(self.cas).map(|_| fs));
        if step.is_err() {
            self.failed = true;
        }
        Some(step)
    }
}

/// Moves `cursor` to its first element and collects every element.
pub fn collect_all(cas: &Cas, cursor: &mut dyn FsCursor) -> Result<Vec<FsRef>> {
    let mut out = Vec::new();
    cursor.move_to_first(cas)?;
    while cursor.is_valid() {
        out.push(cursor.get(cas)?);
        cursor.move_to_next(cas)?;
    }
    Ok(out)
}

impl Cas {
    /// Returns a cursor over the index named `label` in `view`.
    pub fn cursor(&self, view: ViewId, label: &str) -> Result<IndexCursor> {
        IndexCursor::new(self, view, label)
    }

    /// Returns a cursor over the annotation index of `view`.
    pub fn annotation_cursor(&self, view: ViewId) -> Result<IndexCursor> {
        IndexCursor::new(self, view, ANNOTATION_INDEX)
    }

    /// Returns a cursor over the index named `label` in `view` restricted
    /// to records of type `t` or a subtype.
    pub fn subtype_cursor(
        &self,
        view: ViewId,
        label: &str,
        t: TypeCode,
    ) -> Result<FilteredCursor<IndexCursor>> {
        let inner = IndexCursor::new(self, view, label)?;
        FilteredCursor::of_type(self, inner, t)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::tests::test_cas;

    /// Store with annotations at the given spans, indexed in the initial
    /// view in the given order.
    pub(crate) fn cas_with_spans(spans: &[(i32, i32)]) -> (Cas, Vec<FsRef>) {
        let mut cas = test_cas();
        let mut refs = Vec::new();
        for (b, e) in spans {
            let fs = cas
                .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, *b, *e)
                .unwrap();
            cas.add_fs_to_indexes(ViewId::INITIAL, fs).unwrap();
            refs.push(fs);
        }
        (cas, refs)
    }

    #[test]
    fn test_fs_iter_walks_forward() {
        let (cas, refs) = cas_with_spans(&[(4, 5), (0, 1)]);
        let cursor = cas.annotation_cursor(ViewId::INITIAL).unwrap();
        let seen: Vec<FsRef> = FsIter::new(&cas, cursor)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(seen, vec![refs[1], refs[0]]);
    }

    #[test]
    fn test_collect_all_through_box() {
        let (cas, refs) = cas_with_spans(&[(0, 1), (2, 3)]);
        let mut boxed: Box<dyn FsCursor> =
            Box::new(cas.annotation_cursor(ViewId::INITIAL).unwrap());
        boxed.move_to_last(&cas).unwrap();
        assert_eq!(collect_all(&cas, &mut boxed).unwrap(), refs);
    }

    #[test]
    fn test_subtype_cursor() {
        let (mut cas, refs) = cas_with_spans(&[(0, 1)]);
        cas.set_document_text(ViewId::INITIAL, "abc").unwrap();
        let mut docs = cas
            .subtype_cursor(
                ViewId::INITIAL,
                ANNOTATION_INDEX,
                TypeCode::DOCUMENT_ANNOTATION,
            )
            .unwrap();
        let all = collect_all(&cas, &mut docs).unwrap();
        assert_eq!(all.len(), 1);
        assert_ne!(all[0], refs[0]);
    }
}
