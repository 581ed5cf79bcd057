//! Cursor restricted by a predicate.

use std::rc::Rc;

use castor_common::{CasError, FsRef, Result, TypeCode};

use super::FsCursor;
use crate::store::Cas;

/// Predicate over records, evaluated against the store at each step.
pub type FsPredicate = Rc<dyn Fn(&Cas, FsRef) -> bool>;

/// Wraps a cursor and skips every element failing a predicate.
///
/// After every move the wrapped cursor is either on a matching element or
/// invalid; skipping continues in the direction of the move.
pub struct FilteredCursor<C: FsCursor> {
    inner: C,
    pred: FsPredicate,
}

impl<C: FsCursor> FilteredCursor<C> {
    /// Wraps `inner`, advancing it to the first match from its position.
    pub fn new(cas: &Cas, inner: C, pred: FsPredicate) -> Result<Self> {
        let mut cursor = Self { inner, pred };
        cursor.skip_forward(cas)?;
        Ok(cursor)
    }

    /// Wraps `inner`, keeping records of type `t` or a subtype.
    pub fn of_type(cas: &Cas, inner: C, t: TypeCode) -> Result<Self> {
        if !cas.type_system().is_valid_type(t) {
            return Err(CasError::InvalidTypeCode(t.0));
        }
        let pred: FsPredicate = Rc::new(move |cas: &Cas, fs: FsRef| {
            cas.type_system().subsumes(t, cas.ll_type(fs))
        });
        Self::new(cas, inner, pred)
    }

    /// Returns the wrapped cursor.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn skip_forward(&mut self, cas: &Cas) -> Result<()> {
        while self.inner.is_valid() {
            let fs = self.inner.get(cas)?;
            if (self.pred)(cas, fs) {
                break;
            }
            self.inner.move_to_next(cas)?;
        }
        Ok(())
    }

    fn skip_backward(&mut self, cas: &Cas) -> Result<()> {
        while self.inner.is_valid() {
            let fs = self.inner.get(cas)?;
            if (self.pred)(cas, fs) {
                break;
            }
            self.inner.move_to_previous(cas)?;
        }
        Ok(())
    }
}

impl<C: FsCursor> FsCursor for FilteredCursor<C> {
    fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    fn get(&self, cas: &Cas) -> Result<FsRef> {
        self.inner.get(cas)
    }

    fn move_to_first(&mut self, cas: &Cas) -> Result<()> {
        self.inner.move_to_first(cas)?;
        self.skip_forward(cas)
    }

    fn move_to_last(&mut self, cas: &Cas) -> Result<()> {
        self.inner.move_to_last(cas)?;
        self.skip_backward(cas)
    }

    fn move_to_next(&mut self, cas: &Cas) -> Result<()> {
        self.inner.move_to_next(cas)?;
        self.skip_forward(cas)
    }

    fn move_to_previous(&mut self, cas: &Cas) -> Result<()> {
        self.inner.move_to_previous(cas)?;
        self.skip_backward(cas)
    }

    fn move_to(&mut self, cas: &Cas, target: FsRef) -> Result<()> {
        self.inner.move_to(cas, target)?;
        self.skip_forward(cas)
    }

    fn copy(&self) -> Box<dyn FsCursor> {
        Box::new(FilteredCursor {
            inner: self.inner.copy(),
            pred: Rc::clone(&self.pred),
        })
    }
}
