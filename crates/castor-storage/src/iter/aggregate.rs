//! Cursor concatenating several cursors.

use castor_common::{CasError, FsRef, Result};

use super::FsCursor;
use crate::store::Cas;

/// Walks each wrapped cursor in turn, in the order given.
///
/// `current` is the index of the cursor holding the position, or
/// `cursors.len()` when the aggregate is invalid.
pub struct AggregateCursor {
    cursors: Vec<Box<dyn FsCursor>>,
    current: usize,
}

impl AggregateCursor {
    /// Creates an aggregate positioned on its first element.
    pub fn new(cas: &Cas, cursors: Vec<Box<dyn FsCursor>>) -> Result<Self> {
        let mut cursor = Self {
            current: cursors.len(),
            cursors,
        };
        cursor.move_to_first(cas)?;
        Ok(cursor)
    }

    /// Positions on the first element of cursor `from` or a later one.
    fn first_from(&mut self, cas: &Cas, from: usize) -> Result<()> {
        for i in from..self.cursors.len() {
            self.cursors[i].move_to_first(cas)?;
            if self.cursors[i].is_valid() {
                self.current = i;
                return Ok(());
            }
        }
        self.current = self.cursors.len();
        Ok(())
    }

    /// Positions on the last element of cursor `upto - 1` or an earlier one.
    fn last_before(&mut self, cas: &Cas, upto: usize) -> Result<()> {
        for i in (0..upto).rev() {
            self.cursors[i].move_to_last(cas)?;
            if self.cursors[i].is_valid() {
                self.current = i;
                return Ok(());
            }
        }
        self.current = self.cursors.len();
        Ok(())
    }
}

impl FsCursor for AggregateCursor {
    fn is_valid(&self) -> bool {
        self.current < self.cursors.len()
    }

    fn get(&self, cas: &Cas) -> Result<FsRef> {
        match self.cursors.get(self.current) {
            Some(c) => c.get(cas),
            None => Err(CasError::NoSuchElement),
        }
    }

    fn move_to_first(&mut self, cas: &Cas) -> Result<()> {
        self.first_from(cas, 0)
    }

    fn move_to_last(&mut self, cas: &Cas) -> Result<()> {
        self.last_before(cas, self.cursors.len())
    }

    fn move_to_next(&mut self, cas: &Cas) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        let i = self.current;
        self.cursors[i].move_to_next(cas)?;
        if self.cursors[i].is_valid() {
            return Ok(());
        }
        self.first_from(cas, i + 1)
    }

    fn move_to_previous(&mut self, cas: &Cas) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        let i = self.current;
        self.cursors[i].move_to_previous(cas)?;
        if self.cursors[i].is_valid() {
            return Ok(());
        }
        self.last_before(cas, i)
    }

    fn move_to(&mut self, _cas: &Cas, _target: FsRef) -> Result<()> {
        Err(CasError::UnsupportedOperation(
            "move_to on an aggregate cursor".to_string(),
        ))
    }

    fn copy(&self) -> Box<dyn FsCursor> {
        Box::new(AggregateCursor {
            cursors: self.cursors.iter().map(|c| c.copy()).collect(),
            current: self.current,
        })
    }
}
