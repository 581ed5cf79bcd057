//! Snapshot cursor over non-overlapping annotations.
//!
//! Built once from a cursor over annotations sorted by begin: an annotation
//! is kept if it begins at or after the end of the last kept one. With a
//! window, only annotations beginning inside it are considered; strict mode
//! also drops those ending past the window's end.
//!
//! ```text
//!   source   [0,3) [1,2) [3,5) [4,8) [5,6)
//!   kept     [0,3)       [3,5)       [5,6)
//! ```

use castor_common::{CasError, FeatureCode, FsRef, Result};

use super::FsCursor;
use crate::store::Cas;

/// Frozen, greedily chosen sequence of non-overlapping annotations.
#[derive(Debug, Clone)]
pub struct UnambiguousCursor {
    items: Vec<FsRef>,
    begins: Vec<i32>,
    pos: Option<usize>,
}

impl UnambiguousCursor {
    /// Builds the sequence from every element of `source`.
    pub fn new(cas: &Cas, source: &mut dyn FsCursor) -> Result<Self> {
        Self::build(cas, source, None, false, FsRef::NULL)
    }

    /// Builds the sequence from elements of `source` beginning in
    /// `[start, end)`.
    ///
    /// The window is half-open: an annotation is kept when
    /// `start <= begin < end`, so one beginning exactly at `end` is left
    /// out. With `strict` it must also end at or before `end`.
    pub fn with_window(
        cas: &Cas,
        source: &mut dyn FsCursor,
        start: i32,
        end: i32,
        strict: bool,
    ) -> Result<Self> {
        Self::build(cas, source, Some((start, end)), strict, FsRef::NULL)
    }

    /// Builds the sequence from elements of `source` inside the span of the
    /// annotation `cover`, excluding `cover` itself. The span is used as a
    /// half-open window, as in `with_window`.
    pub fn within(
        cas: &Cas,
        source: &mut dyn FsCursor,
        cover: FsRef,
        strict: bool,
    ) -> Result<Self> {
        let (start, end) = span(cas, cover)?;
        Self::build(cas, source, Some((start, end)), strict, cover)
    }

    fn build(
        cas: &Cas,
        source: &mut dyn FsCursor,
        window: Option<(i32, i32)>,
        strict: bool,
        skip: FsRef,
    ) -> Result<Self> {
        let mut items = Vec::new();
        let mut begins = Vec::new();
        let mut last_end: Option<i32> = None;

        source.move_to_first(cas)?;
        while source.is_valid() {
            let fs = source.get(cas)?;
            source.move_to_next(cas)?;
            if fs == skip {
                continue;
            }
            let (begin, end) = span(cas, fs)?;
            if let Some((start, stop)) = window {
                if begin < start || begin >= stop || (strict && end > stop) {
                    continue;
                }
            }
            if last_end.map_or(true, |last| begin >= last) {
                items.push(fs);
                begins.push(begin);
                last_end = Some(end);
            }
        }

        let pos = (!items.is_empty()).then_some(0);
        Ok(Self { items, begins, pos })
    }

    /// Returns the number of annotations kept.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing was kept.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn span(cas: &Cas, fs: FsRef) -> Result<(i32, i32)> {
    let t = cas.check_fs(fs)?;
    if !cas.type_system().is_annotation(t) {
        return Err(CasError::FeatureNotAppropriate {
            feature: cas.type_system().feature_name(FeatureCode::BEGIN),
            type_name: cas.type_system().type_name(t).to_string(),
        });
    }
    Ok((
        cas.ll_get_int_value(fs, FeatureCode::BEGIN),
        cas.ll_get_int_value(fs, FeatureCode::END),
    ))
}

impl FsCursor for UnambiguousCursor {
    fn is_valid(&self) -> bool {
        self.pos.is_some()
    }

    fn get(&self, _cas: &Cas) -> Result<FsRef> {
        self.pos
            .and_then(|p| self.items.get(p).copied())
            .ok_or(CasError::NoSuchElement)
    }

    fn move_to_first(&mut self, _cas: &Cas) -> Result<()> {
        self.pos = (!self.items.is_empty()).then_some(0);
        Ok(())
    }

    fn move_to_last(&mut self, _cas: &Cas) -> Result<()> {
        self.pos = self.items.len().checked_sub(1);
        Ok(())
    }

    fn move_to_next(&mut self, _cas: &Cas) -> Result<()> {
        let len = self.items.len();
        self.pos = self.pos.map(|p| p + 1).filter(|p| *p < len);
        Ok(())
    }

    fn move_to_previous(&mut self, _cas: &Cas) -> Result<()> {
        self.pos = self.pos.and_then(|p| p.checked_sub(1));
        Ok(())
    }

    /// Lands on the first kept annotation beginning at or after `target`.
    fn move_to(&mut self, cas: &Cas, target: FsRef) -> Result<()> {
        let (begin, _) = span(cas, target)?;
        let p = self.begins.partition_point(|b| *b < begin);
        self.pos = (p < self.items.len()).then_some(p);
        Ok(())
    }

    fn copy(&self) -> Box<dyn FsCursor> {
        Box::new(self.clone())
    }
}
