//! Feature offsets and record sizes.
//!
//! One top-down walk from the root assigns every feature the cell offset it
//! keeps in every type that inherits it:
//!
//! ```text
//! cell:     0      1      2      3     4
//! Annot:  [type] [sofa] [begin] [end]
//! Token:  [type] [sofa] [begin] [end] [pos]
//! ```

use castor_common::{CasError, FeatureCode, Result, TypeCode, TypeSystem};

/// Per-feature offsets and per-type cell counts for one type system.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Cell offset of each feature, indexed by feature code.
    feature_offset: Vec<usize>,
    /// Cells of a non-array record, indexed by type code.
    type_cells: Vec<usize>,
}

impl Layout {
    /// Computes the layout of a committed type system.
    pub fn compute(ts: &TypeSystem) -> Result<Self> {
        if !ts.is_committed() {
            return Err(CasError::TypeSystemNotCommitted);
        }
        let mut feature_offset = vec![0; ts.feature_count()];
        let mut type_cells = vec![0; ts.type_count()];

        // (type, feature cells used by its parent)
        let mut stack = vec![(TypeCode::TOP, 0usize)];
        while let Some((t, inherited)) = stack.pop() {
            let introduced = ts.introduced_features(t);
            for (i, f) in introduced.iter().enumerate() {
                feature_offset[f.index()] = inherited + 1 + i;
            }
            let used = inherited + introduced.len();
            type_cells[t.index()] = 1 + used;
            for child in ts.direct_subtypes(t) {
                stack.push((*child, used));
            }
        }

        Ok(Self {
            feature_offset,
            type_cells,
        })
    }

    /// Returns the cell offset of a feature within any record carrying it.
    #[inline]
    pub fn feature_offset(&self, f: FeatureCode) -> usize {
        self.feature_offset[f.index()]
    }

    /// Returns the number of cells a record of type `t` occupies.
    ///
    /// Arrays are sized by their length instead.
    #[inline]
    pub fn type_cells(&self, t: TypeCode) -> usize {
        self.type_cells[t.index()]
    }
}
