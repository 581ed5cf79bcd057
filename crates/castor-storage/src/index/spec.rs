//! Index definitions.

use castor_common::{CasError, FeatureCode, Result, TypeCode, TypeSystem};
use serde::{Deserialize, Serialize};

/// Label of the built-in annotation index.
pub const ANNOTATION_INDEX: &str = "AnnotationIndex";

/// Label of the built-in Sofa index held by the base store.
pub const SOFA_INDEX: &str = "SofaIndex";

/// How an index orders and deduplicates its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Ordered by the comparator; equal entries are all kept.
    Sorted,
    /// Ordered by the comparator; an entry equal to an existing one is ignored.
    Set,
    /// Insertion order, no comparator.
    Bag,
}

/// Direction of one comparator key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyDirection {
    /// Smaller values first.
    #[default]
    Standard,
    /// Larger values first.
    Reverse,
}

/// One comparator key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    /// Compare a feature's value.
    Feature {
        feature: FeatureCode,
        direction: KeyDirection,
    },
    /// Compare record types by the type system's default order.
    TypeOrder,
}

impl IndexKey {
    /// Ascending key on `feature`.
    pub fn asc(feature: FeatureCode) -> Self {
        IndexKey::Feature {
            feature,
            direction: KeyDirection::Standard,
        }
    }

    /// Descending key on `feature`.
    pub fn desc(feature: FeatureCode) -> Self {
        IndexKey::Feature {
            feature,
            direction: KeyDirection::Reverse,
        }
    }
}

/// Definition of an index: a label, the indexed type, and the comparator.
///
/// Every view of a store holds one instance of every definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub label: String,
    pub type_code: TypeCode,
    pub kind: IndexKind,
    pub keys: Vec<IndexKey>,
}

impl IndexSpec {
    /// Sorted index over `type_code`.
    pub fn sorted(label: &str, type_code: TypeCode, keys: Vec<IndexKey>) -> Self {
        Self {
            label: label.to_string(),
            type_code,
            kind: IndexKind::Sorted,
            keys,
        }
    }

    /// Set index over `type_code`.
    pub fn set(label: &str, type_code: TypeCode, keys: Vec<IndexKey>) -> Self {
        Self {
            label: label.to_string(),
            type_code,
            kind: IndexKind::Set,
            keys,
        }
    }

    /// Bag index over `type_code`.
    pub fn bag(label: &str, type_code: TypeCode) -> Self {
        Self {
            label: label.to_string(),
            type_code,
            kind: IndexKind::Bag,
            keys: Vec::new(),
        }
    }

    /// The standard annotation index: begin ascending, end descending, then
    /// type order.
    pub fn annotation_index() -> Self {
        Self::sorted(
            ANNOTATION_INDEX,
            TypeCode::ANNOTATION,
            vec![
                IndexKey::asc(FeatureCode::BEGIN),
                IndexKey::desc(FeatureCode::END),
                IndexKey::TypeOrder,
            ],
        )
    }

    /// The Sofa index.
    pub fn sofa_index() -> Self {
        Self::bag(SOFA_INDEX, TypeCode::SOFA)
    }

    /// Checks the definition against a committed type system.
    pub fn validate(&self, ts: &TypeSystem) -> Result<()> {
        ts.type_info(self.type_code)?;
        match self.kind {
            IndexKind::Bag if !self.keys.is_empty() => {
                return Err(CasError::InvalidIndexKey(format!(
                    "bag index {} cannot have keys",
                    self.label
                )));
            }
            IndexKind::Sorted | IndexKind::Set if self.keys.is_empty() => {
                return Err(CasError::InvalidIndexKey(format!(
                    "index {} needs at least one key",
                    self.label
                )));
            }
            _ => {}
        }
        for key in &self.keys {
            if let IndexKey::Feature { feature, .. } = key {
                ts.feature_info(*feature)?;
                if !ts.is_appropriate(self.type_code, *feature) {
                    return Err(CasError::FeatureNotAppropriate {
                        feature: ts.feature_name(*feature),
                        type_name: ts.type_name(self.type_code).to_string(),
                    });
                }
                if ts.range_class(*feature).is_array() {
                    return Err(CasError::InvalidIndexKey(ts.feature_name(*feature)));
                }
            }
        }
        Ok(())
    }
}
