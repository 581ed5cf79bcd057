//! Indexes over records.
//!
//! - IndexSpec: label, indexed type, kind, and comparator keys
//! - Comparator: key evaluation against the heaps with a type-order tie-break
//! - FsIndex: one sorted, set, or bag instance
//! - IndexRepository: every index of one view plus modification counters

mod comparator;
mod leaf;
mod repository;
mod spec;

pub use comparator::Comparator;
pub use leaf::FsIndex;
pub use repository::{IndexDefinitions, IndexRepository};
pub use spec::{IndexKey, IndexKind, IndexSpec, KeyDirection, ANNOTATION_INDEX, SOFA_INDEX};
