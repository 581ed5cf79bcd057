//! Typed record store for castor.
//!
//! This crate provides:
//! - Paged primary heap of integer cells plus string, byte, short, and long heaps
//! - Layout table assigning every feature a fixed cell offset
//! - Record store with checked and unchecked accessors
//! - Sofa and view management sharing one set of heaps
//! - Sorted, set, and bag indexes with fail-fast cursors
//! - Marker-based delta tracking for incremental serialization

mod heap;
mod index;
mod iter;
mod layout;
mod store;

pub use heap::{AuxHeap, ByteHeap, Heap, Heaps, LongHeap, ShortHeap, StringHeap, StringRef};
pub use index::{
    Comparator, FsIndex, IndexDefinitions, IndexKey, IndexKind, IndexRepository, IndexSpec,
    KeyDirection, ANNOTATION_INDEX, SOFA_INDEX,
};
pub use iter::{
    collect_all, AggregateCursor, FilteredCursor, FsCursor, FsIter, FsPredicate, IndexCursor,
    UnambiguousCursor,
};
pub use layout::Layout;
pub use store::{
    Cas, DeltaAppend, IndexedFs, IndexedFsDelta, Marker, ModifiedCells, ViewDelta, ViewId,
    DEFAULT_LANGUAGE,
    INITIAL_VIEW_NAME, TEXT_MIME_TYPE,
};
