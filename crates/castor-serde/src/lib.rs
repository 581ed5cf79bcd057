//! Binary serialization for castor stores.
//!
//! Two blob kinds share one layout:
//! - Full: every heap and the index membership of every view
//! - Delta: data appended after a marker, cells written below it, and the
//!   index membership changes since it was taken
//!
//! Blobs are big-endian unless written otherwise. Readers detect byte
//! order from the format key.

pub mod constants;
mod reader;
mod writer;

pub use reader::{blob_kind, deserialize, read_from, BlobKind};
pub use writer::{serialize, serialize_delta, write_to, BlobWriter, ByteOrder};
