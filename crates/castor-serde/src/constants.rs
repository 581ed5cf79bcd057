//! Blob format constants.

// Header

/// Format key. Written as one word in the blob's byte order, so a reader
/// seeing `b"AMIU"` knows the blob is little-endian.
pub const MAGIC: [u8; 4] = *b"UIMA";

/// The format key as a big-endian word.
pub const MAGIC_WORD: u32 = u32::from_be_bytes(MAGIC);

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Version bit marking a delta blob.
pub const DELTA_FLAG: u32 = 0x0001_0000;

/// Size of the magic word plus the version word.
pub const HEADER_SIZE: usize = 8;

// Layout

/// Sections are padded to a multiple of this many bytes.
pub const WORD_SIZE: usize = 4;

/// Leading entry of the string ref section, standing for the null ref.
pub const NULL_REF_WORD: i32 = 0;
