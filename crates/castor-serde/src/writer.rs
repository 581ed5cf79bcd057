//! Blob writer.
//!
//! Full blob layout (every count is one word):
//!
//! ```text
//! +-------+---------+-------------------+---------------------+------------------+
//! | magic | version | heap: n, cells... | chars: m, units...  | refs: 2r+1, 0,   |
//! |  4B   |   4B    |   4B + 4B * n     | 4B + 2B * m, padded | (offset, len)... |
//! +-------+---------+-------------------+---------------------+------------------+
//! | index: k, words... | bytes: b, padded | shorts: s, padded | longs: l         |
//! +--------------------+------------------+-------------------+------------------+
//! ```
//!
//! A delta blob carries the same sections restricted to data above the
//! marker, a list of (address, value) pairs for heap cells written below it
//! after the refs section, and one modified-cell section per auxiliary heap
//! at the end.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use castor_common::{CasError, Result};
use castor_storage::{
    Cas, IndexedFs, IndexedFsDelta, Marker, ModifiedCells, StringRef, ViewDelta,
};
use tracing::{debug, info};

use crate::constants::{
    DELTA_FLAG, FORMAT_VERSION, HEADER_SIZE, MAGIC_WORD, NULL_REF_WORD, WORD_SIZE,
};

/// Byte order of the words in a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// Appends words to a buffer in a fixed byte order.
struct WordSink {
    buf: BytesMut,
    order: ByteOrder,
}

impl WordSink {
    fn new(capacity: usize, order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            order,
        }
    }

    fn put_u32(&mut self, value: u32) {
        match self.order {
            ByteOrder::BigEndian => self.buf.put_u32(value),
            ByteOrder::LittleEndian => self.buf.put_u32_le(value),
        }
    }

    fn put_i32(&mut self, value: i32) {
        self.put_u32(value as u32);
    }

    fn put_u16(&mut self, value: u16) {
        match self.order {
            ByteOrder::BigEndian => self.buf.put_u16(value),
            ByteOrder::LittleEndian => self.buf.put_u16_le(value),
        }
    }

    fn put_i64(&mut self, value: i64) {
        match self.order {
            ByteOrder::BigEndian => self.buf.put_i64(value),
            ByteOrder::LittleEndian => self.buf.put_i64_le(value),
        }
    }

    fn put_count(&mut self, n: usize, section: &str) -> Result<()> {
        let n = u32::try_from(n)
            .map_err(|_| CasError::MalformedBlob(format!("{} section too large: {}", section, n)))?;
        self.put_u32(n);
        Ok(())
    }

    fn pad_to_word(&mut self) {
        while self.buf.len() % WORD_SIZE != 0 {
            self.buf.put_u8(0);
        }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Serializes stores into full or delta blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobWriter {
    order: ByteOrder,
}

impl BlobWriter {
    /// Creates a writer producing blobs in `order`.
    pub fn new(order: ByteOrder) -> Self {
        Self { order }
    }

    /// Returns the byte order of produced blobs.
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Serializes every heap and the index membership of every view.
    pub fn write_full(&self, cas: &Cas) -> Result<Bytes> {
        let heaps = cas.heaps();
        let cells = heaps.heap.used_cells();
        let refs = &heaps.strings.refs()[1..];
        let indexed = cas.indexed_fs();

        let estimate = HEADER_SIZE
            + cells.len() * 4
            + heaps.strings.char_len() * 2
            + refs.len() * 8
            + heaps.bytes.len()
            + heaps.shorts.len() * 2
            + heaps.longs.len() * 8
            + 64;
        let mut sink = WordSink::new(estimate, self.order);

        sink.put_u32(MAGIC_WORD);
        sink.put_u32(FORMAT_VERSION);
        write_cells(&mut sink, cells)?;
        write_strings(&mut sink, heaps.strings.chars(), refs)?;
        write_words(&mut sink, &full_index_words(&indexed), "index")?;
        write_bytes(&mut sink, heaps.bytes.as_slice())?;
        write_shorts(&mut sink, heaps.shorts.as_slice())?;
        write_longs(&mut sink, heaps.longs.as_slice())?;

        info!(
            bytes = sink.len(),
            cells = cells.len(),
            views = indexed.views.len(),
            "full blob written"
        );
        Ok(sink.freeze())
    }

    /// Serializes the data appended after `marker` and the cells and index
    /// memberships changed below it.
    pub fn write_delta(&self, cas: &Cas, marker: &Marker) -> Result<Bytes> {
        let modified = cas.modified_cells(marker)?;
        let indexed = cas.indexed_fs_delta(marker)?;
        let heaps = cas.heaps();

        let new_cells = &heaps.heap.used_cells()[marker.heap_mark()..];
        let new_chars = &heaps.strings.chars()[marker.string_chars_mark()..];
        let new_refs = &heaps.strings.refs()[marker.string_refs_mark()..];
        let new_bytes = &heaps.bytes.as_slice()[marker.byte_mark()..];
        let new_shorts = &heaps.shorts.as_slice()[marker.short_mark()..];
        let new_longs = &heaps.longs.as_slice()[marker.long_mark()..];

        let estimate = HEADER_SIZE
            + new_cells.len() * 4
            + new_chars.len() * 2
            + new_refs.len() * 8
            + new_bytes.len()
            + new_shorts.len() * 2
            + new_longs.len() * 8
            + modified.len() * 12
            + 64;
        let mut sink = WordSink::new(estimate, self.order);

        sink.put_u32(MAGIC_WORD);
        sink.put_u32(FORMAT_VERSION | DELTA_FLAG);
        write_cells(&mut sink, new_cells)?;
        write_strings(&mut sink, new_chars, new_refs)?;
        write_modified_heap(&mut sink, &modified)?;
        write_words(&mut sink, &delta_index_words(&indexed), "index")?;
        write_bytes(&mut sink, new_bytes)?;
        write_shorts(&mut sink, new_shorts)?;
        write_longs(&mut sink, new_longs)?;
        write_modified_aux(&mut sink, &modified)?;

        debug!(
            new_cells = new_cells.len(),
            new_strings = new_refs.len(),
            modified = modified.len(),
            "delta sections sized"
        );
        info!(bytes = sink.len(), "delta blob written");
        Ok(sink.freeze())
    }
}

// =============================================================================
// Sections
// =============================================================================

fn write_cells(sink: &mut WordSink, cells: &[i32]) -> Result<()> {
    sink.put_count(cells.len(), "heap")?;
    for cell in cells {
        sink.put_i32(*cell);
    }
    Ok(())
}

fn write_strings(sink: &mut WordSink, chars: &[u16], refs: &[StringRef]) -> Result<()> {
    sink.put_count(chars.len(), "string")?;
    for unit in chars {
        sink.put_u16(*unit);
    }
    sink.pad_to_word();

    sink.put_count(refs.len() * 2 + 1, "string ref")?;
    sink.put_i32(NULL_REF_WORD);
    for r in refs {
        sink.put_u32(r.offset);
        sink.put_u32(r.length);
    }
    Ok(())
}

fn write_words(sink: &mut WordSink, words: &[i32], section: &str) -> Result<()> {
    sink.put_count(words.len(), section)?;
    for word in words {
        sink.put_i32(*word);
    }
    Ok(())
}

fn write_bytes(sink: &mut WordSink, values: &[i8]) -> Result<()> {
    sink.put_count(values.len(), "byte")?;
    for v in values {
        sink.buf.put_i8(*v);
    }
    sink.pad_to_word();
    Ok(())
}

fn write_shorts(sink: &mut WordSink, values: &[i16]) -> Result<()> {
    sink.put_count(values.len(), "short")?;
    for v in values {
        sink.put_u16(*v as u16);
    }
    sink.pad_to_word();
    Ok(())
}

fn write_longs(sink: &mut WordSink, values: &[i64]) -> Result<()> {
    sink.put_count(values.len(), "long")?;
    for v in values {
        sink.put_i64(*v);
    }
    Ok(())
}

fn write_modified_heap(sink: &mut WordSink, modified: &ModifiedCells) -> Result<()> {
    sink.put_count(modified.heap.len(), "modified heap")?;
    for (addr, value) in &modified.heap {
        sink.put_u32(*addr);
        sink.put_i32(*value);
    }
    Ok(())
}

/// Each auxiliary section is a count, the addresses, then the values.
fn write_modified_aux(sink: &mut WordSink, modified: &ModifiedCells) -> Result<()> {
    sink.put_count(modified.bytes.len(), "modified byte")?;
    for (addr, _) in &modified.bytes {
        sink.put_u32(*addr);
    }
    for (_, value) in &modified.bytes {
        sink.buf.put_i8(*value);
    }
    sink.pad_to_word();

    sink.put_count(modified.shorts.len(), "modified short")?;
    for (addr, _) in &modified.shorts {
        sink.put_u32(*addr);
    }
    for (_, value) in &modified.shorts {
        sink.put_u16(*value as u16);
    }
    sink.pad_to_word();

    sink.put_count(modified.longs.len(), "modified long")?;
    for (addr, _) in &modified.longs {
        sink.put_u32(*addr);
    }
    for (_, value) in &modified.longs {
        sink.put_i64(*value);
    }
    Ok(())
}

// =============================================================================
// Index words
// =============================================================================

/// `[views, base count, base..., then per view: count, records...]`
fn full_index_words(indexed: &IndexedFs) -> Vec<i32> {
    let total: usize = indexed.views.iter().map(|v| v.len() + 1).sum();
    let mut words = Vec::with_capacity(2 + indexed.base.len() + total);
    words.push(indexed.views.len() as i32);
    push_list(&mut words, &indexed.base);
    for members in &indexed.views {
        push_list(&mut words, members);
    }
    words
}

/// `[views, base delta, then one delta per view]`, where a delta is the
/// added, removed, and reindexed lists in turn.
fn delta_index_words(delta: &IndexedFsDelta) -> Vec<i32> {
    let mut words = vec![delta.views.len() as i32];
    push_view_delta(&mut words, &delta.base);
    for view in &delta.views {
        push_view_delta(&mut words, view);
    }
    words
}

fn push_view_delta(words: &mut Vec<i32>, delta: &ViewDelta) {
    push_list(words, &delta.added);
    push_list(words, &delta.removed);
    push_list(words, &delta.reindexed);
}

fn push_list(words: &mut Vec<i32>, records: &[castor_common::FsRef]) {
    words.push(records.len() as i32);
    words.extend(records.iter().map(|fs| fs.as_cell()));
}

// =============================================================================
// Entry points
// =============================================================================

/// Serializes `cas` into a big-endian full blob.
pub fn serialize(cas: &Cas) -> Result<Bytes> {
    BlobWriter::default().write_full(cas)
}

/// Serializes the changes to `cas` since `marker` into a big-endian delta
/// blob.
pub fn serialize_delta(cas: &Cas, marker: &Marker) -> Result<Bytes> {
    BlobWriter::default().write_delta(cas, marker)
}

/// Writes a big-endian full blob of `cas` to `out`.
pub fn write_to<W: Write>(cas: &Cas, out: &mut W) -> Result<()> {
    let blob = serialize(cas)?;
    out.write_all(&blob)?;
    out.flush()?;
    Ok(())
}
