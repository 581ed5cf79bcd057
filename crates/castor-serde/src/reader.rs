//! Blob reader.
//!
//! Byte order is decided once from the first byte of the format key; every
//! word read afterwards goes through `WordSource`, so the section parsers
//! never look at byte order themselves.
//!
//! Every section is parsed before the store is touched. A blob that fails
//! to parse leaves the store as it was; a blob that parses but names
//! records the loaded heaps do not hold fails while indexes are rebuilt.

use std::io::Read;

use bytes::Buf;
use castor_common::{CasError, FsRef, Result};
use castor_storage::{
    Cas, DeltaAppend, IndexedFs, IndexedFsDelta, ModifiedCells, StringRef, ViewDelta,
};
use tracing::{debug, info};

use crate::constants::{DELTA_FLAG, FORMAT_VERSION, MAGIC, MAGIC_WORD, NULL_REF_WORD, WORD_SIZE};
use crate::writer::ByteOrder;

/// Kind of blob, read from the version word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Full,
    Delta,
}

/// Reads words from a blob in the byte order its format key announced.
struct WordSource<'a> {
    data: &'a [u8],
    order: ByteOrder,
    consumed: usize,
}

impl<'a> WordSource<'a> {
    /// Detects byte order and validates the format key.
    fn open(data: &'a [u8]) -> Result<Self> {
        let first = *data
            .first()
            .ok_or_else(|| CasError::MalformedBlob("empty blob".to_string()))?;
        let order = if first == MAGIC[0] {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        };
        let mut source = Self {
            data,
            order,
            consumed: 0,
        };
        let magic = source.get_u32("header")?;
        if magic != MAGIC_WORD {
            return Err(CasError::MalformedBlob(format!(
                "bad format key {:#010x}",
                magic
            )));
        }
        debug!(?order, "blob byte order detected");
        Ok(source)
    }

    fn need(&self, n: usize, section: &str) -> Result<()> {
        if self.data.remaining() < n {
            return Err(CasError::MalformedBlob(format!(
                "{} section truncated: need {} bytes, have {}",
                section,
                n,
                self.data.remaining()
            )));
        }
        Ok(())
    }

    fn get_u32(&mut self, section: &str) -> Result<u32> {
        self.need(4, section)?;
        self.consumed += 4;
        Ok(match self.order {
            ByteOrder::BigEndian => self.data.get_u32(),
            ByteOrder::LittleEndian => self.data.get_u32_le(),
        })
    }

    fn get_i32(&mut self, section: &str) -> Result<i32> {
        self.get_u32(section).map(|v| v as i32)
    }

    fn get_u16(&mut self, section: &str) -> Result<u16> {
        self.need(2, section)?;
        self.consumed += 2;
        Ok(match self.order {
            ByteOrder::BigEndian => self.data.get_u16(),
            ByteOrder::LittleEndian => self.data.get_u16_le(),
        })
    }

    fn get_i64(&mut self, section: &str) -> Result<i64> {
        self.need(8, section)?;
        self.consumed += 8;
        Ok(match self.order {
            ByteOrder::BigEndian => self.data.get_i64(),
            ByteOrder::LittleEndian => self.data.get_i64_le(),
        })
    }

    fn get_i8(&mut self, section: &str) -> Result<i8> {
        self.need(1, section)?;
        self.consumed += 1;
        Ok(self.data.get_i8())
    }

    /// Reads a count of `width`-byte items and checks that many are present.
    fn get_count(&mut self, width: usize, section: &str) -> Result<usize> {
        let n = self.get_u32(section)? as usize;
        let bytes = n.checked_mul(width).ok_or_else(|| {
            CasError::MalformedBlob(format!("{} section count {} overflows", section, n))
        })?;
        self.need(bytes, section)?;
        Ok(n)
    }

    fn skip_padding(&mut self, section: &str) -> Result<()> {
        let pad = (WORD_SIZE - self.consumed % WORD_SIZE) % WORD_SIZE;
        self.need(pad, section)?;
        self.data.advance(pad);
        self.consumed += pad;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        !self.data.has_remaining()
    }
}

// =============================================================================
// Sections
// =============================================================================

fn read_cells(src: &mut WordSource<'_>) -> Result<Vec<i32>> {
    let n = src.get_count(4, "heap")?;
    (0..n).map(|_| src.get_i32("heap")).collect()
}

fn read_strings(src: &mut WordSource<'_>) -> Result<(Vec<u16>, Vec<StringRef>)> {
    let m = src.get_count(2, "string")?;
    let chars = (0..m)
        .map(|_| src.get_u16("string"))
        .collect::<Result<Vec<_>>>()?;
    src.skip_padding("string")?;

    let size = src.get_count(4, "string ref")?;
    if size % 2 != 1 {
        return Err(CasError::MalformedBlob(format!(
            "string ref section has even size {}",
            size
        )));
    }
    if src.get_i32("string ref")? != NULL_REF_WORD {
        return Err(CasError::MalformedBlob(
            "string ref section does not start with the null ref".to_string(),
        ));
    }
    let refs = (0..size / 2)
        .map(|_| {
            Ok(StringRef {
                offset: src.get_u32("string ref")?,
                length: src.get_u32("string ref")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((chars, refs))
}

fn read_words(src: &mut WordSource<'_>, section: &str) -> Result<Vec<i32>> {
    let n = src.get_count(4, section)?;
    (0..n).map(|_| src.get_i32(section)).collect()
}

fn read_bytes(src: &mut WordSource<'_>) -> Result<Vec<i8>> {
    let n = src.get_count(1, "byte")?;
    let values = (0..n)
        .map(|_| src.get_i8("byte"))
        .collect::<Result<Vec<_>>>()?;
    src.skip_padding("byte")?;
    Ok(values)
}

fn read_shorts(src: &mut WordSource<'_>) -> Result<Vec<i16>> {
    let n = src.get_count(2, "short")?;
    let values = (0..n)
        .map(|_| src.get_u16("short").map(|v| v as i16))
        .collect::<Result<Vec<_>>>()?;
    src.skip_padding("short")?;
    Ok(values)
}

fn read_longs(src: &mut WordSource<'_>) -> Result<Vec<i64>> {
    let n = src.get_count(8, "long")?;
    (0..n).map(|_| src.get_i64("long")).collect()
}

fn read_modified_heap(src: &mut WordSource<'_>) -> Result<Vec<(u32, i32)>> {
    let n = src.get_count(8, "modified heap")?;
    (0..n)
        .map(|_| Ok((src.get_u32("modified heap")?, src.get_i32("modified heap")?)))
        .collect()
}

fn read_modified_addrs(src: &mut WordSource<'_>, width: usize, section: &str) -> Result<Vec<u32>> {
    let n = src.get_count(4 + width, section)?;
    (0..n).map(|_| src.get_u32(section)).collect()
}

fn read_modified_aux(src: &mut WordSource<'_>, cells: &mut ModifiedCells) -> Result<()> {
    let addrs = read_modified_addrs(src, 1, "modified byte")?;
    for addr in addrs {
        cells.bytes.push((addr, 0));
    }
    for cell in cells.bytes.iter_mut() {
        cell.1 = src.get_i8("modified byte")?;
    }
    src.skip_padding("modified byte")?;

    let addrs = read_modified_addrs(src, 2, "modified short")?;
    for addr in addrs {
        cells.shorts.push((addr, 0));
    }
    for cell in cells.shorts.iter_mut() {
        cell.1 = src.get_u16("modified short")? as i16;
    }
    src.skip_padding("modified short")?;

    let addrs = read_modified_addrs(src, 8, "modified long")?;
    for addr in addrs {
        cells.longs.push((addr, 0));
    }
    for cell in cells.longs.iter_mut() {
        cell.1 = src.get_i64("modified long")?;
    }
    Ok(())
}

// =============================================================================
// Index words
// =============================================================================

/// Cursor over the words of the index section.
struct IndexWords {
    words: std::vec::IntoIter<i32>,
}

impl IndexWords {
    fn new(words: Vec<i32>) -> Self {
        Self {
            words: words.into_iter(),
        }
    }

    fn word(&mut self) -> Result<i32> {
        self.words
            .next()
            .ok_or_else(|| CasError::MalformedBlob("index section truncated".to_string()))
    }

    fn count(&mut self) -> Result<usize> {
        let n = self.word()?;
        usize::try_from(n)
            .map_err(|_| CasError::MalformedBlob(format!("negative index count {}", n)))
    }

    fn list(&mut self) -> Result<Vec<FsRef>> {
        let n = self.count()?;
        if n > self.words.len() {
            return Err(CasError::MalformedBlob(format!(
                "index list of {} records overruns the section",
                n
            )));
        }
        (0..n).map(|_| self.word().map(FsRef::from_cell)).collect()
    }

    fn view_delta(&mut self) -> Result<ViewDelta> {
        Ok(ViewDelta {
            added: self.list()?,
            removed: self.list()?,
            reindexed: self.list()?,
        })
    }

    fn finish(self) -> Result<()> {
        if !self.words.as_slice().is_empty() {
            return Err(CasError::MalformedBlob(format!(
                "{} trailing words in index section",
                self.words.len()
            )));
        }
        Ok(())
    }
}

fn parse_full_index(words: Vec<i32>) -> Result<IndexedFs> {
    let mut words = IndexWords::new(words);
    let views = words.count()?;
    let base = words.list()?;
    let views = (0..views)
        .map(|_| words.list())
        .collect::<Result<Vec<_>>>()?;
    words.finish()?;
    Ok(IndexedFs { base, views })
}

fn parse_delta_index(words: Vec<i32>) -> Result<IndexedFsDelta> {
    let mut words = IndexWords::new(words);
    let views = words.count()?;
    let base = words.view_delta()?;
    let views = (0..views)
        .map(|_| words.view_delta())
        .collect::<Result<Vec<_>>>()?;
    words.finish()?;
    Ok(IndexedFsDelta { base, views })
}

// =============================================================================
// Loading
// =============================================================================

struct FullBlob {
    cells: Vec<i32>,
    chars: Vec<u16>,
    refs: Vec<StringRef>,
    indexed: IndexedFs,
    bytes: Vec<i8>,
    shorts: Vec<i16>,
    longs: Vec<i64>,
}

struct DeltaBlob {
    cells: Vec<i32>,
    chars: Vec<u16>,
    refs: Vec<StringRef>,
    modified: ModifiedCells,
    indexed: IndexedFsDelta,
    bytes: Vec<i8>,
    shorts: Vec<i16>,
    longs: Vec<i64>,
}

fn check_refs(refs: &[StringRef], char_len: usize) -> Result<()> {
    for (i, r) in refs.iter().enumerate() {
        if r.offset as usize + r.length as usize > char_len {
            return Err(CasError::MalformedBlob(format!(
                "string ref {} runs past the character buffer",
                i + 1
            )));
        }
    }
    Ok(())
}

fn check_exhausted(src: &WordSource<'_>) -> Result<()> {
    if !src.is_exhausted() {
        return Err(CasError::MalformedBlob(format!(
            "{} trailing bytes",
            src.data.remaining()
        )));
    }
    Ok(())
}

fn parse_full(src: &mut WordSource<'_>) -> Result<FullBlob> {
    let cells = read_cells(src)?;
    let (chars, refs) = read_strings(src)?;
    check_refs(&refs, chars.len())?;
    let indexed = parse_full_index(read_words(src, "index")?)?;
    let bytes = read_bytes(src)?;
    let shorts = read_shorts(src)?;
    let longs = read_longs(src)?;
    check_exhausted(src)?;
    Ok(FullBlob {
        cells,
        chars,
        refs,
        indexed,
        bytes,
        shorts,
        longs,
    })
}

fn parse_delta(src: &mut WordSource<'_>) -> Result<DeltaBlob> {
    let cells = read_cells(src)?;
    let (chars, refs) = read_strings(src)?;
    let mut modified = ModifiedCells {
        heap: read_modified_heap(src)?,
        ..ModifiedCells::default()
    };
    let indexed = parse_delta_index(read_words(src, "index")?)?;
    let bytes = read_bytes(src)?;
    let shorts = read_shorts(src)?;
    let longs = read_longs(src)?;
    read_modified_aux(src, &mut modified)?;
    check_exhausted(src)?;
    Ok(DeltaBlob {
        cells,
        chars,
        refs,
        modified,
        indexed,
        bytes,
        shorts,
        longs,
    })
}

fn load_full(cas: &mut Cas, blob: FullBlob) -> Result<()> {
    let mut staged = cas.empty_like();
    fill_full(&mut staged, blob)?;
    *cas = staged;
    Ok(())
}

fn fill_full(cas: &mut Cas, blob: FullBlob) -> Result<()> {
    let heaps = cas.heaps_mut();
    heaps.heap.reinit_size_only(blob.cells.len());
    heaps
        .heap
        .slice_mut(0, blob.cells.len())
        .copy_from_slice(&blob.cells);
    heaps.strings.reinit(blob.chars, blob.refs);
    heaps.bytes.reinit(blob.bytes);
    heaps.shorts.reinit(blob.shorts);
    heaps.longs.reinit(blob.longs);
    cas.restore_indexed_fs(&blob.indexed)
}

fn load_delta(cas: &mut Cas, blob: DeltaBlob) -> Result<()> {
    check_refs(
        &blob.refs,
        cas.heaps().strings.char_len() + blob.chars.len(),
    )?;
    let append = DeltaAppend {
        cells: &blob.cells,
        string_refs: blob.refs.len(),
    };
    cas.check_delta(&append, &blob.modified, &blob.indexed)?;

    let heaps = cas.heaps_mut();
    let start = heaps.heap.grow(blob.cells.len());
    heaps
        .heap
        .slice_mut(start, blob.cells.len())
        .copy_from_slice(&blob.cells);
    heaps.strings.append(&blob.chars, &blob.refs);
    heaps.bytes.extend_from_slice(&blob.bytes);
    heaps.shorts.extend_from_slice(&blob.shorts);
    heaps.longs.extend_from_slice(&blob.longs);
    debug!(
        start,
        cells = blob.cells.len(),
        modified = blob.modified.len(),
        "delta heaps appended"
    );
    cas.apply_modified_cells(&blob.modified)?;
    cas.apply_indexed_fs_delta(&blob.indexed)
}

/// Reads the header and returns the blob kind without loading anything.
pub fn blob_kind(data: &[u8]) -> Result<BlobKind> {
    let mut src = WordSource::open(data)?;
    read_kind(&mut src)
}

fn read_kind(src: &mut WordSource<'_>) -> Result<BlobKind> {
    let version = src.get_u32("header")?;
    if version & !DELTA_FLAG != FORMAT_VERSION {
        return Err(CasError::UnsupportedVersion(version));
    }
    Ok(if version & DELTA_FLAG != 0 {
        BlobKind::Delta
    } else {
        BlobKind::Full
    })
}

/// Loads a blob into `cas`.
///
/// A full blob replaces the store's contents. A delta blob is applied on
/// top of them; the store must hold exactly the state the sender had when
/// it took its marker. On error the store is left as it was.
pub fn deserialize(cas: &mut Cas, data: &[u8]) -> Result<BlobKind> {
    let mut src = WordSource::open(data)?;
    let kind = read_kind(&mut src)?;
    match kind {
        BlobKind::Full => {
            let blob = parse_full(&mut src)?;
            load_full(cas, blob)?;
        }
        BlobKind::Delta => {
            let blob = parse_delta(&mut src)?;
            load_delta(cas, blob)?;
        }
    }
    info!(
        ?kind,
        bytes = data.len(),
        cells = cas.heaps().heap.cells_used(),
        views = cas.view_count(),
        "blob loaded"
    );
    Ok(kind)
}

/// Reads a whole blob from `input` and loads it into `cas`.
pub fn read_from<R: Read>(cas: &mut Cas, input: &mut R) -> Result<BlobKind> {
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;
    deserialize(cas, &data)
}
