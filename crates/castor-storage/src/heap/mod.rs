//! Heap storage for records and out-of-line values.
//!
//! This module provides:
//! - Heap: paged bump allocator of i32 cells holding every record
//! - AuxHeap: flat growable stores for byte, short, and long values
//! - StringHeap: shared UTF-16 buffer plus a ref table of (offset, length)

mod auxiliary;
pub mod constants;
mod primary;
mod string;

pub use auxiliary::{AuxHeap, ByteHeap, LongHeap, ShortHeap};
pub use primary::Heap;
pub use string::{StringHeap, StringRef};

use castor_common::CasConfig;

/// The primary heap and every auxiliary heap of one store.
///
/// Views of a store share this single instance.
#[derive(Debug, Clone)]
pub struct Heaps {
    pub heap: Heap,
    pub strings: StringHeap,
    pub bytes: ByteHeap,
    pub shorts: ShortHeap,
    pub longs: LongHeap,
}

impl Heaps {
    /// Creates empty heaps sized from the configuration.
    pub fn new(config: &CasConfig) -> Self {
        Self {
            heap: Heap::new(config.effective_page_size()),
            strings: StringHeap::new(config.initial_string_heap_size),
            bytes: ByteHeap::new(config.initial_aux_heap_size),
            shorts: ShortHeap::new(config.initial_aux_heap_size),
            longs: LongHeap::new(config.initial_aux_heap_size),
        }
    }

    /// Drops every record and value. A full reset also releases heap pages.
    pub fn reset(&mut self, full: bool) {
        if full {
            self.heap.full_reset();
        } else {
            self.heap.soft_reset();
        }
        self.strings.reset();
        self.bytes.reset();
        self.shorts.reset();
        self.longs.reset();
    }

    /// Returns the UTF-16 code units of a string ref, or None for null.
    pub fn string_units(&self, r: i32) -> Option<&[u16]> {
        if r <= 0 {
            return None;
        }
        let entry = self.strings.refs().get(r as usize)?;
        let start = entry.offset as usize;
        self.strings.chars().get(start..start + entry.length as usize)
    }
}
