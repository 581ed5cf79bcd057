//! Paged primary heap.
//!
//! Heap layout:
//! ```text
//! page 0                 page 1                 page 2
//! +-+--------------+----+----------------------+----------------------+
//! |0| records ...  |pad | records ...          | (free)               |
//! +-+--------------+----+----------------------+----------------------+
//!  ^ null                                      ^ pos           page_end ^
//! ```
//!
//! Records are bump allocated in the current page. A request that would
//! cross the page end rolls to the lowest free page, or appends a new one.
//! Pages are always claimed in ascending order, so addresses handed out
//! after a reset grow monotonically and `pos` bounds every live record.

use std::collections::BTreeSet;

use castor_common::{CasError, FsRef, Result, MIN_HEAP_PAGE_SIZE};
use tracing::debug;

/// Paged bump allocator of i32 cells.
#[derive(Debug, Clone)]
pub struct Heap {
    /// Backing cells for every page, in page order.
    cells: Vec<i32>,
    /// Cells per page.
    page_size: usize,
    /// Next free cell.
    pos: usize,
    /// End of the current page (exclusive).
    page_end: usize,
    /// Allocated pages available for reuse, lowest first.
    free_pages: BTreeSet<usize>,
    /// Pages holding records since the last reset.
    used_pages: BTreeSet<usize>,
}

impl Heap {
    /// Creates a heap with the given page size (clamped to the minimum).
    pub fn new(page_size: usize) -> Self {
        let mut heap = Self {
            cells: Vec::new(),
            page_size: page_size.max(MIN_HEAP_PAGE_SIZE),
            pos: 0,
            page_end: 0,
            free_pages: BTreeSet::new(),
            used_pages: BTreeSet::new(),
        };
        heap.next_page();
        heap
    }

    /// Moves allocation to the lowest free page, growing the heap if none.
    fn next_page(&mut self) {
        let page = match self.free_pages.pop_first() {
            Some(page) => {
                debug!(page, "reusing heap page");
                page
            }
            None => {
                let page = self.cells.len() / self.page_size;
                self.cells.resize(self.cells.len() + self.page_size, 0);
                debug!(page, page_size = self.page_size, "allocated heap page");
                page
            }
        };
        self.used_pages.insert(page);
        self.pos = if page == 0 { 1 } else { page * self.page_size };
        self.page_end = (page + 1) * self.page_size;
    }

    /// Claims the page directly after the current one.
    fn claim_following_page(&mut self) {
        let page = self.page_end / self.page_size;
        let needed = (page + 1) * self.page_size;
        if self.cells.len() < needed {
            self.cells.resize(needed, 0);
        }
        self.free_pages.remove(&page);
        self.used_pages.insert(page);
        self.page_end = needed;
    }

    /// Allocates `len` cells and writes `first` into the first one.
    ///
    /// Remaining cells are zero. Fails if the record is larger than a page.
    pub fn allocate(&mut self, len: usize, first: i32) -> Result<FsRef> {
        if len > self.page_size {
            return Err(CasError::RecordTooLarge {
                requested: len,
                page_size: self.page_size,
            });
        }
        let len = len.max(1);
        if self.pos + len > self.page_end {
            self.next_page();
        }
        let addr = self.pos;
        if addr + len > i32::MAX as usize {
            return Err(CasError::Internal("heap address space exhausted".to_string()));
        }
        self.pos += len;
        self.cells[addr] = first;
        Ok(FsRef(addr as u32))
    }

    /// Returns the cell at `addr`.
    #[inline]
    pub fn get(&self, addr: usize) -> i32 {
        self.cells[addr]
    }

    /// Writes the cell at `addr`.
    #[inline]
    pub fn set(&mut self, addr: usize, value: i32) {
        self.cells[addr] = value;
    }

    /// Returns `len` cells starting at `addr`.
    #[inline]
    pub fn slice(&self, addr: usize, len: usize) -> &[i32] {
        &self.cells[addr..addr + len]
    }

    /// Returns `len` mutable cells starting at `addr`.
    #[inline]
    pub fn slice_mut(&mut self, addr: usize, len: usize) -> &mut [i32] {
        &mut self.cells[addr..addr + len]
    }

    /// Returns every cell below the high-water mark, including page padding.
    pub fn used_cells(&self) -> &[i32] {
        &self.cells[..self.pos]
    }

    /// Returns the high-water mark: the next address that would be handed out
    /// if the current page had room.
    pub fn cells_used(&self) -> usize {
        self.pos
    }

    /// Returns the number of allocated cells across all pages.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Returns the page size in cells.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of pages that are allocated but unused.
    pub fn free_page_count(&self) -> usize {
        self.free_pages.len()
    }

    /// Returns true if `addr` lies in the allocated region.
    pub fn is_valid_addr(&self, addr: usize) -> bool {
        addr >= 1 && addr < self.pos
    }

    /// Zeroes the used part of every page in use and returns those pages to
    /// the free list. Capacity is kept.
    pub fn soft_reset(&mut self) {
        for page in &self.used_pages {
            let start = page * self.page_size;
            let end = ((page + 1) * self.page_size).min(self.pos);
            if start < end {
                self.cells[start..end].fill(0);
            }
        }
        let used = std::mem::take(&mut self.used_pages);
        self.free_pages.extend(used);
        self.next_page();
    }

    /// Discards every page and starts over with a single empty page.
    pub fn full_reset(&mut self) {
        self.cells = Vec::new();
        self.free_pages.clear();
        self.used_pages.clear();
        self.next_page();
    }

    /// Replaces the heap with `size` zeroed cells already in use.
    ///
    /// Used before loading a full blob: the caller copies the serialized
    /// cells over `[0, size)` afterwards.
    pub fn reinit_size_only(&mut self, size: usize) {
        let size = size.max(1);
        let pages = size.div_ceil(self.page_size);
        self.cells = vec![0; pages * self.page_size];
        self.free_pages.clear();
        self.used_pages = (0..pages).collect();
        self.pos = size;
        self.page_end = pages * self.page_size;
    }

    /// Extends the used region by `len` contiguous cells, claiming following
    /// pages as needed, and returns the first new address.
    ///
    /// Used when applying a delta blob, whose new cells must land at the same
    /// addresses they had in the sending store.
    pub fn grow(&mut self, len: usize) -> usize {
        let start = self.pos;
        let target = start + len;
        while target > self.page_end {
            self.claim_following_page();
        }
        self.pos = target;
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 1000;

    #[test]
    fn test_first_address_is_one() {
        let mut heap = Heap::new(PAGE);
        let fs = heap.allocate(3, 42).unwrap();
        assert_eq!(fs, FsRef(1));
        assert_eq!(heap.get(1), 42);
        assert_eq!(heap.get(2), 0);
        assert_eq!(heap.cells_used(), 4);
    }

    #[test]
    fn test_page_size_clamped() {
        let heap = Heap::new(10);
        assert_eq!(heap.page_size(), MIN_HEAP_PAGE_SIZE);
    }

    #[test]
    fn test_rollover_to_new_page() {
        let mut heap = Heap::new(PAGE);
        heap.allocate(900, 1).unwrap();
        let fs = heap.allocate(200, 2).unwrap();
        assert_eq!(fs.addr(), PAGE);
        assert_eq!(heap.capacity(), 2 * PAGE);
        assert_eq!(heap.get(PAGE), 2);
    }

    #[test]
    fn test_record_filling_whole_page() {
        let mut heap = Heap::new(PAGE);
        let fs = heap.allocate(PAGE, 7).unwrap();
        assert_eq!(fs.addr(), PAGE);
        assert_eq!(heap.cells_used(), 2 * PAGE);
    }

    #[test]
    fn test_record_too_large() {
        let mut heap = Heap::new(PAGE);
        let err = heap.allocate(PAGE + 1, 0).unwrap_err();
        assert!(matches!(
            err,
            CasError::RecordTooLarge {
                requested: 1001,
                page_size: 1000
            }
        ));
    }

    #[test]
    fn test_soft_reset_reuses_pages() {
        let mut heap = Heap::new(PAGE);
        heap.allocate(900, 5).unwrap();
        heap.allocate(900, 6).unwrap();
        assert_eq!(heap.capacity(), 2 * PAGE);

        heap.soft_reset();
        assert_eq!(heap.capacity(), 2 * PAGE);
        assert_eq!(heap.cells_used(), 1);
        assert_eq!(heap.free_page_count(), 1);
        assert!(heap.slice(0, 2 * PAGE).iter().all(|c| *c == 0));

        let fs = heap.allocate(10, 9).unwrap();
        assert_eq!(fs, FsRef(1));
        let fs = heap.allocate(995, 9).unwrap();
        assert_eq!(fs.addr(), PAGE);
        assert_eq!(heap.capacity(), 2 * PAGE);
        assert_eq!(heap.free_page_count(), 0);
    }

    #[test]
    fn test_soft_reset_idempotent() {
        let mut heap = Heap::new(PAGE);
        heap.allocate(50, 1).unwrap();
        heap.soft_reset();
        let once = (heap.cells_used(), heap.capacity(), heap.free_page_count());
        heap.soft_reset();
        let twice = (heap.cells_used(), heap.capacity(), heap.free_page_count());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_full_reset_discards_pages() {
        let mut heap = Heap::new(PAGE);
        heap.allocate(900, 1).unwrap();
        heap.allocate(900, 1).unwrap();
        heap.full_reset();
        assert_eq!(heap.capacity(), PAGE);
        assert_eq!(heap.cells_used(), 1);
    }

    #[test]
    fn test_reinit_size_only() {
        let mut heap = Heap::new(PAGE);
        heap.reinit_size_only(2500);
        assert_eq!(heap.cells_used(), 2500);
        assert_eq!(heap.capacity(), 3 * PAGE);
        let fs = heap.allocate(10, 3).unwrap();
        assert_eq!(fs.addr(), 2500);
    }

    #[test]
    fn test_grow_matches_sender_addresses() {
        let mut sender = Heap::new(PAGE);
        let mut receiver = Heap::new(PAGE);
        sender.allocate(500, 1).unwrap();
        receiver.allocate(500, 1).unwrap();

        let mark = sender.cells_used();
        let a = sender.allocate(400, 2).unwrap();
        let b = sender.allocate(300, 3).unwrap();
        let delta = sender.cells_used() - mark;

        let start = receiver.grow(delta);
        assert_eq!(start, mark);
        assert_eq!(receiver.cells_used(), sender.cells_used());
        assert!(receiver.is_valid_addr(a.addr()));
        assert!(receiver.is_valid_addr(b.addr()));

        let next_sender = sender.allocate(5, 0).unwrap();
        let next_receiver = receiver.allocate(5, 0).unwrap();
        assert_eq!(next_sender, next_receiver);
    }

    #[test]
    fn test_is_valid_addr() {
        let mut heap = Heap::new(PAGE);
        assert!(!heap.is_valid_addr(0));
        assert!(!heap.is_valid_addr(1));
        heap.allocate(2, 1).unwrap();
        assert!(heap.is_valid_addr(1));
        assert!(heap.is_valid_addr(2));
        assert!(!heap.is_valid_addr(3));
    }
}
