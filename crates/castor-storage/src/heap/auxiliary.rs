//! Auxiliary heaps for values that do not fit a 4-byte cell model.

use super::constants::AUX_NULL_OFFSET;

/// Flat growable store with a bump `reserve`.
///
/// Offset 0 is reserved, so an indirection cell holding 0 never points at
/// live data.
#[derive(Debug, Clone)]
pub struct AuxHeap<T: Copy + Default> {
    data: Vec<T>,
}

/// Elements of byte and boolean arrays.
pub type ByteHeap = AuxHeap<i8>;

/// Elements of short arrays.
pub type ShortHeap = AuxHeap<i16>;

/// Elements of long and double arrays, and long/double feature values.
pub type LongHeap = AuxHeap<i64>;

impl<T: Copy + Default> AuxHeap<T> {
    /// Creates a heap with room for `capacity` values.
    pub fn new(capacity: usize) -> Self {
        let mut data = Vec::with_capacity(capacity.max(1));
        data.push(T::default());
        Self { data }
    }

    /// Reserves `n` zeroed values and returns the offset of the first.
    pub fn reserve(&mut self, n: usize) -> usize {
        let base = self.data.len();
        self.data.resize(base + n, T::default());
        base
    }

    /// Appends one value and returns its offset.
    pub fn push(&mut self, value: T) -> usize {
        self.data.push(value);
        self.data.len() - 1
    }

    /// Returns the value at `offset`.
    #[inline]
    pub fn get(&self, offset: usize) -> T {
        self.data[offset]
    }

    /// Writes the value at `offset`.
    #[inline]
    pub fn set(&mut self, offset: usize, value: T) {
        self.data[offset] = value;
    }

    /// Returns `len` values starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> &[T] {
        &self.data[offset..offset + len]
    }

    /// Returns `len` mutable values starting at `offset`.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> &mut [T] {
        &mut self.data[offset..offset + len]
    }

    /// Returns every value, including the reserved slot 0.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the number of values, including the reserved slot 0.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing beyond the reserved slot is stored.
    pub fn is_empty(&self) -> bool {
        self.data.len() <= AUX_NULL_OFFSET + 1
    }

    /// Drops every value except the reserved slot.
    pub fn reset(&mut self) {
        self.data.truncate(1);
        self.data[AUX_NULL_OFFSET] = T::default();
    }

    /// Replaces the contents with `values`, which include the reserved slot.
    pub fn reinit(&mut self, values: Vec<T>) {
        self.data = values;
        if self.data.is_empty() {
            self.data.push(T::default());
        }
    }

    /// Appends `values` and returns the offset of the first.
    pub fn extend_from_slice(&mut self, values: &[T]) -> usize {
        let base = self.data.len();
        self.data.extend_from_slice(values);
        base
    }
}
