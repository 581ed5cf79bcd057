//! Record and array cell layout constants.

/// Cell holding the type code of a record.
pub const TYPE_CELL: usize = 0;

/// Cell holding the element count of an array record.
pub const ARRAY_LENGTH_OFFSET: usize = 1;

/// First element cell of an inline array, or the indirection cell of an
/// auxiliary-heap array.
pub const ARRAY_CONTENT_OFFSET: usize = 2;

/// Cells occupied by an array whose elements live in an auxiliary heap.
pub const AUX_ARRAY_CELLS: usize = 3;

/// Cell value of a true boolean.
pub const TRUE: i32 = 1;

/// Cell value of a false boolean.
pub const FALSE: i32 = 0;

/// Byte heap value of a true boolean array element.
pub const TRUE_BYTE: i8 = 1;

/// Auxiliary heap offset 0 is reserved so a zero indirection means "none".
pub const AUX_NULL_OFFSET: usize = 0;
