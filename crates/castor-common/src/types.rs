//! Identifiers for types, features, and records.

use serde::{Deserialize, Serialize};

/// Code of a type in a committed type system.
///
/// Code 0 is never assigned. Built-in types occupy fixed low codes so the
/// store can dispatch on them without a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeCode(pub u32);

impl TypeCode {
    /// Invalid type code.
    pub const INVALID: TypeCode = TypeCode(0);

    // Root and primitives
    pub const TOP: TypeCode = TypeCode(1);
    pub const INT: TypeCode = TypeCode(2);
    pub const FLOAT: TypeCode = TypeCode(3);
    pub const STRING: TypeCode = TypeCode(4);
    pub const BOOLEAN: TypeCode = TypeCode(5);
    pub const BYTE: TypeCode = TypeCode(6);
    pub const SHORT: TypeCode = TypeCode(7);
    pub const LONG: TypeCode = TypeCode(8);
    pub const DOUBLE: TypeCode = TypeCode(9);

    // Arrays
    pub const ARRAY_BASE: TypeCode = TypeCode(10);
    pub const FS_ARRAY: TypeCode = TypeCode(11);
    pub const INT_ARRAY: TypeCode = TypeCode(12);
    pub const FLOAT_ARRAY: TypeCode = TypeCode(13);
    pub const STRING_ARRAY: TypeCode = TypeCode(14);
    pub const BOOLEAN_ARRAY: TypeCode = TypeCode(15);
    pub const BYTE_ARRAY: TypeCode = TypeCode(16);
    pub const SHORT_ARRAY: TypeCode = TypeCode(17);
    pub const LONG_ARRAY: TypeCode = TypeCode(18);
    pub const DOUBLE_ARRAY: TypeCode = TypeCode(19);

    // Subjects of analysis and annotations
    pub const SOFA: TypeCode = TypeCode(20);
    pub const ANNOTATION_BASE: TypeCode = TypeCode(21);
    pub const ANNOTATION: TypeCode = TypeCode(22);
    pub const DOCUMENT_ANNOTATION: TypeCode = TypeCode(23);

    /// Number of built-in type codes, including the unused code 0.
    pub const BUILTIN_COUNT: u32 = 24;

    /// Returns true if this is a valid type code.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Returns the code as a table index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type:{}", self.0)
    }
}

/// Code of a feature in a committed type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureCode(pub u32);

impl FeatureCode {
    /// Invalid feature code.
    pub const INVALID: FeatureCode = FeatureCode(0);

    // Sofa
    pub const SOFA_NUM: FeatureCode = FeatureCode(1);
    pub const SOFA_ID: FeatureCode = FeatureCode(2);
    pub const SOFA_MIME: FeatureCode = FeatureCode(3);
    pub const SOFA_ARRAY: FeatureCode = FeatureCode(4);
    pub const SOFA_STRING: FeatureCode = FeatureCode(5);
    pub const SOFA_URI: FeatureCode = FeatureCode(6);

    // Annotations
    pub const SOFA_REF: FeatureCode = FeatureCode(7);
    pub const BEGIN: FeatureCode = FeatureCode(8);
    pub const END: FeatureCode = FeatureCode(9);
    pub const LANGUAGE: FeatureCode = FeatureCode(10);

    /// Number of built-in feature codes, including the unused code 0.
    pub const BUILTIN_COUNT: u32 = 11;

    /// Returns true if this is a valid feature code.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Returns the code as a table index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FeatureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "feature:{}", self.0)
    }
}

/// Address of a record in the primary heap.
///
/// Address 0 is the null reference. Addresses are stored in heap cells as
/// i32, so the valid range is bounded by i32::MAX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FsRef(pub u32);

impl FsRef {
    /// The null reference.
    pub const NULL: FsRef = FsRef(0);

    /// Returns true if this is the null reference.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Reads a reference out of a heap cell.
    #[inline]
    pub fn from_cell(cell: i32) -> FsRef {
        FsRef(cell as u32)
    }

    /// Returns the value to store in a heap cell.
    #[inline]
    pub fn as_cell(&self) -> i32 {
        self.0 as i32
    }

    /// Returns the address as a heap index.
    #[inline]
    pub fn addr(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FsRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fs:{}", self.0)
    }
}

/// Storage class of a type, which decides how its values occupy heap cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeClass {
    // Primitive values held in one cell
    Int = 1,
    Float = 2,
    String = 3,
    Boolean = 4,
    Byte = 5,
    Short = 6,

    // Primitive values held out of line in the long heap
    Long = 7,
    Double = 8,

    // Arrays with inline elements
    IntArray = 10,
    FloatArray = 11,
    StringArray = 12,
    FsArray = 13,

    // Arrays with elements in an auxiliary heap
    BooleanArray = 20,
    ByteArray = 21,
    ShortArray = 22,
    LongArray = 23,
    DoubleArray = 24,

    // Any other record
    Fs = 30,
}

impl TypeClass {
    /// Returns true for primitive (non-record) classes.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeClass::Int
                | TypeClass::Float
                | TypeClass::String
                | TypeClass::Boolean
                | TypeClass::Byte
                | TypeClass::Short
                | TypeClass::Long
                | TypeClass::Double
        )
    }

    /// Returns true for every array class.
    pub fn is_array(&self) -> bool {
        self.is_inline_array() || self.is_aux_array()
    }

    /// Returns true for arrays whose elements occupy primary heap cells.
    pub fn is_inline_array(&self) -> bool {
        matches!(
            self,
            TypeClass::IntArray | TypeClass::FloatArray | TypeClass::StringArray | TypeClass::FsArray
        )
    }

    /// Returns true for arrays whose elements live in an auxiliary heap.
    pub fn is_aux_array(&self) -> bool {
        matches!(
            self,
            TypeClass::BooleanArray
                | TypeClass::ByteArray
                | TypeClass::ShortArray
                | TypeClass::LongArray
                | TypeClass::DoubleArray
        )
    }

    /// Returns true if a feature of this class holds a record address.
    pub fn is_reference(&self) -> bool {
        !self.is_primitive()
    }

    /// Returns the array type code holding elements of this class, if any.
    pub fn array_type(&self) -> Option<TypeCode> {
        match self {
            TypeClass::Int => Some(TypeCode::INT_ARRAY),
            TypeClass::Float => Some(TypeCode::FLOAT_ARRAY),
            TypeClass::String => Some(TypeCode::STRING_ARRAY),
            TypeClass::Boolean => Some(TypeCode::BOOLEAN_ARRAY),
            TypeClass::Byte => Some(TypeCode::BYTE_ARRAY),
            TypeClass::Short => Some(TypeCode::SHORT_ARRAY),
            TypeClass::Long => Some(TypeCode::LONG_ARRAY),
            TypeClass::Double => Some(TypeCode::DOUBLE_ARRAY),
            TypeClass::Fs => Some(TypeCode::FS_ARRAY),
            _ => None,
        }
    }

    /// Returns the class of a built-in array type code.
    pub fn of_array_type(code: TypeCode) -> Option<TypeClass> {
        match code {
            TypeCode::INT_ARRAY => Some(TypeClass::IntArray),
            TypeCode::FLOAT_ARRAY => Some(TypeClass::FloatArray),
            TypeCode::STRING_ARRAY => Some(TypeClass::StringArray),
            TypeCode::FS_ARRAY => Some(TypeClass::FsArray),
            TypeCode::BOOLEAN_ARRAY => Some(TypeClass::BooleanArray),
            TypeCode::BYTE_ARRAY => Some(TypeClass::ByteArray),
            TypeCode::SHORT_ARRAY => Some(TypeClass::ShortArray),
            TypeCode::LONG_ARRAY => Some(TypeClass::LongArray),
            TypeCode::DOUBLE_ARRAY => Some(TypeClass::DoubleArray),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeClass::Int => "int",
            TypeClass::Float => "float",
            TypeClass::String => "string",
            TypeClass::Boolean => "boolean",
            TypeClass::Byte => "byte",
            TypeClass::Short => "short",
            TypeClass::Long => "long",
            TypeClass::Double => "double",
            TypeClass::IntArray => "int[]",
            TypeClass::FloatArray => "float[]",
            TypeClass::StringArray => "string[]",
            TypeClass::FsArray => "fs[]",
            TypeClass::BooleanArray => "boolean[]",
            TypeClass::ByteArray => "byte[]",
            TypeClass::ShortArray => "short[]",
            TypeClass::LongArray => "long[]",
            TypeClass::DoubleArray => "double[]",
            TypeClass::Fs => "fs",
        };
        write!(f, "{}", name)
    }
}
