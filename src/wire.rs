//! Wire format constants.
//!
//! Every record starts with one header byte: the upper five bits carry the
//! [`DataType`] tag, the lower three bits an inline sub-type (number width,
//! string encoding, boolean value, sign, error kind). Multi-byte integers and
//! floats are little endian.
//!
//! Stream layout: `FormatVersion`, root value, `ExtraTypeInfo`, `EOF`.

use crate::options::StringEncoding;

/// Version written into the `FormatVersion` record.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum value of the inline sub-type field.
pub const SUB_TYPE_MASK: u8 = 0b111;

/// Record type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    BigInt = 5,
    ArrayEmptySlots = 6,
    Reference = 7,
    Eof = 8,
    Array = 9,
    Object = 10,
    Set = 11,
    Map = 12,
    ArrayBuffer = 13,
    ArrayBufferView = 14,
    BooleanObject = 15,
    NumberObject = 16,
    StringObject = 17,
    BigIntObject = 18,
    Date = 19,
    RegExp = 20,
    Error = 21,
    ExtraType = 22,
    ExtraTypeInfo = 23,
    FormatVersion = 24,
}

impl DataType {
    /// Packs tag and sub-type into a header byte.
    #[inline]
    pub fn header(self, sub: u8) -> u8 {
        debug_assert!(sub <= SUB_TYPE_MASK, "sub-type {sub} does not fit into 3 bits");
        ((self as u8) << 3) | (sub & SUB_TYPE_MASK)
    }

    /// Splits a header byte into tag value and sub-type.
    #[inline]
    pub fn split_header(byte: u8) -> (u8, u8) {
        (byte >> 3, byte & SUB_TYPE_MASK)
    }
}

/// Width selector of a `Number` record (inline sub-type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NumberWidth {
    Int8 = 0,
    Uint8 = 1,
    Int16 = 2,
    Uint16 = 3,
    Int32 = 4,
    Uint32 = 5,
    Double = 6,
}

impl NumberWidth {
    /// Payload size in bytes.
    pub fn byte_len(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 => 4,
            Self::Double => 8,
        }
    }
}

/// Inline sub-type of `Boolean` and `BooleanObject`.
pub fn boolean_bits(value: bool) -> u8 {
    u8::from(value)
}

/// Inline sub-type of `BigInt` and `BigIntObject`: 1 = negative.
pub fn sign_bits(negative: bool) -> u8 {
    u8::from(negative)
}

impl StringEncoding {
    /// Inline sub-type of `String` and `StringObject`.
    pub fn wire_bits(self) -> u8 {
        match self {
            Self::Utf8 => 0,
            Self::Utf16 => 1,
        }
    }
}

/// Built-in type names extra types must not shadow.
pub const RESERVED_TYPE_NAMES: [&str; 14] = [
    "Refer",
    "Reference",
    "Object",
    "Array",
    "Set",
    "Map",
    "ArrayBuffer",
    "ArrayBufferView",
    "Boolean",
    "Number",
    "BigInt",
    "String",
    "Date",
    "RegExp",
];

/// Error constructors are reserved too.
pub const RESERVED_ERROR_NAMES: [&str; 7] = [
    "Error",
    "EvalError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "TypeError",
    "URIError",
];
