//! Field type tags.
//!
//! Every record carries a one-byte tag after its name:
//!
//! ```text
//! ┌──────┬──────┬───────┬────────┬────────┬──────┐
//! │ 0x00 │ 0x01 │ 0x02  │ 0x03   │ 0x04   │ 0x05 │
//! │ bytes│ bool │ int64 │ double │ string │ form │
//! └──────┴──────┴───────┴────────┴────────┴──────┘
//! ```
//!
//! A vector is the element tag OR'd with [`TypeTag::VECTOR_FLAG`] (0x80).
//! Tags are informational: accessors never check them.

use std::fmt;

/// One-byte field type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeTag(pub u8);

impl TypeTag {
    /// Vector flag bit.
    pub const VECTOR_FLAG: u8 = 0b1000_0000;

    /// Raw bytes, also the tag of any field without a recorded type.
    pub const BYTES: TypeTag = TypeTag(0x00);
    pub const BOOL: TypeTag = TypeTag(0x01);
    pub const INT64: TypeTag = TypeTag(0x02);
    pub const DOUBLE: TypeTag = TypeTag(0x03);
    pub const STRING: TypeTag = TypeTag(0x04);
    pub const FORM: TypeTag = TypeTag(0x05);

    pub const VECTOR_INT64: TypeTag = TypeTag::INT64.vector();
    pub const VECTOR_DOUBLE: TypeTag = TypeTag::DOUBLE.vector();
    pub const VECTOR_STRING: TypeTag = TypeTag::STRING.vector();
    pub const VECTOR_FORM: TypeTag = TypeTag::FORM.vector();

    /// Vector tag with this tag as element type.
    #[inline]
    pub const fn vector(self) -> TypeTag {
        TypeTag(self.0 | Self::VECTOR_FLAG)
    }

    /// Check if the vector flag is set.
    #[inline]
    pub const fn is_vector(self) -> bool {
        self.0 & Self::VECTOR_FLAG != 0
    }

    /// Element tag with the vector flag cleared.
    #[inline]
    pub const fn element(self) -> TypeTag {
        TypeTag(self.0 & !Self::VECTOR_FLAG)
    }

    /// Wire byte.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for TypeTag {
    fn from(value: u8) -> Self {
        TypeTag(value)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.element() {
            TypeTag::BYTES => "bytes",
            TypeTag::BOOL => "bool",
            TypeTag::INT64 => "int64",
            TypeTag::DOUBLE => "double",
            TypeTag::STRING => "string",
            TypeTag::FORM => "form",
            _ => return write!(f, "unknown(0x{:02x})", self.0),
        };
        if self.is_vector() {
            write!(f, "vector<{}>", name)
        } else {
            f.write_str(name)
        }
    }
}
