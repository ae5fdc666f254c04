//! Property (spec.md §3): the smallest typed element a Characteristic or
//! Service exposes on the wire.
//!
//! The original design stores every attribute as its own object carrying a
//! back-pointer to its owning Characteristic. Rust has no safe, allocation-
//! free way to hold that back-pointer (no GC, no self-referential structs),
//! so `Characteristic`/`Service` instead hold their attributes as plain
//! typed fields and produce `Property` values on demand as a projection —
//! see DESIGN.md "Property is a view, not a stored object".

use crate::tlv::Buf;

/// Maximum encoded length of a Property's value. Covers every fixed-size
/// format and every variable one this runtime emits (descriptions, short
/// strings); `Data`/`String` values longer than this do not occur in the
/// mandatory services or the demo characteristic this crate ships.
pub const MAX_PROPERTY_LEN: usize = 64;

/// Property type tag (spec.md §3's closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PropertyType {
    Value = 0,
    Format = 1,
    Unit = 2,
    MinValue = 3,
    MaxValue = 4,
    StepValue = 5,
    MaxLength = 6,
    ValidValues = 7,
    ValidRange = 8,
    Permissions = 9,
    Description = 10,
    CharIid = 11,
    SvcIid = 12,
    CharType = 13,
    SvcType = 14,
    SvcProp = 15,
    SvcLinked = 16,
    Event = 17,
    Ttl = 18,
}

/// Property value format tag (spec.md §3's closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Format {
    Null = 0,
    Bool = 1,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
    Int = 6,
    Float = 7,
    String = 8,
    Data = 9,
    Tlv = 10,
    Uuid = 11,
    FormatTag = 12,
    Unit = 13,
    Iid = 14,
}

impl Format {
    /// Wire-native byte width for fixed-size formats; `None` for the
    /// variable-length ones (`String`, `Data`, `Tlv`).
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            Format::Null => Some(0),
            Format::Bool | Format::Uint8 | Format::FormatTag | Format::Unit => Some(1),
            Format::Uint16 | Format::Iid => Some(2),
            Format::Uint32 | Format::Float | Format::Int => Some(4),
            Format::Uint64 => Some(8),
            Format::Uuid => Some(16),
            Format::String | Format::Data | Format::Tlv => None,
        }
    }
}

/// A typed, owner-attached value. Always built from an owner's current
/// state — see the module docs for why this isn't itself stored anywhere.
#[derive(Clone)]
pub struct Property {
    pub ptype: PropertyType,
    pub format: Format,
    value: Buf<MAX_PROPERTY_LEN>,
}

impl Property {
    /// Build a Property, enforcing the invariant that fixed-size formats
    /// carry exactly their declared width (spec.md §3 Property invariant).
    pub fn new(ptype: PropertyType, format: Format, bytes: &[u8]) -> Option<Self> {
        if let Some(expected) = format.fixed_len() {
            if bytes.len() != expected {
                return None;
            }
        } else if bytes.len() > MAX_PROPERTY_LEN {
            return None;
        }
        let value = Buf::from_slice(bytes).ok()?;
        Some(Self { ptype, format, value })
    }

    pub fn value(&self) -> &[u8] {
        self.value.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_size_format_rejects_wrong_length() {
        assert!(Property::new(PropertyType::CharIid, Format::Uint16, &[1]).is_none());
        assert!(Property::new(PropertyType::CharIid, Format::Uint16, &[1, 0]).is_some());
    }

    #[test]
    fn variable_format_accepts_any_length_up_to_cap() {
        let short = Property::new(PropertyType::Description, Format::String, b"lamp").unwrap();
        assert_eq!(short.value(), b"lamp");
        let too_long = [b'x'; MAX_PROPERTY_LEN + 1];
        assert!(Property::new(PropertyType::Description, Format::String, &too_long).is_none());
    }
}
