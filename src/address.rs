//! Address resolution.
//!
//! A [`FieldAddress`] is the normalized form of every addressing notation the
//! client accepts. It resolves deterministically to an ADS index group and
//! index offset.
//!
//! # Notations
//!
//! - explicit field and offset: `("M", "100")`, `("MX", "3.5")`
//! - numeric offsets for bit fields: `3.5` collapses to `3 * 8 + 5`
//! - compact notation: `%MB100`, `%IW4`, `%QD8`, `%MX3.5`
//!
//! A bit-field offset given without a fractional part denotes bit 0 of that
//! byte, which covers the `0.0` written as plain `0` case.
//!
//! # Example
//!
//! ```
//! use tame_ads::{Field, FieldAddress};
//!
//! let a = FieldAddress::resolve("MX", "3.5").unwrap();
//! assert_eq!(a.index_group(), Field::MX.index_group());
//! assert_eq!(a.index_offset(), 29);
//!
//! let b: FieldAddress = "%MX3.5".parse().unwrap();
//! assert_eq!(a, b);
//!
//! let c = FieldAddress::from_number(Field::MX, 0.0).unwrap();
//! assert_eq!(c.index_offset(), 0);
//! ```

use std::str::FromStr;

use crate::error::{Result, TameError};
use crate::memory::Field;

/// Bits per byte in bit-addressed fields.
pub const BITS_PER_BYTE: u32 = 8;

/// A resolved controller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldAddress {
    field: Field,
    offset: u32,
}

impl FieldAddress {
    /// Creates an address from a field and an already collapsed offset.
    pub fn new(field: Field, offset: u32) -> Self {
        Self { field, offset }
    }

    /// Creates a byte address.
    pub fn byte(field: Field, offset: u32) -> Self {
        Self::new(field, offset)
    }

    /// Creates a bit address; the field is switched to its bit variant.
    ///
    /// # Errors
    ///
    /// Returns `TameError::AddressResolution` if `bit > 7` or the collapsed
    /// offset overflows.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::{Field, FieldAddress};
    ///
    /// let a = FieldAddress::bit(Field::Q, 2, 1).unwrap();
    /// assert_eq!(a.field(), Field::QX);
    /// assert_eq!(a.index_offset(), 17);
    /// ```
    pub fn bit(field: Field, byte: u32, bit: u8) -> Result<Self> {
        Ok(Self {
            field: field.bit_variant(),
            offset: collapse(byte, u32::from(bit))?,
        })
    }

    /// Resolves a field name and textual offset.
    ///
    /// # Errors
    ///
    /// Returns `TameError::AddressResolution` if the field is unknown or the
    /// offset is not numeric.
    pub fn resolve(field: &str, offset: &str) -> Result<Self> {
        let field: Field = field.trim().parse()?;
        let offset = if field.is_bit_addressed() {
            parse_bit_offset(offset)?
        } else {
            parse_byte_offset(offset)?
        };
        Ok(Self { field, offset })
    }

    /// Resolves a numeric offset, e.g. `3.5` for byte 3 bit 5.
    ///
    /// # Errors
    ///
    /// Returns `TameError::AddressResolution` for negative or non-finite
    /// offsets.
    pub fn from_number(field: Field, offset: f64) -> Result<Self> {
        if !offset.is_finite() || offset < 0.0 {
            return Err(TameError::address_resolution(format!(
                "offset {offset} is not a valid address"
            )));
        }
        let text = offset.to_string();
        let offset = if field.is_bit_addressed() {
            parse_bit_offset(&text)?
        } else {
            parse_byte_offset(&text)?
        };
        Ok(Self { field, offset })
    }

    /// Parses the compact notation (`%MB100`, `%MX3.5`, ...).
    ///
    /// # Errors
    ///
    /// Returns `TameError::AddressResolution` if the string has no field
    /// information or the offset is not numeric.
    pub fn parse(compact: &str) -> Result<Self> {
        let s = compact.trim();
        let bytes = s.as_bytes();
        if bytes.len() < 4 || bytes[0] != b'%' || !s.is_ascii() {
            return Err(TameError::address_resolution(format!(
                "`{compact}` contains no field information (%MB, %MX, %IB, %IX, %QB, %QX)"
            )));
        }
        let letter = &s[1..2];
        match bytes[2] {
            b'X' => Self::resolve(&s[1..3], &s[3..]),
            b'B' | b'W' | b'D' => Self::resolve(letter, &s[3..]),
            other => Err(TameError::address_resolution(format!(
                "unknown size prefix `{}` in `{compact}`",
                other as char
            ))),
        }
    }

    /// Returns the field.
    pub fn field(&self) -> Field {
        self.field
    }

    /// Returns the collapsed offset (bits for X fields, bytes otherwise).
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Returns the ADS index group.
    pub fn index_group(&self) -> u32 {
        self.field.index_group()
    }

    /// Returns the ADS index offset.
    pub fn index_offset(&self) -> u32 {
        self.offset
    }

    /// Returns the address moved forward by `delta` offset units.
    ///
    /// # Errors
    ///
    /// Returns `TameError::AddressResolution` on overflow.
    pub fn advanced(self, delta: usize) -> Result<Self> {
        u32::try_from(delta)
            .ok()
            .and_then(|d| self.offset.checked_add(d))
            .map(|offset| Self { offset, ..self })
            .ok_or_else(|| {
                TameError::address_resolution(format!(
                    "offset {} + {delta} exceeds the index offset range",
                    self.offset
                ))
            })
    }
}

impl FromStr for FieldAddress {
    type Err = TameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_bit_addressed() {
            write!(
                f,
                "%{}{}.{}",
                self.field,
                self.offset / BITS_PER_BYTE,
                self.offset % BITS_PER_BYTE
            )
        } else {
            write!(f, "%{}B{}", self.field, self.offset)
        }
    }
}

fn collapse(byte: u32, bit: u32) -> Result<u32> {
    if bit >= BITS_PER_BYTE {
        return Err(TameError::address_resolution(format!(
            "bit {bit} out of range (0-7)"
        )));
    }
    byte.checked_mul(BITS_PER_BYTE)
        .and_then(|b| b.checked_add(bit))
        .ok_or_else(|| TameError::address_resolution(format!("byte offset {byte} too large")))
}

fn parse_number(text: &str) -> Result<u32> {
    let text = text.trim();
    if let Ok(n) = text.parse::<u32>() {
        return Ok(n);
    }
    match text.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&f) => Ok(f as u32),
        _ => Err(TameError::address_resolution(format!(
            "wrong address definition: `{text}` is not a number"
        ))),
    }
}

fn parse_byte_offset(text: &str) -> Result<u32> {
    parse_number(text)
}

fn parse_bit_offset(text: &str) -> Result<u32> {
    match text.trim().split_once('.') {
        Some((byte, bit)) => collapse(parse_number(byte)?, parse_number(bit)?),
        None => collapse(parse_number(text)?, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_byte_field() {
        let a = FieldAddress::resolve("M", "100").unwrap();
        assert_eq!(a.index_group(), 16416);
        assert_eq!(a.index_offset(), 100);
    }

    #[test]
    fn test_bit_collapse() {
        let a = FieldAddress::resolve("MX", "3.5").unwrap();
        assert_eq!(a.index_offset(), 29);
        let b = FieldAddress::from_number(Field::MX, 3.5).unwrap();
        assert_eq!(b.index_offset(), 29);
    }

    #[test]
    fn test_bit_zero_degenerate_case() {
        assert_eq!(FieldAddress::from_number(Field::MX, 0.0).unwrap().index_offset(), 0);
        assert_eq!(FieldAddress::resolve("IX", "0").unwrap().index_offset(), 0);
        assert_eq!(FieldAddress::resolve("IX", "0.0").unwrap().index_offset(), 0);
        assert_eq!(FieldAddress::from_number(Field::QX, 4.0).unwrap().index_offset(), 32);
    }

    #[test]
    fn test_compact_notation() {
        assert_eq!(
            FieldAddress::parse("%MB100").unwrap(),
            FieldAddress::new(Field::M, 100)
        );
        assert_eq!(
            FieldAddress::parse("%IW4").unwrap(),
            FieldAddress::new(Field::I, 4)
        );
        assert_eq!(
            FieldAddress::parse("%QD8").unwrap(),
            FieldAddress::new(Field::Q, 8)
        );
        assert_eq!(
            FieldAddress::parse("%QX1.7").unwrap(),
            FieldAddress::new(Field::QX, 15)
        );
    }

    #[test]
    fn test_compact_and_explicit_agree() {
        for (compact, field, offset) in [("%MX12.3", "MX", "12.3"), ("%IB7", "I", "7")] {
            assert_eq!(
                FieldAddress::parse(compact).unwrap(),
                FieldAddress::resolve(field, offset).unwrap()
            );
        }
    }

    #[test]
    fn test_resolution_errors() {
        assert!(FieldAddress::resolve("Z", "1").is_err());
        assert!(FieldAddress::resolve("M", "abc").is_err());
        assert!(FieldAddress::resolve("M", "1.5").is_err());
        assert!(FieldAddress::resolve("MX", "1.9").is_err());
        assert!(FieldAddress::parse("MB100").is_err());
        assert!(FieldAddress::parse("%MZ100").is_err());
        assert!(FieldAddress::from_number(Field::M, -1.0).is_err());
        assert!(FieldAddress::from_number(Field::M, f64::NAN).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldAddress::new(Field::M, 100).to_string(), "%MB100");
        assert_eq!(FieldAddress::new(Field::MX, 29).to_string(), "%MX3.5");
    }

    #[test]
    fn test_advanced() {
        let a = FieldAddress::new(Field::M, 100);
        assert_eq!(a.advanced(4).unwrap().index_offset(), 104);
        assert!(FieldAddress::new(Field::M, u32::MAX).advanced(1).is_err());
    }
}
