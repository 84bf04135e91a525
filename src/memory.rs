//! Controller memory fields and their ADS index groups.
//!
//! This module defines the [`Field`] enum which represents the process image
//! regions reachable through the ADS protocol. Each field maps to a fixed
//! index group; the `X` variants address single bits.
//!
//! # Fields Overview
//!
//! | Field | Description | Index group | Offset unit |
//! |-------|-------------|------------:|-------------|
//! | M  | Marker memory (`%M`) | 16416 (0x4020) | byte |
//! | MX | Marker memory, bit access (`%MX`) | 16417 (0x4021) | bit |
//! | I  | Physical inputs (`%I`) | 61472 (0xF020) | byte |
//! | IX | Physical inputs, bit access (`%IX`) | 61473 (0xF021) | bit |
//! | Q  | Physical outputs (`%Q`) | 61488 (0xF030) | byte |
//! | QX | Physical outputs, bit access (`%QX`) | 61489 (0xF031) | bit |
//!
//! # Example
//!
//! ```
//! use tame_ads::Field;
//!
//! assert_eq!(Field::M.index_group(), 0x4020);
//! assert!(Field::MX.is_bit_addressed());
//! assert_eq!("QX".parse::<Field>().unwrap(), Field::QX);
//! assert_eq!(Field::IX.to_string(), "IX");
//! ```

use std::str::FromStr;

use crate::error::TameError;

/// Memory fields of the controller's process image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Field {
    /// Marker memory, byte offsets.
    M,
    /// Marker memory, bit offsets.
    MX,
    /// Physical inputs, byte offsets.
    I,
    /// Physical inputs, bit offsets.
    IX,
    /// Physical outputs, byte offsets.
    Q,
    /// Physical outputs, bit offsets.
    QX,
}

impl Field {
    /// All fields, in index group order.
    pub const ALL: [Field; 6] = [Field::M, Field::MX, Field::I, Field::IX, Field::Q, Field::QX];

    /// Returns the ADS index group used to read and write this field.
    pub fn index_group(self) -> u32 {
        match self {
            Field::M => 0x4020,
            Field::MX => 0x4021,
            Field::I => 0xF020,
            Field::IX => 0xF021,
            Field::Q => 0xF030,
            Field::QX => 0xF031,
        }
    }

    /// Returns the field for an index group, if it is one of ours.
    pub fn from_index_group(group: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.index_group() == group)
    }

    /// Returns whether offsets in this field count bits rather than bytes.
    pub fn is_bit_addressed(self) -> bool {
        matches!(self, Field::MX | Field::IX | Field::QX)
    }

    /// Returns the bit-addressed variant of the same region.
    pub fn bit_variant(self) -> Self {
        match self {
            Field::M | Field::MX => Field::MX,
            Field::I | Field::IX => Field::IX,
            Field::Q | Field::QX => Field::QX,
        }
    }

    /// Returns the byte-addressed variant of the same region.
    pub fn byte_variant(self) -> Self {
        match self {
            Field::M | Field::MX => Field::M,
            Field::I | Field::IX => Field::I,
            Field::Q | Field::QX => Field::Q,
        }
    }
}

impl FromStr for Field {
    type Err = TameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M" => Ok(Field::M),
            "MX" => Ok(Field::MX),
            "I" => Ok(Field::I),
            "IX" => Ok(Field::IX),
            "Q" => Ok(Field::Q),
            "QX" => Ok(Field::QX),
            other => Err(TameError::address_resolution(format!(
                "field `{other}` not defined (should be M, MX, I, IX, Q, QX)"
            ))),
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::M => write!(f, "M"),
            Field::MX => write!(f, "MX"),
            Field::I => write!(f, "I"),
            Field::IX => write!(f, "IX"),
            Field::Q => write!(f, "Q"),
            Field::QX => write!(f, "QX"),
        }
    }
}
