//! AMS routing identity.
//!
//! Every ADS request is routed to an AMS Net ID (six octets written as
//! `a.b.c.d.e.f`, usually the controller's IP address followed by `.1.1`)
//! and an AMS port selecting the runtime system.
//!
//! # Example
//!
//! ```
//! use tame_ads::AmsNetId;
//!
//! let id: AmsNetId = "192.168.1.10.1.1".parse().unwrap();
//! assert_eq!(id.octets(), [192, 168, 1, 10, 1, 1]);
//! assert_eq!(id.to_string(), "192.168.1.10.1.1");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TameError};

/// Default AMS port (first PLC runtime).
pub const DEFAULT_AMS_PORT: u16 = 801;

/// Valid AMS ports of the PLC runtimes 1 to 4.
pub const AMS_PORT_RANGE: std::ops::RangeInclusive<u16> = 801..=804;

/// Six-octet AMS Net ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AmsNetId([u8; 6]);

impl AmsNetId {
    /// Creates an id from its octets.
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Returns the octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for AmsNetId {
    type Err = TameError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            TameError::configuration(format!(
                "AMS Net ID `{s}` is not six dot-separated octets"
            ))
        };
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split('.');
        for octet in &mut octets {
            *octet = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for AmsNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a}.{b}.{c}.{d}.{e}.{g}")
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for AmsNetId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for AmsNetId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
