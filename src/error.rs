//! Error and warning types for the ADS marshaling engine.
//!
//! Hard failures are reported through [`TameError`]. Problems found while
//! encoding a write request are recoverable: the offending value is replaced
//! with a best-effort substitute and a [`Warning`] is recorded instead.

use std::io;
use thiserror::Error;

use crate::value::ItemPath;

/// Result type alias for ADS operations.
pub type Result<T> = std::result::Result<T, TameError>;

/// Errors that can occur while building, dispatching or decoding a request.
#[derive(Debug, Error)]
pub enum TameError {
    /// The client configuration is malformed.
    #[error("Configuration error: {reason}")]
    Configuration {
        /// Description of the configuration problem.
        reason: String,
    },

    /// A field or offset could not be resolved to an index group/offset.
    #[error("Address resolution failed: {reason}")]
    AddressResolution {
        /// Description of the addressing error.
        reason: String,
    },

    /// Invalid parameter provided to a request.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// The remote side reported a fault.
    #[error("Transport fault: {text} ({code})")]
    TransportFault {
        /// Fault code reported by the server, `-` if none was given.
        code: String,
        /// Fault text reported by the server.
        text: String,
    },

    /// The response payload could not be decoded.
    #[error("Decode failed: {reason}")]
    Decode {
        /// Description of the decode error.
        reason: String,
    },

    /// Reply token does not match the request.
    #[error("Correlation mismatch: expected token {expected}, received {received}")]
    CorrelationMismatch {
        /// Token sent with the request.
        expected: u64,
        /// Token carried by the reply.
        received: u64,
    },

    /// I/O error inside a transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TameError {
    /// Creates a new `Configuration` error.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::TameError;
    ///
    /// let err = TameError::configuration("service URL is empty");
    /// assert_eq!(err.to_string(), "Configuration error: service URL is empty");
    /// ```
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Creates a new `AddressResolution` error.
    pub fn address_resolution(reason: impl Into<String>) -> Self {
        Self::AddressResolution {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidParameter` error.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::TameError;
    ///
    /// let err = TameError::invalid_parameter("item", "index 7 outside array of 5");
    /// ```
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `TransportFault` error.
    pub fn transport_fault(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self::TransportFault {
            code: code.into(),
            text: text.into(),
        }
    }

    /// Creates a new `Decode` error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Creates a new `CorrelationMismatch` error.
    pub fn correlation_mismatch(expected: u64, received: u64) -> Self {
        Self::CorrelationMismatch { expected, received }
    }
}

/// Recoverable conditions found while encoding a write request.
///
/// Each warning describes the substitute that was actually encoded, so the
/// request can still reach the controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Warning {
    /// The host value is not a number; `0` was written.
    #[error("value for {ty} is not numeric ({found}), 0 used")]
    NotNumeric {
        /// Controller type name.
        ty: &'static str,
        /// Short description of the offending value.
        found: String,
    },

    /// The value was below the type's lower limit and has been clamped.
    #[error("lower limit for {ty} exceeded: {value} clamped to {limit}")]
    BelowMinimum {
        /// Controller type name.
        ty: &'static str,
        /// Limit that was applied.
        limit: f64,
        /// Original value.
        value: f64,
    },

    /// The value was above the type's upper limit and has been clamped.
    #[error("upper limit for {ty} exceeded: {value} clamped to {limit}")]
    AboveMaximum {
        /// Controller type name.
        ty: &'static str,
        /// Limit that was applied.
        limit: f64,
        /// Original value.
        value: f64,
    },

    /// An LREAL value was infinite.
    #[error("limit for LREAL exceeded: {value} clamped to {limit}")]
    NonFinite {
        /// Original value.
        value: f64,
        /// Limit that was applied.
        limit: f64,
    },

    /// No value was supplied for a write item; the type default was used.
    #[error("value of item `{path}` ({ty}) is not defined, default used")]
    MissingValue {
        /// Binding path of the item.
        path: ItemPath,
        /// Controller type name.
        ty: &'static str,
    },

    /// A temporal type received something other than a date/time.
    #[error("value for {ty} is not a date ({found}), epoch used")]
    NotADate {
        /// Controller type name.
        ty: &'static str,
        /// Short description of the offending value.
        found: String,
    },

    /// A requested string length is outside `1..=max`.
    #[error("string length {requested} not valid (max {max}), default {fallback} used")]
    InvalidStringLength {
        /// Requested length.
        requested: usize,
        /// Configured maximum.
        max: usize,
        /// Length actually used.
        fallback: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PathSegment;

    #[test]
    fn test_configuration_display() {
        let err = TameError::configuration("AMS port 805 out of range (801-804)");
        assert_eq!(
            err.to_string(),
            "Configuration error: AMS port 805 out of range (801-804)"
        );
    }

    #[test]
    fn test_transport_fault_display() {
        let err = TameError::transport_fault("1808", "symbol not found");
        assert_eq!(err.to_string(), "Transport fault: symbol not found (1808)");
    }

    #[test]
    fn test_correlation_mismatch_display() {
        let err = TameError::correlation_mismatch(4, 9);
        assert_eq!(
            err.to_string(),
            "Correlation mismatch: expected token 4, received 9"
        );
    }

    #[test]
    fn test_missing_value_warning_display() {
        let warning = Warning::MissingValue {
            path: ItemPath::from(vec![PathSegment::Index(0), PathSegment::field("speed")]),
            ty: "INT",
        };
        assert_eq!(
            warning.to_string(),
            "value of item `[0].speed` (INT) is not defined, default used"
        );
    }

    #[test]
    fn test_clamp_warning_display() {
        let warning = Warning::AboveMaximum {
            ty: "INT",
            limit: 32767.0,
            value: 40000.0,
        };
        assert_eq!(
            warning.to_string(),
            "upper limit for INT exceeded: 40000 clamped to 32767"
        );
    }
}
