//! Value coercion and bounds enforcement for write requests.
//!
//! Nothing in here fails. Host values that are not numbers become `0`,
//! values outside a type's range are clamped, and every substitution is
//! reported as a [`Warning`] next to the value that will be encoded.

use crate::error::Warning;
use crate::value::Value;

/// Smallest positive normal REAL magnitude accepted by the bounds check.
pub const REAL_MIN_MAGNITUDE: f64 = 1.175495e-38;

/// Largest REAL magnitude accepted by the bounds check.
pub const REAL_MAX_MAGNITUDE: f64 = 3.402823e+38;

/// A value after coercion/clamping, with the reason it changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Checked<T> {
    /// Value to encode.
    pub value: T,
    /// Set when `value` differs from what the host supplied.
    pub warning: Option<Warning>,
}

impl<T> Checked<T> {
    fn ok(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    fn warn(value: T, warning: Warning) -> Self {
        Self {
            value,
            warning: Some(warning),
        }
    }
}

/// A host number, kept as an integer when it arrived as one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integral input.
    Int(i64),
    /// Floating point input.
    Float(f64),
}

impl Number {
    /// Returns the number as `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// Turns a host value into a number.
///
/// Text is parsed like an integer prefix (`"42abc"` -> 42) or, with
/// `float`, like a floating point prefix. Anything else that is not a
/// number yields `0` and [`Warning::NotNumeric`].
pub fn coerce(ty: &'static str, value: &Value, float: bool) -> Checked<Number> {
    let not_numeric = |found: String| Checked::warn(Number::Int(0), Warning::NotNumeric { ty, found });

    match value {
        Value::Int(i) => Checked::ok(Number::Int(*i)),
        Value::Real(r) if r.is_nan() => not_numeric("NaN".into()),
        Value::Real(r) => Checked::ok(Number::Float(*r)),
        Value::Text(s) => {
            let parsed = if float {
                parse_float_prefix(s).map(Number::Float)
            } else {
                parse_int_prefix(s).map(Number::Int)
            };
            match parsed {
                Some(n) => Checked::ok(n),
                None => not_numeric(format!("text {s:?}")),
            }
        }
        other => not_numeric(other.kind().to_string()),
    }
}

/// Clamps an integer to `[min, max]`.
///
/// Floating point input is truncated toward zero first. With `enabled`
/// false the value passes unclamped and the encoder keeps its low-order
/// bytes.
pub fn check_integer(ty: &'static str, n: Number, min: i64, max: i64, enabled: bool) -> Checked<i64> {
    let value = match n {
        Number::Int(i) => i,
        Number::Float(f) => {
            let t = f.trunc();
            if enabled && t < min as f64 {
                return Checked::warn(min, below(ty, min as f64, f));
            }
            if enabled && t > max as f64 {
                return Checked::warn(max, above(ty, max as f64, f));
            }
            t as i64
        }
    };
    if !enabled {
        Checked::ok(value)
    } else if value < min {
        Checked::warn(min, below(ty, min as f64, value as f64))
    } else if value > max {
        Checked::warn(max, above(ty, max as f64, value as f64))
    } else {
        Checked::ok(value)
    }
}

/// Keeps a REAL inside the representable normal range.
///
/// Magnitudes below [`REAL_MIN_MAGNITUDE`] snap to it, magnitudes above
/// [`REAL_MAX_MAGNITUDE`] clamp to it, both keeping the sign. Zero is left
/// alone.
pub fn check_real(value: f64, enabled: bool) -> Checked<f64> {
    const TY: &str = "REAL";
    if !enabled || value == 0.0 {
        return Checked::ok(value);
    }
    let magnitude = value.abs();
    let signed = |m: f64| if value < 0.0 { -m } else { m };
    if magnitude < REAL_MIN_MAGNITUDE {
        let limit = signed(REAL_MIN_MAGNITUDE);
        let warning = if value > 0.0 {
            below(TY, limit, value)
        } else {
            above(TY, limit, value)
        };
        Checked::warn(limit, warning)
    } else if magnitude > REAL_MAX_MAGNITUDE {
        let limit = signed(REAL_MAX_MAGNITUDE);
        let warning = if value > 0.0 {
            above(TY, limit, value)
        } else {
            below(TY, limit, value)
        };
        Checked::warn(limit, warning)
    } else {
        Checked::ok(value)
    }
}

/// Replaces infinite LREAL values with `±f64::MAX`.
pub fn check_lreal(value: f64, enabled: bool) -> Checked<f64> {
    if enabled && value.is_infinite() {
        let limit = if value > 0.0 { f64::MAX } else { f64::MIN };
        Checked::warn(limit, Warning::NonFinite { value, limit })
    } else {
        Checked::ok(value)
    }
}

/// Clamps a millisecond count to the TIME range `[0, u32::MAX]`.
///
/// Applied regardless of the bounds-check setting.
pub fn check_time(ms: f64) -> Checked<u32> {
    const TY: &str = "TIME";
    let max = f64::from(u32::MAX);
    if ms < 0.0 {
        Checked::warn(0, below(TY, 0.0, ms))
    } else if ms > max {
        Checked::warn(u32::MAX, above(TY, max, ms))
    } else {
        Checked::ok(ms as u32)
    }
}

fn below(ty: &'static str, limit: f64, value: f64) -> Warning {
    Warning::BelowMinimum { ty, limit, value }
}

fn above(ty: &'static str, limit: f64, value: f64) -> Warning {
    Warning::AboveMaximum { ty, limit, value }
}

fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let end = s
        .bytes()
        .position(|b| !(b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E')))
        .unwrap_or(s.len());
    (1..=end)
        .rev()
        .find_map(|i| s[..i].parse::<f64>().ok())
        .filter(|f| !f.is_nan())
}
