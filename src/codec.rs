//! Encoding of host values into controller memory bytes and back.
//!
//! All multi-byte values are little-endian. Signed integers use two's
//! complement. REAL and LREAL go through [`crate::ieee754`]; temporal types
//! treat the host wall clock as UTC on both sides, so a value written and
//! read back shows the same clock time.
//!
//! Encoding never fails: see [`crate::bounds`] for how unusable values are
//! replaced. Decoding fails only when the buffer is too short.
//!
//! # Example
//!
//! ```
//! use tame_ads::codec::{decode, encode_item, DecodeContext, EncodeContext};
//! use tame_ads::{ItemPath, PlcType, Value};
//!
//! let path = ItemPath::root();
//! let ctx = EncodeContext::new(&path);
//! let encoded = encode_item(&PlcType::Int, Some(&Value::Int(-2)), &ctx);
//! assert_eq!(encoded.bytes, vec![0xFE, 0xFF]);
//!
//! let value = decode(&PlcType::Int, &encoded.bytes, &DecodeContext::default()).unwrap();
//! assert_eq!(value, Value::Int(-2));
//! ```

use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike};

use crate::bounds::{self, Checked, Number};
use crate::error::{Result, TameError, Warning};
use crate::format::{self, Language};
use crate::ieee754;
use crate::types::PlcType;
use crate::value::{ItemPath, Value};

/// Settings applied while encoding one item.
#[derive(Debug, Clone)]
pub struct EncodeContext<'a> {
    /// Binding path of the item, used in warnings.
    pub path: &'a ItemPath,
    /// Whether numeric bounds are enforced.
    pub check_bounds: bool,
    /// Substitute for missing DATE, DT and TOD values.
    pub now: NaiveDateTime,
}

impl<'a> EncodeContext<'a> {
    /// Creates a context with bounds checking on and `now` from the local
    /// clock.
    pub fn new(path: &'a ItemPath) -> Self {
        Self {
            path,
            check_bounds: true,
            now: chrono::Local::now().naive_local(),
        }
    }

    /// Sets whether numeric bounds are enforced.
    pub fn with_check_bounds(mut self, enabled: bool) -> Self {
        self.check_bounds = enabled;
        self
    }

    /// Sets the substitute for missing date/time values.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }
}

/// Settings applied while decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeContext {
    /// Language of weekday and month names in formatted output.
    pub language: Language,
}

/// Bytes of one encoded item and the warnings raised on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoded {
    /// Encoded bytes, exactly `ty.byte_len()` long.
    pub bytes: Vec<u8>,
    /// Substitutions made while encoding.
    pub warnings: Vec<Warning>,
}

impl Encoded {
    fn push_checked<T>(&mut self, checked: Checked<T>) -> T {
        self.warnings.extend(checked.warning);
        checked.value
    }
}

/// Encodes one item.
///
/// `None` and `Value::Null` mean "no value supplied": the type default is
/// encoded (`0`, empty string, `ctx.now` for DATE/DT/TOD) and a
/// [`Warning::MissingValue`] is recorded. Padding never takes a value.
pub fn encode_item(ty: &PlcType, value: Option<&Value>, ctx: &EncodeContext<'_>) -> Encoded {
    let mut out = Encoded::default();

    if let PlcType::EndStructPadding(n) = ty {
        out.bytes = vec![0; *n];
        return out;
    }

    let default;
    let value = match value {
        Some(v) if *v != Value::Null => v,
        _ => {
            out.warnings.push(Warning::MissingValue {
                path: ctx.path.clone(),
                ty: ty.name(),
            });
            default = default_value(ty, ctx.now);
            &default
        }
    };

    let name = ty.name();
    let check = ctx.check_bounds;
    out.bytes = match ty {
        PlcType::Bool => vec![u8::from(value.is_truthy())],
        PlcType::Byte | PlcType::Usint => int_bytes(&mut out, name, value, 0, 0xFF, check, 1),
        PlcType::Sint => int_bytes(&mut out, name, value, -0x80, 0x7F, check, 1),
        PlcType::Word | PlcType::Uint => int_bytes(&mut out, name, value, 0, 0xFFFF, check, 2),
        PlcType::Int => int_bytes(&mut out, name, value, -0x8000, 0x7FFF, check, 2),
        PlcType::Int1Dp => {
            let n = out.push_checked(bounds::coerce(name, value, true));
            let scaled = match n {
                Number::Int(i) => Number::Int(i.saturating_mul(10)),
                Number::Float(f) => Number::Float((f * 10.0).round()),
            };
            let raw = out.push_checked(bounds::check_integer(name, scaled, -0x8000, 0x7FFF, check));
            le_bytes(raw, 2)
        }
        PlcType::Dword | PlcType::Udint => {
            int_bytes(&mut out, name, value, 0, i64::from(u32::MAX), check, 4)
        }
        PlcType::Dint => int_bytes(
            &mut out,
            name,
            value,
            i64::from(i32::MIN),
            i64::from(i32::MAX),
            check,
            4,
        ),
        PlcType::Real { .. } => {
            let n = out.push_checked(bounds::coerce(name, value, true));
            let v = out.push_checked(bounds::check_real(n.as_f64(), check));
            ieee754::encode_f32_bits(v).to_le_bytes().to_vec()
        }
        PlcType::Lreal { .. } => {
            let n = out.push_checked(bounds::coerce(name, value, true));
            let v = out.push_checked(bounds::check_lreal(n.as_f64(), check));
            ieee754::encode_f64_bits(v).to_le_bytes().to_vec()
        }
        PlcType::String { len } => encode_string(value, *len),
        PlcType::Time { format } => {
            let n = out.push_checked(bounds::coerce(name, value, true));
            let ms = (n.as_f64() * time_unit_ms(format.as_deref())).round();
            let ms = out.push_checked(bounds::check_time(ms));
            ms.to_le_bytes().to_vec()
        }
        PlcType::Tod { .. } => {
            let ms = match as_datetime(&mut out, name, value) {
                Some(dt) => {
                    let time = dt.time();
                    time.num_seconds_from_midnight() * 1000 + time.nanosecond() / 1_000_000 % 1000
                }
                None => 0,
            };
            ms.to_le_bytes().to_vec()
        }
        PlcType::Date { .. } => {
            let secs = as_datetime(&mut out, name, value)
                .map_or(0, |dt| dt.date().and_time(NaiveTime::MIN).and_utc().timestamp());
            epoch_seconds(&mut out, name, secs)
        }
        PlcType::Dt { .. } => {
            let secs = as_datetime(&mut out, name, value).map_or(0, |dt| dt.and_utc().timestamp());
            epoch_seconds(&mut out, name, secs)
        }
        PlcType::EndStructPadding(n) => vec![0; *n],
    };
    out
}

/// Decodes one item from the start of `bytes`.
///
/// # Errors
///
/// Returns `TameError::Decode` if `bytes` is shorter than the type.
pub fn decode(ty: &PlcType, bytes: &[u8], ctx: &DecodeContext) -> Result<Value> {
    let width = ty.byte_len();
    let bytes = bytes.get(..width).ok_or_else(|| {
        TameError::decode(format!(
            "{} needs {width} bytes, {} left in payload",
            ty.name(),
            bytes.len()
        ))
    })?;

    let value = match ty {
        PlcType::Bool => Value::Bool(bytes[0] != 0),
        PlcType::Byte | PlcType::Usint => Value::Int(i64::from(bytes[0])),
        PlcType::Sint => Value::Int(i64::from(bytes[0] as i8)),
        PlcType::Word | PlcType::Uint => Value::Int(i64::from(u16::from_le_bytes([bytes[0], bytes[1]]))),
        PlcType::Int => Value::Int(i64::from(i16::from_le_bytes([bytes[0], bytes[1]]))),
        PlcType::Int1Dp => Value::Real(f64::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 10.0),
        PlcType::Dword | PlcType::Udint => Value::Int(i64::from(read_u32(bytes))),
        PlcType::Dint => Value::Int(i64::from(read_u32(bytes) as i32)),
        PlcType::Real { decimals } => {
            fixed_point(ieee754::decode_f32_bits(read_u32(bytes)), *decimals)
        }
        PlcType::Lreal { decimals } => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            fixed_point(ieee754::decode_f64_bits(u64::from_le_bytes(raw)), *decimals)
        }
        PlcType::String { .. } => Value::Text(decode_string(bytes)),
        PlcType::Time { format } => {
            let ms = read_u32(bytes);
            match format {
                Some(f) => Value::Text(format::format_time(ms, f)),
                None => Value::Int(i64::from(ms)),
            }
        }
        PlcType::Tod { format } => {
            let ms = i64::from(read_u32(bytes));
            temporal(DateTime::from_timestamp_millis(ms), format.as_deref(), ctx)
        }
        PlcType::Date { format } | PlcType::Dt { format } => {
            let secs = i64::from(read_u32(bytes));
            temporal(DateTime::from_timestamp(secs, 0), format.as_deref(), ctx)
        }
        PlcType::EndStructPadding(_) => Value::Null,
    };
    Ok(value)
}

/// Milliseconds per unit of a TIME write format.
pub fn time_unit_ms(format: Option<&str>) -> f64 {
    match format {
        Some("#d" | "#dd") => 86_400_000.0,
        Some("#h" | "#hh") => 3_600_000.0,
        Some("#m" | "#mm") => 60_000.0,
        Some("#s" | "#ss") => 1_000.0,
        _ => 1.0,
    }
}

fn default_value(ty: &PlcType, now: NaiveDateTime) -> Value {
    match ty {
        PlcType::String { .. } => Value::Text(String::new()),
        PlcType::Date { .. } | PlcType::Dt { .. } | PlcType::Tod { .. } => Value::DateTime(now),
        PlcType::Bool => Value::Bool(false),
        _ => Value::Int(0),
    }
}

fn int_bytes(
    out: &mut Encoded,
    ty: &'static str,
    value: &Value,
    min: i64,
    max: i64,
    check: bool,
    width: usize,
) -> Vec<u8> {
    let n = out.push_checked(bounds::coerce(ty, value, false));
    let v = out.push_checked(bounds::check_integer(ty, n, min, max, check));
    le_bytes(v, width)
}

/// Low-order `width` bytes of the two's complement representation.
fn le_bytes(value: i64, width: usize) -> Vec<u8> {
    value.to_le_bytes()[..width].to_vec()
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn encode_string(value: &Value, len: usize) -> Vec<u8> {
    let text = match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    };
    let mut bytes: Vec<u8> = text
        .chars()
        .take(len)
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    bytes.resize(len + 1, 0);
    bytes
}

fn decode_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

fn as_datetime(out: &mut Encoded, ty: &'static str, value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        other => {
            out.warnings.push(Warning::NotADate {
                ty,
                found: other.kind().to_string(),
            });
            None
        }
    }
}

fn epoch_seconds(out: &mut Encoded, ty: &'static str, secs: i64) -> Vec<u8> {
    let checked = match u32::try_from(secs) {
        Ok(v) => Checked { value: v, warning: None },
        Err(_) if secs < 0 => Checked {
            value: 0,
            warning: Some(Warning::BelowMinimum { ty, limit: 0.0, value: secs as f64 }),
        },
        Err(_) => Checked {
            value: u32::MAX,
            warning: Some(Warning::AboveMaximum {
                ty,
                limit: f64::from(u32::MAX),
                value: secs as f64,
            }),
        },
    };
    out.push_checked(checked).to_le_bytes().to_vec()
}

fn fixed_point(v: f64, decimals: Option<u8>) -> Value {
    match decimals {
        Some(d) => Value::Text(format!("{v:.prec$}", prec = usize::from(d))),
        None => Value::Real(v),
    }
}

fn temporal(dt: Option<DateTime<chrono::Utc>>, format: Option<&str>, ctx: &DecodeContext) -> Value {
    // u32 seconds and milliseconds are always inside chrono's range
    let dt = dt.map(|d| d.naive_utc()).unwrap_or_default();
    match format {
        Some(f) => Value::Text(format::format_date(&dt, f, ctx.language)),
        None => Value::DateTime(dt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn enc(ty: &PlcType, v: impl Into<Value>) -> Encoded {
        let path = ItemPath::root();
        encode_item(ty, Some(&v.into()), &EncodeContext::new(&path))
    }

    fn dec(ty: &PlcType, bytes: &[u8]) -> Value {
        decode(ty, bytes, &DecodeContext::default()).unwrap()
    }

    #[test]
    fn test_sint_and_byte_share_bit_pattern() {
        assert_eq!(enc(&PlcType::Sint, -1).bytes, enc(&PlcType::Byte, 255).bytes);
        assert_eq!(dec(&PlcType::Sint, &[0xFF]), Value::Int(-1));
        assert_eq!(dec(&PlcType::Byte, &[0xFF]), Value::Int(255));
    }

    #[test]
    fn test_integer_layouts() {
        assert_eq!(enc(&PlcType::Uint, 0x1234).bytes, hex::decode("3412").unwrap());
        assert_eq!(enc(&PlcType::Dint, -2).bytes, hex::decode("feffffff").unwrap());
        assert_eq!(enc(&PlcType::Udint, 0xDEADBEEFu32).bytes, hex::decode("efbeadde").unwrap());
        assert_eq!(dec(&PlcType::Dint, &hex::decode("feffffff").unwrap()), Value::Int(-2));
        assert_eq!(dec(&PlcType::Dword, &hex::decode("efbeadde").unwrap()), Value::Int(0xDEAD_BEEF));
    }

    #[test]
    fn test_int_clamp_warns() {
        let e = enc(&PlcType::Int, 40000);
        assert_eq!(e.bytes, 32767i16.to_le_bytes().to_vec());
        assert_eq!(e.warnings.len(), 1);
    }

    #[test]
    fn test_unchecked_int_keeps_low_bytes() {
        let path = ItemPath::root();
        let ctx = EncodeContext::new(&path).with_check_bounds(false);
        let e = encode_item(&PlcType::Int, Some(&Value::Int(0x1_0005)), &ctx);
        assert_eq!(e.bytes, vec![0x05, 0x00]);
        assert!(e.warnings.is_empty());
    }

    #[test]
    fn test_int1dp() {
        let e = enc(&PlcType::Int1Dp, 12.34);
        assert_eq!(e.bytes, 123i16.to_le_bytes().to_vec());
        assert_eq!(dec(&PlcType::Int1Dp, &e.bytes), Value::Real(12.3));
        assert_eq!(dec(&PlcType::Int1Dp, &(-55i16).to_le_bytes()), Value::Real(-5.5));
    }

    #[test]
    fn test_real_tiny_value_is_clamped() {
        let e = enc(&PlcType::Real { decimals: None }, 1e-40);
        let expected = ieee754::encode_f32_bits(1.175495e-38).to_le_bytes().to_vec();
        assert_eq!(e.bytes, expected);
        assert_eq!(e.warnings.len(), 1);
    }

    #[test]
    fn test_real_decimals() {
        let bytes = ieee754::encode_f32_bits(2.5).to_le_bytes();
        assert_eq!(dec(&PlcType::Real { decimals: Some(2) }, &bytes), Value::Text("2.50".into()));
        assert_eq!(dec(&PlcType::Real { decimals: None }, &bytes), Value::Real(2.5));
    }

    #[test]
    fn test_lreal_low_word_first() {
        let e = enc(&PlcType::Lreal { decimals: None }, 1.0);
        assert_eq!(e.bytes, hex::decode("000000000000f03f").unwrap());
        assert_eq!(dec(&PlcType::Lreal { decimals: None }, &e.bytes), Value::Real(1.0));
    }

    #[test]
    fn test_string_padding_and_truncation() {
        let e = enc(&PlcType::String { len: 4 }, "ab");
        assert_eq!(e.bytes, b"ab\0\0\0".to_vec());

        let e = enc(&PlcType::String { len: 2 }, "abcdef");
        assert_eq!(e.bytes, b"ab\0".to_vec());

        let e = enc(&PlcType::String { len: 3 }, "é€");
        assert_eq!(e.bytes, vec![0xE9, b'?', 0, 0]);

        assert_eq!(dec(&PlcType::String { len: 5 }, b"hi\0xyz"), Value::Text("hi".into()));
        assert_eq!(dec(&PlcType::String { len: 1 }, &[0xE9, 0]), Value::Text("é".into()));
    }

    #[test]
    fn test_time_units() {
        let e = enc(&PlcType::Time { format: Some("#s".into()) }, 1.5);
        assert_eq!(e.bytes, 1500u32.to_le_bytes().to_vec());
        let e = enc(&PlcType::Time { format: None }, -1);
        assert_eq!(e.bytes, vec![0; 4]);
        assert_eq!(e.warnings.len(), 1);

        let bytes = 90_000u32.to_le_bytes();
        assert_eq!(dec(&PlcType::Time { format: None }, &bytes), Value::Int(90_000));
        assert_eq!(
            dec(&PlcType::Time { format: Some("#m".into()) }, &bytes),
            Value::Text("1.5".into())
        );
    }

    #[test]
    fn test_temporal_types() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();

        let e = enc(&PlcType::Dt { format: None }, dt);
        assert_eq!(e.bytes, 1_577_934_245u32.to_le_bytes().to_vec());
        assert_eq!(dec(&PlcType::Dt { format: None }, &e.bytes), Value::DateTime(dt));

        let e = enc(&PlcType::Date { format: None }, dt);
        assert_eq!(e.bytes, 1_577_923_200u32.to_le_bytes().to_vec());

        let e = enc(&PlcType::Tod { format: None }, dt);
        assert_eq!(e.bytes, 11_045_000u32.to_le_bytes().to_vec());
        let tod = dec(&PlcType::Tod { format: Some("#hh#:#mm#:#ss".into()) }, &e.bytes);
        assert_eq!(tod, Value::Text("03:04:05".into()));
    }

    #[test]
    fn test_date_rejects_non_dates() {
        let e = enc(&PlcType::Date { format: None }, "yesterday");
        assert_eq!(e.bytes, vec![0; 4]);
        assert!(matches!(e.warnings[0], Warning::NotADate { ty: "DATE", .. }));
    }

    #[test]
    fn test_missing_value_uses_default() {
        let path = ItemPath::root();
        let e = encode_item(&PlcType::Dint, None, &EncodeContext::new(&path));
        assert_eq!(e.bytes, vec![0; 4]);
        assert!(matches!(e.warnings[0], Warning::MissingValue { ty: "DINT", .. }));

        let e = encode_item(&PlcType::String { len: 2 }, Some(&Value::Null), &EncodeContext::new(&path));
        assert_eq!(e.bytes, vec![0; 3]);
    }

    #[test]
    fn test_padding_encodes_zeros() {
        let path = ItemPath::root();
        let e = encode_item(&PlcType::EndStructPadding(3), None, &EncodeContext::new(&path));
        assert_eq!(e.bytes, vec![0; 3]);
        assert!(e.warnings.is_empty());
    }

    #[test]
    fn test_decode_short_buffer() {
        let err = decode(&PlcType::Dint, &[1, 2], &DecodeContext::default()).unwrap_err();
        assert!(matches!(err, TameError::Decode { .. }));
    }

    #[test]
    fn test_bool() {
        assert_eq!(enc(&PlcType::Bool, true).bytes, vec![1]);
        assert_eq!(enc(&PlcType::Bool, 0).bytes, vec![0]);
        assert_eq!(dec(&PlcType::Bool, &[7]), Value::Bool(true));
    }
}
