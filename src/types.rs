//! Controller data types.
//!
//! [`PlcType`] is the closed set of leaf types the engine can encode and
//! decode, including their parameters (string length, display format,
//! decimal places). [`TypeTag`] is the bare tag used by the operation
//! surface, with an extra `Struct` marker.
//!
//! # Byte widths
//!
//! | Type | Bytes |
//! |------|------:|
//! | BOOL, BYTE, USINT, SINT | 1 |
//! | WORD, UINT, INT, INT1DP | 2 |
//! | DWORD, UDINT, DINT, TIME, TOD, DATE, DT, REAL | 4 |
//! | LREAL | 8 |
//! | STRING(n) | n + 1 |
//!
//! # Textual notation
//!
//! Structure definitions name their member types as text. Everything after
//! the first `.` is the type parameter:
//!
//! ```
//! use tame_ads::PlcType;
//!
//! assert_eq!("INT".parse::<PlcType>().unwrap(), PlcType::Int);
//! assert_eq!("STRING.20".parse::<PlcType>().unwrap(), PlcType::String { len: 20 });
//! assert_eq!(
//!     "REAL.2".parse::<PlcType>().unwrap(),
//!     PlcType::Real { decimals: Some(2) }
//! );
//! assert_eq!(
//!     "DT.#DD#.#MM#.#YYYY".parse::<PlcType>().unwrap(),
//!     PlcType::Dt { format: Some("#DD#.#MM#.#YYYY".into()) }
//! );
//! ```

use std::str::FromStr;

use crate::error::{Result, TameError, Warning};

/// Default STRING length when none is declared.
pub const DEFAULT_STRING_LEN: usize = 80;

/// Default maximum STRING length accepted in declarations.
pub const DEFAULT_MAX_STRING_LEN: usize = 255;

/// Largest alignment applied by 4-byte alignment mode.
pub const MAX_ALIGNMENT: usize = 4;

/// Bare controller type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[allow(missing_docs)]
pub enum TypeTag {
    Bool,
    Byte,
    Usint,
    Sint,
    Word,
    Uint,
    Int,
    Int1Dp,
    Dword,
    Udint,
    Dint,
    Real,
    Lreal,
    String,
    Time,
    Tod,
    Date,
    Dt,
    /// Structure marker, layout comes from a structure definition.
    Struct,
}

impl TypeTag {
    /// Returns the controller type name.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Bool => "BOOL",
            TypeTag::Byte => "BYTE",
            TypeTag::Usint => "USINT",
            TypeTag::Sint => "SINT",
            TypeTag::Word => "WORD",
            TypeTag::Uint => "UINT",
            TypeTag::Int => "INT",
            TypeTag::Int1Dp => "INT1DP",
            TypeTag::Dword => "DWORD",
            TypeTag::Udint => "UDINT",
            TypeTag::Dint => "DINT",
            TypeTag::Real => "REAL",
            TypeTag::Lreal => "LREAL",
            TypeTag::String => "STRING",
            TypeTag::Time => "TIME",
            TypeTag::Tod => "TOD",
            TypeTag::Date => "DATE",
            TypeTag::Dt => "DT",
            TypeTag::Struct => "STRUCT",
        }
    }
}

impl FromStr for TypeTag {
    type Err = TameError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "BOOL" => TypeTag::Bool,
            "BYTE" => TypeTag::Byte,
            "USINT" => TypeTag::Usint,
            "SINT" => TypeTag::Sint,
            "WORD" => TypeTag::Word,
            "UINT" => TypeTag::Uint,
            "INT" => TypeTag::Int,
            "INT1DP" => TypeTag::Int1Dp,
            "DWORD" => TypeTag::Dword,
            "UDINT" => TypeTag::Udint,
            "DINT" => TypeTag::Dint,
            "REAL" => TypeTag::Real,
            "LREAL" => TypeTag::Lreal,
            "STRING" => TypeTag::String,
            "TIME" => TypeTag::Time,
            "TOD" => TypeTag::Tod,
            "DATE" => TypeTag::Date,
            "DT" => TypeTag::Dt,
            "STRUCT" => TypeTag::Struct,
            other => {
                return Err(TameError::invalid_parameter(
                    "type",
                    format!("unknown data type `{other}`"),
                ))
            }
        })
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-request type parameters, applied when turning a [`TypeTag`] into a
/// [`PlcType`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeParams {
    /// STRING length override.
    pub str_len: Option<usize>,
    /// Display format for TIME, TOD, DATE and DT reads.
    pub format: Option<String>,
    /// Decimal places for REAL and LREAL reads.
    pub dec_places: Option<u8>,
}

/// A controller leaf type with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PlcType {
    /// Boolean, one byte.
    Bool,
    /// Unsigned 8 bit.
    Byte,
    /// Unsigned 8 bit.
    Usint,
    /// Signed 8 bit.
    Sint,
    /// Unsigned 16 bit.
    Word,
    /// Unsigned 16 bit.
    Uint,
    /// Signed 16 bit.
    Int,
    /// Signed 16 bit holding a value with one implied decimal place.
    Int1Dp,
    /// Unsigned 32 bit.
    Dword,
    /// Unsigned 32 bit.
    Udint,
    /// Signed 32 bit.
    Dint,
    /// IEEE-754 binary32.
    Real {
        /// Decimal places of the text produced on read.
        decimals: Option<u8>,
    },
    /// IEEE-754 binary64.
    Lreal {
        /// Decimal places of the text produced on read.
        decimals: Option<u8>,
    },
    /// Fixed-length string plus NUL terminator.
    String {
        /// Declared length without terminator.
        len: usize,
    },
    /// Duration in milliseconds.
    Time {
        /// Unit on write / display format on read.
        format: Option<String>,
    },
    /// Time of day, milliseconds since midnight.
    Tod {
        /// Display format on read.
        format: Option<String>,
    },
    /// Date, seconds since 1970-01-01.
    Date {
        /// Display format on read.
        format: Option<String>,
    },
    /// Date and time, seconds since 1970-01-01.
    Dt {
        /// Display format on read.
        format: Option<String>,
    },
    /// Padding bytes closing a structure instance.
    EndStructPadding(usize),
}

impl PlcType {
    /// Builds a type from a tag and request parameters.
    ///
    /// Returns `None` for [`TypeTag::Struct`]. An invalid `str_len` falls
    /// back to [`DEFAULT_STRING_LEN`] and yields a warning.
    pub fn from_tag(
        tag: TypeTag,
        params: &TypeParams,
        max_string_len: usize,
    ) -> Option<(Self, Option<Warning>)> {
        let ty = match tag {
            TypeTag::Bool => PlcType::Bool,
            TypeTag::Byte => PlcType::Byte,
            TypeTag::Usint => PlcType::Usint,
            TypeTag::Sint => PlcType::Sint,
            TypeTag::Word => PlcType::Word,
            TypeTag::Uint => PlcType::Uint,
            TypeTag::Int => PlcType::Int,
            TypeTag::Int1Dp => PlcType::Int1Dp,
            TypeTag::Dword => PlcType::Dword,
            TypeTag::Udint => PlcType::Udint,
            TypeTag::Dint => PlcType::Dint,
            TypeTag::Real => PlcType::Real {
                decimals: params.dec_places,
            },
            TypeTag::Lreal => PlcType::Lreal {
                decimals: params.dec_places,
            },
            TypeTag::String => PlcType::String {
                len: params.str_len.unwrap_or(DEFAULT_STRING_LEN),
            },
            TypeTag::Time => PlcType::Time {
                format: params.format.clone(),
            },
            TypeTag::Tod => PlcType::Tod {
                format: params.format.clone(),
            },
            TypeTag::Date => PlcType::Date {
                format: params.format.clone(),
            },
            TypeTag::Dt => PlcType::Dt {
                format: params.format.clone(),
            },
            TypeTag::Struct => return None,
        };
        Some(ty.normalized(max_string_len))
    }

    /// Replaces an out-of-range STRING length with the default.
    pub fn normalized(self, max_string_len: usize) -> (Self, Option<Warning>) {
        match self {
            PlcType::String { len } if len == 0 || len > max_string_len => (
                PlcType::String {
                    len: DEFAULT_STRING_LEN,
                },
                Some(Warning::InvalidStringLength {
                    requested: len,
                    max: max_string_len,
                    fallback: DEFAULT_STRING_LEN,
                }),
            ),
            other => (other, None),
        }
    }

    /// Returns the controller type name.
    pub fn name(&self) -> &'static str {
        match self {
            PlcType::EndStructPadding(_) => "EndStruct",
            other => other.tag().map_or("EndStruct", TypeTag::name),
        }
    }

    /// Returns the tag of this type (`None` for padding).
    pub fn tag(&self) -> Option<TypeTag> {
        Some(match self {
            PlcType::Bool => TypeTag::Bool,
            PlcType::Byte => TypeTag::Byte,
            PlcType::Usint => TypeTag::Usint,
            PlcType::Sint => TypeTag::Sint,
            PlcType::Word => TypeTag::Word,
            PlcType::Uint => TypeTag::Uint,
            PlcType::Int => TypeTag::Int,
            PlcType::Int1Dp => TypeTag::Int1Dp,
            PlcType::Dword => TypeTag::Dword,
            PlcType::Udint => TypeTag::Udint,
            PlcType::Dint => TypeTag::Dint,
            PlcType::Real { .. } => TypeTag::Real,
            PlcType::Lreal { .. } => TypeTag::Lreal,
            PlcType::String { .. } => TypeTag::String,
            PlcType::Time { .. } => TypeTag::Time,
            PlcType::Tod { .. } => TypeTag::Tod,
            PlcType::Date { .. } => TypeTag::Date,
            PlcType::Dt { .. } => TypeTag::Dt,
            PlcType::EndStructPadding(_) => return None,
        })
    }

    /// Returns the number of bytes this type occupies in controller memory.
    pub fn byte_len(&self) -> usize {
        match self {
            PlcType::Bool | PlcType::Byte | PlcType::Usint | PlcType::Sint => 1,
            PlcType::Word | PlcType::Uint | PlcType::Int | PlcType::Int1Dp => 2,
            PlcType::Dword
            | PlcType::Udint
            | PlcType::Dint
            | PlcType::Real { .. }
            | PlcType::Time { .. }
            | PlcType::Tod { .. }
            | PlcType::Date { .. }
            | PlcType::Dt { .. } => 4,
            PlcType::Lreal { .. } => 8,
            PlcType::String { len } => len.saturating_add(1),
            PlcType::EndStructPadding(n) => *n,
        }
    }

    /// Returns the alignment this type requires in 4-byte alignment mode.
    ///
    /// Strings and padding are byte aligned; everything else aligns to its
    /// width, capped at [`MAX_ALIGNMENT`].
    pub fn alignment(&self) -> usize {
        match self {
            PlcType::String { .. } | PlcType::EndStructPadding(_) => 1,
            other => other.byte_len().min(MAX_ALIGNMENT),
        }
    }

    /// Returns whether this is a STRING type.
    pub fn is_string(&self) -> bool {
        matches!(self, PlcType::String { .. })
    }
}

impl FromStr for PlcType {
    type Err = TameError;

    fn from_str(s: &str) -> Result<Self> {
        let (head, param) = match s.split_once('.') {
            Some((head, param)) => (head, Some(param)),
            None => (s, None),
        };
        let tag: TypeTag = head.parse()?;
        let mut params = TypeParams::default();
        if let Some(param) = param {
            match tag {
                TypeTag::String => {
                    let len: usize = param.parse().map_err(|_| {
                        TameError::invalid_parameter("type", format!("string length `{param}` in `{s}`"))
                    })?;
                    if len > DEFAULT_MAX_STRING_LEN {
                        return Err(TameError::invalid_parameter(
                            "type",
                            format!("string length {len} in `{s}` exceeds {DEFAULT_MAX_STRING_LEN}"),
                        ));
                    }
                    params.str_len = Some(len);
                }
                TypeTag::Real | TypeTag::Lreal => {
                    params.dec_places = Some(param.parse().map_err(|_| {
                        TameError::invalid_parameter("type", format!("decimal places `{param}` in `{s}`"))
                    })?);
                }
                TypeTag::Time | TypeTag::Tod | TypeTag::Date | TypeTag::Dt => {
                    params.format = Some(param.to_string());
                }
                _ => {
                    return Err(TameError::invalid_parameter(
                        "type",
                        format!("`{head}` takes no parameter (`{s}`)"),
                    ))
                }
            }
        }
        match PlcType::from_tag(tag, &params, DEFAULT_MAX_STRING_LEN) {
            Some((ty, _)) => Ok(ty),
            None => Err(TameError::invalid_parameter(
                "type",
                "STRUCT is not a leaf type",
            )),
        }
    }
}

impl std::fmt::Display for PlcType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlcType::Real { decimals: Some(d) } | PlcType::Lreal { decimals: Some(d) } => {
                write!(f, "{}.{d}", self.name())
            }
            PlcType::String { len } => write!(f, "STRING.{len}"),
            PlcType::Time { format: Some(fmt) }
            | PlcType::Tod { format: Some(fmt) }
            | PlcType::Date { format: Some(fmt) }
            | PlcType::Dt { format: Some(fmt) } => write!(f, "{}.{fmt}", self.name()),
            PlcType::EndStructPadding(n) => write!(f, "EndStruct({n})"),
            other => f.write_str(other.name()),
        }
    }
}
