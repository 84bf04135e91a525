//! Host-side values and item binding paths.
//!
//! [`Value`] is the application-facing representation of everything the
//! engine reads from or writes to the controller. Composite values (arrays,
//! structures) are addressed with an [`ItemPath`], one per leaf item of a
//! request's item list.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;

/// A host value exchanged with the controller.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer, wide enough for every controller integer type.
    Int(i64),
    /// Floating point number.
    Real(f64),
    /// Text, also used for formatted date/time and fixed-point output.
    Text(String),
    /// Wall-clock date and time (DATE, DT, TOD).
    DateTime(NaiveDateTime),
    /// Array of values.
    Array(Vec<Value>),
    /// Structure members by name.
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the truthiness of the value, as used for BOOL writes.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::Value;
    ///
    /// assert!(Value::Int(3).is_truthy());
    /// assert!(!Value::Text(String::new()).is_truthy());
    /// assert!(!Value::Null.is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Real(r) => *r != 0.0 && !r.is_nan(),
            Self::Text(s) => !s.is_empty(),
            Self::DateTime(_) | Self::Array(_) | Self::Struct(_) => true,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::DateTime(_) => "datetime",
            Self::Array(_) => "array",
            Self::Struct(_) => "struct",
        }
    }

    /// Returns the elements if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the number of elements if this is an array.
    pub fn array_len(&self) -> Option<usize> {
        self.as_array().map(<[Value]>::len)
    }

    /// Looks up a nested value.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::{ItemPath, PathSegment, Value};
    ///
    /// let v = Value::Array(vec![Value::Int(1), Value::Int(2)]);
    /// let path = ItemPath::from(vec![PathSegment::Index(1)]);
    /// assert_eq!(v.get_path(&path), Some(&Value::Int(2)));
    /// ```
    pub fn get_path(&self, path: &ItemPath) -> Option<&Value> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Index(i), Self::Array(items)) => items.get(*i)?,
                (PathSegment::Field(name), Self::Struct(members)) => members.get(name)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Stores a value at a nested path, creating intermediate containers.
    ///
    /// A `Null` (or mismatching) container is replaced by an array or a
    /// structure as the segment requires; arrays grow with `Null` elements.
    pub fn set_path(&mut self, path: &ItemPath, value: Value) {
        let mut current = self;
        for segment in path.segments() {
            current = match segment {
                PathSegment::Index(i) => {
                    if !matches!(current, Self::Array(_)) {
                        *current = Self::Array(Vec::new());
                    }
                    match current {
                        Self::Array(items) => {
                            if items.len() <= *i {
                                items.resize(*i + 1, Self::Null);
                            }
                            &mut items[*i]
                        }
                        _ => return,
                    }
                }
                PathSegment::Field(name) => {
                    if !matches!(current, Self::Struct(_)) {
                        *current = Self::Struct(BTreeMap::new());
                    }
                    match current {
                        Self::Struct(members) => members.entry(name.clone()).or_insert(Self::Null),
                        _ => return,
                    }
                }
            };
        }
        *current = value;
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Struct(members) => {
                write!(f, "{{")?;
                for (i, (name, item)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Int, i16 => Int, i32 => Int, i64 => Int,
    u8 => Int, u16 => Int, u32 => Int,
    f32 => Real, f64 => Real,
    String => Text, &str => Text,
    NaiveDateTime => DateTime,
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Struct(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One step of an [`ItemPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PathSegment {
    /// Array element.
    Index(usize),
    /// Structure member.
    Field(String),
}

impl PathSegment {
    /// Creates a member segment.
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }
}

/// Location of a leaf value inside a request's host container.
///
/// The empty path denotes the container itself (single variables).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ItemPath(Vec<PathSegment>);

impl ItemPath {
    /// The empty path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Returns whether this is the empty path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path with `segment` appended.
    pub fn join(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }
}

impl From<Vec<PathSegment>> for ItemPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(root)");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
                PathSegment::Field(name) if i == 0 => write!(f, "{name}")?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
            }
        }
        Ok(())
    }
}
