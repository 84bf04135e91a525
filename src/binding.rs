//! Host value bindings.
//!
//! The engine never owns application state. Write requests fetch their
//! source value through a [`Binding`], read requests store the decoded
//! value through one. Two implementations are provided:
//!
//! - [`Slot`] - a shared cell holding one value
//! - [`HostStore`] - a tree of values addressed by path expressions such as
//!   `"line1.motors[2].speed"`, parsed once when the binding is created
//!
//! # Example
//!
//! ```
//! use tame_ads::{Binding, HostStore, Value};
//!
//! let store = HostStore::new();
//! let speed = store.bind("line1.motors[2].speed").unwrap();
//! speed.set(Value::Int(1500));
//!
//! assert_eq!(store.bind("line1.motors[2].speed").unwrap().get(), Value::Int(1500));
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, TameError};
use crate::value::{ItemPath, PathSegment, Value};

/// Access to one host-side value.
pub trait Binding: Send + Sync {
    /// Returns a copy of the current value (`Value::Null` if unset).
    fn get(&self) -> Value;

    /// Replaces the current value.
    fn set(&self, value: Value);
}

/// A shared single-value cell.
///
/// Clones share the same cell.
#[derive(Clone, Default)]
pub struct Slot {
    cell: Arc<Mutex<Value>>,
}

impl Slot {
    /// Creates a slot holding `value`.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            cell: Arc::new(Mutex::new(value.into())),
        }
    }

    /// Creates an empty slot.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl Binding for Slot {
    fn get(&self) -> Value {
        self.cell.lock().clone()
    }

    fn set(&self, value: Value) {
        *self.cell.lock() = value;
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&*self.cell.lock()).finish()
    }
}

/// A tree of host values addressed by path expressions.
#[derive(Clone, Default)]
pub struct HostStore {
    root: Arc<RwLock<Value>>,
}

impl HostStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with an initial tree.
    pub fn with_root(root: Value) -> Self {
        Self {
            root: Arc::new(RwLock::new(root)),
        }
    }

    /// Returns a copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.root.read().clone()
    }

    /// Creates a binding for a path expression.
    ///
    /// Segments are separated by `.`; each segment is a member name, a
    /// decimal array index, or a member with one index (`name[3]`).
    ///
    /// # Errors
    ///
    /// Returns `TameError::InvalidParameter` if the expression is malformed.
    pub fn bind(&self, expr: &str) -> Result<PathBinding> {
        Ok(PathBinding {
            root: Arc::clone(&self.root),
            path: parse_path(expr)?,
            expr: expr.to_string(),
        })
    }
}

impl fmt::Debug for HostStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStore")
            .field("root", &*self.root.read())
            .finish()
    }
}

/// Binding to one location inside a [`HostStore`].
#[derive(Clone)]
pub struct PathBinding {
    root: Arc<RwLock<Value>>,
    path: ItemPath,
    expr: String,
}

impl PathBinding {
    /// Returns the parsed path.
    pub fn path(&self) -> &ItemPath {
        &self.path
    }
}

impl Binding for PathBinding {
    fn get(&self) -> Value {
        self.root
            .read()
            .get_path(&self.path)
            .cloned()
            .unwrap_or_default()
    }

    fn set(&self, value: Value) {
        self.root.write().set_path(&self.path, value);
    }
}

impl fmt::Debug for PathBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathBinding").field("expr", &self.expr).finish()
    }
}

impl FromStr for ItemPath {
    type Err = TameError;

    fn from_str(s: &str) -> Result<Self> {
        parse_path(s)
    }
}

fn parse_path(expr: &str) -> Result<ItemPath> {
    let invalid = |reason: String| TameError::invalid_parameter("path", reason);

    if expr.trim().is_empty() {
        return Err(invalid("path expression is empty".into()));
    }

    let mut segments = Vec::new();
    for part in expr.split('.') {
        if part.is_empty() {
            return Err(invalid(format!("empty segment in `{expr}`")));
        }
        if let Some(inner) = part.strip_suffix(']') {
            let (name, index) = inner
                .split_once('[')
                .ok_or_else(|| invalid(format!("unbalanced brackets in `{part}`")))?;
            let index: usize = index
                .parse()
                .map_err(|_| invalid(format!("index `{index}` in `{part}` is not a number")))?;
            if name.is_empty() {
                return Err(invalid(format!("missing name before `[` in `{part}`")));
            }
            segments.push(PathSegment::field(name));
            segments.push(PathSegment::Index(index));
        } else if part.contains('[') || part.contains(']') {
            return Err(invalid(format!("unbalanced brackets in `{part}`")));
        } else if part.bytes().all(|b| b.is_ascii_digit()) {
            let index = part
                .parse()
                .map_err(|_| invalid(format!("index `{part}` out of range")))?;
            segments.push(PathSegment::Index(index));
        } else {
            segments.push(PathSegment::field(part));
        }
    }
    Ok(ItemPath::from(segments))
}
