//! Decoding of read replies.
//!
//! The reply payload is consumed item by item in layout order. Each item is
//! read at its payload offset, optionally decorated with a prefix and a
//! suffix, and stored at its path in a value tree. The tree starts from the
//! sink's current value, so members the layout does not cover are kept.
//!
//! # Example
//!
//! ```
//! use tame_ads::codec::DecodeContext;
//! use tame_ads::response::{decode_payload, Decoration};
//! use tame_ads::{Layout, PlcType, Value};
//!
//! let layout = Layout::array(PlcType::Int, 2, None).unwrap();
//! let value = decode_payload(
//!     &layout,
//!     &[0x01, 0x00, 0xFF, 0xFF],
//!     Value::Null,
//!     &DecodeContext::default(),
//!     &Decoration::default(),
//! )
//! .unwrap();
//! assert_eq!(value, Value::from(vec![1, -1]));
//! ```

use crate::codec::{self, DecodeContext};
use crate::error::{Result, TameError};
use crate::layout::{Item, Layout};
use crate::value::Value;

/// Text put around every decoded value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoration {
    /// Text before the value.
    pub prefix: Option<String>,
    /// Text after the value.
    pub suffix: Option<String>,
}

impl Decoration {
    /// Creates a decoration.
    pub fn new(prefix: Option<String>, suffix: Option<String>) -> Self {
        Self { prefix, suffix }
    }

    /// Returns whether neither prefix nor suffix is set.
    pub fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.suffix.is_none()
    }

    fn apply(&self, value: Value) -> Value {
        if self.is_empty() {
            return value;
        }
        Value::Text(format!(
            "{}{value}{}",
            self.prefix.as_deref().unwrap_or_default(),
            self.suffix.as_deref().unwrap_or_default()
        ))
    }
}

/// Decodes a reply payload into `base`.
///
/// # Errors
///
/// Returns `TameError::Decode` naming the first item whose bytes are not
/// in the payload. Nothing is returned in that case; the caller's value is
/// left untouched.
pub fn decode_payload(
    layout: &Layout,
    payload: &[u8],
    base: Value,
    ctx: &DecodeContext,
    decoration: &Decoration,
) -> Result<Value> {
    let mut root = base;
    for item in layout.values() {
        let value = decode_item(item, payload, ctx)?;
        root.set_path(&item.path, decoration.apply(value));
    }
    Ok(root)
}

fn decode_item(item: &Item, payload: &[u8], ctx: &DecodeContext) -> Result<Value> {
    let bytes = payload.get(item.offset..).unwrap_or_default();
    codec::decode(&item.ty, bytes, ctx).map_err(|e| match e {
        TameError::Decode { reason } => {
            TameError::decode(format!("item `{}` at offset {}: {reason}", item.path, item.offset))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StructDefinition;
    use crate::types::PlcType;
    use crate::value::{ItemPath, PathSegment};

    #[test]
    fn test_struct_decode_skips_padding() {
        let def = StructDefinition::new()
            .scalar("n", PlcType::Int)
            .scalar("f", PlcType::Bool);
        let layout = Layout::array_of_struct(&def, 2, true, None).unwrap();
        let payload = hex::decode("0500010007000000").unwrap();
        let value = decode_payload(
            &layout,
            &payload,
            Value::Null,
            &DecodeContext::default(),
            &Decoration::default(),
        )
        .unwrap();

        let first: Value = [("n", Value::Int(5)), ("f", Value::Bool(true))]
            .into_iter()
            .collect();
        let second: Value = [("n", Value::Int(7)), ("f", Value::Bool(false))]
            .into_iter()
            .collect();
        assert_eq!(value, Value::Array(vec![first, second]));
    }

    #[test]
    fn test_selected_element_keeps_siblings() {
        let layout = Layout::array(PlcType::Byte, 3, Some(1)).unwrap();
        let value = decode_payload(
            &layout,
            &[9],
            Value::from(vec![1, 2, 3]),
            &DecodeContext::default(),
            &Decoration::default(),
        )
        .unwrap();
        assert_eq!(value, Value::from(vec![1, 9, 3]));
    }

    #[test]
    fn test_prefix_and_suffix() {
        let layout = Layout::scalar(PlcType::Int);
        let value = decode_payload(
            &layout,
            &[0x15, 0x00],
            Value::Null,
            &DecodeContext::default(),
            &Decoration::new(Some("T=".into()), Some(" C".into())),
        )
        .unwrap();
        assert_eq!(value, Value::Text("T=21 C".into()));
    }

    #[test]
    fn test_short_payload_names_item() {
        let layout = Layout::array(PlcType::Dint, 2, None).unwrap();
        let err = decode_payload(
            &layout,
            &[0; 6],
            Value::Null,
            &DecodeContext::default(),
            &Decoration::default(),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("[1]"), "{message}");
        assert!(matches!(err, TameError::Decode { .. }));
    }

    #[test]
    fn test_explicit_items_decode_at_offsets() {
        let layout = Layout::explicit(
            10,
            [
                (ItemPath::from(vec![PathSegment::field("a")]), PlcType::Byte, 10),
                (ItemPath::from(vec![PathSegment::field("b")]), PlcType::Word, 13),
            ],
        )
        .unwrap();
        let value = decode_payload(
            &layout,
            &[1, 0, 0, 0x34, 0x12],
            Value::Null,
            &DecodeContext::default(),
            &Decoration::default(),
        )
        .unwrap();
        let expected: Value = [("a", Value::Int(1)), ("b", Value::Int(0x1234))]
            .into_iter()
            .collect();
        assert_eq!(value, expected);
    }
}
