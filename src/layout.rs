//! Layout engine: maps a host value onto a contiguous byte region.
//!
//! A [`Layout`] is an ordered list of [`Item`]s, one per leaf value, each
//! with its controller type and its byte offset inside the request payload.
//! The same placement routine serves length calculation, encoding and
//! decoding, so a write and a read of the same definition always agree.
//!
//! # Alignment
//!
//! With 4-byte alignment enabled (structures only), a member wider than one
//! byte that is not a STRING starts at a multiple of `min(width, 4)`, and
//! each structure instance ends with an `EndStructPadding` item that pads it
//! to a multiple of its widest member (again capped at 4):
//!
//! ```
//! use tame_ads::{Layout, PlcType, StructDefinition};
//!
//! let def = StructDefinition::new()
//!     .scalar("a", PlcType::Byte)
//!     .scalar("b", PlcType::Dint);
//! let layout = Layout::structure(&def, true).unwrap();
//!
//! assert_eq!(layout.items[0].offset, 0);
//! assert_eq!(layout.items[1].offset, 4);
//! assert_eq!(layout.byte_len, 8);
//! ```
//!
//! # Structure definitions
//!
//! Definitions list members in declaration order. The textual member
//! notation is a type (`"INT"`, `"STRING.20"`) or an array
//! `"ARRAY.<count>.<type>[.<param>][.SP]"`. `SP` spreads the elements over
//! members named `name0`, `name1`, ... instead of one array `name`.

use std::str::FromStr;

use crate::error::{Result, TameError, Warning};
use crate::types::{PlcType, MAX_ALIGNMENT};
use crate::value::{ItemPath, PathSegment, Value};

/// One member of a [`StructDefinition`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StructMember {
    /// A single value.
    Scalar(PlcType),
    /// `count` consecutive values of `ty`.
    Array {
        /// Number of elements.
        count: usize,
        /// Element type.
        ty: PlcType,
        /// Bind elements to `name0..nameN` instead of `name[0..N]`.
        spread: bool,
    },
}

impl StructMember {
    /// Returns the member's (element) type.
    pub fn ty(&self) -> &PlcType {
        match self {
            StructMember::Scalar(ty) | StructMember::Array { ty, .. } => ty,
        }
    }

    fn ty_mut(&mut self) -> &mut PlcType {
        match self {
            StructMember::Scalar(ty) | StructMember::Array { ty, .. } => ty,
        }
    }
}

impl FromStr for StructMember {
    type Err = TameError;

    fn from_str(s: &str) -> Result<Self> {
        let Some(rest) = s.strip_prefix("ARRAY.") else {
            return Ok(StructMember::Scalar(s.parse()?));
        };
        let (count, element) = rest.split_once('.').ok_or_else(|| {
            TameError::invalid_parameter("def", format!("array member `{s}` has no element type"))
        })?;
        let count: usize = count.parse().map_err(|_| {
            TameError::invalid_parameter("def", format!("array length `{count}` in `{s}`"))
        })?;
        if count == 0 {
            return Err(TameError::invalid_parameter(
                "def",
                format!("array member `{s}` has no elements"),
            ));
        }
        let (element, spread) = match element.strip_suffix(".SP") {
            Some(element) => (element, true),
            None => (element, false),
        };
        Ok(StructMember::Array {
            count,
            ty: element.parse()?,
            spread,
        })
    }
}

/// Ordered member list of a controller structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StructDefinition {
    members: Vec<(String, StructMember)>,
}

impl StructDefinition {
    /// Creates an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a member.
    pub fn with_member(mut self, name: impl Into<String>, member: StructMember) -> Self {
        self.members.push((name.into(), member));
        self
    }

    /// Appends a scalar member.
    pub fn scalar(self, name: impl Into<String>, ty: PlcType) -> Self {
        self.with_member(name, StructMember::Scalar(ty))
    }

    /// Appends an array member.
    pub fn array(self, name: impl Into<String>, count: usize, ty: PlcType) -> Self {
        self.with_member(
            name,
            StructMember::Array {
                count,
                ty,
                spread: false,
            },
        )
    }

    /// Builds a definition from `(name, notation)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `TameError::InvalidParameter` for unknown types or malformed
    /// array notation.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::StructDefinition;
    ///
    /// let def = StructDefinition::parse([
    ///     ("id", "UDINT"),
    ///     ("label", "STRING.12"),
    ///     ("temp", "ARRAY.3.REAL.1.SP"),
    /// ])
    /// .unwrap();
    /// assert_eq!(def.members().len(), 3);
    /// ```
    pub fn parse<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        entries
            .into_iter()
            .try_fold(Self::new(), |def, (name, notation)| -> Result<Self> {
                Ok(def.with_member(name, notation.parse()?))
            })
    }

    /// Returns the members in declaration order.
    pub fn members(&self) -> &[(String, StructMember)] {
        &self.members
    }

    /// Returns whether the definition has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Replaces out-of-range STRING lengths with the default.
    pub fn normalized(&self, max_string_len: usize) -> (Self, Vec<Warning>) {
        let mut warnings = Vec::new();
        let mut def = self.clone();
        for (_, member) in &mut def.members {
            let ty = member.ty_mut();
            let (fixed, warning) = ty.clone().normalized(max_string_len);
            *ty = fixed;
            warnings.extend(warning);
        }
        (def, warnings)
    }

    /// Byte length of one instance.
    pub fn instance_len(&self, align4: bool) -> usize {
        let mut placer = Placer::new(align4);
        placer.instance(self, &ItemPath::root());
        placer.pos
    }

    fn end_alignment(&self) -> usize {
        self.members
            .iter()
            .map(|(_, m)| m.ty().alignment())
            .max()
            .unwrap_or(1)
            .min(MAX_ALIGNMENT)
    }
}

/// How item offsets relate to the request address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Addressing {
    /// Items follow each other from the request address.
    Sequential,
    /// Each item carries its own address.
    Explicit,
}

/// Host-side shape of the value a layout describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Shape {
    /// A single value.
    Scalar,
    /// An array of scalars.
    Array {
        /// Element count of the host array.
        len: usize,
    },
    /// One structure.
    Struct,
    /// An array of structures.
    ArrayOfStruct {
        /// Element count of the host array.
        len: usize,
    },
    /// Independently addressed items.
    Items,
}

/// One leaf of a layout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Item {
    /// Location of the value in the host container.
    pub path: ItemPath,
    /// Controller type.
    pub ty: PlcType,
    /// Value to write (filled in by the request builder).
    pub value: Option<Value>,
    /// Byte offset inside the payload.
    pub offset: usize,
}

impl Item {
    fn new(path: ItemPath, ty: PlcType, offset: usize) -> Self {
        Self {
            path,
            ty,
            value: None,
            offset,
        }
    }

    /// Returns whether this item is structure padding.
    pub fn is_padding(&self) -> bool {
        matches!(self.ty, PlcType::EndStructPadding(_))
    }

    /// Offset of the first byte after this item.
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.ty.byte_len())
    }
}

/// Ordered item list plus the byte region it covers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Layout {
    /// Items in payload order.
    pub items: Vec<Item>,
    /// Total payload length in bytes.
    pub byte_len: usize,
    /// Host-side shape.
    pub shape: Shape,
    /// Sequential or explicit addressing.
    pub addressing: Addressing,
    /// Whether 4-byte alignment was applied.
    pub align4: bool,
    /// Bytes to add to the request address (single element selection).
    pub offset_shift: usize,
}

impl Layout {
    /// Layout of a single value.
    pub fn scalar(ty: PlcType) -> Self {
        let byte_len = ty.byte_len();
        Self {
            items: vec![Item::new(ItemPath::root(), ty, 0)],
            byte_len,
            shape: Shape::Scalar,
            addressing: Addressing::Sequential,
            align4: false,
            offset_shift: 0,
        }
    }

    /// Layout of `len` consecutive values, or of element `select` only.
    ///
    /// # Errors
    ///
    /// Returns `TameError::InvalidParameter` if `len` is zero or `select`
    /// is outside the array.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::{Layout, PlcType};
    ///
    /// let layout = Layout::array(PlcType::Int, 5, Some(2)).unwrap();
    /// assert_eq!(layout.items.len(), 1);
    /// assert_eq!(layout.offset_shift, 4);
    /// ```
    pub fn array(ty: PlcType, len: usize, select: Option<usize>) -> Result<Self> {
        check_selection(len, select)?;
        let width = ty.byte_len();
        let mut placer = Placer::new(false);
        match select {
            Some(i) => placer.leaf(ItemPath::root().join(PathSegment::Index(i)), ty),
            None => (0..len).for_each(|i| {
                placer.leaf(ItemPath::root().join(PathSegment::Index(i)), ty.clone())
            }),
        }
        Ok(placer.finish(
            Shape::Array { len },
            select.map_or(0, |i| i.saturating_mul(width)),
        ))
    }

    /// Layout of one structure.
    ///
    /// # Errors
    ///
    /// Returns `TameError::InvalidParameter` for an empty definition.
    pub fn structure(def: &StructDefinition, align4: bool) -> Result<Self> {
        check_definition(def)?;
        let mut placer = Placer::new(align4);
        placer.instance(def, &ItemPath::root());
        Ok(placer.finish(Shape::Struct, 0))
    }

    /// Layout of `len` structures, or of element `select` only.
    ///
    /// # Errors
    ///
    /// Returns `TameError::InvalidParameter` for an empty definition, a zero
    /// length or an out-of-range selection.
    pub fn array_of_struct(
        def: &StructDefinition,
        len: usize,
        align4: bool,
        select: Option<usize>,
    ) -> Result<Self> {
        check_definition(def)?;
        check_selection(len, select)?;
        let mut placer = Placer::new(align4);
        let indices = match select {
            Some(i) => i..i + 1,
            None => 0..len,
        };
        for i in indices {
            placer.instance(def, &ItemPath::root().join(PathSegment::Index(i)));
        }
        let shift = select.map_or(0, |i| i.saturating_mul(def.instance_len(align4)));
        Ok(placer.finish(Shape::ArrayOfStruct { len }, shift))
    }

    /// Layout of independently addressed items.
    ///
    /// `base` is the request's index offset; each entry gives its own
    /// absolute byte offset. The length runs from `base` to the end of the
    /// last entry.
    ///
    /// # Errors
    ///
    /// Returns `TameError::InvalidParameter` if there are no entries or an
    /// entry lies before `base`.
    pub fn explicit(
        base: u32,
        entries: impl IntoIterator<Item = (ItemPath, PlcType, u32)>,
    ) -> Result<Self> {
        let mut items = Vec::new();
        for (path, ty, address) in entries {
            let offset = address.checked_sub(base).ok_or_else(|| {
                TameError::invalid_parameter(
                    "items",
                    format!("address {address} of `{path}` lies before the request address {base}"),
                )
            })?;
            items.push(Item::new(path, ty, offset as usize));
        }
        let byte_len = items
            .last()
            .map(Item::end)
            .ok_or_else(|| TameError::invalid_parameter("items", "no items given"))?;
        Ok(Self {
            items,
            byte_len,
            shape: Shape::Items,
            addressing: Addressing::Explicit,
            align4: false,
            offset_shift: 0,
        })
    }

    /// Items that carry values (everything except padding).
    pub fn values(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| !item.is_padding())
    }
}

/// Bytes needed to move `pos` up to a multiple of `align`.
pub fn padding(pos: usize, align: usize) -> usize {
    if align <= 1 {
        0
    } else {
        (align - pos % align) % align
    }
}

struct Placer {
    items: Vec<Item>,
    pos: usize,
    align4: bool,
}

impl Placer {
    fn new(align4: bool) -> Self {
        Self {
            items: Vec::new(),
            pos: 0,
            align4,
        }
    }

    fn leaf(&mut self, path: ItemPath, ty: PlcType) {
        if self.align4 {
            self.pos = self.pos.saturating_add(padding(self.pos, ty.alignment()));
        }
        let width = ty.byte_len();
        self.items.push(Item::new(path, ty, self.pos));
        self.pos = self.pos.saturating_add(width);
    }

    fn instance(&mut self, def: &StructDefinition, base: &ItemPath) {
        let start = self.pos;
        for (name, member) in def.members() {
            match member {
                StructMember::Scalar(ty) => {
                    self.leaf(base.join(PathSegment::field(name.as_str())), ty.clone());
                }
                StructMember::Array { count, ty, spread } => {
                    for j in 0..*count {
                        let path = if *spread {
                            base.join(PathSegment::field(format!("{name}{j}")))
                        } else {
                            base.join(PathSegment::field(name.as_str()))
                                .join(PathSegment::Index(j))
                        };
                        self.leaf(path, ty.clone());
                    }
                }
            }
        }
        if self.align4 {
            let pad = padding(self.pos - start, def.end_alignment());
            if pad > 0 {
                self.items
                    .push(Item::new(base.clone(), PlcType::EndStructPadding(pad), self.pos));
                self.pos = self.pos.saturating_add(pad);
            }
        }
    }

    fn finish(self, shape: Shape, offset_shift: usize) -> Layout {
        Layout {
            items: self.items,
            byte_len: self.pos,
            shape,
            addressing: Addressing::Sequential,
            align4: self.align4,
            offset_shift,
        }
    }
}

fn check_definition(def: &StructDefinition) -> Result<()> {
    if def.is_empty() {
        return Err(TameError::invalid_parameter(
            "def",
            "structure definition has no members",
        ));
    }
    Ok(())
}

fn check_selection(len: usize, select: Option<usize>) -> Result<()> {
    if len == 0 {
        return Err(TameError::invalid_parameter("arrlen", "array length is 0"));
    }
    match select {
        Some(i) if i >= len => Err(TameError::invalid_parameter(
            "item",
            format!("index {i} outside array of {len} (last index {})", len - 1),
        )),
        _ => Ok(()),
    }
}
