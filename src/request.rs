//! Request descriptors.
//!
//! [`RequestOptions`] collects what the caller says about one operation:
//! where (address), what (value or binding), how (type parameters, element
//! selection, structure definition) and what to do afterwards (callback).
//! [`RequestDescriptor::build`] turns the options into a self-contained
//! descriptor: a resolved address, a [`Layout`] and, for writes, the encoded
//! payload.
//!
//! Building a write never fails because of the values themselves: values
//! that cannot be represented are replaced and reported as [`Warning`]s,
//! which are logged and kept on the descriptor.
//!
//! # Example
//!
//! ```
//! use tame_ads::request::{BuildContext, Method, RequestDescriptor, RequestKind};
//! use tame_ads::{RequestOptions, TypeTag, Value};
//!
//! let options = RequestOptions::at("%MB100")
//!     .with_value(vec![1, 2, 3, 4, 5])
//!     .with_item(2);
//! let descriptor = RequestDescriptor::build(
//!     Method::Write,
//!     RequestKind::Array(TypeTag::Int),
//!     options,
//!     &BuildContext::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(descriptor.address.index_offset(), 104);
//! assert_eq!(descriptor.payload, vec![3, 0]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::address::FieldAddress;
use crate::binding::Binding;
use crate::codec::{encode_item, EncodeContext};
use crate::error::{Result, TameError, Warning};
use crate::layout::{Layout, StructDefinition};
use crate::memory::Field;
use crate::transport::{Target, TransportRequest};
use crate::types::{PlcType, TypeParams, TypeTag, DEFAULT_MAX_STRING_LEN};
use crate::value::{ItemPath, Value};

/// Completion callback.
pub type OnComplete = Box<dyn FnOnce() + Send + 'static>;

/// Direction of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Method {
    /// Read from the controller.
    Read,
    /// Write to the controller.
    Write,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Read => write!(f, "Read"),
            Method::Write => write!(f, "Write"),
        }
    }
}

/// What a request transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// One value of the given type.
    Scalar(TypeTag),
    /// An array of the given type.
    Array(TypeTag),
    /// One structure.
    Struct,
    /// An array of structures.
    ArrayOfStruct,
    /// Independently addressed items (reads only).
    Items,
}

#[derive(Debug, Clone)]
enum Location {
    Compact(String),
    Parts(String, String),
    Number(Field, f64),
    Resolved(FieldAddress),
}

impl Location {
    fn resolve(&self) -> Result<FieldAddress> {
        match self {
            Location::Compact(addr) => FieldAddress::parse(addr),
            Location::Parts(field, offset) => FieldAddress::resolve(field, offset),
            Location::Number(field, offset) => FieldAddress::from_number(*field, *offset),
            Location::Resolved(address) => Ok(*address),
        }
    }
}

#[derive(Debug, Clone)]
enum DefinitionSource {
    Inline(StructDefinition),
    Named(String),
}

/// Caller-supplied parameters of one operation.
///
/// Start with one of the address constructors and chain `with_*` calls:
///
/// ```
/// use std::time::Duration;
/// use tame_ads::{Field, RequestOptions, Slot};
/// use std::sync::Arc;
///
/// let sink = Arc::new(Slot::empty());
/// let options = RequestOptions::field(Field::MX, 3.5)
///     .with_id(7)
///     .with_target(sink)
///     .with_on_complete(|| println!("done"))
///     .with_on_complete_delay(Duration::from_millis(50));
/// ```
#[derive(Default)]
pub struct RequestOptions {
    location: Option<Location>,
    id: Option<u32>,
    value: Option<Value>,
    target: Option<Arc<dyn Binding>>,
    params: TypeParams,
    arr_len: Option<usize>,
    item: Option<usize>,
    definition: Option<DefinitionSource>,
    entries: Vec<(String, PlcType, u32)>,
    debug: bool,
    on_complete: Option<OnComplete>,
    on_complete_delay: Option<Duration>,
    prefix: Option<String>,
    suffix: Option<String>,
}

impl RequestOptions {
    /// Options for an address in compact notation (`%MB100`, `%MX3.5`).
    pub fn at(compact: impl Into<String>) -> Self {
        Self::located(Location::Compact(compact.into()))
    }

    /// Options for a field and a numeric offset (`3.5` = byte 3, bit 5).
    pub fn field(field: Field, offset: f64) -> Self {
        Self::located(Location::Number(field, offset))
    }

    /// Options for a field name and a textual offset, e.g. `("MX", "3.5")`.
    pub fn parts(field: impl Into<String>, offset: impl Into<String>) -> Self {
        Self::located(Location::Parts(field.into(), offset.into()))
    }

    /// Options for an already resolved address.
    pub fn address(address: FieldAddress) -> Self {
        Self::located(Location::Resolved(address))
    }

    fn located(location: Location) -> Self {
        Self {
            location: Some(location),
            ..Self::default()
        }
    }

    /// Sets the channel id used for deduplication.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the value to write.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the binding that supplies the write value (when no value is
    /// given) and receives the read result.
    pub fn with_target(mut self, target: Arc<dyn Binding>) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the STRING length.
    pub fn with_str_len(mut self, len: usize) -> Self {
        self.params.str_len = Some(len);
        self
    }

    /// Sets the TIME unit (writes) or the display format (reads).
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.params.format = Some(format.into());
        self
    }

    /// Sets the decimal places of REAL/LREAL reads.
    pub fn with_dec_places(mut self, places: u8) -> Self {
        self.params.dec_places = Some(places);
        self
    }

    /// Sets the number of array elements.
    pub fn with_arr_len(mut self, len: usize) -> Self {
        self.arr_len = Some(len);
        self
    }

    /// Restricts an array request to one element.
    pub fn with_item(mut self, index: usize) -> Self {
        self.item = Some(index);
        self
    }

    /// Sets the structure definition.
    pub fn with_definition(mut self, def: StructDefinition) -> Self {
        self.definition = Some(DefinitionSource::Inline(def));
        self
    }

    /// Uses a structure definition registered on the client.
    pub fn with_definition_name(mut self, name: impl Into<String>) -> Self {
        self.definition = Some(DefinitionSource::Named(name.into()));
        self
    }

    /// Adds an independently addressed item.
    ///
    /// `path` is where the value lands in the result (`"motor.speed"`),
    /// `offset` is its absolute index offset in the request's field.
    pub fn with_entry(mut self, path: impl Into<String>, ty: PlcType, offset: u32) -> Self {
        self.entries.push((path.into(), ty, offset));
        self
    }

    /// Logs the built descriptor.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the callback run after a successful completion.
    pub fn with_on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Delays the completion callback.
    pub fn with_on_complete_delay(mut self, delay: Duration) -> Self {
        self.on_complete_delay = Some(delay);
        self
    }

    /// Prepends text to every decoded value.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Appends text to every decoded value.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("location", &self.location)
            .field("id", &self.id)
            .field("value", &self.value)
            .field("has_target", &self.target.is_some())
            .field("params", &self.params)
            .field("arr_len", &self.arr_len)
            .field("item", &self.item)
            .field("definition", &self.definition)
            .field("entries", &self.entries)
            .field("debug", &self.debug)
            .field("has_on_complete", &self.on_complete.is_some())
            .field("on_complete_delay", &self.on_complete_delay)
            .finish()
    }
}

/// Client settings that shape a descriptor.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Apply 4-byte alignment to structures.
    pub align4: bool,
    /// Enforce numeric bounds on write.
    pub check_bounds: bool,
    /// Upper limit for STRING lengths.
    pub max_string_len: usize,
    /// Named structure definitions.
    pub definitions: Option<&'a BTreeMap<String, StructDefinition>>,
}

impl Default for BuildContext<'_> {
    fn default() -> Self {
        Self {
            align4: false,
            check_bounds: true,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            definitions: None,
        }
    }
}

/// A fully prepared request.
pub struct RequestDescriptor {
    /// Read or write.
    pub method: Method,
    /// Address of the first byte, element selection applied.
    pub address: FieldAddress,
    /// Deduplication channel.
    pub channel: Option<u32>,
    /// Item list and length.
    pub layout: Layout,
    /// Encoded bytes (writes only).
    pub payload: Vec<u8>,
    /// Substitutions made while building.
    pub warnings: Vec<Warning>,
    /// Binding that receives read results.
    pub sink: Option<Arc<dyn Binding>>,
    /// Callback run after completion.
    pub on_complete: Option<OnComplete>,
    /// Delay before the callback.
    pub on_complete_delay: Option<Duration>,
    /// Whether the descriptor was logged.
    pub debug: bool,
    /// Text prepended to decoded values.
    pub prefix: Option<String>,
    /// Text appended to decoded values.
    pub suffix: Option<String>,
}

impl RequestDescriptor {
    /// Builds a descriptor.
    ///
    /// # Errors
    ///
    /// - `TameError::AddressResolution` if no address is given or it does
    ///   not resolve
    /// - `TameError::InvalidParameter` for a missing or empty structure
    ///   definition, an unknown array length, an out-of-range element
    ///   selection, or an explicit-item write
    pub fn build(
        method: Method,
        kind: RequestKind,
        options: RequestOptions,
        ctx: &BuildContext<'_>,
    ) -> Result<Self> {
        let RequestOptions {
            location,
            id,
            value,
            target,
            params,
            arr_len,
            item,
            definition,
            entries,
            debug,
            on_complete,
            on_complete_delay,
            prefix,
            suffix,
        } = options;

        let address = location
            .ok_or_else(|| TameError::address_resolution("no address given"))
            .and_then(|location| location.resolve())
            .inspect_err(|e| tracing::error!(error = %e, "request abandoned"))?;

        let mut warnings = Vec::new();
        let source = match method {
            Method::Write => value.or_else(|| target.as_ref().map(|t| t.get())),
            Method::Read => None,
        };
        let host_len = || match method {
            Method::Write => source.as_ref().and_then(Value::array_len),
            Method::Read => target.as_ref().and_then(|t| t.get().array_len()),
        };
        let element_count = || {
            arr_len.or_else(host_len).ok_or_else(|| {
                TameError::invalid_parameter(
                    "arrlen",
                    "no array length given and the host value is not an array",
                )
            })
        };

        let mut layout = match kind {
            RequestKind::Scalar(tag) => {
                Layout::scalar(leaf_type(tag, &params, ctx.max_string_len, &mut warnings)?)
            }
            RequestKind::Array(tag) => {
                let ty = leaf_type(tag, &params, ctx.max_string_len, &mut warnings)?;
                Layout::array(ty, element_count()?, item)?
            }
            RequestKind::Struct => {
                let def = definition_for(definition, ctx, &mut warnings)?;
                Layout::structure(&def, ctx.align4)?
            }
            RequestKind::ArrayOfStruct => {
                let def = definition_for(definition, ctx, &mut warnings)?;
                Layout::array_of_struct(&def, element_count()?, ctx.align4, item)?
            }
            RequestKind::Items => {
                if method == Method::Write {
                    return Err(TameError::invalid_parameter(
                        "items",
                        "independently addressed items can only be read",
                    ));
                }
                let mut resolved = Vec::with_capacity(entries.len());
                for (path, ty, offset) in entries {
                    let (ty, warning) = ty.normalized(ctx.max_string_len);
                    warnings.extend(warning);
                    resolved.push((path.parse::<ItemPath>()?, ty, offset));
                }
                Layout::explicit(address.offset(), resolved)?
            }
        };
        let address = address.advanced(layout.offset_shift)?;

        for warning in &warnings {
            tracing::warn!(%warning, "request parameter replaced");
        }

        let payload = match method {
            Method::Write => encode_payload(
                &mut layout,
                source.as_ref(),
                ctx.check_bounds,
                chrono::Local::now().naive_local(),
                &mut warnings,
            ),
            Method::Read => Vec::new(),
        };

        let descriptor = Self {
            method,
            address,
            channel: id,
            layout,
            payload,
            warnings,
            sink: target,
            on_complete,
            on_complete_delay,
            debug,
            prefix,
            suffix,
        };
        if debug {
            descriptor.log();
        }
        Ok(descriptor)
    }

    /// Payload length in bytes.
    pub fn byte_len(&self) -> usize {
        self.layout.byte_len
    }

    /// Builds the transport request for this descriptor.
    pub fn to_transport(&self, target: Target, token: u64) -> TransportRequest {
        TransportRequest {
            method: self.method,
            target,
            index_group: self.address.index_group(),
            index_offset: self.address.index_offset(),
            read_len: match self.method {
                Method::Read => self.byte_len(),
                Method::Write => 0,
            },
            payload: self.payload.clone(),
            token,
        }
    }

    #[cfg(feature = "serde")]
    fn log(&self) {
        #[derive(serde::Serialize)]
        struct Summary<'a> {
            method: Method,
            address: String,
            channel: Option<u32>,
            layout: &'a Layout,
            warnings: Vec<String>,
        }

        let summary = Summary {
            method: self.method,
            address: self.address.to_string(),
            channel: self.channel,
            layout: &self.layout,
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        };
        match serde_json::to_string(&summary) {
            Ok(json) => tracing::info!(descriptor = %json, "request descriptor"),
            Err(e) => tracing::info!(descriptor = ?self, error = %e, "request descriptor"),
        }
    }

    #[cfg(not(feature = "serde"))]
    fn log(&self) {
        tracing::info!(descriptor = ?self, "request descriptor");
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("address", &self.address.to_string())
            .field("channel", &self.channel)
            .field("byte_len", &self.layout.byte_len)
            .field("items", &self.layout.items.len())
            .field("addressing", &self.layout.addressing)
            .field("align4", &self.layout.align4)
            .field("warnings", &self.warnings.len())
            .field("has_sink", &self.sink.is_some())
            .field("has_on_complete", &self.on_complete.is_some())
            .field("on_complete_delay", &self.on_complete_delay)
            .finish()
    }
}

fn leaf_type(
    tag: TypeTag,
    params: &TypeParams,
    max_string_len: usize,
    warnings: &mut Vec<Warning>,
) -> Result<PlcType> {
    let (ty, warning) = PlcType::from_tag(tag, params, max_string_len).ok_or_else(|| {
        TameError::invalid_parameter("type", "STRUCT needs a structure request")
    })?;
    warnings.extend(warning);
    Ok(ty)
}

fn definition_for(
    source: Option<DefinitionSource>,
    ctx: &BuildContext<'_>,
    warnings: &mut Vec<Warning>,
) -> Result<StructDefinition> {
    let def = match source {
        Some(DefinitionSource::Inline(def)) => def,
        Some(DefinitionSource::Named(name)) => ctx
            .definitions
            .and_then(|defs| defs.get(&name))
            .cloned()
            .ok_or_else(|| {
                TameError::invalid_parameter("def", format!("no structure definition named `{name}`"))
            })?,
        None => {
            return Err(TameError::invalid_parameter(
                "def",
                "no structure definition given",
            ))
        }
    };
    let (def, found) = def.normalized(ctx.max_string_len);
    warnings.extend(found);
    Ok(def)
}

fn encode_payload(
    layout: &mut Layout,
    source: Option<&Value>,
    check_bounds: bool,
    now: NaiveDateTime,
    warnings: &mut Vec<Warning>,
) -> Vec<u8> {
    if source.is_none() {
        tracing::error!("no value and no target given for write, defaults used");
    }
    let mut payload = vec![0u8; layout.byte_len];
    for item in &mut layout.items {
        if !item.is_padding() {
            item.value = source.and_then(|s| s.get_path(&item.path)).cloned();
        }
        let ctx = EncodeContext::new(&item.path)
            .with_check_bounds(check_bounds)
            .with_now(now);
        let encoded = encode_item(&item.ty, item.value.as_ref(), &ctx);
        if let Some(dst) = payload.get_mut(item.offset..item.offset + encoded.bytes.len()) {
            dst.copy_from_slice(&encoded.bytes);
        }
        for warning in encoded.warnings {
            tracing::warn!(path = %item.path, %warning, "write value replaced");
            warnings.push(warning);
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Slot;
    use crate::layout::Addressing;

    fn build(method: Method, kind: RequestKind, options: RequestOptions) -> Result<RequestDescriptor> {
        RequestDescriptor::build(method, kind, options, &BuildContext::default())
    }

    #[test]
    fn test_scalar_write_payload() {
        let d = build(
            Method::Write,
            RequestKind::Scalar(TypeTag::Dint),
            RequestOptions::at("%MB8").with_value(-2),
        )
        .unwrap();
        assert_eq!(d.payload, vec![0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(d.address.index_offset(), 8);
        assert!(d.warnings.is_empty());
    }

    #[test]
    fn test_write_from_target_binding() {
        let slot = Arc::new(Slot::new(300));
        let d = build(
            Method::Write,
            RequestKind::Scalar(TypeTag::Byte),
            RequestOptions::parts("M", "0").with_target(slot),
        )
        .unwrap();
        assert_eq!(d.payload, vec![255]);
        assert_eq!(d.warnings.len(), 1);
    }

    #[test]
    fn test_missing_value_uses_default() {
        let d = build(
            Method::Write,
            RequestKind::Scalar(TypeTag::Int),
            RequestOptions::at("%MB0"),
        )
        .unwrap();
        assert_eq!(d.payload, vec![0, 0]);
        assert!(matches!(d.warnings[0], Warning::MissingValue { .. }));
    }

    #[test]
    fn test_read_item_selection_shifts_address() {
        let d = build(
            Method::Read,
            RequestKind::Array(TypeTag::Int),
            RequestOptions::at("%MB100").with_arr_len(5).with_item(2),
        )
        .unwrap();
        assert_eq!(d.address.index_offset(), 104);
        assert_eq!(d.layout.items.len(), 1);
        assert_eq!(d.byte_len(), 2);
    }

    #[test]
    fn test_array_length_from_read_target() {
        let slot = Arc::new(Slot::new(vec![0, 0, 0]));
        let d = build(
            Method::Read,
            RequestKind::Array(TypeTag::Word),
            RequestOptions::at("%MB0").with_target(slot),
        )
        .unwrap();
        assert_eq!(d.byte_len(), 6);
    }

    #[test]
    fn test_array_length_required() {
        let err = build(
            Method::Read,
            RequestKind::Array(TypeTag::Word),
            RequestOptions::at("%MB0"),
        )
        .unwrap_err();
        assert!(matches!(err, TameError::InvalidParameter { ref parameter, .. } if parameter == "arrlen"));
    }

    #[test]
    fn test_address_errors_abandon_request() {
        let err = build(
            Method::Read,
            RequestKind::Scalar(TypeTag::Int),
            RequestOptions::parts("Z", "1"),
        )
        .unwrap_err();
        assert!(matches!(err, TameError::AddressResolution { .. }));

        let err = build(
            Method::Read,
            RequestKind::Scalar(TypeTag::Int),
            RequestOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TameError::AddressResolution { .. }));
    }

    #[test]
    fn test_invalid_string_length_falls_back() {
        let d = build(
            Method::Read,
            RequestKind::Scalar(TypeTag::String),
            RequestOptions::at("%MB0").with_str_len(300),
        )
        .unwrap();
        assert_eq!(d.byte_len(), 81);
        assert!(matches!(d.warnings[0], Warning::InvalidStringLength { .. }));
    }

    #[test]
    fn test_struct_write_aligned() {
        let def = StructDefinition::new()
            .scalar("a", PlcType::Byte)
            .scalar("b", PlcType::Dint);
        let value: Value = [("a", Value::Int(1)), ("b", Value::Int(2))].into_iter().collect();
        let ctx = BuildContext {
            align4: true,
            ..BuildContext::default()
        };
        let d = RequestDescriptor::build(
            Method::Write,
            RequestKind::Struct,
            RequestOptions::at("%MB0")
                .with_definition(def)
                .with_value(value),
            &ctx,
        )
        .unwrap();
        assert_eq!(d.payload, vec![1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_named_definition() {
        let mut defs = BTreeMap::new();
        defs.insert(
            "motor".to_string(),
            StructDefinition::new().scalar("speed", PlcType::Int),
        );
        let ctx = BuildContext {
            definitions: Some(&defs),
            ..BuildContext::default()
        };
        let d = RequestDescriptor::build(
            Method::Read,
            RequestKind::Struct,
            RequestOptions::at("%MB0").with_definition_name("motor"),
            &ctx,
        )
        .unwrap();
        assert_eq!(d.byte_len(), 2);

        let err = RequestDescriptor::build(
            Method::Read,
            RequestKind::Struct,
            RequestOptions::at("%MB0").with_definition_name("pump"),
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, TameError::InvalidParameter { .. }));
    }

    #[test]
    fn test_explicit_items() {
        let d = build(
            Method::Read,
            RequestKind::Items,
            RequestOptions::at("%MB100")
                .with_entry("speed", PlcType::Int, 100)
                .with_entry("limits[1]", PlcType::Dint, 110),
        )
        .unwrap();
        assert_eq!(d.layout.addressing, Addressing::Explicit);
        assert_eq!(d.byte_len(), 14);

        assert!(build(
            Method::Write,
            RequestKind::Items,
            RequestOptions::at("%MB100").with_entry("speed", PlcType::Int, 100),
        )
        .is_err());
    }

    #[test]
    fn test_to_transport() {
        let d = build(
            Method::Read,
            RequestKind::Scalar(TypeTag::Real),
            RequestOptions::field(Field::Q, 12.0),
        )
        .unwrap();
        let target = Target {
            service_url: "http://plc/TcAdsWebService.dll".into(),
            ams_net_id: crate::net_id::AmsNetId::new([1, 2, 3, 4, 1, 1]),
            ams_port: 801,
        };
        let request = d.to_transport(target, 5);
        assert_eq!(request.index_group, Field::Q.index_group());
        assert_eq!(request.index_offset, 12);
        assert_eq!(request.read_len, 4);
        assert!(request.payload.is_empty());
        assert_eq!(request.token, 5);
    }
}
