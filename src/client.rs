//! High-level client driving the request lifecycle.
//!
//! This module provides the [`Client`] struct, the operation surface of the
//! crate. Each operation:
//!
//! 1. builds a [`RequestDescriptor`] (address, layout, encoded payload)
//! 2. passes the channel check: a request on a channel that still has one
//!    in flight is dropped
//! 3. sends exactly one [`TransportRequest`] and awaits the reply
//! 4. for reads, decodes the payload and stores the value in the target
//!    binding
//! 5. runs the completion callback, immediately or after a delay
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tame_ads::{Binding, Client, ClientConfig, LoopbackTransport, RequestOptions, Slot, Value};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = ClientConfig::new("http://192.168.1.10/TcAdsWebService/TcAdsWebService.dll", "192.168.1.10.1.1")
//!     .with_ams_port(801)
//!     .with_data_align4(true);
//! let client = Client::new(config, LoopbackTransport::new())?;
//!
//! client.write_real(RequestOptions::at("%MB20").with_value(21.5)).await?;
//!
//! let sink = Arc::new(Slot::empty());
//! client.read_real(RequestOptions::at("%MB20").with_target(sink.clone())).await?;
//! assert_eq!(sink.get(), Value::Real(21.5));
//! # Ok::<(), tame_ads::TameError>(())
//! # }).unwrap();
//! ```
//!
//! # Thread Safety
//!
//! The client is `Send + Sync`. Channel states live behind a mutex that is
//! never held across an await, so operations on different channels may run
//! concurrently and complete in any order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::channel::{Admission, ChannelState, ChannelTable, DEFAULT_MAX_DROP_REQUESTS};
use crate::codec::DecodeContext;
use crate::error::{Result, TameError};
use crate::format::Language;
use crate::layout::StructDefinition;
use crate::net_id::{AmsNetId, AMS_PORT_RANGE, DEFAULT_AMS_PORT};
use crate::request::{
    BuildContext, Method, OnComplete, RequestDescriptor, RequestKind, RequestOptions,
};
use crate::response::{decode_payload, Decoration};
use crate::transport::{Target, Transport, TransportReply, TransportRequest};
use crate::types::{TypeTag, DEFAULT_MAX_STRING_LEN};
use crate::value::Value;

/// Configuration for creating a client.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
    /// URL of the ADS web service.
    pub service_url: String,
    /// AMS Net ID of the controller, e.g. `"192.168.1.10.1.1"`.
    pub ams_net_id: String,
    /// AMS port of the runtime system (801-804).
    pub ams_port: u16,
    /// Align structure members to 4 bytes (ARM based controllers).
    pub data_align4: bool,
    /// Drops tolerated on a busy channel before it is reset.
    pub max_drop_requests: u32,
    /// Enforce numeric bounds on write.
    pub check_bounds: bool,
    /// Upper limit for STRING lengths.
    pub max_string_len: usize,
    /// Language of weekday and month names.
    pub language: Language,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            ams_net_id: String::new(),
            ams_port: DEFAULT_AMS_PORT,
            data_align4: false,
            max_drop_requests: DEFAULT_MAX_DROP_REQUESTS,
            check_bounds: true,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            language: Language::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with the required routing parameters.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::ClientConfig;
    ///
    /// let config = ClientConfig::new("http://plc/TcAdsWebService/TcAdsWebService.dll", "5.1.204.160.1.1");
    /// assert_eq!(config.ams_port, 801);
    /// assert_eq!(config.max_drop_requests, 10);
    /// ```
    pub fn new(service_url: impl Into<String>, ams_net_id: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            ams_net_id: ams_net_id.into(),
            ..Self::default()
        }
    }

    /// Sets the AMS port (default is 801).
    pub fn with_ams_port(mut self, port: u16) -> Self {
        self.ams_port = port;
        self
    }

    /// Enables 4-byte alignment of structure members.
    pub fn with_data_align4(mut self, enabled: bool) -> Self {
        self.data_align4 = enabled;
        self
    }

    /// Sets how many requests a busy channel drops before it is reset
    /// (default is 10).
    pub fn with_max_drop_requests(mut self, max: u32) -> Self {
        self.max_drop_requests = max;
        self
    }

    /// Enables or disables numeric bounds on write (default is on).
    pub fn with_check_bounds(mut self, enabled: bool) -> Self {
        self.check_bounds = enabled;
        self
    }

    /// Sets the upper limit for STRING lengths (default is 255).
    pub fn with_max_string_len(mut self, len: usize) -> Self {
        self.max_string_len = len;
        self
    }

    /// Sets the language of weekday and month names (default is German).
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Checks the configuration and returns the parsed routing target.
    ///
    /// # Errors
    ///
    /// Returns `TameError::Configuration` for an empty service URL, a
    /// malformed AMS Net ID or an AMS port outside 801-804.
    pub fn target(&self) -> Result<Target> {
        if self.service_url.trim().is_empty() {
            return Err(TameError::configuration("no service URL given"));
        }
        let ams_net_id: AmsNetId = self.ams_net_id.parse()?;
        if !AMS_PORT_RANGE.contains(&self.ams_port) {
            return Err(TameError::configuration(format!(
                "AMS port {} out of range ({}-{})",
                self.ams_port,
                AMS_PORT_RANGE.start(),
                AMS_PORT_RANGE.end()
            )));
        }
        Ok(Target {
            service_url: self.service_url.clone(),
            ams_net_id,
            ams_port: self.ams_port,
        })
    }
}

/// Outcome of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The channel had a request in flight; nothing was sent.
    Dropped {
        /// Channel id.
        channel: u32,
        /// Drop count after this request.
        drops: u32,
    },
    /// The write was acknowledged.
    Written,
    /// The decoded value (also stored in the target binding, if any).
    Read(Value),
}

impl Completion {
    /// Returns the read value, if this is a completed read.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Completion::Read(value) => Some(value),
            _ => None,
        }
    }

    /// Returns whether the request was dropped.
    pub fn is_dropped(&self) -> bool {
        matches!(self, Completion::Dropped { .. })
    }
}

macro_rules! typed_operations {
    ($($tag:ident: $read:ident, $write:ident, $read_array:ident, $write_array:ident;)*) => {
        $(
            #[doc = concat!("Reads one ", stringify!($tag), " value.")]
            pub async fn $read(&self, options: RequestOptions) -> Result<Completion> {
                self.read(RequestKind::Scalar(TypeTag::$tag), options).await
            }

            #[doc = concat!("Writes one ", stringify!($tag), " value.")]
            pub async fn $write(&self, options: RequestOptions) -> Result<Completion> {
                self.write(RequestKind::Scalar(TypeTag::$tag), options).await
            }

            #[doc = concat!("Reads an array of ", stringify!($tag), " values.")]
            pub async fn $read_array(&self, options: RequestOptions) -> Result<Completion> {
                self.read(RequestKind::Array(TypeTag::$tag), options).await
            }

            #[doc = concat!("Writes an array of ", stringify!($tag), " values.")]
            pub async fn $write_array(&self, options: RequestOptions) -> Result<Completion> {
                self.write(RequestKind::Array(TypeTag::$tag), options).await
            }
        )*
    };
}

/// ADS client bound to one controller.
///
/// Generic over the [`Transport`] so that the web service binding, a test
/// double or the [`LoopbackTransport`](crate::LoopbackTransport) can be
/// plugged in.
pub struct Client<T> {
    transport: T,
    target: Target,
    config: ClientConfig,
    channels: Mutex<ChannelTable>,
    definitions: RwLock<BTreeMap<String, StructDefinition>>,
    token_counter: AtomicU64,
}

impl<T: Transport> Client<T> {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `TameError::Configuration` if the configuration is invalid.
    pub fn new(config: ClientConfig, transport: T) -> Result<Self> {
        let target = config.target()?;
        tracing::debug!(
            url = %target.service_url,
            net_id = %target.ams_net_id,
            port = target.ams_port,
            "client created"
        );
        Ok(Self {
            transport,
            target,
            channels: Mutex::new(ChannelTable::new(config.max_drop_requests)),
            definitions: RwLock::new(BTreeMap::new()),
            token_counter: AtomicU64::new(0),
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the routing target.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the state of a deduplication channel.
    pub fn channel_state(&self, channel: u32) -> ChannelState {
        self.channels.lock().state(channel)
    }

    /// Registers a structure definition usable through
    /// [`RequestOptions::with_definition_name`].
    pub fn register_definition(&self, name: impl Into<String>, def: StructDefinition) {
        self.definitions.write().insert(name.into(), def);
    }

    /// Builds a descriptor with this client's settings.
    ///
    /// # Errors
    ///
    /// See [`RequestDescriptor::build`].
    pub fn prepare(
        &self,
        method: Method,
        kind: RequestKind,
        options: RequestOptions,
    ) -> Result<RequestDescriptor> {
        let definitions = self.definitions.read();
        let ctx = BuildContext {
            align4: self.config.data_align4,
            check_bounds: self.config.check_bounds,
            max_string_len: self.config.max_string_len,
            definitions: Some(&*definitions),
        };
        RequestDescriptor::build(method, kind, options, &ctx)
    }

    /// Reads a value of any kind.
    ///
    /// # Errors
    ///
    /// Returns the build, transport or decode error of the request.
    pub async fn read(&self, kind: RequestKind, options: RequestOptions) -> Result<Completion> {
        let descriptor = self.prepare(Method::Read, kind, options)?;
        self.execute(descriptor).await
    }

    /// Writes a value of any kind.
    ///
    /// # Errors
    ///
    /// Returns the build or transport error of the request.
    pub async fn write(&self, kind: RequestKind, options: RequestOptions) -> Result<Completion> {
        let descriptor = self.prepare(Method::Write, kind, options)?;
        self.execute(descriptor).await
    }

    typed_operations! {
        Bool: read_bool, write_bool, read_array_of_bool, write_array_of_bool;
        Byte: read_byte, write_byte, read_array_of_byte, write_array_of_byte;
        Usint: read_usint, write_usint, read_array_of_usint, write_array_of_usint;
        Sint: read_sint, write_sint, read_array_of_sint, write_array_of_sint;
        Word: read_word, write_word, read_array_of_word, write_array_of_word;
        Uint: read_uint, write_uint, read_array_of_uint, write_array_of_uint;
        Int: read_int, write_int, read_array_of_int, write_array_of_int;
        Int1Dp: read_int1dp, write_int1dp, read_array_of_int1dp, write_array_of_int1dp;
        Dword: read_dword, write_dword, read_array_of_dword, write_array_of_dword;
        Udint: read_udint, write_udint, read_array_of_udint, write_array_of_udint;
        Dint: read_dint, write_dint, read_array_of_dint, write_array_of_dint;
        Real: read_real, write_real, read_array_of_real, write_array_of_real;
        Lreal: read_lreal, write_lreal, read_array_of_lreal, write_array_of_lreal;
        String: read_string, write_string, read_array_of_string, write_array_of_string;
        Time: read_time, write_time, read_array_of_time, write_array_of_time;
        Tod: read_tod, write_tod, read_array_of_tod, write_array_of_tod;
        Date: read_date, write_date, read_array_of_date, write_array_of_date;
        Dt: read_dt, write_dt, read_array_of_dt, write_array_of_dt;
    }

    /// Reads one structure.
    pub async fn read_struct(&self, options: RequestOptions) -> Result<Completion> {
        self.read(RequestKind::Struct, options).await
    }

    /// Writes one structure.
    pub async fn write_struct(&self, options: RequestOptions) -> Result<Completion> {
        self.write(RequestKind::Struct, options).await
    }

    /// Reads an array of structures.
    pub async fn read_array_of_struct(&self, options: RequestOptions) -> Result<Completion> {
        self.read(RequestKind::ArrayOfStruct, options).await
    }

    /// Writes an array of structures.
    pub async fn write_array_of_struct(&self, options: RequestOptions) -> Result<Completion> {
        self.write(RequestKind::ArrayOfStruct, options).await
    }

    /// Reads independently addressed items in one request.
    ///
    /// # Example
    ///
    /// ```
    /// use tame_ads::{Client, ClientConfig, Field, LoopbackTransport, PlcType, RequestOptions, Value};
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let loopback = LoopbackTransport::new();
    /// loopback.poke(Field::M, 100, &[0x2A, 0x00]);
    /// loopback.poke(Field::M, 108, &[0x07]);
    ///
    /// let client = Client::new(ClientConfig::new("http://plc", "1.2.3.4.1.1"), loopback).unwrap();
    /// let value = client
    ///     .read_items(
    ///         RequestOptions::at("%MB100")
    ///             .with_entry("speed", PlcType::Int, 100)
    ///             .with_entry("mode", PlcType::Byte, 108),
    ///     )
    ///     .await
    ///     .unwrap()
    ///     .into_value()
    ///     .unwrap();
    /// assert_eq!(value.get_path(&"mode".parse().unwrap()), Some(&Value::Int(7)));
    /// # });
    /// ```
    pub async fn read_items(&self, options: RequestOptions) -> Result<Completion> {
        self.read(RequestKind::Items, options).await
    }

    /// Runs a prepared descriptor through the request lifecycle.
    ///
    /// # Errors
    ///
    /// - transport errors as returned by the [`Transport`]
    /// - `TameError::CorrelationMismatch` if the reply token differs
    /// - `TameError::TransportFault` for a fault reply
    /// - `TameError::Decode` if a read reply is too short
    ///
    /// The completion callback runs only when `Ok` is returned, a dropped
    /// request excepted. An admitted channel is released on every outcome,
    /// including cancellation of the returned future.
    pub async fn execute(&self, mut descriptor: RequestDescriptor) -> Result<Completion> {
        if let Some(channel) = descriptor.channel {
            if let Admission::Dropped { drops } = self.channels.lock().admit(channel) {
                tracing::warn!(channel, drops, "request dropped, channel busy");
                return Ok(Completion::Dropped { channel, drops });
            }
        }
        let in_flight = InFlight {
            channels: &self.channels,
            channel: descriptor.channel,
        };

        let token = self.next_token();
        let request = descriptor.to_transport(self.target.clone(), token);
        let result = self.dispatch(request).await;
        drop(in_flight);

        let reply = result?;
        if reply.token() != token {
            let err = TameError::correlation_mismatch(token, reply.token());
            tracing::error!(error = %err, "reply rejected");
            return Err(err);
        }

        let completion = match reply {
            TransportReply::Fault { code, text, .. } => {
                tracing::error!(%code, %text, address = %descriptor.address, "controller reported a fault");
                return Err(TameError::transport_fault(code, text));
            }
            TransportReply::Data { payload, .. } if descriptor.method == Method::Read => {
                Completion::Read(self.store(&mut descriptor, &payload)?)
            }
            TransportReply::Ack { .. } if descriptor.method == Method::Read => {
                let err = TameError::decode("read answered without data");
                tracing::error!(error = %err, address = %descriptor.address, "decode failed");
                return Err(err);
            }
            TransportReply::Data { .. } | TransportReply::Ack { .. } => Completion::Written,
        };

        tracing::debug!(token, address = %descriptor.address, "request completed");
        run_callback(descriptor.on_complete.take(), descriptor.on_complete_delay);
        Ok(completion)
    }

    fn next_token(&self) -> u64 {
        self.token_counter.fetch_add(1, Ordering::Relaxed)
    }

    async fn dispatch(&self, request: TransportRequest) -> Result<TransportReply> {
        tracing::debug!(
            method = %request.method,
            group = request.index_group,
            offset = request.index_offset,
            read_len = request.read_len,
            write_len = request.payload.len(),
            token = request.token,
            "dispatching request"
        );
        self.transport
            .call(request)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "transport failed"))
    }

    fn store(&self, descriptor: &mut RequestDescriptor, payload: &[u8]) -> Result<Value> {
        let base = descriptor
            .sink
            .as_ref()
            .map(|sink| sink.get())
            .unwrap_or_default();
        let decoration = Decoration::new(descriptor.prefix.take(), descriptor.suffix.take());
        let ctx = DecodeContext {
            language: self.config.language,
        };
        let value = decode_payload(&descriptor.layout, payload, base, &ctx, &decoration)
            .inspect_err(|e| tracing::error!(error = %e, address = %descriptor.address, "decode failed"))?;
        if let Some(sink) = &descriptor.sink {
            sink.set(value.clone());
        }
        Ok(value)
    }
}

/// Returns an admitted channel to idle when dropped, also when the
/// operation's future is cancelled before the reply arrives.
struct InFlight<'a> {
    channels: &'a Mutex<ChannelTable>,
    channel: Option<u32>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel {
            self.channels.lock().acknowledge(channel);
        }
    }
}

fn run_callback(callback: Option<OnComplete>, delay: Option<Duration>) {
    let Some(callback) = callback else {
        return;
    };
    match delay.filter(|d| !d.is_zero()) {
        Some(delay) => match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    callback();
                });
            }
            Err(_) => {
                tracing::warn!("no async runtime for a delayed callback, running it now");
                callback();
            }
        },
        None => callback(),
    }
}

impl<T: fmt::Debug> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("target", &self.target)
            .field("data_align4", &self.config.data_align4)
            .field("definitions", &self.definitions.read().len())
            .field("token_counter", &self.token_counter.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Binding, Slot};
    use crate::memory::Field;
    use crate::transport::LoopbackTransport;
    use crate::types::PlcType;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn config() -> ClientConfig {
        ClientConfig::new("http://192.168.1.10/TcAdsWebService/TcAdsWebService.dll", "192.168.1.10.1.1")
    }

    fn client() -> Client<LoopbackTransport> {
        Client::new(config(), LoopbackTransport::new()).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = config();
        assert_eq!(config.ams_port, 801);
        assert!(!config.data_align4);
        assert_eq!(config.max_drop_requests, 10);
        assert!(config.check_bounds);
        assert_eq!(config.max_string_len, 255);
        assert_eq!(config.language, Language::German);
    }

    #[test]
    fn test_config_builder() {
        let config = config()
            .with_ams_port(802)
            .with_data_align4(true)
            .with_max_drop_requests(3)
            .with_check_bounds(false)
            .with_max_string_len(100)
            .with_language(Language::English);
        assert_eq!(config.ams_port, 802);
        assert!(config.data_align4);
        assert_eq!(config.max_drop_requests, 3);
        assert!(!config.check_bounds);
        assert_eq!(config.max_string_len, 100);
        assert_eq!(config.language, Language::English);
    }

    #[test]
    fn test_config_validation() {
        assert!(config().target().is_ok());
        assert!(matches!(
            ClientConfig::new("", "1.2.3.4.1.1").target(),
            Err(TameError::Configuration { .. })
        ));
        assert!(matches!(
            ClientConfig::new("http://plc", "1.2.3.4").target(),
            Err(TameError::Configuration { .. })
        ));
        assert!(matches!(
            config().with_ams_port(805).target(),
            Err(TameError::Configuration { .. })
        ));
        assert!(Client::new(config().with_ams_port(800), LoopbackTransport::new()).is_err());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let client = client();
        let completion = client
            .write_dint(RequestOptions::at("%MB4").with_value(-123456))
            .await
            .unwrap();
        assert_eq!(completion, Completion::Written);

        let value = client
            .read_dint(RequestOptions::at("%MB4"))
            .await
            .unwrap()
            .into_value();
        assert_eq!(value, Some(Value::Int(-123456)));
    }

    #[tokio::test]
    async fn test_read_stores_into_target() {
        let client = client();
        client.transport().poke(Field::M, 0, &[0x34, 0x12]);
        let sink = Arc::new(Slot::empty());
        client
            .read_word(RequestOptions::at("%MB0").with_target(sink.clone()))
            .await
            .unwrap();
        assert_eq!(sink.get(), Value::Int(0x1234));
    }

    #[tokio::test]
    async fn test_fault_acknowledges_channel() {
        let client = client();
        client.transport().inject_fault("1861", "timeout elapsed");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let err = client
            .read_int(
                RequestOptions::at("%MB0")
                    .with_id(3)
                    .with_on_complete(move || flag.store(true, Ordering::SeqCst)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TameError::TransportFault { .. }));
        assert_eq!(client.channel_state(3), ChannelState::Idle);
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_callback_runs_after_completion() {
        let client = client();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        client
            .write_bool(
                RequestOptions::at("%MX0.1")
                    .with_value(true)
                    .with_on_complete(move || flag.store(true, Ordering::SeqCst)),
            )
            .await
            .unwrap();
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(client.transport().peek(Field::M, 0, 1), vec![0b10]);
    }

    #[tokio::test]
    async fn test_registered_definition() {
        let client = client();
        client.register_definition(
            "motor",
            StructDefinition::new()
                .scalar("speed", PlcType::Int)
                .scalar("on", PlcType::Bool),
        );
        let value: Value = [("speed", Value::Int(1500)), ("on", Value::Bool(true))]
            .into_iter()
            .collect();
        client
            .write_struct(
                RequestOptions::at("%MB10")
                    .with_definition_name("motor")
                    .with_value(value.clone()),
            )
            .await
            .unwrap();
        let read = client
            .read_struct(RequestOptions::at("%MB10").with_definition_name("motor"))
            .await
            .unwrap()
            .into_value();
        assert_eq!(read, Some(value));
    }

    #[test]
    fn test_client_debug() {
        let debug_str = format!("{:?}", client());
        assert!(debug_str.contains("Client"));
        assert!(debug_str.contains("LoopbackTransport"));
    }
}
