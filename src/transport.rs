//! Transport seam between the engine and an ADS web service.
//!
//! The engine knows nothing about HTTP or SOAP. It hands a
//! [`TransportRequest`] (routing target, index group and offset, payload) to
//! a [`Transport`] and gets a [`TransportReply`] back. Every request carries
//! a correlation token that the reply must echo.
//!
//! [`LoopbackTransport`] is an in-memory controller image used by the tests
//! and the demo. Byte fields and their bit variants share one image: bit
//! offset `n` of `MX` is bit `n % 8` of byte `n / 8` of `M`.
//!
//! # Example
//!
//! ```
//! use tame_ads::{Client, ClientConfig, LoopbackTransport, RequestOptions, Value};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = Client::new(
//!     ClientConfig::new("http://192.168.1.10/TcAdsWebService/TcAdsWebService.dll", "192.168.1.10.1.1"),
//!     LoopbackTransport::new(),
//! )
//! .unwrap();
//!
//! client.write_int(RequestOptions::at("%MB0").with_value(-5)).await.unwrap();
//! let value = client.read_int(RequestOptions::at("%MB0")).await.unwrap();
//! assert_eq!(value.into_value(), Some(Value::Int(-5)));
//! # });
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::address::BITS_PER_BYTE;
use crate::error::{Result, TameError};
use crate::memory::Field;
use crate::net_id::AmsNetId;
use crate::payload;
use crate::request::Method;

/// Routing target of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// URL of the ADS web service.
    pub service_url: String,
    /// AMS Net ID of the controller.
    pub ams_net_id: AmsNetId,
    /// AMS port of the runtime system.
    pub ams_port: u16,
}

/// One ADS read or write handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// Read or write.
    pub method: Method,
    /// Routing target.
    pub target: Target,
    /// ADS index group.
    pub index_group: u32,
    /// ADS index offset.
    pub index_offset: u32,
    /// Number of bytes to read (reads only).
    pub read_len: usize,
    /// Bytes to write (writes only).
    pub payload: Vec<u8>,
    /// Correlation token the reply must echo.
    pub token: u64,
}

impl TransportRequest {
    /// Returns the write payload as Base64, as sent to the web service.
    pub fn payload_base64(&self) -> String {
        payload::encode_base64(&self.payload)
    }
}

/// Reply of the transport to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportReply {
    /// Bytes read from the controller.
    Data {
        /// Correlation token.
        token: u64,
        /// Raw bytes.
        payload: Vec<u8>,
    },
    /// A write was accepted.
    Ack {
        /// Correlation token.
        token: u64,
    },
    /// The service or controller reported an error.
    Fault {
        /// Correlation token.
        token: u64,
        /// Fault code.
        code: String,
        /// Fault text.
        text: String,
    },
}

impl TransportReply {
    /// Builds a data reply from the Base64 text returned by the web service.
    ///
    /// # Errors
    ///
    /// Returns `TameError::Decode` if the text is not valid Base64.
    pub fn data_from_base64(token: u64, text: &str) -> Result<Self> {
        Ok(TransportReply::Data {
            token,
            payload: payload::decode_base64(text)?,
        })
    }

    /// Returns the correlation token.
    pub fn token(&self) -> u64 {
        match self {
            TransportReply::Data { token, .. }
            | TransportReply::Ack { token }
            | TransportReply::Fault { token, .. } => *token,
        }
    }
}

/// Asynchronous request/reply exchange with an ADS web service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and waits for its reply.
    ///
    /// Transport failures (unreachable service, malformed envelope) are
    /// returned as errors; errors reported by the service are
    /// [`TransportReply::Fault`].
    async fn call(&self, request: TransportRequest) -> Result<TransportReply>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(&self, request: TransportRequest) -> Result<TransportReply> {
        (**self).call(request).await
    }
}

/// In-memory controller image.
///
/// Clones share the same image. A loopback can be *gated*: each call then
/// waits for a permit released with [`LoopbackTransport::release`], which
/// keeps requests in flight for as long as a test needs.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    image: Mutex<HashMap<Field, Vec<u8>>>,
    faults: Mutex<VecDeque<(String, String)>>,
    log: Mutex<Vec<TransportRequest>>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
}

impl LoopbackTransport {
    /// Creates an empty image that answers immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty image whose calls wait for [`release`](Self::release).
    pub fn gated() -> Self {
        Self {
            inner: Arc::new(Inner {
                gate: Some(Semaphore::new(0)),
                ..Inner::default()
            }),
        }
    }

    /// Lets `n` waiting or future calls complete (gated loopbacks only).
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.inner.gate {
            gate.add_permits(n);
        }
    }

    /// Makes the next call answer with a fault.
    pub fn inject_fault(&self, code: impl Into<String>, text: impl Into<String>) {
        self.inner.faults.lock().push_back((code.into(), text.into()));
    }

    /// Copies bytes into a byte field.
    pub fn poke(&self, field: Field, offset: usize, bytes: &[u8]) {
        let mut image = self.inner.image.lock();
        let region = image.entry(field.byte_variant()).or_default();
        store(region, offset, bytes);
    }

    /// Reads bytes from a byte field; unwritten memory reads as zero.
    pub fn peek(&self, field: Field, offset: usize, len: usize) -> Vec<u8> {
        let image = self.inner.image.lock();
        load(image.get(&field.byte_variant()), offset, len)
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.inner.log.lock().clone()
    }

    fn apply(&self, request: &TransportRequest) -> Result<TransportReply> {
        let field = Field::from_index_group(request.index_group).ok_or_else(|| {
            TameError::transport_fault(
                "1794",
                format!("invalid index group {}", request.index_group),
            )
        })?;
        let offset = request.index_offset as usize;
        let mut image = self.inner.image.lock();
        let region = image.entry(field.byte_variant()).or_default();

        match request.method {
            Method::Read => {
                let payload = if field.is_bit_addressed() {
                    (0..request.read_len)
                        .map(|i| u8::from(read_bit(region, offset + i)))
                        .collect()
                } else {
                    load(Some(region), offset, request.read_len)
                };
                Ok(TransportReply::Data {
                    token: request.token,
                    payload,
                })
            }
            Method::Write => {
                if field.is_bit_addressed() {
                    for (i, byte) in request.payload.iter().enumerate() {
                        write_bit(region, offset + i, *byte != 0);
                    }
                } else {
                    store(region, offset, &request.payload);
                }
                Ok(TransportReply::Ack {
                    token: request.token,
                })
            }
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn call(&self, request: TransportRequest) -> Result<TransportReply> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.log.lock().push(request.clone());

        if let Some(gate) = &self.inner.gate {
            gate.acquire()
                .await
                .map_err(|_| TameError::transport_fault("closed", "loopback gate closed"))?
                .forget();
        }

        let fault = self.inner.faults.lock().pop_front();
        if let Some((code, text)) = fault {
            return Ok(TransportReply::Fault {
                token: request.token,
                code,
                text,
            });
        }

        match self.apply(&request) {
            Ok(reply) => Ok(reply),
            Err(TameError::TransportFault { code, text }) => Ok(TransportReply::Fault {
                token: request.token,
                code,
                text,
            }),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("regions", &self.inner.image.lock().len())
            .field("gated", &self.inner.gate.is_some())
            .field("calls", &self.calls())
            .finish()
    }
}

fn store(region: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    let end = offset + bytes.len();
    if region.len() < end {
        region.resize(end, 0);
    }
    region[offset..end].copy_from_slice(bytes);
}

fn load(region: Option<&Vec<u8>>, offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0; len];
    if let Some(region) = region {
        if offset < region.len() {
            let available = (region.len() - offset).min(len);
            out[..available].copy_from_slice(&region[offset..offset + available]);
        }
    }
    out
}

fn read_bit(region: &[u8], bit: usize) -> bool {
    let bits = BITS_PER_BYTE as usize;
    region
        .get(bit / bits)
        .is_some_and(|byte| byte & (1 << (bit % bits)) != 0)
}

fn write_bit(region: &mut Vec<u8>, bit: usize, on: bool) {
    let bits = BITS_PER_BYTE as usize;
    let index = bit / bits;
    if region.len() <= index {
        region.resize(index + 1, 0);
    }
    let mask = 1 << (bit % bits);
    if on {
        region[index] |= mask;
    } else {
        region[index] &= !mask;
    }
}
