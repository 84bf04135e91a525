//! # TwinCAT ADS Marshaling Engine
//!
//! A client-side library that turns typed host values into the byte layouts
//! of a Beckhoff TwinCAT controller and back, for reads and writes through
//! an ADS web service.
//!
//! This is a **marshaling** library: it builds and interprets payloads and
//! drives one request/reply exchange per operation. The wire transport
//! (HTTP/SOAP) is plugged in through the [`Transport`] trait. No polling,
//! retries or caching.
//!
//! ## Features
//!
//! - **18 controller types**: BOOL to LREAL, STRING, TIME, TOD, DATE, DT
//!   and the INT1DP fixed-point convention
//! - **Structures**: ordered member definitions, arrays of structures and
//!   optional 4-byte alignment for ARM based controllers
//! - **Warnings, not failures**: out-of-range values are clamped and
//!   reported as [`Warning`]s
//! - **Per-channel deduplication**: a busy channel drops new requests until
//!   its reply arrives
//! - **Own IEEE-754 packing**: REAL/LREAL bit patterns are built with integer
//!   arithmetic ([`ieee754`])
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tame_ads::{
//!     Binding, Client, ClientConfig, HostStore, LoopbackTransport, PlcType, RequestOptions,
//!     StructDefinition, Value,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = ClientConfig::new(
//!     "http://192.168.1.10/TcAdsWebService/TcAdsWebService.dll",
//!     "192.168.1.10.1.1",
//! )
//! .with_data_align4(true);
//! let client = Client::new(config, LoopbackTransport::new())?;
//!
//! // Scalars and arrays
//! client.write_int(RequestOptions::at("%MB0").with_value(-42)).await?;
//! client
//!     .write_array_of_real(RequestOptions::at("%MB4").with_value(vec![1.5, 2.5]))
//!     .await?;
//!
//! // Structures, bound to a host value tree
//! let store = HostStore::new();
//! let motor = Arc::new(store.bind("line.motor")?);
//! let def = StructDefinition::new()
//!     .scalar("on", PlcType::Bool)
//!     .scalar("speed", PlcType::Dint);
//! motor.set([("on", Value::Bool(true)), ("speed", Value::Int(1500))].into_iter().collect());
//!
//! client
//!     .write_struct(RequestOptions::at("%MB100").with_definition(def.clone()).with_target(motor.clone()))
//!     .await?;
//! client
//!     .read_struct(RequestOptions::at("%MB100").with_definition(def).with_target(motor.clone()))
//!     .await?;
//! assert_eq!(
//!     store.bind("line.motor.speed")?.get(),
//!     Value::Int(1500)
//! );
//! # Ok::<(), tame_ads::TameError>(())
//! # }).unwrap();
//! ```
//!
//! ## Addressing
//!
//! | Field | Index group | Offset unit | Compact notation |
//! |-------|------------:|-------------|------------------|
//! | [`Field::M`]  | 16416 | byte | `%MB100`, `%MW100`, `%MD100` |
//! | [`Field::MX`] | 16417 | bit  | `%MX3.5` |
//! | [`Field::I`]  | 61472 | byte | `%IB0` |
//! | [`Field::IX`] | 61473 | bit  | `%IX0.0` |
//! | [`Field::Q`]  | 61488 | byte | `%QB0` |
//! | [`Field::QX`] | 61489 | bit  | `%QX1.7` |
//!
//! ## Error Handling
//!
//! Operations return [`Result<T, TameError>`](Result). Write values that
//! cannot be represented never fail a request; they end up in
//! [`RequestDescriptor::warnings`](request::RequestDescriptor) and in the
//! log.
//!
//! ```
//! use tame_ads::{Client, ClientConfig, LoopbackTransport, RequestOptions, TameError};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = Client::new(ClientConfig::new("http://plc", "1.2.3.4.1.1"), LoopbackTransport::new()).unwrap();
//!
//! match client.read_int(RequestOptions::parts("ZB", "1")).await {
//!     Err(TameError::AddressResolution { reason }) => println!("bad address: {reason}"),
//!     Err(e) => println!("error: {e}"),
//!     Ok(completion) => println!("{completion:?}"),
//! }
//! # });
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: warnings for replaced values and
//! dropped requests, errors for address, transport and decode failures,
//! debug events per dispatch. Installing a subscriber is up to the
//! application.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod address;
mod binding;
pub mod bounds;
pub mod channel;
mod client;
pub mod codec;
mod error;
pub mod format;
pub mod ieee754;
mod layout;
mod memory;
mod net_id;
pub mod payload;
pub mod request;
pub mod response;
mod transport;
mod types;
mod value;

// Public re-exports
pub use address::{FieldAddress, BITS_PER_BYTE};
pub use binding::{Binding, HostStore, PathBinding, Slot};
pub use channel::{Admission, ChannelState, ChannelTable, DEFAULT_MAX_DROP_REQUESTS};
pub use client::{Client, ClientConfig, Completion};
pub use error::{Result, TameError, Warning};
pub use format::Language;
pub use layout::{Addressing, Item, Layout, Shape, StructDefinition, StructMember};
pub use memory::Field;
pub use net_id::{AmsNetId, AMS_PORT_RANGE, DEFAULT_AMS_PORT};
pub use request::{Method, RequestDescriptor, RequestKind, RequestOptions};
pub use transport::{LoopbackTransport, Target, Transport, TransportReply, TransportRequest};
pub use types::{PlcType, TypeParams, TypeTag, DEFAULT_MAX_STRING_LEN, DEFAULT_STRING_LEN};
pub use value::{ItemPath, PathSegment, Value};
