//! # Boson RPC
//!
//! A binary RPC protocol for request/response and one-way calls over a
//! persistent connection.
//!
//! ## Features
//! - Length-prefixed framing with a hard size limit checked before buffering
//! - Tagged value codec with identity-preserving, cyclic object graphs
//! - Pluggable field access through mutators instead of runtime reflection
//! - Asynchronous call correlation with per-call timeouts
//! - Pooled or inline dispatch of inbound messages
//!
//! ## Layers
//! - [`core`]: frames, values, object heap, mutators, value codec
//! - [`protocol`]: message envelope, dispatcher, queueing strategies
//! - [`service`]: connections, pending calls, client and server
//! - [`transport`]: stream connectors and acceptors (TCP, Unix sockets)
//! - [`utils`]: logging, metrics, timeouts
//!
//! ## Quick Start
//! ```rust,no_run
//! use boson_rpc::prelude::*;
//!
//! # async fn demo() -> Result<()> {
//! let server = ServerBuilder::new().build()?;
//! server.register("echo", |_ctx, msg| Ok(Some(msg.payload.clone())))?;
//! tokio::spawn(async move { server.bind_and_serve().await });
//!
//! let client = ClientBuilder::new().connect_tcp()?;
//! let reply = client.call("echo", Payload::from_values([Value::I64(7)])).await?;
//! assert_eq!(reply.first(), Some(&Value::I64(7)));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::{BosonConfig, PROTOCOL_VERSION};
pub use crate::error::{BosonError, Result};

/// Common imports for applications.
pub mod prelude {
    pub use crate::config::{BosonConfig, CodecConfig, DispatchConfig, StrategyKind};
    pub use crate::core::heap::{Heap, Record};
    pub use crate::core::mutator::{MutatorRegistry, TypedMutator};
    pub use crate::core::value::{ObjectId, Value};
    pub use crate::error::{BosonError, CallError, Result};
    pub use crate::protocol::message::{Message, Payload};
    pub use crate::service::client::{BosonClient, ClientBuilder};
    pub use crate::service::connection::{CallOptions, ConnectionContext};
    pub use crate::service::server::{BosonServer, ServerBuilder};
}
