//! # Protocol Layer
//!
//! RPC semantics on top of the value codec.
//!
//! ## Components
//! - **Message**: envelope with version, kind, call id, method and parameters
//! - **Dispatcher**: exact-match routing of inbound messages to handlers
//! - **Queue**: pluggable hand-off between connection tasks and handlers
//!
//! ## Message Kinds
//! - `Request`: expects exactly one `Response` or `Error` with the same call id
//! - `OneWay`: never answered, never tracked
//! - `Response` / `Error`: resolve the caller's pending call

pub mod dispatcher;
pub mod message;
pub mod queue;
