//! # Service Layer
//!
//! Connection lifecycle, outbound buffering and response correlation.
//!
//! ## Components
//! - **Connection**: per-connection context and its reader/writer tasks
//! - **Pending**: table of calls awaiting a response
//! - **Client**: `ClientBuilder` / `BosonClient`
//! - **Server**: `ServerBuilder` / `BosonServer`

pub mod client;
pub mod connection;
pub mod pending;
pub mod server;
