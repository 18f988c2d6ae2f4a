//! # Error Types
//!
//! Error handling for the Boson protocol.
//!
//! Errors are grouped the way they propagate:
//! - **FrameError**: length-prefix framing. `TooLarge` is connection-fatal,
//!   `Incomplete` only means "buffer more bytes" and never leaves the codec.
//! - **EncodingError**: the tagged value codec. Connection-fatal on inbound
//!   streams, fails the originating `invoke()` on outbound.
//! - **TransportError**: connection lifecycle.
//! - **CallError**: local to a single pending call.
//!
//! All of them convert into [`BosonError`] with `?`.
//!
//! ## Example Usage
//! ```rust
//! use boson_rpc::error::{BosonError, EncodingError, Result};
//!
//! fn check_tag(tag: u8) -> Result<()> {
//!     if tag > 0x0D {
//!         return Err(EncodingError::UnknownTag(tag).into());
//!     }
//!     Ok(())
//! }
//!
//! assert!(matches!(
//!     check_tag(0xFF),
//!     Err(BosonError::Encoding(EncodingError::UnknownTag(0xFF)))
//! ));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Codec errors
    pub const ERR_TRUNCATED: &str = "Input ended before the value was complete";
    pub const ERR_TRAILING_BYTES: &str = "Trailing bytes after the last parameter";
    pub const ERR_EMPTY_METHOD: &str = "Method name must not be empty";
    pub const ERR_INVALID_UTF8: &str = "String is not valid UTF-8";

    /// Runtime errors
    pub const ERR_NO_RUNTIME: &str = "No Tokio runtime available";
    pub const ERR_CONNECT_TIMEOUT: &str = "Connection attempt timed out";
}

/// Framing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },

    #[error("Incomplete frame: {needed} more bytes needed")]
    Incomplete { needed: usize },
}

/// Value codec failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Unknown value tag: 0x{0:02X}")]
    UnknownTag(u8),

    #[error("Size limit exceeded for {what}: {len} (max {max})")]
    SizeLimitExceeded {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Unresolved object reference: {0}")]
    UnresolvedReference(u32),

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Field access failed: {0}")]
    FieldAccess(String),
}

/// Connection lifecycle failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connect error: {0}")]
    ConnectError(String),

    #[error("Outbound buffer full ({0} frames)")]
    BufferFull(usize),
}

/// Failures scoped to a single call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Call timed out")]
    Timeout,

    #[error("Call cancelled")]
    Cancelled,

    #[error("Remote error: {0}")]
    Remote(String),
}

// BosonError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum BosonError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("No handler registered for method '{0}'")]
    NoHandler(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl BosonError {
    /// Whether this error means the inbound byte stream can no longer be trusted.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            BosonError::Io(_)
                | BosonError::Frame(FrameError::TooLarge { .. })
                | BosonError::Encoding(_)
                | BosonError::UnsupportedVersion(_)
        )
    }

    /// Shorthand for `TransportError::ConnectionClosed`.
    pub fn closed() -> Self {
        BosonError::Transport(TransportError::ConnectionClosed)
    }
}

/// Type alias for Results using BosonError
pub type Result<T> = std::result::Result<T, BosonError>;
