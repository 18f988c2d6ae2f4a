//! # Core Protocol Components
//!
//! Framing, the value model and the binary value codec.
//!
//! ## Components
//! - **Frame / Codec**: length-prefixed frames and their Tokio codec
//! - **Value / Heap**: tagged values and the per-message object arena
//! - **Mutator**: field access for heap objects, resolved through a frozen registry
//! - **Encoding**: the identity-preserving value codec
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [Payload(Length)]
//! ```
//!
//! ## Security
//! - Frame length is validated before the payload is buffered
//! - Every variable-length value is bounded by `CodecConfig`
//! - Object references must point at an already-decoded object

pub mod codec;
pub mod encoding;
pub mod frame;
pub mod heap;
pub mod mutator;
pub mod value;
