//! # Message Envelope
//!
//! The RPC structure carried inside one frame payload:
//!
//! ```text
//! [Version(1)] [Kind(1)] [CallId(8)] [MethodLen(4)] [Method] [ParamCount(4)] [Value..]
//! ```
//!
//! `Error` is a response whose first parameter is a message string; it resolves
//! the caller's pending call with `CallError::Remote`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::PROTOCOL_VERSION;
use crate::core::encoding::{Reader, ValueCodec};
use crate::core::heap::Heap;
use crate::core::value::Value;
use crate::error::constants::ERR_EMPTY_METHOD;
use crate::error::{BosonError, EncodingError, FrameError, Result};

/// Message direction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request = 0,
    Response = 1,
    OneWay = 2,
    Error = 3,
}

impl TryFrom<u8> for MessageKind {
    type Error = EncodingError;

    fn try_from(byte: u8) -> std::result::Result<Self, EncodingError> {
        match byte {
            0 => Ok(MessageKind::Request),
            1 => Ok(MessageKind::Response),
            2 => Ok(MessageKind::OneWay),
            3 => Ok(MessageKind::Error),
            other => Err(EncodingError::InvalidEncoding(format!(
                "unknown message kind {other}"
            ))),
        }
    }
}

impl MessageKind {
    /// Whether this message answers an earlier request.
    pub fn is_reply(self) -> bool {
        matches!(self, MessageKind::Response | MessageKind::Error)
    }
}

/// Parameters of one message together with the objects they reference.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub values: Vec<Value>,
    pub heap: Heap,
}

impl Payload {
    pub fn new(values: Vec<Value>, heap: Heap) -> Self {
        Self { values, heap }
    }

    /// Scalar-only parameters with an empty heap.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            values: values.into_iter().collect(),
            heap: Heap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Payload {
    fn from(values: Vec<Value>) -> Self {
        Self::from_values(values)
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub version: u8,
    pub kind: MessageKind,
    pub call_id: u64,
    pub method: String,
    pub payload: Payload,
}

impl Message {
    pub fn new(kind: MessageKind, call_id: u64, method: impl Into<String>, payload: Payload) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind,
            call_id,
            method: method.into(),
            payload,
        }
    }

    pub fn request(call_id: u64, method: impl Into<String>, payload: Payload) -> Self {
        Self::new(MessageKind::Request, call_id, method, payload)
    }

    pub fn one_way(call_id: u64, method: impl Into<String>, payload: Payload) -> Self {
        Self::new(MessageKind::OneWay, call_id, method, payload)
    }

    /// Reply to `request`, echoing its call id and method.
    pub fn response_to(request: &Message, payload: Payload) -> Self {
        Self::new(MessageKind::Response, request.call_id, request.method.clone(), payload)
    }

    pub fn error_to(request: &Message, reason: impl Into<String>) -> Self {
        let payload = Payload::from_values([Value::Str(reason.into())]);
        Self::new(MessageKind::Error, request.call_id, request.method.clone(), payload)
    }

    /// Human-readable reason carried by an `Error` message.
    pub fn error_reason(&self) -> String {
        self.payload
            .first()
            .and_then(Value::as_str)
            .unwrap_or("remote error")
            .to_owned()
    }

    /// Encode into a complete frame payload.
    ///
    /// The whole message is buffered first, so a failure never leaves partial
    /// bytes behind. The result is checked against the frame limit here rather
    /// than at write time.
    pub fn encode(&self, codec: &ValueCodec) -> Result<Bytes> {
        if self.method.is_empty() {
            return Err(EncodingError::InvalidEncoding(ERR_EMPTY_METHOD.to_string()).into());
        }
        let limits = codec.limits();
        if self.method.len() > limits.max_string_len {
            return Err(EncodingError::SizeLimitExceeded {
                what: "method name",
                len: self.method.len(),
                max: limits.max_string_len,
            }
            .into());
        }

        let mut dst = BytesMut::with_capacity(64);
        dst.put_u8(self.version);
        dst.put_u8(self.kind as u8);
        dst.put_u64(self.call_id);
        dst.put_u32(self.method.len() as u32);
        dst.put_slice(self.method.as_bytes());
        codec.encode_params(&self.payload.values, &self.payload.heap, &mut dst)?;

        if dst.len() > limits.max_frame_size {
            return Err(FrameError::TooLarge {
                len: dst.len(),
                max: limits.max_frame_size,
            }
            .into());
        }
        Ok(dst.freeze())
    }

    /// Decode one frame payload.
    pub fn decode(input: &[u8], codec: &ValueCodec) -> Result<Self> {
        let mut reader = Reader::new(input);
        let version = reader.read_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(BosonError::UnsupportedVersion(version));
        }
        let kind = MessageKind::try_from(reader.read_u8()?)?;
        let call_id = reader.read_u64()?;
        let method = reader.read_str("method name", codec.limits().max_string_len)?;
        if method.is_empty() {
            return Err(EncodingError::InvalidEncoding(ERR_EMPTY_METHOD.to_string()).into());
        }
        let (values, heap) = codec.decode_params(reader.rest())?;

        Ok(Self {
            version,
            kind,
            call_id,
            method,
            payload: Payload::new(values, heap),
        })
    }
}
