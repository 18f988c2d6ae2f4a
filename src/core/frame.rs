//! Length-prefixed frames.
//!
//! ```text
//! [Length(4, big-endian)] [Payload(Length)]
//! ```
//!
//! The length is validated against the configured maximum before any payload
//! is buffered, so a hostile peer cannot make us allocate more than the limit.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Size of the big-endian length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// One delimited unit of bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Payload length as carried in the prefix.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Parse one frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied. Nothing is consumed
    /// on `Incomplete`; callers retry once more bytes have arrived.
    pub fn parse(buf: &[u8], max_len: usize) -> Result<(Frame, usize), FrameError> {
        let payload_len = check_header(buf, max_len)?;
        let total = LENGTH_PREFIX_LEN + payload_len;
        let payload = Bytes::copy_from_slice(&buf[LENGTH_PREFIX_LEN..total]);
        Ok((Frame { payload }, total))
    }

    /// Serialize this frame, prefix included.
    pub fn to_bytes(&self, max_len: usize) -> Result<Bytes, FrameError> {
        let mut dst = BytesMut::with_capacity(LENGTH_PREFIX_LEN + self.len());
        encode_into(&self.payload, max_len, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Validate the prefix at the front of `buf` and return the payload length.
///
/// Fails with `Incomplete` until the whole frame is available and with
/// `TooLarge` as soon as the prefix alone shows the limit is exceeded.
pub fn check_header(buf: &[u8], max_len: usize) -> Result<usize, FrameError> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Err(FrameError::Incomplete {
            needed: LENGTH_PREFIX_LEN - buf.len(),
        });
    }

    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(&buf[..LENGTH_PREFIX_LEN]);
    let payload_len = u32::from_be_bytes(prefix) as usize;

    if payload_len > max_len {
        return Err(FrameError::TooLarge {
            len: payload_len,
            max: max_len,
        });
    }

    let total = LENGTH_PREFIX_LEN + payload_len;
    if buf.len() < total {
        return Err(FrameError::Incomplete {
            needed: total - buf.len(),
        });
    }

    Ok(payload_len)
}

/// Append `[len][payload]` to `dst`.
pub fn encode_into(payload: &[u8], max_len: usize, dst: &mut BytesMut) -> Result<(), FrameError> {
    if payload.len() > max_len || payload.len() > u32::MAX as usize {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: max_len,
        });
    }
    dst.reserve(LENGTH_PREFIX_LEN + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}
