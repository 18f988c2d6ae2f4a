//! Tokio codec for framing Boson messages over byte streams.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_FRAME_SIZE;
use crate::core::frame::{self, Frame, LENGTH_PREFIX_LEN};
use crate::error::{BosonError, FrameError};

/// Length-prefix codec with a hard upper bound on frame size.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = BosonError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, BosonError> {
        match frame::check_header(src, self.max_frame_size) {
            Ok(payload_len) => {
                src.advance(LENGTH_PREFIX_LEN);
                let payload = src.split_to(payload_len).freeze();
                Ok(Some(Frame { payload }))
            }
            Err(FrameError::Incomplete { needed }) => {
                src.reserve(needed);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = BosonError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), BosonError> {
        frame::encode_into(&payload, self.max_frame_size, dst)?;
        Ok(())
    }
}
