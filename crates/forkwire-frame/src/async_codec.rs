//! Tokio codec for value frames.
//!
//! Speaks the same wire format as [`FrameReader`](crate::FrameReader) and
//! [`FrameWriter`](crate::FrameWriter), so an async peer can sit on either
//! end of a channel.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::{decode_value, encode_value, Value};

/// Encodes and decodes [`Value`] frames for use with `tokio_util::codec::Framed`.
#[derive(Debug, Clone, Default)]
pub struct ValueCodec {
    config: FrameConfig,
}

impl ValueCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for ValueCodec {
    type Item = Value;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        match decode_frame(src, self.config.max_payload_size)? {
            Some(payload) => decode_value(&payload).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        match self.decode(src)? {
            Some(value) => Ok(Some(value)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::IncompleteFrame {
                buffered: src.len(),
            }),
        }
    }
}

impl Encoder<Value> for ValueCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        <Self as Encoder<&Value>>::encode(self, &item, dst)
    }
}

impl<'a> Encoder<&'a Value> for ValueCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &'a Value, dst: &mut BytesMut) -> Result<()> {
        let payload = encode_value(item)?;
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(&payload, dst)
    }
}
