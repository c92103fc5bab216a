use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: a single big-endian u32 payload length.
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Largest payload the 32-bit length prefix can describe.
pub const MAX_WIRE_PAYLOAD: usize = u32::MAX as usize;

/// A complete framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Consume the frame and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────────┬─────────────────┐
/// │ Length (4B BE)│ Payload          │
/// │               │ (Length bytes)   │
/// └───────────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_WIRE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_WIRE_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. The size cap is
/// checked as soon as the length prefix is available, before any payload
/// bytes are required.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(payload_len) = peek_payload_len(src) else {
        return Ok(None); // Need more data
    };

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { payload }))
}

/// Read the declared payload length without consuming anything.
pub(crate) fn peek_payload_len(src: &[u8]) -> Option<usize> {
    if src.len() < HEADER_SIZE {
        return None;
    }
    Some(u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl FrameConfig {
    /// No cap beyond what the length prefix can express.
    pub fn unbounded() -> Self {
        Self {
            max_payload_size: MAX_WIRE_PAYLOAD,
            ..Self::default()
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
