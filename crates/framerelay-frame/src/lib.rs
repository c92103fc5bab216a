//! Length-prefixed message framing for framerelay.
//!
//! Every message on the wire is:
//! - A 4-byte big-endian payload length
//! - Exactly that many payload bytes
//!
//! Requests and responses use the same format. [`FrameReader`] absorbs
//! partial reads and tells a clean end of stream apart from a truncated
//! frame; [`FrameWriter`] writes each frame as one unit.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    MAX_WIRE_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
