use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use framerelay_transport::RelayStream;
use tracing::trace;

use crate::codec::{decode_frame, peek_payload_len, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally, so callers always get complete frames.
/// [`read_frame`](FrameReader::read_frame) is the usual entry point;
/// [`read_length`](FrameReader::read_length) and
/// [`read_payload`](FrameReader::read_payload) expose the two halves for
/// callers that track which half they are blocked in.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    pending: Option<usize>,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            pending: None,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` when the peer closed the stream on a frame
    /// boundary. A close in the middle of a frame is reported as
    /// [`FrameError::TruncatedPrefix`] or [`FrameError::TruncatedPayload`].
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.read_length()?.is_none() {
            return Ok(None);
        }
        let payload = self.read_payload()?;
        trace!(size = payload.len(), "decoded frame");
        Ok(Some(Frame { payload }))
    }

    /// Read the 4-byte length prefix of the next frame (blocking).
    ///
    /// Returns `Ok(None)` if the stream ended before any byte of the prefix
    /// arrived. The size cap is enforced here, before the payload is read.
    /// Calling this again before [`read_payload`](FrameReader::read_payload)
    /// returns the same length.
    pub fn read_length(&mut self) -> Result<Option<usize>> {
        if let Some(len) = self.pending {
            return Ok(Some(len));
        }

        if !self.fill(HEADER_SIZE)? {
            if self.buf.is_empty() {
                return Ok(None);
            }
            return Err(FrameError::TruncatedPrefix {
                received: self.buf.len(),
            });
        }

        let Some(len) = peek_payload_len(&self.buf) else {
            return Err(FrameError::TruncatedPrefix {
                received: self.buf.len(),
            });
        };
        if len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }

        self.pending = Some(len);
        Ok(Some(len))
    }

    /// Read the payload announced by the last length prefix (blocking).
    ///
    /// Reads the prefix first if it has not been read yet; a clean end of
    /// stream at that point is [`FrameError::ConnectionClosed`].
    pub fn read_payload(&mut self) -> Result<Bytes> {
        let len = match self.read_length()? {
            Some(len) => len,
            None => return Err(FrameError::ConnectionClosed),
        };

        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                self.pending = None;
                return Ok(frame.into_payload());
            }
            if !self.read_chunk()? {
                return Err(FrameError::TruncatedPayload {
                    expected: len,
                    received: self.buf.len() - HEADER_SIZE,
                });
            }
        }
    }

    /// Buffer at least `target` bytes. Returns `false` on end of stream.
    fn fill(&mut self, target: usize) -> Result<bool> {
        while self.buf.len() < target {
            if !self.read_chunk()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// One read from the stream into the buffer. Returns `false` on end of stream.
    fn read_chunk(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<RelayStream> {
    /// Create a frame reader for `RelayStream` and apply read timeout from config.
    pub fn with_config_stream(inner: RelayStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: framerelay_transport::TransportError) -> FrameError {
    match err {
        framerelay_transport::TransportError::Io(io)
        | framerelay_transport::TransportError::Accept(io) => FrameError::Io(io),
        framerelay_transport::TransportError::Bind { source, .. }
        | framerelay_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
