/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection closed where a frame was required.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// The stream ended inside the 4-byte length prefix.
    #[error("connection closed after {received} of 4 length prefix bytes")]
    TruncatedPrefix { received: usize },

    /// The stream ended before the declared payload length was satisfied.
    #[error("connection closed after {received} of {expected} payload bytes")]
    TruncatedPayload { expected: usize, received: usize },
}

impl FrameError {
    /// True when the peer disconnected partway through a frame.
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            FrameError::TruncatedPrefix { .. } | FrameError::TruncatedPayload { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
