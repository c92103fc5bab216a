/// Errors that can occur in TCP transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host/port pair did not resolve to any socket address.
    #[error("address {addr} did not resolve to a socket address")]
    Unresolved { addr: String },
}

impl TransportError {
    /// True when a non-blocking accept found no pending connection.
    pub fn is_would_block(&self) -> bool {
        match self {
            TransportError::Accept(err) | TransportError::Io(err) => {
                err.kind() == std::io::ErrorKind::WouldBlock
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
