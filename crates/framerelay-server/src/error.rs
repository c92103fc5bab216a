/// Errors that can occur while serving connections.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framerelay_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] framerelay_frame::FrameError),

    /// Worker invocation error.
    #[error("worker error: {0}")]
    Worker(#[from] framerelay_worker::WorkerError),

    /// A session thread could not be started.
    #[error("failed to spawn session thread: {0}")]
    Thread(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
