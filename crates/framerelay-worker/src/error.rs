use std::path::PathBuf;

/// Errors that can occur while running a worker process.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker process could not be started.
    #[error("failed to launch worker {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Reading from or waiting on a running worker failed.
    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server's own executable path could not be determined.
    #[error("cannot locate server executable: {0}")]
    CurrentExe(std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
