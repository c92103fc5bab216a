use std::path::{Path, PathBuf};

use framerelay_frame::{FrameConfig, MAX_WIRE_PAYLOAD};
use framerelay_worker::{InstallLayout, WorkerInvoker};

/// Default listen host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// How accepted connections are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceMode {
    /// One connection at a time, handled on the accept thread.
    #[default]
    Serial,
    /// One named thread per connection.
    Concurrent,
}

impl ServiceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceMode::Serial => "serial",
            ServiceMode::Concurrent => "concurrent",
        }
    }
}

/// Everything the relay needs to accept and serve connections.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host or address to bind.
    pub host: String,
    /// Port to bind. `0` picks an ephemeral port.
    pub port: u16,
    /// Worker executable run once per request.
    pub worker: PathBuf,
    /// Working directory for every worker process.
    pub data_dir: PathBuf,
    /// Request size cap and socket timeouts.
    pub frame: FrameConfig,
    pub mode: ServiceMode,
}

impl ServerConfig {
    /// Serve the layout's worker on the default address.
    pub fn new(layout: &InstallLayout) -> Self {
        Self::with_worker(layout.worker(), layout.data_dir())
    }

    /// Serve an explicit worker on the default address.
    pub fn with_worker(worker: impl AsRef<Path>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            worker: worker.as_ref().to_path_buf(),
            data_dir: data_dir.as_ref().to_path_buf(),
            frame: FrameConfig::default(),
            mode: ServiceMode::default(),
        }
    }

    /// Override the listen address.
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Override the frame configuration.
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    /// Override the largest accepted request payload.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.frame.max_payload_size = max_payload_size;
        self
    }

    pub fn with_mode(mut self, mode: ServiceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Invoker bound to this configuration's worker paths.
    pub fn invoker(&self) -> WorkerInvoker {
        WorkerInvoker::new(&self.worker, &self.data_dir)
    }

    /// Frame settings for the response direction.
    ///
    /// Responses are only bounded by the 32-bit length prefix.
    pub(crate) fn response_frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: MAX_WIRE_PAYLOAD,
            ..self.frame.clone()
        }
    }
}
