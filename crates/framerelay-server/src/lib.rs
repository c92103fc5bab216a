//! Request relay server.
//!
//! Accepts TCP connections, reads length-prefixed request frames, runs the
//! worker once per request, and writes the worker's output back as a frame
//! on the same connection.

pub mod config;
pub mod error;
pub mod listener;
pub mod session;
pub mod shutdown;

pub use config::{ServerConfig, ServiceMode, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{Result, ServerError};
pub use listener::{RelayListener, ServeStats};
pub use session::{Session, SessionOutcome, SessionState, SessionSummary};
pub use shutdown::ShutdownSignal;
