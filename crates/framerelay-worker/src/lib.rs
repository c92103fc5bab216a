//! Worker process invocation for framerelay.
//!
//! A worker is an opaque executable: it receives one request payload on
//! standard input, writes the response to standard output, and may write
//! diagnostics to standard error. Every request gets a fresh process.
//!
//! - [`InstallLayout`] resolves where the worker lives and where it runs.
//! - [`WorkerInvoker`] runs one request through one process.

pub mod error;
pub mod invoker;
pub mod layout;

pub use error::{Result, WorkerError};
pub use invoker::{WorkerInvoker, WorkerOutput};
pub use layout::{is_executable, InstallLayout, WORKER_BINARY_NAME};
