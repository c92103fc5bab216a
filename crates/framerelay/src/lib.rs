//! Length-prefixed TCP relay backed by a process-per-request worker.
//!
//! Clients send frames (a 4-byte big-endian length followed by that many
//! bytes). Each frame is piped into a fresh worker process, and whatever the
//! worker writes to standard output comes back as one frame.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and stream wrappers
//! - [`frame`]: length-prefixed framing over any `Read`/`Write`
//! - [`worker`]: install layout and worker process invocation
//! - [`server`]: sessions and the accept loop (behind `server` feature)

/// Re-export transport types.
pub mod transport {
    pub use framerelay_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framerelay_frame::*;
}

/// Re-export worker types.
pub mod worker {
    pub use framerelay_worker::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use framerelay_server::*;
}
