//! Blocking TCP transport for framerelay.
//!
//! This is the lowest layer of framerelay. The server binds a
//! [`TcpTransport`], accepts [`RelayStream`]s from it, and hands each stream
//! to the framing layer. Clients use [`TcpTransport::connect`] to get the
//! same stream type.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::RelayStream;
pub use tcp::TcpTransport;
