use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::RelayStream;

/// TCP listening socket.
///
/// Binds a host/port pair with the platform's default backlog. The socket is
/// closed when the value is dropped.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `host:port`.
    ///
    /// Port `0` asks the OS for an ephemeral port; use [`local_addr`] to read
    /// it back.
    ///
    /// [`local_addr`]: TcpTransport::local_addr
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = display_addr(host, port);
        let candidates = resolve(host, port).map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
        if candidates.is_empty() {
            return Err(TransportError::Unresolved { addr });
        }

        let listener = TcpListener::bind(&candidates[..]).map_err(|source| {
            TransportError::Bind {
                addr: addr.clone(),
                source,
            }
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection.
    ///
    /// Blocks unless the transport was switched to non-blocking mode, in which
    /// case an empty backlog surfaces as an error with
    /// [`TransportError::is_would_block`] set. Accepted streams are always in
    /// blocking mode.
    pub fn accept(&self) -> Result<(RelayStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(false)?;
        debug!(%peer, "accepted connection");
        Ok((RelayStream::from_tcp(stream), peer))
    }

    /// Toggle non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Connect to a listening relay (blocking).
    pub fn connect(host: &str, port: u16) -> Result<RelayStream> {
        Self::connect_inner(host, port, None)
    }

    /// Connect to a listening relay, giving up on each resolved address after
    /// `timeout`.
    pub fn connect_timeout(host: &str, port: u16, timeout: Duration) -> Result<RelayStream> {
        Self::connect_inner(host, port, Some(timeout))
    }

    fn connect_inner(host: &str, port: u16, timeout: Option<Duration>) -> Result<RelayStream> {
        let addr = display_addr(host, port);
        let candidates = resolve(host, port).map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;

        let mut last_err = None;
        for candidate in candidates {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(stream) => {
                    debug!(peer = %candidate, "connected to relay");
                    return Ok(RelayStream::from_tcp(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect { addr, source }),
            None => Err(TransportError::Unresolved { addr }),
        }
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        debug!(local_addr = %self.local_addr, "closing tcp listener");
    }
}

fn resolve(host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
    Ok((host, port).to_socket_addrs()?.collect())
}

fn display_addr(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{ErrorKind, Read, Write};

    #[test]
    fn test_bind_accept_connect() {
        let listener = TcpTransport::bind("127.0.0.1", 0).unwrap();
        let port = listener.local_addr().port();
        assert_ne!(port, 0);

        let handle = std::thread::spawn(move || {
            let mut client = TcpTransport::connect("127.0.0.1", port).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let (mut server, peer) = listener.accept().unwrap();
        assert!(peer.ip().is_loopback());
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn test_bind_port_in_use() {
        let first = TcpTransport::bind("127.0.0.1", 0).unwrap();
        let port = first.local_addr().port();

        let result = TcpTransport::bind("127.0.0.1", port);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn test_bind_invalid_host() {
        let result = TcpTransport::bind("not a host name", 0);
        assert!(matches!(
            result,
            Err(TransportError::Bind { .. }) | Err(TransportError::Unresolved { .. })
        ));
    }

    #[test]
    fn test_nonblocking_accept_reports_would_block() {
        let listener = TcpTransport::bind("127.0.0.1", 0).unwrap();
        listener.set_nonblocking(true).unwrap();

        let err = listener.accept().unwrap_err();
        assert!(err.is_would_block());
    }

    #[test]
    fn test_accepted_stream_is_blocking() {
        let listener = TcpTransport::bind("127.0.0.1", 0).unwrap();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().port();

        let mut client = TcpTransport::connect("127.0.0.1", port).unwrap();

        let (mut server, _) = loop {
            match listener.accept() {
                Ok(accepted) => break accepted,
                Err(err) if err.is_would_block() => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(err) => panic!("accept failed: {err}"),
            }
        };

        // A blocking read waits for the late write instead of failing.
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            client.write_all(b"late").unwrap();
            client
        });
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"late");
        let _client = writer.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpTransport::bind("127.0.0.1", 0).unwrap();
            listener.local_addr().port()
        };

        let err = TcpTransport::connect_timeout("127.0.0.1", port, Duration::from_secs(1))
            .unwrap_err();
        match err {
            TransportError::Connect { source, .. } => {
                assert_eq!(source.kind(), ErrorKind::ConnectionRefused)
            }
            other => panic!("expected connect error, got {other}"),
        }
    }

    #[test]
    fn test_display_addr_brackets_ipv6() {
        assert_eq!(display_addr("::1", 80), "[::1]:80");
        assert_eq!(display_addr("127.0.0.1", 80), "127.0.0.1:80");
    }
}
