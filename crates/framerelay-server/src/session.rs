use std::fmt;
use std::net::SocketAddr;

use framerelay_frame::{FrameError, FrameReader, FrameWriter};
use framerelay_transport::RelayStream;
use framerelay_worker::WorkerInvoker;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

const PREVIEW_CHARS: usize = 120;

/// Where a session is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the 4-byte length prefix of the next request.
    AwaitingLength,
    /// Prefix read, waiting for the payload bytes.
    AwaitingPayload,
    /// Worker running for the current request.
    Invoking,
    /// Writing the worker's output back to the client.
    Responding,
    /// Request finished; about to wait for the next one.
    Idle,
    /// Peer closed the connection.
    Closed,
    /// Unrecoverable stream error.
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::AwaitingLength => "awaiting-length",
            SessionState::AwaitingPayload => "awaiting-payload",
            SessionState::Invoking => "invoking",
            SessionState::Responding => "responding",
            SessionState::Idle => "idle",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Peer closed the connection between frames.
    Closed,
    /// Peer closed the connection partway through a frame.
    Disconnected(FrameError),
    /// Stream error or protocol violation. The connection was dropped.
    Failed(ServerError),
}

impl SessionOutcome {
    /// True unless the session ended on a stream error.
    ///
    /// A peer that disconnects mid-frame ends its own session; that is not
    /// a server fault.
    pub fn is_clean(&self) -> bool {
        !matches!(self, SessionOutcome::Failed(_))
    }
}

/// Final accounting for one connection.
#[derive(Debug)]
pub struct SessionSummary {
    pub id: String,
    pub peer: SocketAddr,
    pub outcome: SessionOutcome,
    /// Complete request frames received.
    pub requests: u64,
    /// Response frames written.
    pub responses: u64,
}

/// One client connection, served until the peer goes away.
///
/// Requests on a connection are handled strictly in order: each one is read,
/// run through a fresh worker, and answered (or silently dropped) before the
/// next is read.
pub struct Session {
    id: String,
    peer: SocketAddr,
    reader: FrameReader<RelayStream>,
    writer: FrameWriter<RelayStream>,
    invoker: WorkerInvoker,
    state: SessionState,
    requests: u64,
    responses: u64,
}

impl Session {
    /// Wrap an accepted stream, applying the configured size cap and timeouts.
    pub fn new(
        id: impl Into<String>,
        stream: RelayStream,
        peer: SocketAddr,
        config: &ServerConfig,
    ) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let reader = FrameReader::with_config_stream(reader_stream, config.frame.clone())?;
        let writer = FrameWriter::with_config_stream(stream, config.response_frame_config())?;

        Ok(Self {
            id: id.into(),
            peer,
            reader,
            writer,
            invoker: config.invoker(),
            state: SessionState::AwaitingLength,
            requests: 0,
            responses: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve requests until the peer disconnects or the stream fails.
    pub fn run(mut self) -> SessionSummary {
        info!(session = %self.id, peer = %self.peer, "session started");

        let outcome = self.serve_requests();
        match &outcome {
            SessionOutcome::Closed => {
                self.transition(SessionState::Closed);
                info!(
                    session = %self.id,
                    requests = self.requests,
                    responses = self.responses,
                    "session closed"
                );
            }
            SessionOutcome::Disconnected(err) => {
                self.transition(SessionState::Closed);
                info!(
                    session = %self.id,
                    requests = self.requests,
                    responses = self.responses,
                    reason = %err,
                    "peer disconnected mid-frame"
                );
            }
            SessionOutcome::Failed(err) => {
                self.transition(SessionState::Failed);
                warn!(
                    session = %self.id,
                    requests = self.requests,
                    responses = self.responses,
                    error = %err,
                    "session failed"
                );
            }
        }

        SessionSummary {
            id: self.id,
            peer: self.peer,
            outcome,
            requests: self.requests,
            responses: self.responses,
        }
    }

    fn serve_requests(&mut self) -> SessionOutcome {
        loop {
            self.transition(SessionState::AwaitingLength);
            let len = match self.reader.read_length() {
                Ok(Some(len)) => len,
                Ok(None) => return SessionOutcome::Closed,
                Err(err) => return read_failure(err),
            };

            self.transition(SessionState::AwaitingPayload);
            trace!(session = %self.id, len, "reading request payload");
            let payload = match self.reader.read_payload() {
                Ok(payload) => payload,
                Err(err) => return read_failure(err),
            };

            self.requests += 1;
            debug!(
                session = %self.id,
                request = self.requests,
                size = payload.len(),
                preview = %preview(&payload),
                "received request"
            );

            if let Err(err) = self.handle(&payload) {
                return SessionOutcome::Failed(err);
            }
            self.transition(SessionState::Idle);
        }
    }

    /// Run one request through the worker and write back whatever it printed.
    ///
    /// Only a failure to write the response ends the session; a worker that
    /// cannot be launched or prints nothing costs the client one response.
    fn handle(&mut self, payload: &[u8]) -> Result<()> {
        self.transition(SessionState::Invoking);
        let response = match self.invoker.invoke(payload) {
            Ok(Some(response)) => response,
            Ok(None) => {
                debug!(session = %self.id, "worker produced no output; no response sent");
                return Ok(());
            }
            Err(err) => {
                warn!(
                    session = %self.id,
                    error = %err,
                    "worker invocation failed; request dropped"
                );
                return Ok(());
            }
        };

        self.transition(SessionState::Responding);
        match self.writer.send(&response) {
            Ok(()) => {
                self.responses += 1;
                debug!(session = %self.id, size = response.len(), "sent response");
                Ok(())
            }
            // Rejected before any byte was written, so the stream is intact.
            Err(FrameError::PayloadTooLarge { size, max }) => {
                warn!(
                    session = %self.id,
                    size,
                    max,
                    "worker output does not fit in a frame; response dropped"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            trace!(session = %self.id, from = %self.state, to = %next, "session state");
            self.state = next;
        }
    }
}

fn read_failure(err: FrameError) -> SessionOutcome {
    if err.is_truncation() {
        SessionOutcome::Disconnected(err)
    } else {
        SessionOutcome::Failed(err.into())
    }
}

/// Lossy text rendering of a payload for log lines.
fn preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut chars = text.chars();
    let mut out: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::net::Shutdown;
    use std::thread;

    use bytes::BufMut;
    use framerelay_transport::TcpTransport;

    use super::*;

    fn config(worker: &str) -> ServerConfig {
        ServerConfig::with_worker(worker, std::env::temp_dir())
    }

    /// Connect a client to a fresh session and run it on a helper thread.
    fn start(config: ServerConfig) -> (RelayStream, thread::JoinHandle<SessionSummary>) {
        let transport = TcpTransport::bind("127.0.0.1", 0).expect("transport should bind");
        let port = transport.local_addr().port();

        let client = TcpTransport::connect("127.0.0.1", port).expect("client should connect");
        let (stream, peer) = transport.accept().expect("accept should succeed");
        let session = Session::new("conn-test", stream, peer, &config).expect("session setup");
        assert_eq!(session.state(), SessionState::AwaitingLength);
        assert_eq!(session.id(), "conn-test");

        let handle = thread::spawn(move || session.run());
        (client, handle)
    }

    #[test]
    fn echoes_request_and_closes_cleanly() {
        let (client, handle) = start(config("/bin/cat"));

        let mut writer = FrameWriter::new(client.try_clone().expect("clone"));
        let mut reader = FrameReader::new(client);
        writer.send(b"ping").expect("send");
        let response = reader.read_frame().expect("read").expect("response frame");
        assert_eq!(response.payload.as_ref(), b"ping");

        drop(writer);
        reader
            .get_ref()
            .shutdown(Shutdown::Both)
            .expect("client shutdown");

        let summary = handle.join().expect("session thread");
        assert!(matches!(summary.outcome, SessionOutcome::Closed));
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.responses, 1);
    }

    #[test]
    fn zero_bytes_then_close_is_a_clean_close() {
        let (client, handle) = start(config("/bin/cat"));
        drop(client);

        let summary = handle.join().expect("session thread");
        assert!(matches!(summary.outcome, SessionOutcome::Closed));
        assert_eq!(summary.requests, 0);
    }

    #[test]
    fn truncated_prefix_ends_session_without_failure() {
        let (mut client, handle) = start(config("/bin/cat"));
        client.write_all(&[0x00, 0x00]).expect("partial prefix");
        drop(client);

        let summary = handle.join().expect("session thread");
        assert!(summary.outcome.is_clean());
        assert!(matches!(
            summary.outcome,
            SessionOutcome::Disconnected(FrameError::TruncatedPrefix { received: 2 })
        ));
        assert_eq!(summary.requests, 0);
    }

    #[test]
    fn truncated_payload_ends_session_without_failure() {
        let (mut client, handle) = start(config("/bin/cat"));
        let mut partial = Vec::new();
        partial.put_u32(10);
        partial.put_slice(b"abc");
        client.write_all(&partial).expect("partial frame");
        drop(client);

        let summary = handle.join().expect("session thread");
        assert!(matches!(
            summary.outcome,
            SessionOutcome::Disconnected(FrameError::TruncatedPayload {
                expected: 10,
                received: 3
            })
        ));
    }

    #[test]
    fn oversized_request_fails_session() {
        let (mut client, handle) = start(config("/bin/cat").with_max_payload_size(4));
        let mut prefix = Vec::new();
        prefix.put_u32(5);
        client.write_all(&prefix).expect("prefix");

        let summary = handle.join().expect("session thread");
        assert!(!summary.outcome.is_clean());
        assert!(matches!(
            summary.outcome,
            SessionOutcome::Failed(ServerError::Frame(FrameError::PayloadTooLarge {
                size: 5,
                max: 4
            }))
        ));

        // The server side is gone, so the client reads end of stream.
        let mut rest = Vec::new();
        let _ = client.read_to_end(&mut rest);
        assert!(rest.is_empty());
    }

    #[test]
    fn silent_worker_sends_nothing_and_keeps_connection() {
        let (client, handle) = start(config("/bin/true"));

        let mut writer = FrameWriter::new(client.try_clone().expect("clone"));
        writer.send(b"first").expect("send first");
        writer.send(b"second").expect("send second");
        drop(writer);
        client.shutdown(Shutdown::Write).expect("half close");

        let mut reader = FrameReader::new(client);
        assert!(reader.read_frame().expect("read").is_none());

        let summary = handle.join().expect("session thread");
        assert!(matches!(summary.outcome, SessionOutcome::Closed));
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.responses, 0);
    }

    #[test]
    fn missing_worker_drops_request_and_keeps_connection() {
        let (client, handle) = start(config("/definitely/not/a/worker"));

        let mut writer = FrameWriter::new(client.try_clone().expect("clone"));
        writer.send(b"lost").expect("send");
        drop(writer);
        client.shutdown(Shutdown::Write).expect("half close");

        let mut reader = FrameReader::new(client);
        assert!(reader.read_frame().expect("read").is_none());

        let summary = handle.join().expect("session thread");
        assert!(summary.outcome.is_clean());
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.responses, 0);
    }

    #[test]
    fn state_names_and_terminal_states() {
        assert_eq!(SessionState::AwaitingPayload.to_string(), "awaiting-payload");
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn preview_is_lossy_and_bounded() {
        assert_eq!(preview(b"ping"), "ping");
        assert_eq!(preview(&[0x66, 0xff, 0x6f]), "f\u{fffd}o");

        let long = vec![b'a'; PREVIEW_CHARS + 10];
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.len(), PREVIEW_CHARS + 3);
    }
}
