use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use framerelay_transport::{RelayStream, TcpTransport};
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, ServiceMode};
use crate::error::{Result, ServerError};
use crate::session::{Session, SessionSummary};
use crate::shutdown::ShutdownSignal;

/// How often the accept loop checks for shutdown while no client is waiting.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often serial mode checks on the session it is waiting for.
const SESSION_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long shutdown waits for sessions that are already on their way out.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(50);

/// Totals reported when [`RelayListener::serve`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Connections accepted.
    pub connections: u64,
    /// Requests read across all finished sessions.
    pub requests: u64,
    /// Responses written across all finished sessions.
    pub responses: u64,
    /// Sessions still running when the loop stopped. Their connections are
    /// shut down so the peers see the relay go away.
    pub abandoned: u64,
}

impl ServeStats {
    fn record(&mut self, summary: &SessionSummary) {
        self.requests += summary.requests;
        self.responses += summary.responses;
    }
}

/// A session running on its own thread, plus a handle to its connection.
struct RunningSession {
    id: String,
    stream: RelayStream,
    handle: JoinHandle<SessionSummary>,
}

/// Accepts relay connections and hands each one to a [`Session`].
pub struct RelayListener {
    transport: TcpTransport,
    config: ServerConfig,
    next_session_id: AtomicU64,
}

impl RelayListener {
    /// Bind the configured address.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let transport = TcpTransport::bind(&config.host, config.port)?;
        info!(
            local_addr = %transport.local_addr(),
            worker = %config.worker.display(),
            data_dir = %config.data_dir.display(),
            mode = config.mode.as_str(),
            max_payload = config.frame.max_payload_size,
            "relay listening"
        );
        Ok(Self {
            transport,
            config,
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Address actually bound. Useful when the configured port was `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Block until the next connection arrives and wrap it in a session.
    pub fn accept(&self) -> Result<Session> {
        let (stream, peer) = self.transport.accept()?;
        self.session_for(stream, peer)
    }

    /// Accept and serve connections until `shutdown` is triggered.
    ///
    /// Every session runs on its own thread. Serial mode waits for the
    /// current session to finish before accepting the next connection.
    /// Concurrent mode keeps accepting. Shutdown is noticed within one poll
    /// interval in both modes: sessions still running at that point are
    /// counted as abandoned and their connections are shut down. The
    /// listening socket is released when the listener is dropped.
    pub fn serve(&self, shutdown: &ShutdownSignal) -> Result<ServeStats> {
        self.transport.set_nonblocking(true)?;

        let mut stats = ServeStats::default();
        let mut running: Vec<RunningSession> = Vec::new();

        while !shutdown.is_triggered() {
            reap_finished(&mut running, &mut stats);
            if self.config.mode == ServiceMode::Serial && !running.is_empty() {
                thread::sleep(SESSION_POLL_INTERVAL);
                continue;
            }

            let (stream, peer) = match self.transport.accept() {
                Ok(accepted) => accepted,
                Err(err) if err.is_would_block() => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
            };
            stats.connections += 1;

            match self.spawn_session(stream, peer) {
                Ok(session) => running.push(session),
                Err(err) => {
                    warn!(%peer, error = %err, "connection setup failed; dropping connection")
                }
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            reap_finished(&mut running, &mut stats);
            if running.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(SESSION_POLL_INTERVAL);
        }
        stats.abandoned = abandon(running);
        info!(
            connections = stats.connections,
            requests = stats.requests,
            responses = stats.responses,
            abandoned = stats.abandoned,
            "relay stopped"
        );
        Ok(stats)
    }

    fn spawn_session(&self, stream: RelayStream, peer: SocketAddr) -> Result<RunningSession> {
        let control = stream.try_clone()?;
        let session = self.session_for(stream, peer)?;
        let id = session.id().to_string();
        let handle = thread::Builder::new()
            .name(format!("framerelay-{id}"))
            .spawn(move || session.run())
            .map_err(ServerError::Thread)?;
        Ok(RunningSession {
            id,
            stream: control,
            handle,
        })
    }

    fn session_for(&self, stream: RelayStream, peer: SocketAddr) -> Result<Session> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        Session::new(format!("conn-{id}"), stream, peer, &self.config)
    }
}

/// Join every session thread that has already returned.
fn reap_finished(running: &mut Vec<RunningSession>, stats: &mut ServeStats) {
    let mut index = 0;
    while index < running.len() {
        if !running[index].handle.is_finished() {
            index += 1;
            continue;
        }
        let session = running.swap_remove(index);
        match session.handle.join() {
            Ok(summary) => stats.record(&summary),
            Err(_) => warn!(session = %session.id, "session thread panicked"),
        }
    }
}

/// Cut off sessions still running at shutdown. Returns how many there were.
fn abandon(running: Vec<RunningSession>) -> u64 {
    let count = running.len() as u64;
    for session in running {
        info!(session = %session.id, "abandoning session at shutdown");
        if let Err(err) = session.stream.shutdown(Shutdown::Both) {
            debug!(session = %session.id, error = %err, "connection already closed");
        }
    }
    count
}
