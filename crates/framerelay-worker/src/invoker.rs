use std::borrow::Cow;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Result, WorkerError};

/// Runs one request through one freshly spawned worker process.
///
/// The invoker only holds paths; every call to [`run`](WorkerInvoker::run)
/// starts an independent process, so an invoker can be shared freely.
#[derive(Debug, Clone)]
pub struct WorkerInvoker {
    executable: PathBuf,
    working_dir: PathBuf,
}

/// Everything a finished worker produced.
#[derive(Debug)]
pub struct WorkerOutput {
    /// Bytes written to standard output. This is the response payload.
    pub stdout: Bytes,
    /// Bytes written to standard error. Diagnostics only.
    pub stderr: Bytes,
    /// Exit status. Not used to decide success.
    pub status: ExitStatus,
}

impl WorkerOutput {
    /// Trimmed standard error text, if the worker wrote any.
    pub fn diagnostics(&self) -> Option<Cow<'_, str>> {
        let text = String::from_utf8_lossy(&self.stderr);
        if text.trim().is_empty() {
            return None;
        }
        Some(match text {
            Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
            Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
        })
    }

    /// The response payload, or `None` when standard output was empty.
    pub fn into_response(self) -> Option<Bytes> {
        if self.stdout.is_empty() {
            None
        } else {
            Some(self.stdout)
        }
    }
}

impl WorkerInvoker {
    /// Create an invoker for `executable`, run inside `working_dir`.
    pub fn new(executable: impl AsRef<Path>, working_dir: impl AsRef<Path>) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// Worker executable path.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Worker working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run the worker and return its response payload.
    ///
    /// Standard error is logged and dropped. Empty standard output yields
    /// `Ok(None)`, meaning no response should be sent.
    pub fn invoke(&self, input: &[u8]) -> Result<Option<Bytes>> {
        let output = self.run(input)?;

        if let Some(diagnostics) = output.diagnostics() {
            warn!(
                worker = %self.executable.display(),
                diagnostics = %diagnostics,
                "worker wrote to stderr"
            );
        }
        debug!(
            status = %output.status,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "worker exited"
        );

        Ok(output.into_response())
    }

    /// Run the worker to completion and collect everything it produced.
    ///
    /// The payload is written on a helper thread while standard output and
    /// standard error are drained, so a worker that streams output before
    /// consuming all of its input cannot deadlock against the relay.
    pub fn run(&self, input: &[u8]) -> Result<WorkerOutput> {
        let child = Command::new(&self.executable)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                path: self.executable.clone(),
                source,
            })?;
        let mut guard = ChildGuard::new(child);
        debug!(pid = guard.id(), input_bytes = input.len(), "worker started");

        let stdin = guard.child_mut().stdin.take();
        let stdout = guard.child_mut().stdout.take();
        let stderr = guard.child_mut().stderr.take();

        let (stdout, stderr) = std::thread::scope(|scope| -> Result<(Vec<u8>, Vec<u8>)> {
            let feeder = scope.spawn(move || feed_stdin(stdin, input));
            let stderr_drain = scope.spawn(move || drain(stderr));

            let stdout = match drain(stdout) {
                Ok(bytes) => bytes,
                Err(err) => {
                    // Unblock the helper threads before the scope joins them.
                    guard.kill();
                    return Err(err.into());
                }
            };

            join_io(feeder.join())?;
            let stderr = join_io(stderr_drain.join())?;
            Ok((stdout, stderr))
        })?;

        let status = guard.wait()?;

        Ok(WorkerOutput {
            stdout: Bytes::from(stdout),
            stderr: Bytes::from(stderr),
            status,
        })
    }
}

/// Write the whole payload, then close stdin to signal end of input.
fn feed_stdin(stdin: Option<ChildStdin>, input: &[u8]) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(input).and_then(|()| stdin.flush()) {
        Ok(()) => Ok(()),
        // The worker exited or closed stdin without reading everything.
        Err(err) if err.kind() == ErrorKind::BrokenPipe => {
            debug!("worker closed stdin early");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn drain<R: Read>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn join_io<T>(joined: std::thread::Result<std::io::Result<T>>) -> Result<T> {
    match joined {
        Ok(result) => result.map_err(WorkerError::Io),
        Err(_) => Err(WorkerError::Io(std::io::Error::other(
            "worker stream thread panicked",
        ))),
    }
}

/// Owns a spawned child and guarantees it is reaped.
///
/// Dropping the guard before [`wait`](ChildGuard::wait) succeeded kills the
/// process and waits for it.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    fn id(&self) -> u32 {
        self.child.id()
    }

    fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
    }

    fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
