//! Install layout resolution.
//!
//! A packaged relay looks like:
//!
//! ```text
//! <root>/bin/framerelay      server executable
//! <root>/lib/<worker>        worker executable (platform specific name)
//! <root>/data/               worker working directory
//! ```
//!
//! Both worker paths are resolved once from the server's own location.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{Result, WorkerError};

/// File name of the packaged worker for the target platform.
#[cfg(windows)]
pub const WORKER_BINARY_NAME: &str = "win.exe";
/// File name of the packaged worker for the target platform.
#[cfg(not(windows))]
pub const WORKER_BINARY_NAME: &str = "linux";

const LIB_DIR: &str = "lib";
const DATA_DIR: &str = "data";

/// Resolved worker executable and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    exe_dir: PathBuf,
    worker: PathBuf,
    data_dir: PathBuf,
}

impl InstallLayout {
    /// Resolve the layout around the running server executable.
    pub fn from_current_exe() -> Result<Self> {
        let exe = std::env::current_exe().map_err(WorkerError::CurrentExe)?;
        let exe_dir = exe.parent().map(Path::to_path_buf).ok_or_else(|| {
            WorkerError::CurrentExe(std::io::Error::other(format!(
                "{} has no parent directory",
                exe.display()
            )))
        })?;
        Ok(Self::from_exe_dir(exe_dir))
    }

    /// Resolve the layout around an explicit executable directory.
    pub fn from_exe_dir(exe_dir: impl AsRef<Path>) -> Self {
        let exe_dir = absolutize(exe_dir.as_ref());
        let worker = normalize(&exe_dir.join("..").join(LIB_DIR).join(WORKER_BINARY_NAME));
        let data_dir = normalize(&exe_dir.join("..").join(DATA_DIR));
        debug!(
            worker = %worker.display(),
            data_dir = %data_dir.display(),
            "resolved install layout"
        );
        Self {
            exe_dir,
            worker,
            data_dir,
        }
    }

    /// Replace the worker executable path.
    pub fn with_worker(mut self, worker: impl AsRef<Path>) -> Self {
        self.worker = absolutize(worker.as_ref());
        self
    }

    /// Replace the worker working directory.
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        self.data_dir = absolutize(data_dir.as_ref());
        self
    }

    /// Directory the layout was resolved from.
    pub fn exe_dir(&self) -> &Path {
        &self.exe_dir
    }

    /// Worker executable path.
    pub fn worker(&self) -> &Path {
        &self.worker
    }

    /// Worker working directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// True when `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

fn absolutize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize(&absolute)
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
