use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use framerelay_frame::DEFAULT_MAX_PAYLOAD;
use framerelay_server::{DEFAULT_HOST, DEFAULT_PORT};
use framerelay_worker::InstallLayout;

use crate::exit::{worker_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod doctor;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and answer each frame with the worker's output.
    Serve(ServeArgs),
    /// Send a single frame to a relay.
    Send(SendArgs),
    /// Check the install layout and listen address.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddressArgs {
    /// Host or address of the relay.
    #[arg(long, short = 'a', env = "FRAMERELAY_ADDRESS", default_value = DEFAULT_HOST)]
    pub address: String,
    /// TCP port of the relay.
    #[arg(long, short = 'p', env = "FRAMERELAY_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LayoutArgs {
    /// Worker executable. Default: ../lib/<platform worker> next to this binary.
    #[arg(long, value_name = "PATH", env = "FRAMERELAY_WORKER")]
    pub worker: Option<PathBuf>,
    /// Worker working directory. Default: ../data next to this binary.
    #[arg(long, value_name = "DIR", env = "FRAMERELAY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl LayoutArgs {
    /// Resolve the install layout around this executable, then apply overrides.
    pub fn resolve(&self) -> CliResult<InstallLayout> {
        let mut layout = InstallLayout::from_current_exe()
            .map_err(|err| worker_error("cannot resolve install layout", err))?;
        if let Some(worker) = &self.worker {
            layout = layout.with_worker(worker);
        }
        if let Some(data_dir) = &self.data_dir {
            layout = layout.with_data_dir(data_dir);
        }
        Ok(layout)
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub address: AddressArgs,
    #[command(flatten)]
    pub layout: LayoutArgs,
    /// Largest accepted request payload in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_frame_size: usize,
    /// Per-connection read timeout (e.g. 30s, 500ms). Default: none.
    #[arg(long, value_name = "DURATION")]
    pub read_timeout: Option<String>,
    /// Per-connection write timeout (e.g. 30s, 500ms). Default: none.
    #[arg(long, value_name = "DURATION")]
    pub write_timeout: Option<String>,
    /// Serve each connection on its own thread.
    #[arg(long)]
    pub concurrent: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub address: AddressArgs,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub address: AddressArgs,
    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
