use framerelay_frame::FrameConfig;
use framerelay_server::{RelayListener, ServerConfig, ServiceMode, ShutdownSignal};
use framerelay_worker::is_executable;
use tracing::warn;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{server_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_serve_stats, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = server_config(&args)?;

    // Launch failures only drop the affected request, so a missing worker is
    // not fatal at startup.
    if !is_executable(&config.worker) {
        warn!(
            worker = %config.worker.display(),
            "worker is not an executable file; requests will get no response"
        );
    }
    if !config.data_dir.is_dir() {
        warn!(data_dir = %config.data_dir.display(), "data directory does not exist");
    }

    let listener = RelayListener::bind(config).map_err(|err| server_error("bind failed", err))?;

    let shutdown = ShutdownSignal::new();
    install_ctrlc_handler(shutdown.clone())?;

    let stats = listener
        .serve(&shutdown)
        .map_err(|err| server_error("serve failed", err))?;
    print_serve_stats(&stats, listener.local_addr(), format);

    Ok(SUCCESS)
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let layout = args.layout.resolve()?;
    let frame = FrameConfig {
        max_payload_size: args.max_frame_size,
        read_timeout: args.read_timeout.as_deref().map(parse_duration).transpose()?,
        write_timeout: args.write_timeout.as_deref().map(parse_duration).transpose()?,
    };
    let mode = if args.concurrent {
        ServiceMode::Concurrent
    } else {
        ServiceMode::Serial
    };

    Ok(ServerConfig::new(&layout)
        .with_address(args.address.address.clone(), args.address.port)
        .with_frame_config(frame)
        .with_mode(mode))
}

fn install_ctrlc_handler(shutdown: ShutdownSignal) -> CliResult<()> {
    ctrlc::set_handler(move || shutdown.trigger())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
