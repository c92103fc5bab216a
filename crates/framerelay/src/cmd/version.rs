use framerelay_worker::WORKER_BINARY_NAME;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("framerelay {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: framerelay");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("FRAMERELAY_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("FRAMERELAY_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("worker_binary: ../lib/{WORKER_BINARY_NAME}");
    println!(
        "features: server={}, cli=true",
        cfg!(feature = "server")
    );

    Ok(SUCCESS)
}
