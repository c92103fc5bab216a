use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framerelay_transport::TcpTransport;
use framerelay_worker::{is_executable, InstallLayout};
use serde::Serialize;

use crate::cmd::{AddressArgs, DoctorArgs};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let layout = args.layout.resolve()?;
    let checks = vec![
        install_root_check(&layout),
        worker_check(&layout),
        data_dir_check(&layout),
        bind_check(&args.address),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHECK", "STATUS", "DETAIL"]);
            for c in &output.checks {
                table.add_row(vec![
                    c.name.clone(),
                    status_text(c.status).to_string(),
                    c.detail.clone(),
                ]);
            }
            println!("{table}");
            println!("overall: {}", output.overall);
        }
        OutputFormat::Pretty => {
            println!("framerelay doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<16} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Info => "INFO",
    }
}

fn install_root_check(layout: &InstallLayout) -> CheckResult {
    CheckResult::new(
        "install_root",
        CheckStatus::Info,
        format!("resolved from {}", layout.exe_dir().display()),
    )
}

fn worker_check(layout: &InstallLayout) -> CheckResult {
    let worker = layout.worker();
    if !worker.exists() {
        return CheckResult::new(
            "worker",
            CheckStatus::Fail,
            format!("{} does not exist", worker.display()),
        );
    }
    if !is_executable(worker) {
        return CheckResult::new(
            "worker",
            CheckStatus::Fail,
            format!("{} is not an executable file", worker.display()),
        );
    }
    CheckResult::new("worker", CheckStatus::Pass, worker.display().to_string())
}

fn data_dir_check(layout: &InstallLayout) -> CheckResult {
    let dir = layout.data_dir();
    if !dir.exists() {
        return CheckResult::new(
            "data_dir",
            CheckStatus::Fail,
            format!("{} does not exist", dir.display()),
        );
    }
    if !dir.is_dir() {
        return CheckResult::new(
            "data_dir",
            CheckStatus::Fail,
            format!("{} is not a directory", dir.display()),
        );
    }
    CheckResult::new("data_dir", CheckStatus::Pass, dir.display().to_string())
}

fn bind_check(address: &AddressArgs) -> CheckResult {
    match TcpTransport::bind(&address.address, address.port) {
        Ok(transport) => CheckResult::new(
            "listen_address",
            CheckStatus::Pass,
            format!("{} can be bound", transport.local_addr()),
        ),
        Err(err) => CheckResult::new("listen_address", CheckStatus::Fail, err.to_string()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn layout(worker: &str, data_dir: &str) -> InstallLayout {
        InstallLayout::from_exe_dir("/opt/relay/bin")
            .with_worker(worker)
            .with_data_dir(data_dir)
    }

    #[test]
    fn doctor_output_has_overall_status() {
        let output = DoctorOutput {
            checks: vec![CheckResult::new("x", CheckStatus::Pass, "ok")],
            overall: "pass",
        };
        let json = serde_json::to_string(&output).expect("doctor output should serialize");
        assert!(json.contains("\"overall\":\"pass\""));
        assert!(json.contains("\"status\":\"pass\""));
    }

    #[test]
    fn worker_check_requires_an_executable_file() {
        assert!(matches!(
            worker_check(&layout("/bin/sh", "/tmp")).status,
            CheckStatus::Pass
        ));
        assert!(matches!(
            worker_check(&layout("/definitely/missing", "/tmp")).status,
            CheckStatus::Fail
        ));
        assert!(matches!(
            worker_check(&layout("/tmp", "/tmp")).status,
            CheckStatus::Fail
        ));
    }

    #[test]
    fn data_dir_check_requires_a_directory() {
        assert!(matches!(
            data_dir_check(&layout("/bin/sh", "/tmp")).status,
            CheckStatus::Pass
        ));
        assert!(matches!(
            data_dir_check(&layout("/bin/sh", "/bin/sh")).status,
            CheckStatus::Fail
        ));
    }

    #[test]
    fn bind_check_fails_on_a_port_in_use() {
        let held = TcpTransport::bind("127.0.0.1", 0).expect("hold a port");
        let address = AddressArgs {
            address: "127.0.0.1".to_string(),
            port: held.local_addr().port(),
        };
        assert!(matches!(bind_check(&address).status, CheckStatus::Fail));

        let free = AddressArgs {
            address: "127.0.0.1".to_string(),
            port: 0,
        };
        assert!(matches!(bind_check(&free).status, CheckStatus::Pass));
    }
}
