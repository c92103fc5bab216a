#![cfg(all(unix, feature = "cli"))]

use std::io::Read;
use std::net::TcpListener;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use framerelay_frame::{FrameReader, DEFAULT_MAX_PAYLOAD};
use framerelay_transport::TcpTransport;

fn framerelay() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_framerelay"));
    cmd.env_remove("FRAMERELAY_ADDRESS")
        .env_remove("FRAMERELAY_PORT")
        .env_remove("FRAMERELAY_WORKER")
        .env_remove("FRAMERELAY_DATA_DIR")
        .arg("--log-level")
        .arg("error");
    cmd
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should succeed");
    listener
        .local_addr()
        .expect("listener should have an address")
        .port()
}

fn wait_for_listen(port: u16, timeout: Duration) {
    let start = Instant::now();
    loop {
        match TcpTransport::connect("127.0.0.1", port) {
            Ok(_) => return,
            Err(err) => {
                if start.elapsed() >= timeout {
                    panic!("relay did not start listening on {port}: {err}");
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child should be waitable") {
            return status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            panic!("child did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn start_relay(port: u16, worker: &str, extra: &[&str]) -> Child {
    let child = framerelay()
        .arg("--format")
        .arg("json")
        .arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .arg("--worker")
        .arg(worker)
        .arg("--data-dir")
        .arg("/tmp")
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");
    wait_for_listen(port, Duration::from_secs(5));
    child
}

fn interrupt(child: &Child) {
    let status = Command::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());
}

fn read_stats(child: &mut Child) -> serde_json::Value {
    let mut stdout = String::new();
    child
        .stdout
        .take()
        .expect("stdout should be piped")
        .read_to_string(&mut stdout)
        .expect("stdout should be readable");
    serde_json::from_str(stdout.trim()).expect("serve stats should be json")
}

fn send(port: u16, extra: &[&str]) -> Output {
    framerelay()
        .arg("send")
        .arg("--port")
        .arg(port.to_string())
        .args(extra)
        .output()
        .expect("send command should run")
}

#[test]
fn version_prints_package_version() {
    let output = framerelay()
        .arg("version")
        .output()
        .expect("version command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("framerelay {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn version_extended_reports_worker_binary() {
    let output = framerelay()
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: framerelay"));
    assert!(stdout.contains("worker_binary: ../lib/linux"));
}

#[test]
fn doctor_passes_with_valid_layout() {
    let output = framerelay()
        .arg("--format")
        .arg("json")
        .arg("doctor")
        .arg("--worker")
        .arg("/bin/cat")
        .arg("--data-dir")
        .arg("/tmp")
        .arg("--port")
        .arg("0")
        .output()
        .expect("doctor command should run");

    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("doctor output should be json");
    assert_eq!(report["overall"], "pass");
}

#[test]
fn doctor_fails_with_missing_worker() {
    let output = framerelay()
        .arg("--format")
        .arg("json")
        .arg("doctor")
        .arg("--worker")
        .arg("/definitely/not/a/worker")
        .arg("--data-dir")
        .arg("/tmp")
        .arg("--port")
        .arg("0")
        .output()
        .expect("doctor command should run");

    assert_eq!(output.status.code(), Some(30));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("doctor output should be json");
    assert_eq!(report["overall"], "fail");
    let worker = report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|c| c["name"] == "worker"))
        .expect("worker check should be reported");
    assert_eq!(worker["status"], "fail");
}

#[test]
fn serve_and_send_roundtrip_then_interrupt() {
    let port = free_port();
    let mut relay = start_relay(port, "/bin/cat", &[]);

    let output = send(port, &["--data", "ping", "--wait", "--format", "raw"]);
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(output.stdout, b"ping");

    let json = send(port, &["--data", "hello", "--wait", "--format", "json"]);
    assert!(json.status.success());
    let response: serde_json::Value =
        serde_json::from_slice(&json.stdout).expect("send output should be json");
    assert_eq!(response["payload"], "hello");
    assert_eq!(response["payload_size"], 5);

    interrupt(&relay);

    let status = wait_with_timeout(&mut relay, Duration::from_secs(5));
    assert_eq!(status.code(), Some(0));

    let stats = read_stats(&mut relay);
    assert_eq!(stats["requests"], 2);
    assert_eq!(stats["responses"], 2);

    // The port is released once serve returns.
    TcpTransport::bind("127.0.0.1", port).expect("port should be free after shutdown");
}

#[test]
fn interrupt_stops_serve_while_client_is_idle() {
    let port = free_port();
    let mut relay = start_relay(port, "/bin/cat", &[]);

    let idle = TcpTransport::connect("127.0.0.1", port).expect("idle client should connect");
    idle
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    // Let the relay start serving the idle connection.
    thread::sleep(Duration::from_millis(300));

    interrupt(&relay);
    let status = wait_with_timeout(&mut relay, Duration::from_secs(3));
    assert_eq!(status.code(), Some(0));

    let stats = read_stats(&mut relay);
    assert_eq!(stats["abandoned"], 1);

    // The relay hung up on the idle client and released the port.
    let mut reader = FrameReader::new(idle);
    assert!(reader.read_frame().expect("clean close").is_none());
    TcpTransport::bind("127.0.0.1", port).expect("port should be free after shutdown");
}

#[test]
fn send_handles_frames_above_default_cap() {
    let size = DEFAULT_MAX_PAYLOAD + 1024;
    let path = std::env::temp_dir().join(format!("framerelay-big-{}.bin", std::process::id()));
    let payload: Vec<u8> = (0..=255u8).cycle().take(size).collect();
    std::fs::write(&path, &payload).expect("payload file");

    let port = free_port();
    let cap = (2 * DEFAULT_MAX_PAYLOAD).to_string();
    let mut relay = start_relay(port, "/bin/cat", &["--max-frame-size", &cap]);

    let path_arg = path.to_string_lossy().to_string();
    let output = send(
        port,
        &[
            "--file",
            &path_arg,
            "--wait",
            "--wait-timeout",
            "30s",
            "--format",
            "raw",
        ],
    );
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(output.stdout.len(), size);
    assert!(output.stdout == payload);

    let _ = relay.kill();
    let _ = relay.wait();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn send_wait_times_out_on_silent_worker() {
    let port = free_port();
    let mut relay = start_relay(port, "/bin/true", &[]);

    let output = send(
        port,
        &["--data", "ignored", "--wait", "--wait-timeout", "300ms"],
    );
    assert_eq!(output.status.code(), Some(124));

    let _ = relay.kill();
    let _ = relay.wait();
}

#[test]
fn send_to_closed_port_fails() {
    let port = free_port();
    let output = send(port, &["--data", "nobody home"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}
