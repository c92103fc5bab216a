use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framerelay_server::ServeStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    relay: &'a str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

/// Print one response frame received from a relay.
pub fn print_response(payload: &[u8], relay: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                relay,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["RELAY", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    relay.to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "relay={} size={} payload={}",
                relay,
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

#[derive(Serialize)]
struct ServeOutput {
    local_addr: String,
    connections: u64,
    requests: u64,
    responses: u64,
    abandoned: u64,
}

impl ServeOutput {
    fn new(stats: &ServeStats, local_addr: SocketAddr) -> Self {
        Self {
            local_addr: local_addr.to_string(),
            connections: stats.connections,
            requests: stats.requests,
            responses: stats.responses,
            abandoned: stats.abandoned,
        }
    }
}

/// Print the totals of a finished `serve` run.
pub fn print_serve_stats(stats: &ServeStats, local_addr: SocketAddr, format: OutputFormat) {
    let out = ServeOutput::new(stats, local_addr);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "CONNECTIONS", "REQUESTS", "RESPONSES", "ABANDONED"])
                .add_row(vec![
                    out.local_addr.clone(),
                    out.connections.to_string(),
                    out.requests.to_string(),
                    out.responses.to_string(),
                    out.abandoned.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "address={} connections={} requests={} responses={} abandoned={}",
                out.local_addr, out.connections, out.requests, out.responses, out.abandoned
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
