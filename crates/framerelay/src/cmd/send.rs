use std::fs;
use std::time::Duration;

use framerelay_frame::{FrameConfig, FrameReader, FrameWriter};
use framerelay_transport::TcpTransport;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, transport_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_response, OutputFormat};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let host = &args.address.address;
    let port = args.address.port;
    let stream = TcpTransport::connect_timeout(host, port, CONNECT_TIMEOUT)
        .map_err(|err| transport_error("connect failed", err))?;
    let relay = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| format!("{host}:{port}"));

    let reader_stream = stream
        .try_clone()
        .map_err(|err| transport_error("connect failed", err))?;
    let mut writer = FrameWriter::with_config(stream, FrameConfig::unbounded());
    writer
        .send(&payload)
        .map_err(|err| frame_error("send failed", err))?;

    if !args.wait {
        return Ok(SUCCESS);
    }

    reader_stream
        .set_read_timeout(Some(wait_timeout))
        .map_err(|err| transport_error("receive failed", err))?;
    // The relay does not cap responses, so neither does the client.
    let mut reader = FrameReader::with_config(reader_stream, FrameConfig::unbounded());
    match reader.read_frame() {
        Ok(Some(frame)) => {
            print_response(frame.payload.as_ref(), &relay, format);
            Ok(SUCCESS)
        }
        Ok(None) => Err(CliError::new(
            FAILURE,
            "receive failed: relay closed the connection without a response",
        )),
        Err(err) => Err(frame_error("receive failed", err)),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}
