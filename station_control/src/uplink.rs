//! Uplink to the operator station server.
//!
//! Newline-delimited JSON over TCP. Each cycle through the poll
//! interval pushes the latest status record (if the control loop
//! produced one since last time) and polls for the next pending
//! operator command. Everything is best-effort: a transport failure
//! drops the frame, logs, and reconnects after a backoff — the control
//! loop never notices.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use station_common::{Command, LinkConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::mailbox::{CommandSlot, StatusOutbox};

/// Message target the server files station commands under.
const COMMAND_TARGET: &str = "FiringStation";

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UplinkFrame<'a> {
    /// Status record pushed upstream.
    Record {
        station_id: &'a str,
        state_code: u8,
        relay_code: u8,
        pressure_mpsi: i64,
        uptime_ms: u64,
    },
    /// Request for the next pending command.
    Poll {
        station_id: &'a str,
        target: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    /// `None` when no command is queued for this station.
    command: Option<String>,
}

/// Run the uplink until the task is aborted.
pub async fn run_uplink(
    config: LinkConfig,
    station_id: String,
    status: Arc<StatusOutbox>,
    commands: Arc<CommandSlot>,
) {
    let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
    let backoff = Duration::from_millis(config.backoff_ms.max(1));

    loop {
        match TcpStream::connect(&config.server_addr).await {
            Ok(stream) => {
                info!(addr = %config.server_addr, "uplink connected");
                let (read_half, write_half) = tokio::io::split(stream);
                if let Err(e) = serve_connection(
                    read_half,
                    write_half,
                    poll_interval,
                    &station_id,
                    &status,
                    &commands,
                )
                .await
                {
                    warn!(error = %e, "uplink connection lost");
                }
            }
            Err(e) => {
                warn!(addr = %config.server_addr, error = %e, "uplink connect failed");
            }
        }

        tokio::time::sleep(backoff).await;
    }
}

async fn serve_connection(
    read_half: ReadHalf<TcpStream>,
    mut write_half: WriteHalf<TcpStream>,
    poll_interval: Duration,
    station_id: &str,
    status: &StatusOutbox,
    commands: &CommandSlot,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(read_half);
    let mut ticker = tokio::time::interval(poll_interval);
    let mut line = String::new();

    loop {
        ticker.tick().await;

        // Push the latest status record, if the control loop produced
        // one since the last pass.
        if let Some(frame) = status.try_take() {
            send_frame(
                &mut write_half,
                &UplinkFrame::Record {
                    station_id,
                    state_code: frame.state_code,
                    relay_code: frame.relay_code,
                    pressure_mpsi: frame.pressure_mpsi,
                    uptime_ms: frame.uptime_ms,
                },
            )
            .await?;
        }

        // Poll for the next command and hand it to the control loop.
        send_frame(
            &mut write_half,
            &UplinkFrame::Poll {
                station_id,
                target: COMMAND_TARGET,
            },
        )
        .await?;

        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed connection",
            ));
        }

        handle_poll_response(line.trim(), commands);
    }
}

async fn send_frame(
    write_half: &mut WriteHalf<TcpStream>,
    frame: &UplinkFrame<'_>,
) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(frame).map_err(std::io::Error::other)?;
    payload.push(b'\n');
    write_half.write_all(&payload).await
}

/// Decode one poll response. Unknown commands are logged and dropped;
/// they never reach the control loop (and never tear it down).
fn handle_poll_response(line: &str, commands: &CommandSlot) {
    if line.is_empty() {
        return;
    }

    let response: CommandResponse = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(line, error = %e, "malformed poll response");
            return;
        }
    };

    let Some(raw) = response.command else {
        return; // nothing queued
    };

    match Command::from_str(&raw) {
        Ok(command) => {
            debug!(?command, "command received");
            commands.post(command);
        }
        Err(e) => warn!(%e, "dropping undecodable command"),
    }
}
