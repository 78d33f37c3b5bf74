//! `userredis daemon`: status endpoint lifecycle and queries.

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Subcommand;
use serde_json::{json, Value};

use userredis_core::Settings;
use userredis_daemon::{request_ping, request_status, request_stop, start_blocking, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (socket server + package watcher).
    Start,
    /// Request graceful daemon shutdown over the socket.
    Stop,
    /// Show whether the daemon is running.
    Status,
    /// Ask the daemon for a user's instance status, as the panel does.
    Query {
        /// Session user.
        user: String,
        /// Account to view as.
        #[arg(long)]
        look: Option<String>,
    },
}

pub fn run(command: DaemonCommand, settings: Settings) -> Result<()> {
    let socket = settings.status_socket.clone();

    match command {
        DaemonCommand::Start => {
            start_blocking(settings).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&socket) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_ping(&socket) {
                Ok(payload) => with_started_at(payload),
                Err(DaemonError::DaemonNotRunning { .. }) => json!({
                    "running": false,
                    "socket": socket.display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Query { user, look } => {
            let info = request_status(&socket, &user, look.as_deref())
                .context("status query failed")?;
            println!(
                "{}",
                serde_json::to_string(&info).context("failed to render status JSON")?
            );
        }
    }

    Ok(())
}

/// Add an RFC 3339 `started_at` next to the daemon's unix timestamp.
fn with_started_at(mut payload: Value) -> Value {
    let started = payload
        .get("started_at_unix")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    if let (Some(started), Some(map)) = (started, payload.as_object_mut()) {
        map.insert("started_at".into(), Value::String(started.to_rfc3339()));
    }
    payload
}
