//! Wire format of the status socket and a blocking client for it.
//!
//! One JSON object per line in each direction. Requests are tagged by `cmd`:
//!
//! ```text
//! {"cmd":"get_status","user":"admin","look":"alice"}
//! {"cmd":"ping"}
//! {"cmd":"stop"}
//! ```
//!
//! Responses are `{"ok":true,"data":...}` or `{"ok":false,"error":"..."}`.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use userredis_core::InstanceInfo;

use crate::error::{io_err, DaemonError};

/// How long the client waits on a daemon that accepted but does not answer.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// `user` is the panel session user; `look` is the account an admin is
    /// viewing as, if any.
    GetStatus {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        look: Option<String>,
    },
    Ping,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// The payload of a successful response; a failure becomes
    /// [`DaemonError::Protocol`] carrying the daemon's message.
    pub fn into_data(self) -> Result<Value, DaemonError> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.data.unwrap_or(Value::Null)),
            (false, Some(message)) => Err(DaemonError::Protocol(message)),
            (false, None) => Err(DaemonError::Protocol("daemon reported failure without a message".into())),
        }
    }
}

/// Blocking client for the status socket. Each call is one connection.
#[derive(Debug, Clone)]
pub struct StatusClient {
    socket: PathBuf,
    timeout: Duration,
}

impl StatusClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn call(&self, request: &DaemonRequest) -> Result<Value, DaemonError> {
        let mut stream = self.connect()?;

        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        stream.write_all(&line).map_err(|e| io_err(&self.socket, e))?;

        let mut reply = String::new();
        BufReader::new(stream)
            .read_line(&mut reply)
            .map_err(|e| io_err(&self.socket, e))?;
        if reply.trim().is_empty() {
            return Err(DaemonError::Protocol(
                "daemon closed connection before responding".into(),
            ));
        }
        serde_json::from_str::<DaemonResponse>(&reply)?.into_data()
    }

    fn connect(&self) -> Result<UnixStream, DaemonError> {
        let stream = UnixStream::connect(&self.socket).map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused => DaemonError::DaemonNotRunning {
                socket: self.socket.clone(),
            },
            _ => io_err(&self.socket, err),
        })?;
        let timeout = Some(self.timeout);
        stream
            .set_read_timeout(timeout)
            .and_then(|()| stream.set_write_timeout(timeout))
            .map_err(|e| io_err(&self.socket, e))?;
        Ok(stream)
    }
}

/// Status of the effective user's instance, as the panel's user page asks for it.
pub fn request_status(
    socket: &Path,
    user: &str,
    look: Option<&str>,
) -> Result<InstanceInfo, DaemonError> {
    let data = StatusClient::new(socket).call(&DaemonRequest::GetStatus {
        user: Some(user.to_owned()),
        look: look.map(str::to_owned),
    })?;
    Ok(serde_json::from_value(data)?)
}

pub fn request_ping(socket: &Path) -> Result<Value, DaemonError> {
    StatusClient::new(socket).call(&DaemonRequest::Ping)
}

pub fn request_stop(socket: &Path) -> Result<(), DaemonError> {
    StatusClient::new(socket).call(&DaemonRequest::Stop).map(drop)
}
