use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use userredis_core::{InstanceInfo, Settings, Username};
use userredis_provision::{AdminToken, Provisioner};

use crate::error::{io_err, DaemonError};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::watcher::PackageWatcher;

pub const NOT_AUTHENTICATED: &str = "Not authenticated";

/// Owner and group may connect; the panel's web user is expected in the group.
const SOCKET_MODE: u32 = 0o660;

type TaskResult = (&'static str, Result<(), DaemonError>);

/// Start the daemon with the real system adapters and block until it exits.
///
/// The package watcher runs only when this process holds the admin identity.
pub fn start_blocking(settings: Settings) -> Result<(), DaemonError> {
    let token = match AdminToken::acquire(&settings) {
        Ok(token) => Some(token),
        Err(err) => {
            tracing::warn!(error = %err, "not running as the privileged user; package watcher disabled");
            None
        }
    };
    let provisioner = Provisioner::system(settings)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(Arc::new(provisioner), token))
}

/// Run the status server, plus the package watcher when `token` is present,
/// until `stop`, ctrl-c, or the first task that exits.
///
/// The watch is registered and the socket bound before this returns control
/// to the runtime, so a client that sees the socket also has its package
/// edits observed.
pub async fn run(provisioner: Arc<Provisioner>, token: Option<AdminToken>) -> Result<(), DaemonError> {
    let info = ServerInfo {
        started_at_unix: unix_seconds_now(),
        watching: token.is_some(),
    };
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let mut tasks = JoinSet::<TaskResult>::new();

    if let Some(token) = token {
        let watcher = PackageWatcher::start(provisioner.packages().dir())?;
        let shutdown_rx = shutdown_tx.subscribe();
        let provisioner = provisioner.clone();
        tasks.spawn(async move {
            ("watcher", watcher.run(provisioner, Arc::new(token), shutdown_rx).await)
        });
    }

    let listener = bind_status_socket(provisioner.settings())?;
    {
        let shutdown_tx = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let provisioner = provisioner.clone();
        tasks.spawn(async move {
            let result = serve(listener, provisioner, shutdown_tx, shutdown_rx, info).await;
            ("socket server", result)
        });
    }

    let shutdown_rx = shutdown_tx.subscribe();
    let signal_tx = shutdown_tx.clone();
    tasks.spawn(async move { ("signal handler", stop_on_ctrl_c(signal_tx, shutdown_rx).await) });

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let (task, result) = joined.unwrap_or_else(|err| {
            ("daemon", Err(DaemonError::Protocol(format!("task join failure: {err}"))))
        });
        // Any task ending takes the rest down with it.
        let _ = shutdown_tx.send(());
        if let Err(err) = result {
            tracing::error!(task, error = %err, "daemon task failed");
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[derive(Debug, Clone, Copy)]
struct ServerInfo {
    started_at_unix: u64,
    watching: bool,
}

fn bind_status_socket(settings: &Settings) -> Result<UnixListener, DaemonError> {
    let socket = &settings.status_socket;
    if let Some(parent) = socket.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    clear_stale_socket(socket)?;

    let listener = UnixListener::bind(socket).map_err(|e| io_err(socket, e))?;
    set_socket_permissions(socket)?;
    tracing::info!(socket = %socket.display(), "status daemon listening");
    Ok(listener)
}

/// Remove a socket file left behind by a daemon that is gone. A socket that
/// still accepts connections belongs to a live daemon and is an error.
fn clear_stale_socket(socket: &Path) -> Result<(), DaemonError> {
    match fs::symlink_metadata(socket) {
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(io_err(socket, err)),
        Ok(_) => {}
    }
    if StdUnixStream::connect(socket).is_ok() {
        return Err(DaemonError::Protocol(format!(
            "another daemon is already serving {}",
            socket.display()
        )));
    }
    tracing::warn!(socket = %socket.display(), "removing stale status socket");
    match fs::remove_file(socket) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(io_err(socket, err)),
        _ => Ok(()),
    }
}

async fn serve(
    listener: UnixListener,
    provisioner: Arc<Provisioner>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    info: ServerInfo,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let provisioner = provisioner.clone();
                    let shutdown_tx = shutdown_tx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_client(stream, provisioner, shutdown_tx, info).await {
                            tracing::warn!(error = %err, "status client error");
                        }
                    });
                }
                Err(err) => tracing::warn!(error = %err, "accept failed"),
            },
        }
    }

    let socket = &provisioner.settings().status_socket;
    if let Err(err) = fs::remove_file(socket) {
        if err.kind() != ErrorKind::NotFound {
            tracing::warn!(socket = %socket.display(), error = %err, "could not remove status socket");
        }
    }
    Ok(())
}

async fn stop_on_ctrl_c(
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| io_err("ctrl-c handler", e))?;
            tracing::info!("received ctrl-c, shutting down daemon");
            let _ = shutdown_tx.send(());
            Ok(())
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    provisioner: Arc<Provisioner>,
    shutdown_tx: broadcast::Sender<()>,
    info: ServerInfo,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("status socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let mut stop = false;
        let response = match serde_json::from_str::<DaemonRequest>(&line) {
            Err(err) => DaemonResponse::error(format!("invalid request: {err}")),
            Ok(DaemonRequest::GetStatus { user, look }) => {
                match effective_user(user.as_deref(), look.as_deref()) {
                    Ok(user) => status_response(provisioner.clone(), user).await,
                    Err(message) => DaemonResponse::error(message),
                }
            }
            Ok(DaemonRequest::Ping) => DaemonResponse::ok(ping_payload(provisioner.settings(), info)),
            Ok(DaemonRequest::Stop) => {
                stop = true;
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
        };

        send_line(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

/// `look` when non-empty, otherwise the session user. No session user means
/// the caller is not authenticated, whatever `look` says.
fn effective_user(user: Option<&str>, look: Option<&str>) -> Result<Username, String> {
    let session = user.map(str::trim).unwrap_or_default();
    if session.is_empty() {
        return Err(NOT_AUTHENTICATED.to_string());
    }
    let look = look.map(str::trim).unwrap_or_default();
    let effective = if look.is_empty() { session } else { look };
    Username::parse(effective).map_err(|err| err.to_string())
}

async fn status_response(provisioner: Arc<Provisioner>, user: Username) -> DaemonResponse {
    let result = tokio::task::spawn_blocking(move || status_for(&provisioner, &user)).await;
    match result {
        Ok(info) => match serde_json::to_value(info) {
            Ok(data) => DaemonResponse::ok(data),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        Err(err) => DaemonResponse::error(format!("status task failed: {err}")),
    }
}

/// Provision just in time, then report. A failed provisioning degrades to
/// whatever the status probe says instead of failing the request.
fn status_for(provisioner: &Provisioner, user: &Username) -> InstanceInfo {
    match provisioner.ensure_provisioned(user) {
        Ok(true) => tracing::info!(user = %user, "provisioned redis instance on first visit"),
        Ok(false) => {}
        Err(err) => tracing::warn!(user = %user, error = %err, "just-in-time provisioning failed"),
    }
    provisioner.get_info(user)
}

fn ping_payload(settings: &Settings, info: ServerInfo) -> Value {
    json!({
        "running": true,
        "started_at_unix": info.started_at_unix,
        "watching_packages": info.watching,
        "socket": settings.status_socket.display().to_string(),
        "packages_dir": settings.packages_dir.display().to_string(),
    })
}

async fn send_line(writer: &mut OwnedWriteHalf, response: &DaemonResponse) -> Result<(), DaemonError> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .map_err(|e| io_err("status socket write", e))
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE)).map_err(|e| io_err(path, e))
}
