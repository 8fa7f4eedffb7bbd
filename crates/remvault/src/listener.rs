//! Unix socket listener for remvault.
//!
//! Accepts client connections, executes one wallet request per connection and
//! writes the reply back. Connections that close without sending anything are
//! liveness probes from `remcli` and are dropped silently.

use crate::config::Config;
use crate::daemon::{Lifecycle, backoff};
use crate::vault::Vault;
use anyhow::Result;
use fs2::FileExt;
use remvault_lib::{WalletRequest, WalletResponse};
use std::fs as stdfs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

/// Largest request accepted from a client.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1 MiB
/// How long a `stop` handler waits for the endpoint to be released before
/// acknowledging anyway.
const RELEASE_WAIT: Duration = Duration::from_secs(2);

/// Errors raised while claiming the daemon endpoint.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Another daemon answered on the socket.
    #[error("endpoint {} is already served by another daemon", .0.display())]
    EndpointInUse(PathBuf),
    /// Filesystem or socket failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// State shared by every connection handler.
#[derive(Debug)]
pub struct ServerState {
    /// Wallet registry.
    pub vault: Vault,
    /// Shutdown coordination.
    pub lifecycle: Lifecycle,
    /// Time a client may take to send its request.
    pub read_timeout: Duration,
}

impl ServerState {
    /// Build fresh state for the daemon described by `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            vault: Vault::new(),
            lifecycle: Lifecycle::new(),
            read_timeout: Duration::from_secs(config.client_read_timeout_secs),
        }
    }
}

/// Prepare a Unix domain socket for the listener.
///
/// Creates the socket directory, refuses to take over a socket that a live
/// daemon still answers on, removes any stale file at `path` and sets the
/// socket permissions to `0o600`. The liveness check, removal and bind run
/// under an exclusive `flock` on the socket directory, so two daemons racing
/// for the same endpoint cannot both bind it.
///
/// # Errors
/// Returns [`ListenerError::EndpointInUse`] when another daemon is serving
/// `path`, or an I/O error if the socket cannot be created.
pub fn prepare_listener(path: &Path) -> Result<UnixListener, ListenerError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    stdfs::create_dir_all(parent)?;
    let dir = stdfs::File::open(parent)?;
    dir.lock_exclusive()?;
    let bound = bind_unlocked(path);
    if let Err(e) = FileExt::unlock(&dir) {
        tracing::debug!(dir = %parent.display(), error = %e, "Failed to unlock socket directory");
    }
    bound
}

fn bind_unlocked(path: &Path) -> Result<UnixListener, ListenerError> {
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(ListenerError::EndpointInUse(path.to_path_buf()));
    }
    // Remove any stale socket without a race-prone existence check.
    match stdfs::remove_file(path) {
        Ok(()) => tracing::debug!(socket = %path.display(), "Removed stale socket"),
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        Err(_) => {}
    }
    let listener = UnixListener::bind(path)?;
    stdfs::set_permissions(path, stdfs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// Unlink the socket file, ignoring a file that is already gone.
pub(crate) fn release_endpoint(path: &Path) {
    match stdfs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(socket = %path.display(), error = %e, "Failed to remove socket"),
    }
}

/// Bind the configured socket and serve it until shutdown.
///
/// # Errors
/// Returns an error if the socket cannot be prepared.
pub async fn run_listener(
    config: Arc<Config>,
    state: Arc<ServerState>,
    shutdown: watch::Receiver<()>,
) -> Result<()> {
    let listener = prepare_listener(&config.socket_path)?;
    serve(listener, config, state, shutdown).await
}

/// Accept connections on `listener` and spawn a handler for each client.
///
/// Each connection is handled concurrently by [`handle_client`]. When the
/// `shutdown` watch channel fires the listener is closed, the socket file is
/// removed and the endpoint is marked as released so a pending `stop` can be
/// acknowledged.
///
/// # Errors
/// Accept failures are retried with backoff; exiting due to a shutdown signal
/// is normal and not treated as an error.
pub async fn serve(
    listener: UnixListener,
    config: Arc<Config>,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let min_delay = Duration::from_millis(config.restart_min_delay_ms);
    let mut accept_backoff = backoff(min_delay);

    loop {
        tokio::select! {
            res = listener.accept() => match res {
                Ok((stream, _)) => {
                    accept_backoff = backoff(min_delay);
                    let pid = stream.peer_cred().ok().and_then(|c| c.pid());
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, state).await {
                            match pid {
                                Some(pid) => tracing::warn!(pid, error = %e, "Client handling failed"),
                                None => tracing::warn!(error = %e, "Client handling failed"),
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept client connection");
                    let delay = accept_backoff.next().unwrap_or(min_delay);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {},
                        _ = shutdown.changed() => break,
                    }
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    drop(listener);
    release_endpoint(&config.socket_path);
    state.lifecycle.mark_released();
    tracing::info!(socket = %config.socket_path.display(), "Endpoint released");
    Ok(())
}

/// Read a single request from `stream`, execute it and write the reply.
///
/// Expects the client to send a JSON encoded [`WalletRequest`] and then shut
/// down its write half. An empty payload is a probe and gets no reply. A
/// `stop` request is acknowledged only after the endpoint has been released.
///
/// # Errors
/// Fails if reading from the socket times out, the payload is too large or
/// not valid JSON, or the reply cannot be written.
pub async fn handle_client(mut stream: UnixStream, state: Arc<ServerState>) -> Result<()> {
    let mut buffer = Vec::with_capacity(8 * 1024);
    let limit = u64::try_from(MAX_REQUEST_BYTES)?.saturating_add(1);
    tokio::time::timeout(
        state.read_timeout,
        (&mut stream).take(limit).read_to_end(&mut buffer),
    )
    .await
    .map_err(|_| anyhow::anyhow!("client read timed out"))??;

    if buffer.is_empty() {
        tracing::debug!("Probe connection closed");
        return Ok(());
    }
    if buffer.len() > MAX_REQUEST_BYTES {
        anyhow::bail!("client payload exceeds {} bytes", MAX_REQUEST_BYTES);
    }
    let request: WalletRequest = match serde_json::from_slice(&buffer) {
        Ok(request) => request,
        Err(e) => {
            write_response(
                &mut stream,
                &WalletResponse::error(format!("malformed request: {e}")),
            )
            .await?;
            return Err(e.into());
        }
    };

    tracing::debug!(command = %request.command, "Executing wallet command");
    let execution = state.vault.execute(&request).await;
    if execution.shutdown {
        tracing::info!("Stop requested by client");
        state.lifecycle.request_shutdown();
        if !state.lifecycle.wait_released(RELEASE_WAIT).await {
            tracing::warn!("Endpoint not released before acknowledging stop");
        }
    }
    write_response(&mut stream, &execution.response).await
}

async fn write_response(stream: &mut UnixStream, response: &WalletResponse) -> Result<()> {
    let payload = serde_json::to_vec(response)?;
    stream.write_all(&payload).await?;
    stream.shutdown().await?;
    Ok(())
}
