//! Task orchestration for remvault.
//!
//! Binds the endpoint, supervises the listener task with exponential backoff
//! and turns `stop` requests, SIGINT and SIGTERM into a graceful shutdown
//! that releases the endpoint before the process exits.

use crate::config::Config;
use crate::listener::{
    ListenerError, ServerState, prepare_listener, release_endpoint, run_listener, serve,
};
use backon::{ExponentialBackoff, ExponentialBuilder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

/// How long the supervisor lets the listener finish releasing the endpoint
/// before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Shutdown coordination shared between the supervisor, the listener and
/// connection handlers.
#[derive(Debug)]
pub struct Lifecycle {
    shutdown: watch::Sender<()>,
    released: watch::Sender<bool>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shutdown: watch::channel(()).0,
            released: watch::channel(false).0,
        }
    }

    /// Receiver that fires once shutdown is requested.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.shutdown.subscribe()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(());
    }

    /// Record that the socket is closed and unlinked.
    pub fn mark_released(&self) {
        self.released.send_replace(true);
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    /// Wait until [`Lifecycle::mark_released`] is called or `limit` elapses.
    ///
    /// Returns `true` if the endpoint was released in time.
    pub async fn wait_released(&self, limit: Duration) -> bool {
        let mut rx = self.released.subscribe();
        let waited = tokio::time::timeout(limit, async move {
            rx.wait_for(|released| *released).await.is_ok()
        })
        .await;
        matches!(waited, Ok(true))
    }
}

/// Build a jittered exponential backoff with no maximum attempt count.
///
/// The minimum delay is provided by the caller to allow environment-specific
/// tuning.
pub(crate) fn backoff(min_delay: Duration) -> ExponentialBackoff {
    backon::BackoffBuilder::build(
        ExponentialBuilder::default()
            .with_jitter()
            .with_min_delay(min_delay)
            .without_max_times(),
    )
}

/// Sleep for `d` or return early if `shutdown` is triggered.
///
/// Returns `true` if a shutdown occurred.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<()>, d: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(d) => false,
        _ = shutdown.changed() => true,
    }
}

/// Log the failure of a supervised task at error level.
///
/// A task that returned `Ok(())` is not a failure and is not logged here.
pub(crate) fn log_task_failure(
    name: &str,
    res: &std::result::Result<anyhow::Result<()>, JoinError>,
) {
    match res {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(task = name, kind = "inner_error", error = %e, "Task failed");
        }
        Err(e) => {
            tracing::error!(task = name, kind = "join_error", error = %e, "Task failed");
        }
    }
}

/// Supervise a task that returns `Result<()>` and respawn it on failure.
///
/// On shutdown the task gets [`SHUTDOWN_GRACE`] to finish its own cleanup
/// before it is aborted.
async fn supervise_task<F, B>(
    name: &str,
    mut handle: JoinHandle<anyhow::Result<()>>,
    mut backoff: ExponentialBackoff,
    mut spawn_fn: F,
    mut shutdown: watch::Receiver<()>,
    mut backoff_builder: B,
) where
    F: FnMut() -> JoinHandle<anyhow::Result<()>>,
    B: FnMut() -> ExponentialBackoff,
{
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                    tracing::warn!(task = name, "did not stop in time; aborting");
                    handle.abort();
                }
                break;
            }
            res = &mut handle => {
                if matches!(res, Ok(Ok(()))) {
                    tracing::warn!(task = name, "exited");
                }
                log_task_failure(name, &res);
                let delay = backoff.next().unwrap_or(SHUTDOWN_GRACE);
                if sleep_or_shutdown(&mut shutdown, delay).await {
                    break;
                }
                backoff = backoff_builder();
                handle = spawn_fn();
            }
        }
    }
}

/// Convert SIGINT and SIGTERM into a shutdown request.
fn install_signal_handlers(state: Arc<ServerState>) {
    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGINT handler");
                state.lifecycle.request_shutdown();
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                state.lifecycle.request_shutdown();
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => tracing::info!("SIGINT received"),
            _ = sigterm.recv() => tracing::info!("SIGTERM received"),
        }
        state.lifecycle.request_shutdown();
    });
}

/// Start the daemon with the provided configuration.
///
/// Returns once the daemon has been stopped and its endpoint released.
///
/// # Errors
/// Fails without serving anything if the endpoint cannot be claimed, for
/// example because another daemon already answers on it.
pub async fn run(config: Config) -> Result<()> {
    let listener = prepare_listener(&config.socket_path)?;
    tracing::info!(socket = %config.socket_path.display(), "remvault listening");
    let cfg = Arc::new(config);
    let state = Arc::new(ServerState::new(&cfg));
    install_signal_handlers(state.clone());

    let shutdown = state.lifecycle.subscribe();
    let handle = tokio::spawn(serve(listener, cfg.clone(), state.clone(), shutdown.clone()));
    let min_delay = Duration::from_millis(cfg.restart_min_delay_ms);
    supervise_task(
        "listener",
        handle,
        backoff(min_delay),
        || spawn_listener(cfg.clone(), state.clone()),
        shutdown,
        || backoff(min_delay),
    )
    .await;

    // The listener normally unlinks the socket itself. Removing it again after
    // a successful release could delete the socket of a newer daemon.
    if !state.lifecycle.is_released() {
        release_endpoint(&cfg.socket_path);
        state.lifecycle.mark_released();
    }
    tracing::info!("remvault stopped");
    Ok(())
}

fn spawn_listener(cfg: Arc<Config>, state: Arc<ServerState>) -> JoinHandle<anyhow::Result<()>> {
    let shutdown = state.lifecycle.subscribe();
    tokio::spawn(run_listener(cfg, state, shutdown))
}
