//! Auto-launching the daemon.
//!
//! [`launch_and_wait`] takes the endpoint's launch right, spawns the daemon
//! detached from the client and polls the endpoint until it accepts
//! connections. Clients that lose the race for the launch right never spawn;
//! they poll instead, and take the right over if its holder turns out to have
//! crashed.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use backon::{ExponentialBackoff, ExponentialBuilder};
use remvault_lib::DAEMON_NAME;
use thiserror::Error;
use tokio::time::Instant;

use crate::endpoint::EndpointDescriptor;
use crate::lock::{Acquisition, DEFAULT_STALE_AFTER, LaunchGuard, LaunchLock, LockError};
use crate::probe::probe;

/// How long a freshly spawned daemon may take to accept connections.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
/// Time budget of a single connection attempt.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const POLL_MIN_DELAY: Duration = Duration::from_millis(10);
const POLL_MAX_DELAY: Duration = Duration::from_millis(250);

/// How to start the daemon and how long to wait for it.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// Daemon executable.
    pub program: PathBuf,
    /// Arguments placed before the `--socket-path <endpoint>` pair.
    pub args: Vec<OsString>,
    pub ready_timeout: Duration,
    pub probe_timeout: Duration,
    /// Grace period after which a held launch lock counts as abandoned.
    pub stale_after: Duration,
    pub poll_min_delay: Duration,
    pub poll_max_delay: Duration,
}

impl LaunchSettings {
    /// Settings with default timeouts for launching `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            stale_after: DEFAULT_STALE_AFTER,
            poll_min_delay: POLL_MIN_DELAY,
            poll_max_delay: POLL_MAX_DELAY,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_stale_after(mut self, grace: Duration) -> Self {
        self.stale_after = grace;
        self
    }

    fn poll_backoff(&self) -> ExponentialBackoff {
        backon::BackoffBuilder::build(
            ExponentialBuilder::default()
                .with_jitter()
                .with_min_delay(self.poll_min_delay)
                .with_max_delay(self.poll_max_delay)
                .without_max_times(),
        )
    }
}

/// Why an auto-launch attempt failed outright.
#[derive(Debug, Error)]
pub enum LaunchFailure {
    /// The daemon process could not be started. Never retried.
    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The daemon started but exited before accepting connections.
    #[error("{} exited before accepting connections ({status})", DAEMON_NAME)]
    ExitedEarly { status: ExitStatus },
    /// The launch right could not be arbitrated.
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// What an auto-launch attempt achieved.
#[derive(Debug)]
pub enum LaunchOutcome {
    /// A daemon was already reachable; nothing was spawned by this client.
    AlreadyRunning,
    /// This client spawned the daemon with `pid` and it accepts connections.
    LaunchedAndReady { pid: u32 },
    LaunchFailed(LaunchFailure),
    /// No daemon became reachable within the readiness timeout. A daemon this
    /// client spawned is left running; it may just be slow.
    TimedOutWaitingForReady { waited: Duration },
}

/// A spawned daemon process, owned by the launcher until it is ready.
#[derive(Debug)]
pub struct DaemonHandle {
    child: Child,
}

impl DaemonHandle {
    /// Start the daemon for `endpoint` in its own session.
    ///
    /// Stdin is closed; stdout and stderr go to the endpoint's log file so the
    /// daemon holds no pipe of the client open.
    ///
    /// # Errors
    /// Returns [`LaunchFailure::Spawn`] if the process cannot be created.
    pub fn spawn(
        endpoint: &EndpointDescriptor,
        settings: &LaunchSettings,
    ) -> Result<Self, LaunchFailure> {
        let (stdout, stderr) = log_stdio(&endpoint.log_path());
        let mut command = Command::new(&settings.program);
        command
            .args(&settings.args)
            .arg("--socket-path")
            .arg(endpoint.socket())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        // SAFETY: `detach_session` only calls `setsid`, which is
        // async-signal-safe.
        unsafe {
            command.pre_exec(detach_session);
        }
        let child = command.spawn().map_err(|source| LaunchFailure::Spawn {
            program: settings.program.clone(),
            source,
        })?;
        Ok(Self { child })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    fn exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to poll daemon process");
                None
            }
        }
    }

    /// Give up ownership; the daemon keeps running on its own.
    fn release(self) -> u32 {
        self.child.id()
    }
}

/// Run the daemon in a new session so it outlives the client, its terminal
/// and its process group.
fn detach_session() -> io::Result<()> {
    // SAFETY: `setsid` has no preconditions.
    if unsafe { libc::setsid() } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn log_stdio(path: &Path) -> (Stdio, Stdio) {
    let opened = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(path))
        .and_then(|file| Ok((file.try_clone()?, file)));
    match opened {
        Ok((out, err)) => (Stdio::from(out), Stdio::from(err)),
        Err(e) => {
            tracing::debug!(log = %path.display(), error = %e, "Discarding daemon output");
            (Stdio::null(), Stdio::null())
        }
    }
}

enum LaunchRight {
    Granted(LaunchGuard),
    DaemonUp,
    TimedOut(Duration),
}

enum Readiness {
    Ready,
    Exited(ExitStatus),
    TimedOut(Duration),
}

/// Make sure a daemon serves `endpoint`, spawning one if this client wins
/// the launch right.
///
/// The launch right is released on every path before this returns.
pub async fn launch_and_wait(
    endpoint: &EndpointDescriptor,
    settings: &LaunchSettings,
) -> LaunchOutcome {
    let lock = LaunchLock::for_endpoint(endpoint, settings.stale_after);
    let guard = match acquire_or_wait(endpoint, &lock, settings).await {
        Ok(LaunchRight::Granted(guard)) => guard,
        Ok(LaunchRight::DaemonUp) => return LaunchOutcome::AlreadyRunning,
        Ok(LaunchRight::TimedOut(waited)) => {
            return LaunchOutcome::TimedOutWaitingForReady { waited };
        }
        Err(e) => return LaunchOutcome::LaunchFailed(e.into()),
    };

    // The previous holder may have brought a daemon up after our first probe.
    if probe(endpoint, settings.probe_timeout).await.is_connected() {
        return LaunchOutcome::AlreadyRunning;
    }

    let mut handle = match DaemonHandle::spawn(endpoint, settings) {
        Ok(handle) => handle,
        Err(e) => return LaunchOutcome::LaunchFailed(e),
    };
    tracing::info!(pid = handle.pid(), endpoint = %endpoint, "Spawned {DAEMON_NAME}");

    let outcome = match wait_until_ready(endpoint, settings, &mut handle).await {
        Readiness::Ready => LaunchOutcome::LaunchedAndReady {
            pid: handle.release(),
        },
        Readiness::Exited(status) => {
            LaunchOutcome::LaunchFailed(LaunchFailure::ExitedEarly { status })
        }
        Readiness::TimedOut(waited) => {
            tracing::warn!(pid = handle.release(), "{DAEMON_NAME} not ready; leaving it running");
            LaunchOutcome::TimedOutWaitingForReady { waited }
        }
    };
    if let Err(e) = guard.release() {
        tracing::warn!(error = %e, "Failed to release launch lock");
    }
    outcome
}

/// Take the launch right, or wait for whoever holds it to bring the daemon up.
async fn acquire_or_wait(
    endpoint: &EndpointDescriptor,
    lock: &LaunchLock,
    settings: &LaunchSettings,
) -> Result<LaunchRight, LockError> {
    let deadline = Instant::now() + settings.ready_timeout;
    let mut delays = settings.poll_backoff();
    loop {
        match lock.try_acquire()? {
            Acquisition::Acquired(guard) => return Ok(LaunchRight::Granted(guard)),
            Acquisition::AlreadyHeld(owner) => {
                tracing::debug!(?owner, "Another client is launching {DAEMON_NAME}");
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(LaunchRight::TimedOut(settings.ready_timeout));
        }
        let delay = delays.next().unwrap_or(settings.poll_max_delay);
        tokio::time::sleep(delay.min(deadline - now)).await;
        if probe(endpoint, settings.probe_timeout).await.is_connected() {
            return Ok(LaunchRight::DaemonUp);
        }
    }
}

async fn wait_until_ready(
    endpoint: &EndpointDescriptor,
    settings: &LaunchSettings,
    handle: &mut DaemonHandle,
) -> Readiness {
    let deadline = Instant::now() + settings.ready_timeout;
    let mut delays = settings.poll_backoff();
    loop {
        if probe(endpoint, settings.probe_timeout).await.is_connected() {
            return Readiness::Ready;
        }
        if let Some(status) = handle.exit_status() {
            return Readiness::Exited(status);
        }
        let now = Instant::now();
        if now >= deadline {
            return Readiness::TimedOut(settings.ready_timeout);
        }
        let delay = delays.next().unwrap_or(settings.poll_max_delay);
        tokio::time::sleep(delay.min(deadline - now)).await;
    }
}
