//! Top-level client flow: probe, optionally launch, forward, report.
//!
//! [`Dispatcher::run`] makes exactly one pass through
//! `Probing → (Launching) → Forwarding → Done | Failed`. Auto-launch is tried
//! at most once per invocation; whether it happened is part of the returned
//! [`Report`] rather than a log line, so callers can show or assert it.

use std::process::ExitCode;
use std::time::Duration;

use remvault_lib::{DAEMON_NAME, WalletRequest, WalletResponse};
use thiserror::Error;

use crate::client::{ClientError, send_request};
use crate::endpoint::EndpointDescriptor;
use crate::launcher::{
    DEFAULT_PROBE_TIMEOUT, LaunchFailure, LaunchOutcome, LaunchSettings, launch_and_wait,
};
use crate::probe::{ConnectError, ProbeResult, probe};

/// Word announcing a successful auto-launch in [`Report::message`].
pub const LAUNCH_CONFIRMATION: &str = "launched";

/// Default time the daemon may take to answer a forwarded command.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the dispatcher needs, resolved once at start-up.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub endpoint: EndpointDescriptor,
    pub probe_timeout: Duration,
    pub reply_timeout: Duration,
    pub launch: LaunchSettings,
}

impl DispatcherConfig {
    /// Configuration with default timeouts.
    #[must_use]
    pub fn new(endpoint: EndpointDescriptor, launch: LaunchSettings) -> Self {
        Self {
            endpoint,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            launch,
        }
    }
}

/// Terminal failure of one invocation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The daemon could not be reached and no launch was attempted, or the
    /// launched daemon stopped answering before the command was sent.
    #[error("Failed to connect to {} at {endpoint}: {source}", DAEMON_NAME)]
    Connect {
        endpoint: EndpointDescriptor,
        #[source]
        source: ConnectError,
    },
    /// Auto-launch was attempted and failed.
    #[error("Failed to connect to {} at {endpoint}: {source}", DAEMON_NAME)]
    Launch {
        endpoint: EndpointDescriptor,
        #[source]
        source: LaunchFailure,
    },
    /// Auto-launch was attempted but no daemon became reachable in time.
    #[error(
        "Failed to connect to {} at {endpoint}: {} not ready within {waited:?}",
        DAEMON_NAME,
        DAEMON_NAME
    )]
    ReadinessTimeout {
        endpoint: EndpointDescriptor,
        waited: Duration,
    },
    /// The exchange over an established connection failed.
    #[error(transparent)]
    Forward(#[from] ClientError),
    /// The daemon refused the command.
    #[error("{}: {0}", DAEMON_NAME)]
    Rejected(String),
}

/// Result of one invocation, ready to be shown to the user.
#[derive(Debug)]
pub struct Report {
    launched: bool,
    result: Result<String, DispatchError>,
}

impl Report {
    fn new(launched: bool, result: Result<String, DispatchError>) -> Self {
        Self { launched, result }
    }

    /// Whether this invocation spawned the daemon.
    #[must_use]
    pub fn launched(&self) -> bool {
        self.launched
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Command output for stdout, when the command succeeded.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }

    #[must_use]
    pub fn error(&self) -> Option<&DispatchError> {
        self.result.as_ref().err()
    }

    /// Diagnostics for stderr: the launch confirmation, if any, followed by
    /// the failure reason, if any. Empty for a plain success.
    #[must_use]
    pub fn message(&self) -> String {
        let mut lines = Vec::with_capacity(2);
        if self.launched {
            lines.push(format!("\"{DAEMON_NAME}\" {LAUNCH_CONFIRMATION}"));
        }
        if let Err(e) = &self.result {
            lines.push(e.to_string());
        }
        lines.join("\n")
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Drives wallet commands against the configured endpoint.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: DispatcherConfig,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Forward `request` to the daemon, launching it first when it is not
    /// reachable and `auto_launch` allows it.
    pub async fn run(&self, request: &WalletRequest, auto_launch: bool) -> Report {
        let endpoint = &self.config.endpoint;
        let first = probe(endpoint, self.config.probe_timeout).await;
        let (launched, connection) = match first {
            ProbeResult::Connected(stream) => (false, Ok(stream)),
            other if !auto_launch => {
                tracing::debug!(%endpoint, "Daemon unreachable and auto-launch disabled");
                (false, other.into_stream())
            }
            other => {
                tracing::debug!(%endpoint, probe = ?other, "Daemon unreachable; auto-launching");
                match launch_and_wait(endpoint, &self.config.launch).await {
                    LaunchOutcome::AlreadyRunning => (false, self.connect().await),
                    LaunchOutcome::LaunchedAndReady { pid } => {
                        tracing::info!(pid, "Daemon ready");
                        (true, self.connect().await)
                    }
                    LaunchOutcome::LaunchFailed(source) => {
                        let endpoint = endpoint.clone();
                        return Report::new(false, Err(DispatchError::Launch { endpoint, source }));
                    }
                    LaunchOutcome::TimedOutWaitingForReady { waited } => {
                        let endpoint = endpoint.clone();
                        return Report::new(
                            false,
                            Err(DispatchError::ReadinessTimeout { endpoint, waited }),
                        );
                    }
                }
            }
        };

        let stream = match connection {
            Ok(stream) => stream,
            Err(source) => {
                let endpoint = endpoint.clone();
                return Report::new(launched, Err(DispatchError::Connect { endpoint, source }));
            }
        };
        let result = match send_request(stream, request, self.config.reply_timeout).await {
            Ok(WalletResponse::Ok { output }) => Ok(output),
            Ok(WalletResponse::Error { message }) => Err(DispatchError::Rejected(message)),
            Err(e) => Err(e.into()),
        };
        Report::new(launched, result)
    }

    async fn connect(&self) -> Result<tokio::net::UnixStream, ConnectError> {
        probe(&self.config.endpoint, self.config.probe_timeout)
            .await
            .into_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::TempEndpoint;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    fn dispatcher(tmp: &TempEndpoint, program: &str) -> Dispatcher {
        let launch =
            LaunchSettings::new(program).with_ready_timeout(Duration::from_millis(300));
        Dispatcher::new(DispatcherConfig::new(
            EndpointDescriptor::new(tmp.socket()),
            launch,
        ))
    }

    /// Serve one connection with `reply`, ignoring probes.
    fn fake_daemon(tmp: &TempEndpoint, reply: WalletResponse) -> tokio::task::JoinHandle<WalletRequest> {
        let listener = UnixListener::bind(tmp.socket()).expect("bind");
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.expect("accept");
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).await.expect("read");
                if buf.is_empty() {
                    continue;
                }
                let payload = serde_json::to_vec(&reply).expect("serialise");
                stream.write_all(&payload).await.expect("write");
                return serde_json::from_slice(&buf).expect("deserialise");
            }
        })
    }

    #[tokio::test]
    async fn unreachable_without_auto_launch_fails_to_connect() {
        let tmp = TempEndpoint::new();
        let report = dispatcher(&tmp, "/nonexistent/remvault-binary")
            .run(&WalletRequest::new("list"), false)
            .await;
        assert!(!report.is_success());
        assert!(!report.launched());
        assert!(matches!(
            report.error(),
            Some(DispatchError::Connect {
                source: ConnectError::Refused,
                ..
            })
        ));
        assert!(report.message().starts_with("Failed to connect to remvault at "));
        assert!(!report.message().contains(LAUNCH_CONFIRMATION));
        assert!(!tmp.socket().with_extension("sock.lock").exists());
    }

    #[tokio::test]
    async fn running_daemon_gets_the_command() {
        let tmp = TempEndpoint::new();
        let daemon = fake_daemon(&tmp, WalletResponse::ok("alpha"));
        let report = dispatcher(&tmp, "/nonexistent/remvault-binary")
            .run(&WalletRequest::new("list"), true)
            .await;
        assert!(report.is_success());
        assert_eq!(report.output(), Some("alpha"));
        assert_eq!(report.message(), "");
        assert_eq!(daemon.await.expect("join"), WalletRequest::new("list"));
    }

    #[tokio::test]
    async fn rejected_command_fails() {
        let tmp = TempEndpoint::new();
        let _daemon = fake_daemon(&tmp, WalletResponse::error("unknown wallet command: x"));
        let report = dispatcher(&tmp, "/nonexistent/remvault-binary")
            .run(&WalletRequest::new("x"), false)
            .await;
        assert!(matches!(report.error(), Some(DispatchError::Rejected(_))));
        assert!(report.message().contains("unknown wallet command: x"));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_without_confirmation() {
        let tmp = TempEndpoint::new();
        let report = dispatcher(&tmp, "/nonexistent/remvault-binary")
            .run(&WalletRequest::new("list"), true)
            .await;
        assert!(matches!(
            report.error(),
            Some(DispatchError::Launch {
                source: LaunchFailure::Spawn { .. },
                ..
            })
        ));
        assert!(!report.launched());
        assert!(!report.message().contains(LAUNCH_CONFIRMATION));
    }

    #[tokio::test]
    async fn never_ready_daemon_is_a_readiness_failure() {
        let tmp = TempEndpoint::new();
        let mut dispatcher = dispatcher(&tmp, "sh");
        dispatcher.config.launch = dispatcher
            .config
            .launch
            .clone()
            .with_args(["-c", "sleep 2", "sh"]);
        let report = dispatcher.run(&WalletRequest::new("list"), true).await;
        assert!(matches!(
            report.error(),
            Some(DispatchError::ReadinessTimeout { .. })
        ));
        assert_eq!(report.exit_code(), ExitCode::FAILURE);
    }

    #[test]
    fn launch_confirmation_appears_once_in_message() {
        let report = Report::new(true, Ok(String::new()));
        assert_eq!(report.message().matches(LAUNCH_CONFIRMATION).count(), 1);
        assert_eq!(report.exit_code(), ExitCode::SUCCESS);
    }
}
