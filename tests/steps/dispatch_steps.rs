//! Behavioural test steps for the client dispatcher.
//!
//! Daemons here run in-process or not at all; scenarios that spawn the real
//! binary live in the daemon crate's integration tests.
#![expect(clippy::expect_used, reason = "simplify test failure output")]
#![expect(clippy::unwrap_used, reason = "simplify test failure output")]

use std::sync::Arc;
use std::time::Duration;

use cucumber::{World, given, then, when};
use test_support::{SOCKET_RETRY_COUNT, SOCKET_RETRY_DELAY, TempEndpoint, wait_for_file};

use remcli::{Dispatcher, DispatcherConfig, EndpointDescriptor, LaunchSettings, Report};
use remvault::config::Config;
use remvault::listener::{ServerState, run_listener};
use remvault_lib::WalletRequest;

#[derive(World)]
pub struct DispatchWorld {
    endpoint: TempEndpoint,
    binary: String,
    daemon: Option<(Arc<ServerState>, tokio::task::JoinHandle<()>)>,
    report: Option<Report>,
}

impl Default for DispatchWorld {
    fn default() -> Self {
        Self {
            endpoint: TempEndpoint::new(),
            binary: "/nonexistent/remvault".to_owned(),
            daemon: None,
            report: None,
        }
    }
}

impl std::fmt::Debug for DispatchWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchWorld")
            .field("socket", &self.endpoint.socket())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl DispatchWorld {
    fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor::new(self.endpoint.socket())
    }

    fn report(&self) -> &Report {
        self.report.as_ref().expect("the client has not run yet")
    }
}

#[given("an endpoint with no daemon")]
fn endpoint_with_no_daemon(world: &mut DispatchWorld) {
    assert!(!world.endpoint.socket().exists());
}

#[given("an endpoint served by a daemon")]
async fn endpoint_served(world: &mut DispatchWorld) {
    let cfg = Arc::new(Config::for_socket(world.endpoint.socket()));
    let state = Arc::new(ServerState::new(&cfg));
    let shutdown = state.lifecycle.subscribe();
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        run_listener(cfg, task_state, shutdown).await.unwrap();
    });
    assert!(
        wait_for_file(world.endpoint.socket(), SOCKET_RETRY_COUNT, SOCKET_RETRY_DELAY).await
    );
    world.daemon = Some((state, handle));
}

#[given(regex = r#"^the daemon binary is \"(.+)\"$"#)]
fn daemon_binary_is(world: &mut DispatchWorld, binary: String) {
    world.binary = binary;
}

#[when(regex = r#"^the client runs \"(.+)\" (with|without) auto-launch$"#)]
async fn client_runs(world: &mut DispatchWorld, command: String, mode: String) {
    let launch = LaunchSettings::new(&world.binary).with_ready_timeout(Duration::from_secs(1));
    let dispatcher = Dispatcher::new(DispatcherConfig::new(world.descriptor(), launch));
    let report = dispatcher
        .run(&WalletRequest::new(command), mode == "with")
        .await;
    world.report = Some(report);
}

#[then("the command succeeds")]
fn command_succeeds(world: &mut DispatchWorld) {
    let report = world.report();
    assert!(report.is_success(), "{}", report.message());
}

#[then("the command fails")]
fn command_fails(world: &mut DispatchWorld) {
    assert!(!world.report().is_success());
}

#[then(regex = r#"^the message contains \"(.+)\"$"#)]
fn message_contains(world: &mut DispatchWorld, needle: String) {
    let message = world.report().message();
    assert!(message.contains(&needle), "{message}");
}

#[then(regex = r#"^the message does not contain \"(.+)\"$"#)]
fn message_lacks(world: &mut DispatchWorld, needle: String) {
    let message = world.report().message();
    assert!(!message.contains(&needle), "{message}");
}

#[then("the launch lock is free")]
fn launch_lock_free(world: &mut DispatchWorld) {
    assert!(!world.descriptor().lock_path().exists());
}

impl Drop for DispatchWorld {
    fn drop(&mut self) {
        if let Some((state, handle)) = self.daemon.take() {
            state.lifecycle.request_shutdown();
            handle.abort();
        }
    }
}
