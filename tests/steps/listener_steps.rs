//! Behavioural test steps for the daemon listener.
#![expect(clippy::expect_used, reason = "simplify test failure output")]
#![expect(clippy::unwrap_used, reason = "simplify test failure output")]

use std::sync::Arc;
use std::time::Duration;

use cucumber::World;
use cucumber::{given, then, when};
use test_support::{SOCKET_RETRY_COUNT, SOCKET_RETRY_DELAY, TempEndpoint, wait_for_file};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use remcli::client::send_request;
use remcli::probe::{ProbeResult, probe};
use remcli::EndpointDescriptor;
use remvault::config::Config;
use remvault::listener::{ServerState, run_listener};
use remvault_lib::{WalletRequest, WalletResponse};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default, World)]
pub struct ListenerWorld {
    endpoint: Option<TempEndpoint>,
    state: Option<Arc<ServerState>>,
    handle: Option<tokio::task::JoinHandle<()>>,
    reply: Option<WalletResponse>,
}

impl std::fmt::Debug for ListenerWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerWorld").finish()
    }
}

impl ListenerWorld {
    fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor::new(self.endpoint.as_ref().unwrap().socket())
    }
}

#[given("a running listener task")]
async fn running_listener(world: &mut ListenerWorld) {
    let endpoint = TempEndpoint::new();
    let cfg = Arc::new(Config::for_socket(endpoint.socket()));
    let state = Arc::new(ServerState::new(&cfg));
    let shutdown = state.lifecycle.subscribe();
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        run_listener(cfg, task_state, shutdown).await.unwrap();
    });
    assert!(
        wait_for_file(endpoint.socket(), SOCKET_RETRY_COUNT, SOCKET_RETRY_DELAY).await,
        "socket file {} not created within timeout",
        endpoint.socket().display()
    );
    world.endpoint = Some(endpoint);
    world.state = Some(state);
    world.handle = Some(handle);
}

#[when(regex = r#"^a client sends \"(.+)\"$"#)]
async fn client_sends(world: &mut ListenerWorld, line: String) {
    let mut words = line.split_whitespace();
    let command = words.next().expect("command word");
    let request = WalletRequest::new(command).with_args(words);
    let stream = UnixStream::connect(world.descriptor().socket())
        .await
        .expect("connect");
    let reply = send_request(stream, &request, REPLY_TIMEOUT)
        .await
        .expect("exchange");
    world.reply = Some(reply);
}

#[when("a client sends invalid JSON")]
async fn client_sends_invalid(world: &mut ListenerWorld) {
    let mut stream = UnixStream::connect(world.descriptor().socket())
        .await
        .expect("connect");
    stream.write_all(b"not json").await.unwrap();
    stream.shutdown().await.expect("shutdown");
    let mut buf = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut buf)
        .await
        .expect("read");
    world.reply = Some(serde_json::from_slice(&buf).expect("deserialise"));
}

#[then(regex = r#"^the reply is \"(.*)\"$"#)]
fn reply_is(world: &mut ListenerWorld, expected: String) {
    assert_eq!(world.reply.take(), Some(WalletResponse::ok(expected)));
}

#[then(regex = r#"^the reply is an error mentioning \"(.+)\"$"#)]
fn reply_is_error(world: &mut ListenerWorld, needle: String) {
    match world.reply.take() {
        Some(WalletResponse::Error { message }) => assert!(message.contains(&needle)),
        other => panic!("expected error reply, got {other:?}"),
    }
}

#[then("the listener is still running")]
async fn listener_still_running(world: &mut ListenerWorld) {
    assert!(probe(&world.descriptor(), REPLY_TIMEOUT).await.is_connected());
}

#[then("no daemon is listening")]
async fn no_daemon_listening(world: &mut ListenerWorld) {
    assert!(matches!(
        probe(&world.descriptor(), REPLY_TIMEOUT).await,
        ProbeResult::RefusedNoListener
    ));
    assert!(!world.descriptor().socket().exists());
}

impl Drop for ListenerWorld {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.lifecycle.request_shutdown();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
