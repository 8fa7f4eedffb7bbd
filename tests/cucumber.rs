mod steps;
use cucumber::World as _;
use steps::{CliWorld, DispatchWorld, ListenerWorld};

#[tokio::main]
async fn main() {
    CliWorld::run("tests/features/cli.feature").await;
    ListenerWorld::run("tests/features/listener.feature").await;
    DispatchWorld::run("tests/features/dispatch.feature").await;
}
