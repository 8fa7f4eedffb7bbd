//! Entry point for the remvault daemon binary.
//! Serves wallet requests from `remcli` on a Unix socket until it receives a
//! `stop` request or a termination signal.

use remvault::config::Config;
use remvault::{daemon, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let config = Config::load()?;
    tracing::info!(pid = std::process::id(), "remvault starting");
    daemon::run(config).await?;
    Ok(())
}
