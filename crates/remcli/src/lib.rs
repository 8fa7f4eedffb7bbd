//! Library for the `remcli` wallet client.
//!
//! The client forwards wallet commands to the `remvault` daemon over a Unix
//! socket, starting the daemon on demand when nothing is listening.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use remvault_lib::{DAEMON_NAME, WalletRequest, default_socket_path};

pub mod client;
pub mod dispatch;
pub mod endpoint;
pub mod launcher;
pub mod lock;
pub mod probe;

pub use dispatch::{DispatchError, Dispatcher, DispatcherConfig, Report};
pub use endpoint::EndpointDescriptor;
pub use launcher::{LaunchOutcome, LaunchSettings};
pub use probe::{ProbeResult, probe};

/// Command line arguments for the `remcli` client.
#[derive(Debug, Clone, Parser)]
#[command(name = "remcli", about = "Send wallet commands to the remvault daemon")]
pub struct Args {
    /// Path to the daemon's Unix Domain Socket.
    #[arg(long, default_value_os_t = default_socket_path())]
    pub socket: PathBuf,

    /// Fail instead of starting the daemon when it is not running.
    #[arg(long = "no-auto-remvault")]
    pub no_auto_remvault: bool,

    /// Daemon executable to start. Defaults to `remvault` next to this
    /// binary, then `remvault` on `PATH`.
    #[arg(long)]
    pub remvault_binary: Option<PathBuf>,

    /// How long to wait for a started daemon to accept connections.
    #[arg(long, default_value_t = 5000)]
    pub ready_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a wallet command in the daemon.
    Wallet(WalletArgs),
}

#[derive(Debug, Clone, ClapArgs)]
pub struct WalletArgs {
    /// Command name, e.g. `list`, `create` or `stop`.
    pub command: String,

    /// Arguments passed to the command unchanged.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Args {
    /// The request to forward.
    #[must_use]
    pub fn request(&self) -> WalletRequest {
        match &self.command {
            Command::Wallet(wallet) => {
                WalletRequest::new(wallet.command.clone()).with_args(wallet.args.clone())
            }
        }
    }

    #[must_use]
    pub fn auto_launch(&self) -> bool {
        !self.no_auto_remvault
    }

    /// Resolve every setting the dispatcher needs.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let program = self
            .remvault_binary
            .clone()
            .unwrap_or_else(resolve_daemon_binary);
        let launch = LaunchSettings::new(program)
            .with_ready_timeout(Duration::from_millis(self.ready_timeout_ms));
        DispatcherConfig::new(EndpointDescriptor::new(self.socket.clone()), launch)
    }
}

/// `remvault` next to the running executable if present, otherwise the bare
/// name for a `PATH` lookup.
fn resolve_daemon_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DAEMON_NAME)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(DAEMON_NAME))
}

/// Forward the command described by `args`, launching the daemon if needed.
///
/// # Examples
///
/// ```no_run
/// # use clap::Parser;
/// # async fn try_run() {
/// let args = remcli::Args::parse_from(["remcli", "wallet", "list"]);
/// let report = remcli::run(&args).await;
/// assert!(report.is_success());
/// # }
/// ```
pub async fn run(args: &Args) -> Report {
    Dispatcher::new(args.dispatcher_config())
        .run(&args.request(), args.auto_launch())
        .await
}
