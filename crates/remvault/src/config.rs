//! Configuration loading for the remvault daemon.
//!
//! The configuration is read from `/etc/remvault/config.toml` when that file
//! exists. Values may be overridden by environment variables using the
//! `REMVAULT_` prefix and by command-line flags. Auto-launched daemons usually
//! run without a file, so every key has a default.

use clap::Parser;
use figment::Figment;
use figment::providers::Env;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default minimum delay between listener restarts in milliseconds.
const DEFAULT_RESTART_MIN_DELAY_MS: u64 = 100;
/// Default time allowed for a client to send its request, in seconds.
const DEFAULT_CLIENT_READ_TIMEOUT_SECS: u64 = 5;

/// Runtime configuration for the daemon.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct Config {
    /// Path to the Unix Domain Socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Minimum delay in milliseconds applied between listener restarts.
    #[serde(default = "default_restart_min_delay_ms")]
    pub restart_min_delay_ms: u64,
    /// Seconds a client may take to send its request before it is dropped.
    #[serde(default = "default_client_read_timeout_secs")]
    pub client_read_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            restart_min_delay_ms: DEFAULT_RESTART_MIN_DELAY_MS,
            client_read_timeout_secs: DEFAULT_CLIENT_READ_TIMEOUT_SECS,
        }
    }
}

/// Command-line overrides for configuration values.
#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "remvault", about = "Wallet daemon serving remcli requests")]
struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE", default_value = Config::DEFAULT_PATH)]
    config: PathBuf,
    /// Override the Unix Domain Socket path.
    #[arg(long)]
    socket_path: Option<PathBuf>,
}

fn default_socket_path() -> PathBuf {
    remvault_lib::default_socket_path()
}

fn default_restart_min_delay_ms() -> u64 {
    DEFAULT_RESTART_MIN_DELAY_MS
}

fn default_client_read_timeout_secs() -> u64 {
    DEFAULT_CLIENT_READ_TIMEOUT_SECS
}

impl Config {
    /// Default location of the daemon configuration file.
    pub const DEFAULT_PATH: &'static str = "/etc/remvault/config.toml";

    /// Build a default configuration serving `socket_path`.
    #[must_use]
    pub fn for_socket(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }

    /// Load the configuration using command-line overrides and environment
    /// variables.
    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    pub fn load() -> Result<Self, ortho_config::OrthoError> {
        let args = CliArgs::parse();
        Self::from_file_with_cli(&args.config, &args)
    }

    /// Load the configuration from `path`, merging `REMVAULT_*` environment
    /// variables over file values. A missing file yields the defaults.
    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    pub fn from_file(path: &Path) -> Result<Self, ortho_config::OrthoError> {
        Self::from_file_with_cli(path, &CliArgs::default())
    }

    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    fn from_file_with_cli(path: &Path, cli: &CliArgs) -> Result<Self, ortho_config::OrthoError> {
        let fig = ortho_config::load_config_file(path)?.unwrap_or_else(Figment::new);
        let fig = fig.merge(Env::prefixed("REMVAULT_").split("__"));
        let mut cfg: Self = fig.extract().map_err(ortho_config::OrthoError::from)?;

        if let Some(socket) = &cli.socket_path {
            cfg.socket_path = socket.clone();
        }
        Ok(cfg)
    }
}
