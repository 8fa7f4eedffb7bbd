//! Shared types for the remvault project.
//!
//! This library defines the wire protocol exchanged between the `remcli`
//! client and the `remvault` daemon, and the well-known endpoint both sides
//! default to.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the daemon binary and of the service in user-facing messages.
pub const DAEMON_NAME: &str = "remvault";

/// Wallet command that asks the daemon to shut down gracefully.
pub const STOP_COMMAND: &str = "stop";

/// File name of the daemon socket inside its runtime directory.
const SOCKET_FILE_NAME: &str = "remvault.sock";

/// Default Unix Domain Socket path for the remvault daemon.
///
/// Shared by the daemon and CLI to avoid configuration drift. The socket
/// lives in `$XDG_RUNTIME_DIR/remvault/` when that variable is set and in the
/// system temporary directory otherwise.
///
/// # Examples
///
/// ```
/// let path = remvault_lib::default_socket_path();
/// assert!(path.ends_with("remvault/remvault.sock"));
/// ```
#[must_use]
pub fn default_socket_path() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map_or_else(std::env::temp_dir, PathBuf::from);
    base.join(DAEMON_NAME).join(SOCKET_FILE_NAME)
}

/// Request sent from the client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletRequest {
    /// Wallet command name, e.g. `list` or `stop`.
    pub command: String,
    /// Positional arguments forwarded verbatim.
    #[serde(default)]
    pub args: Vec<String>,
}

impl WalletRequest {
    /// Build a request without arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Append positional arguments to the request.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether this request asks the daemon to stop.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        self.command == STOP_COMMAND
    }
}

/// Reply sent from the daemon to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WalletResponse {
    /// The command succeeded; `output` is printed by the client.
    Ok { output: String },
    /// The command was rejected by the daemon.
    Error { message: String },
}

impl WalletResponse {
    /// Successful reply carrying `output`.
    pub fn ok(output: impl Into<String>) -> Self {
        Self::Ok {
            output: output.into(),
        }
    }

    /// Failed reply carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
