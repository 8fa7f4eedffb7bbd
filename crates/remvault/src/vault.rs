//! In-memory wallet registry and command execution.
//!
//! The registry only tracks wallet names. Key material and its storage format
//! are handled elsewhere; this module gives forwarded commands an observable
//! effect and decides which requests end the daemon.

use std::collections::BTreeSet;

use remvault_lib::{STOP_COMMAND, WalletRequest, WalletResponse};
use tokio::sync::Mutex;

/// Result of executing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Reply to send back to the client.
    pub response: WalletResponse,
    /// Whether the daemon must shut down after replying.
    pub shutdown: bool,
}

impl Execution {
    fn reply(response: WalletResponse) -> Self {
        Self {
            response,
            shutdown: false,
        }
    }
}

/// Wallet names known to this daemon instance.
#[derive(Debug, Default)]
pub struct Vault {
    wallets: Mutex<BTreeSet<String>>,
}

impl Vault {
    /// Create an empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute `request` against the registry.
    ///
    /// Unknown commands and malformed arguments produce an error response
    /// rather than an `Err`, so the client always receives a reply.
    pub async fn execute(&self, request: &WalletRequest) -> Execution {
        match request.command.as_str() {
            "list" => Execution::reply(WalletResponse::ok(self.list().await.join("\n"))),
            "create" => Execution::reply(self.create(&request.args).await),
            STOP_COMMAND => Execution {
                response: WalletResponse::ok("ok"),
                shutdown: true,
            },
            other => Execution::reply(WalletResponse::error(format!(
                "unknown wallet command: {other}"
            ))),
        }
    }

    /// Sorted wallet names.
    pub async fn list(&self) -> Vec<String> {
        self.wallets.lock().await.iter().cloned().collect()
    }

    async fn create(&self, args: &[String]) -> WalletResponse {
        let [name] = args else {
            return WalletResponse::error("usage: create <name>");
        };
        if name.trim().is_empty() {
            return WalletResponse::error("wallet name must not be empty");
        }
        if self.wallets.lock().await.insert(name.clone()) {
            tracing::info!(wallet = %name, "Wallet created");
            WalletResponse::ok(format!("Created wallet \"{name}\""))
        } else {
            WalletResponse::error(format!("wallet \"{name}\" already exists"))
        }
    }
}
