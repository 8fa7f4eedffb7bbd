//! Where the daemon listens.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the auto-launched daemon's log, next to the socket.
const LOG_FILE_NAME: &str = "remvault.log";

/// Immutable description of a daemon endpoint.
///
/// The socket path is the only input; the launch lock and the daemon log are
/// derived from it so every client targeting the same socket coordinates on
/// the same files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointDescriptor {
    socket: PathBuf,
}

impl EndpointDescriptor {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// The process-wide default endpoint shared with the daemon.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(remvault_lib::default_socket_path())
    }

    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Lock file arbitrating launch rights, `<socket>.lock`.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.socket.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Log file receiving an auto-launched daemon's output.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.socket
            .parent()
            .map_or_else(|| PathBuf::from(LOG_FILE_NAME), |dir| dir.join(LOG_FILE_NAME))
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket.display())
    }
}
