//! Temporary daemon endpoints.
//!
//! Each test gets its own directory so sockets, lock files and daemon logs
//! never collide between concurrently running tests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A socket path inside a private temporary directory.
///
/// The directory, and everything a daemon left in it, is removed on drop.
#[derive(Debug)]
pub struct TempEndpoint {
    dir: TempDir,
    socket: PathBuf,
}

impl TempEndpoint {
    /// Create a fresh directory holding `vault.sock`.
    ///
    /// # Panics
    /// Panics if the temporary directory cannot be created.
    #[expect(clippy::expect_used, reason = "simplify test setup")]
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temporary directory");
        let socket = dir.path().join("vault.sock");
        Self { dir, socket }
    }

    /// Path of the socket.
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Directory containing the socket.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TempEndpoint {
    fn default() -> Self {
        Self::new()
    }
}
