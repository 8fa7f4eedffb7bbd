//! Utility helpers for asynchronous tests.
//!
//! Provides functions to synchronise with background tasks and processes.

use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Default number of polls when waiting for a socket file.
pub const SOCKET_RETRY_COUNT: u32 = 500;
/// Default pause between socket polls.
pub const SOCKET_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Wait for a file to appear within the given number of tries.
///
/// # Examples
///
/// ```rust,ignore
/// use std::path::Path;
/// use std::time::Duration;
/// use test_support::wait_for_file;
///
/// let path = Path::new("/tmp/example.sock");
/// let found = wait_for_file(path, 5, Duration::from_millis(10)).await;
/// assert!(found);
/// ```
pub async fn wait_for_file(path: &Path, tries: u32, delay: Duration) -> bool {
    for _ in 0..tries {
        if path.exists() {
            return true;
        }
        sleep(delay).await;
    }
    path.exists()
}

/// Wait for a file to disappear within the given number of tries.
pub async fn wait_for_removal(path: &Path, tries: u32, delay: Duration) -> bool {
    for _ in 0..tries {
        if !path.exists() {
            return true;
        }
        sleep(delay).await;
    }
    !path.exists()
}
