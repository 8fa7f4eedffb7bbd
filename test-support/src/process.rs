//! Process helpers for lock and launch tests.

use std::process::Command;

/// Return the pid of a process that has already exited and been reaped.
///
/// Used to fabricate lock records left behind by a crashed launcher.
///
/// # Panics
/// Panics if `true` cannot be spawned.
#[expect(clippy::expect_used, reason = "simplify test setup")]
#[must_use]
pub fn dead_pid() -> u32 {
    let mut child = Command::new("true").spawn().expect("spawn `true`");
    let pid = child.id();
    child.wait().expect("wait for `true`");
    pid
}

/// Count non-overlapping occurrences of `needle` in `haystack`.
#[must_use]
pub fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
