//! A scripted stand-in for the `remvault` binary.
//!
//! Client tests cannot depend on the daemon crate's binary, so they launch a
//! shell script instead. Each run of the script appends a line to a spawn
//! log and then idles. A helper thread in the test process notices the first
//! spawn, binds the endpoint and answers every request with an empty success.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::TempEndpoint;

const REPLY: &[u8] = br#"{"status":"ok","output":""}"#;
const SPAWN_WAIT: Duration = Duration::from_secs(10);
const SPAWN_POLL: Duration = Duration::from_millis(10);

/// A daemon executable that records how often it was started.
#[derive(Debug)]
pub struct StandInDaemon {
    script: PathBuf,
    spawns: PathBuf,
}

impl StandInDaemon {
    /// Write the script into the endpoint directory and start the helper
    /// that serves `endpoint` once the script has run.
    ///
    /// # Panics
    /// Panics if the script cannot be written.
    #[expect(clippy::expect_used, reason = "simplify test setup")]
    #[must_use]
    pub fn install(endpoint: &TempEndpoint) -> Self {
        let script = endpoint.dir().join("remvault-stand-in");
        let spawns = endpoint.dir().join("spawns.log");
        let body = format!(
            "#!/bin/sh\necho \"$$\" >> '{}'\nexec sleep 10\n",
            spawns.display()
        );
        fs::write(&script, body).expect("write stand-in script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
            .expect("make stand-in executable");

        let socket = endpoint.socket().to_path_buf();
        let marker = spawns.clone();
        thread::spawn(move || serve_after_spawn(&marker, &socket));
        Self { script, spawns }
    }

    /// Path to pass as the daemon binary.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.script
    }

    /// How many times the script has been started.
    #[must_use]
    pub fn spawn_count(&self) -> usize {
        fs::read_to_string(&self.spawns)
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }
}

fn serve_after_spawn(marker: &Path, socket: &Path) {
    let deadline = Instant::now() + SPAWN_WAIT;
    while !marker.exists() {
        if Instant::now() >= deadline {
            return;
        }
        thread::sleep(SPAWN_POLL);
    }
    let Ok(listener) = UnixListener::bind(socket) else {
        return;
    };
    for stream in listener.incoming().flatten() {
        thread::spawn(move || answer(stream));
    }
}

fn answer(mut stream: UnixStream) {
    let mut request = Vec::new();
    if stream.read_to_end(&mut request).is_ok() && !request.is_empty() {
        let _ = stream.write_all(REPLY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stand_in_has_not_been_spawned() {
        let endpoint = TempEndpoint::new();
        let daemon = StandInDaemon::install(&endpoint);
        assert_eq!(daemon.spawn_count(), 0);
        let mode = fs::metadata(daemon.program())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
