//! Bounded-time liveness probes against a daemon endpoint.
//!
//! A probe is a single connection attempt. It distinguishes "nothing is
//! listening" from "something is listening but did not accept in time" from
//! any other I/O failure. Retrying is the caller's business.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UnixStream;

use crate::endpoint::EndpointDescriptor;

/// Outcome of one connection attempt.
#[derive(Debug)]
pub enum ProbeResult {
    /// A daemon accepted the connection. Dropping the stream closes it; keep
    /// it to reuse the connection for a request.
    Connected(UnixStream),
    /// No socket file, or nobody bound to it.
    RefusedNoListener,
    /// A listener exists but did not accept within the time budget.
    TimedOut(Duration),
    /// Any other failure, e.g. permission denied.
    OtherIoError(io::Error),
}

/// Why an endpoint could not be reached.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no daemon is listening")]
    Refused,
    #[error("daemon did not accept the connection within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProbeResult {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Keep the connection, or turn the failure into a [`ConnectError`].
    ///
    /// # Errors
    /// Returns the classified reason when the probe did not connect.
    pub fn into_stream(self) -> Result<UnixStream, ConnectError> {
        match self {
            Self::Connected(stream) => Ok(stream),
            Self::RefusedNoListener => Err(ConnectError::Refused),
            Self::TimedOut(after) => Err(ConnectError::Timeout(after)),
            Self::OtherIoError(e) => Err(ConnectError::Io(e)),
        }
    }
}

/// Try to connect to `endpoint` within `timeout`.
///
/// A full accept backlog (`EAGAIN`) means a listener exists but is not keeping
/// up, so it is reported as [`ProbeResult::TimedOut`] like a slow accept.
pub async fn probe(endpoint: &EndpointDescriptor, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, UnixStream::connect(endpoint.socket())).await {
        Ok(Ok(stream)) => ProbeResult::Connected(stream),
        Ok(Err(e)) => classify(e, timeout),
        Err(_) => ProbeResult::TimedOut(timeout),
    }
}

fn classify(error: io::Error, timeout: Duration) -> ProbeResult {
    match error.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
            ProbeResult::RefusedNoListener
        }
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ProbeResult::TimedOut(timeout),
        _ => ProbeResult::OtherIoError(error),
    }
}
