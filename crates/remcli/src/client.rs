//! Client-side communication with the `remvault` daemon.
//!
//! This module serialises a wallet request, sends it over an established
//! connection and reads the daemon's reply. Locating or starting the daemon
//! is the dispatcher's job; by the time this runs the connection exists.

use std::time::Duration;

use remvault_lib::{WalletRequest, WalletResponse};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Largest reply accepted from the daemon.
const MAX_REPLY_BYTES: u64 = 1024 * 1024;

/// Errors that can occur while exchanging a request with the daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Serialising the request failed.
    #[error("failed to serialise request: {0}")]
    Serialise(#[source] serde_json::Error),
    /// Writing the request to the socket failed.
    #[error("failed to write to daemon: {0}")]
    Write(#[source] std::io::Error),
    /// Reading the reply failed.
    #[error("failed to read reply from daemon: {0}")]
    Read(#[source] std::io::Error),
    /// The daemon did not answer in time.
    #[error("daemon did not reply within {0:?}")]
    Timeout(Duration),
    /// The connection closed before any reply arrived.
    #[error("daemon closed the connection without replying")]
    NoReply,
    /// The reply was not a valid response document.
    #[error("failed to parse reply from daemon: {0}")]
    Deserialise(#[source] serde_json::Error),
}

/// Send `request` over `stream` and wait up to `reply_timeout` for the reply.
///
/// # Examples
///
/// ```no_run
/// # use remcli::client::{ClientError, send_request};
/// # use remvault_lib::WalletRequest;
/// # use std::time::Duration;
/// # async fn try_send() -> Result<(), ClientError> {
/// let stream = tokio::net::UnixStream::connect("/tmp/remvault.sock")
///     .await
///     .map_err(ClientError::Write)?;
/// let reply = send_request(stream, &WalletRequest::new("list"), Duration::from_secs(5)).await?;
/// println!("{reply:?}");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Returns [`ClientError`] describing which step of the exchange failed.
pub async fn send_request(
    mut stream: UnixStream,
    request: &WalletRequest,
    reply_timeout: Duration,
) -> Result<WalletResponse, ClientError> {
    let payload = serde_json::to_vec(request).map_err(ClientError::Serialise)?;
    stream
        .write_all(&payload)
        .await
        .map_err(ClientError::Write)?;
    stream.shutdown().await.map_err(ClientError::Write)?;

    let mut buf = Vec::new();
    tokio::time::timeout(
        reply_timeout,
        (&mut stream).take(MAX_REPLY_BYTES).read_to_end(&mut buf),
    )
    .await
    .map_err(|_| ClientError::Timeout(reply_timeout))?
    .map_err(ClientError::Read)?;
    if buf.is_empty() {
        return Err(ClientError::NoReply);
    }
    serde_json::from_slice(&buf).map_err(ClientError::Deserialise)
}
