//! Logging utilities for the daemon.
//!
//! Initialises structured logging using `tracing` and `tracing-subscriber`.
//! Filter settings come from `RUST_LOG`; without it the daemon logs at
//! `info`, because an auto-launched daemon's output is only ever read from
//! its log file after something went wrong.

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info";

/// Initialise the global tracing subscriber writing to stdout.
///
/// Call `init` before any logging statements to avoid missing logs.
///
/// # Examples
///
/// ```rust,no_run
/// use remvault::logging::init;
///
/// init();
/// tracing::info!("Logging is initialised!");
/// ```
pub fn init() {
    init_with_writer(fmt::writer::BoxMakeWriter::new(std::io::stdout));
}

/// Initialise logging with a custom writer.
///
/// # Examples
///
/// ```rust,no_run
/// use remvault::logging::init_with_writer;
/// use tracing_subscriber::fmt;
///
/// init_with_writer(fmt::writer::BoxMakeWriter::new(std::io::stderr));
/// ```
pub fn init_with_writer<W>(writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::{debug, info};

    #[derive(Clone)]
    struct BufMakeWriter {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl<'a> MakeWriter<'a> for BufMakeWriter {
        type Writer = BufWriter;

        fn make_writer(&'a self) -> Self::Writer {
            BufWriter {
                buf: self.buf.clone(),
            }
        }
    }

    struct BufWriter {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl std::io::Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buf
                .lock()
                .expect("Failed to lock log buffer")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    #[serial_test::serial]
    fn falls_back_to_info_filter() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let _guard = test_support::env_guard::EnvVarGuard::remove("RUST_LOG");
        init_with_writer(BufMakeWriter { buf: buf.clone() });
        info!("captured");
        debug!("hidden");
        let output = String::from_utf8(buf.lock().expect("Failed to lock log buffer").clone())
            .expect("Captured output is not valid UTF-8");
        assert!(output.contains("captured"));
        assert!(!output.contains("hidden"));
    }
}
