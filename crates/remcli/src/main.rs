//! CLI client for the remvault daemon.
//! Parses user input, forwards it to the daemon and reports the outcome.

use std::process::ExitCode;

use clap::Parser;
use remcli::Args;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let report = remcli::run(&args).await;
    if let Some(output) = report.output().filter(|o| !o.is_empty()) {
        println!("{output}");
    }
    let message = report.message();
    if !message.is_empty() {
        eprintln!("{message}");
    }
    report.exit_code()
}
