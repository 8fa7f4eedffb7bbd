#![cfg_attr(docsrs, feature(doc_cfg))]

//! Library components for the remvault wallet daemon.
//!
//! # Overview
//! This crate exposes:
//! - [`config::Config`] — daemon configuration layered from an optional
//!   `/etc/remvault/config.toml`, `REMVAULT_*` environment variables and CLI
//!   overrides.
//! - [`listener`] — the Unix socket listener answering `remcli` requests and
//!   probes.
//! - [`daemon::run`] — the supervised daemon main loop with graceful `stop`.
//! - [`vault::Vault`] — the in-memory wallet registry.
//!
//! # Examples
//! ```rust,no_run
//! use remvault::config::Config;
//!
//! # async fn start() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = Config::for_socket("/tmp/remvault.sock");
//! remvault::daemon::run(cfg).await?;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod daemon;
pub mod listener;
pub mod logging;
pub mod vault;
