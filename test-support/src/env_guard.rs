//! Test helpers for managing environment variables.
//!
//! `EnvVarGuard` temporarily sets or removes an environment variable and
//! restores the previous value on drop. Callers must serialise tests that
//! use it (for example with `#[serial_test::serial]`).

use std::ffi::{OsStr, OsString};

#[derive(Debug)]
pub struct EnvVarGuard {
    key: OsString,
    original: Option<OsString>,
}

impl EnvVarGuard {
    /// Set an environment variable for the lifetime of the returned guard.
    pub fn set(key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        let guard = Self::capture(key.as_ref());
        // SAFETY: only used from serial test contexts.
        unsafe { std::env::set_var(&guard.key, value) };
        guard
    }

    /// Remove an environment variable for the lifetime of the returned guard.
    pub fn remove(key: impl AsRef<OsStr>) -> Self {
        let guard = Self::capture(key.as_ref());
        // SAFETY: only used from serial test contexts.
        unsafe { std::env::remove_var(&guard.key) };
        guard
    }

    fn capture(key: &OsStr) -> Self {
        Self {
            key: key.to_os_string(),
            original: std::env::var_os(key),
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        // SAFETY: restoring happens in the same serial context as the change.
        match &self.original {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}
