//! Shared primitives used across the shell loader crates.

use core::fmt;

/// Result alias used across the workspace.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Error carried through every layer of the loader.
///
/// `code` is a stable dotted identifier (`loader.fetch.unavailable`,
/// `storage.quota_exceeded`, ...) that callers match on; `message` is for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderError {
    pub code: &'static str,
    pub message: String,
}

impl LoaderError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// True when the code sits under `prefix` (`"net"` matches `net.http.status`).
    pub fn is_within(&self, prefix: &str) -> bool {
        self.code == prefix
            || self
                .code
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for LoaderError {}
