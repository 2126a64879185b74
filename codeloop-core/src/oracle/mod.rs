//! Adapters around the external text-generation oracle
//!
//! The oracle is non-deterministic and not testable by assertion, so it
//! sits behind a narrow trait returning structured results or explicit
//! failure. Everything on this side of the boundary, the response
//! decoding in particular, is deterministic and unit-tested with canned
//! responses.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod change;
pub mod decode;
pub mod gemini;
#[cfg(test)]
pub mod mock;

pub use change::{ChangeOutcome, ChangeStatus, CodeModifier, FileChange};
pub use gemini::{GeminiConfig, GeminiOracle};

/// A single request to the oracle: an instruction plus optional working
/// directory context.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub prompt: String,
    pub working_dir: Option<PathBuf>,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), working_dir: None }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Narrow contract for the generation oracle. Implementations must
/// convert every internal failure into an `OracleError`; nothing
/// panics across this boundary.
#[async_trait]
pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;

    async fn is_available(&self) -> bool;

    /// Issue one request and return the raw response text.
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Failure modes at the oracle boundary.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("failed to invoke oracle: {message}")]
    Exec { message: String },

    #[error("oracle command failed (status {status}): {stderr}")]
    CommandFailed { status: i32, stderr: String },

    #[error("undecodable oracle response: {message}; preview: {preview}")]
    Decode { message: String, preview: String },
}

impl OracleError {
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    pub fn exec(message: impl Into<String>) -> Self {
        Self::Exec { message: message.into() }
    }

    pub fn command_failed(status: i32, stderr: impl Into<String>) -> Self {
        Self::CommandFailed { status, stderr: stderr.into() }
    }

    /// Decode failure carrying a bounded preview of the offending text.
    pub fn decode(message: impl Into<String>, raw: &str) -> Self {
        Self::Decode { message: message.into(), preview: preview(raw) }
    }
}

const PREVIEW_LEN: usize = 200;

/// Bounded, char-safe preview of an oracle response for diagnostics.
pub fn preview(raw: &str) -> String {
    if raw.chars().count() <= PREVIEW_LEN {
        raw.to_string()
    } else {
        let mut p: String = raw.chars().take(PREVIEW_LEN).collect();
        p.push_str("...");
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_bounded() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.len(), PREVIEW_LEN + 3);
        assert!(p.ends_with("..."));

        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn error_display() {
        let err = OracleError::command_failed(1, "boom");
        assert_eq!(err.to_string(), "oracle command failed (status 1): boom");

        let err = OracleError::decode("not json", "garbage in");
        assert!(err.to_string().contains("preview: garbage in"));
    }
}
