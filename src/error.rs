//! Typed errors for the browser, language-model and extraction seams.
//!
//! Application plumbing (store, config, CLI) stays on `anyhow`; these are the
//! errors callers actually branch on.

use thiserror::Error;

/// Failures surfaced by a [`crate::browser::Browser`] adapter.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    /// Element reference went stale between lookup and use
    #[error("stale element reference")]
    Stale,

    /// Nothing matched any of the given selectors
    #[error("element not found: {0}")]
    NotFound(String),

    /// The page could not be loaded
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The browser session is gone; nothing on this session can be retried
    #[error("browser session lost: {0}")]
    SessionLost(String),

    /// Any other driver-level failure
    #[error("driver error: {0}")]
    Driver(String),
}

impl BrowserError {
    /// Errors worth retrying locally with a short backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrowserError::Stale | BrowserError::NotFound(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::SessionLost(_))
    }
}

/// Failures from a language-model provider.
///
/// Every variant is treated the same by the gates and the scorer (fail-open),
/// but the distinction is kept for logging.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} is not set")]
    MissingApiKey(&'static str),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Format(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Format(err.to_string())
    }
}

/// Outcome of a failed posting extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Retries ran out; the posting is skipped and the role continues
    #[error("posting {posting_id} not extracted after {attempts} attempts: {last}")]
    Exhausted {
        posting_id: String,
        attempts: u32,
        last: BrowserError,
    },

    /// The session died mid-extraction; the role must stop
    #[error("fatal browser error: {0}")]
    Fatal(BrowserError),
}
