//! Error types for the mandi price sync
//!
//! Every fatal condition of a run ends up as a [`RunError`], which decides the
//! process exit code.

/// Configuration errors, raised before any network activity
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required key absent or blank
    #[error("{0} must be set in the environment or .env")]
    Missing(&'static str),

    /// Key present but unusable
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Target date derivation errors
#[derive(Debug, thiserror::Error)]
pub enum DateError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Upstream fetch failures that end the run
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transient failures kept happening on the same page
    #[error("giving up at offset={offset} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        offset: u64,
        attempts: u32,
        last_error: String,
    },

    /// Client error or a response we cannot interpret
    #[error("non-retryable failure at offset={}{}: {}", .offset, status_suffix(.status), .message)]
    NonRetryable {
        offset: u64,
        status: Option<u16>,
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Persistence backend failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend could not be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered but refused the request
    #[error("backend rejected request (HTTP {status}): {body}")]
    WriteRejected { status: u16, body: String },

    /// Backend answered with something we cannot parse
    #[error("unexpected backend response: {0}")]
    UnexpectedResponse(String),
}

/// Fatal run outcome
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("backend error: {0}")]
    Store(#[from] StoreError),
}

impl RunError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Config(_) => 1,
            _ => 2,
        }
    }
}
