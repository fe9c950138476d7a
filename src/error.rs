//! Error types for the Yakusu pipeline.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use crate::language::Language;
use std::time::Duration;
use thiserror::Error;

/// Error type for calls against the persistence or compute services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Transport-level failure (connect, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The service did not answer within the configured timeout
    #[error("{endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// The response body did not have the expected shape
    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    /// The resource already exists (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Daily quota exhausted (HTTP 429)
    #[error("Quota exhausted, resets in {reset_in:?}")]
    QuotaExhausted { reset_in: Duration },

    /// Endpoint URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ServiceError {
    /// Returns true for failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error type for the orchestration steps.
///
/// Gating failures (quota, save, session) stop the step that raised them.
/// Per-language failures never surface here; they are folded into the job set.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Quota could not be read, so availability is unknown
    #[error("Quota check failed: {0}")]
    QuotaCheckFailed(#[source] ServiceError),

    /// No translations left for today
    #[error("Daily translation quota exhausted, resets in {}", crate::utils::format_duration(*reset_in))]
    QuotaExhausted { reset_in: Duration },

    /// An episode with this sequence number already exists
    #[error("Episode {ep} already exists for this novel")]
    DuplicateEpisode { ep: u32 },

    /// Saving the episode failed; nothing was dispatched
    #[error("Failed to save episode: {0}")]
    SaveFailed(#[source] ServiceError),

    /// Opening a processing session failed
    #[error("Failed to open processing session: {0}")]
    SessionFailed(String),

    /// The compute service rejected or failed the extraction
    #[error("Entity extraction failed: {0}")]
    ExtractionFailed(String),

    /// The language is not a translation target of this run
    #[error("{0} is not a translation target of this run")]
    NotATarget(Language),

    /// The episode was edited after this run was dispatched
    #[error("Episode was revised after dispatch; dispatch the new revision instead")]
    StaleRevision,

    /// Any other service failure
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
