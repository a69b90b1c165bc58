//! Error taxonomy for the update pipeline.
//!
//! Per-artifact failures (`FileNotFound`, `TransportError`, `SizeMismatch`,
//! `HashMismatch`, `ExtractionFailed`) stay local to that artifact's state
//! machine: the orchestrator maps them to a `Failed` transition and keeps
//! going. Only `ParseError` aborts an update session outright.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// The manifest could not be parsed. Resolution must not proceed.
    #[error("manifest parse error: {reason}")]
    ParseError { reason: String },

    /// The server answered 404 for an artifact URL. Terminal, no retry.
    #[error("file not found on server: {url}")]
    FileNotFound { url: String },

    /// Connection reset, timeout, unexpected HTTP status, or a broken body
    /// stream. Terminal for this artifact; the orchestrator decides whether
    /// to advance or abort.
    #[error("transport error: {message}")]
    TransportError { message: String },

    /// The redirect hop limit was exhausted without reaching a payload.
    #[error("redirect limit exceeded after {hops} hops (last target {url})")]
    TooManyRedirects { hops: u32, url: String },

    /// The in-flight download was abandoned via its cancellation token.
    #[error("download cancelled")]
    Cancelled,

    /// Downloaded byte count differs from the manifest's expected size.
    #[error("size mismatch for {filename}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        filename: String,
        expected: u64,
        actual: u64,
    },

    /// Content digest differs from the manifest's expected hash.
    #[error("integrity check failed for {filename}: expected {expected}, got {actual}")]
    HashMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// The archive could not be opened at all (corrupt or not an archive).
    /// Partial per-entry failures are reported through
    /// [`ExtractionResult::entry_errors`](crate::extract::ExtractionResult)
    /// instead.
    #[error("cannot open archive {path}: {reason}")]
    ExtractionFailed { path: String, reason: String },

    /// Local filesystem failure while staging or extracting.
    #[error("i/o error during {operation} on {path}")]
    Io {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl UpdateError {
    /// Map a reqwest failure to the pipeline taxonomy. 404 is the only
    /// status with its own variant; everything else on the wire is a
    /// transport error.
    pub fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        if err.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            return UpdateError::FileNotFound {
                url: url.to_string(),
            };
        }
        if err.is_timeout() {
            return UpdateError::TransportError {
                message: format!("request timed out for {}", url),
            };
        }
        UpdateError::TransportError {
            message: err.to_string(),
        }
    }

    pub fn io(operation: &str, path: &std::path::Path, source: std::io::Error) -> Self {
        UpdateError::Io {
            operation: operation.to_string(),
            path: path.display().to_string(),
            source,
        }
    }

    /// True for failures scoped to a single artifact. The session treats
    /// everything else (manifest parse failure) as fatal.
    pub fn is_artifact_local(&self) -> bool {
        !matches!(self, UpdateError::ParseError { .. })
    }
}
