//! Error taxonomy (spec §7).
//!
//! `CodebasedError` names the kinds a caller needs to branch on (is this
//! retryable? fatal? does it quarantine a path?). Call sites that aggregate
//! heterogeneous failures (CLI entry points, test helpers) use `anyhow`
//! instead, matching how errors are handled across the rest of this crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodebasedError {
    /// Bad configuration or missing required key. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Path read or store-open failure. Non-fatal per path, fatal store-wide.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Grammar parse failure. Non-fatal: the file contributes zero objects.
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Transient embedding failure (network error, 408/429/5xx). Retried.
    #[error("transient embedding error: {0}")]
    EmbeddingTransient(String),

    /// Permanent embedding failure (4xx other than 408/429). The content
    /// fingerprint is quarantined for the remainder of the run.
    #[error("permanent embedding error for fingerprint {fingerprint}: {message}")]
    EmbeddingPermanent { fingerprint: String, message: String },

    /// Invariant violation during a store commit. The transaction is
    /// aborted and the fingerprint is not updated.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Propagates unchanged; the caller requested cancellation.
    #[error("cancelled")]
    Cancelled,
}

impl From<rusqlite::Error> for CodebasedError {
    fn from(err: rusqlite::Error) -> Self {
        CodebasedError::Consistency(err.to_string())
    }
}

impl From<reqwest::Error> for CodebasedError {
    fn from(err: reqwest::Error) -> Self {
        CodebasedError::EmbeddingTransient(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodebasedError>;
