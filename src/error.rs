//! Custom error types for rustcsbc.
//!
//! Per-publication failures (`Fetch`, `DateResolution`, `IncompleteExtraction`)
//! are caught at the batch boundary and reported as skips. Everything else is
//! fatal for the run.

use thiserror::Error;

/// Main error type for rustcsbc operations.
#[derive(Debug, Error)]
pub enum CsbcError {
    /// Scrape collaborator could not produce a publication
    #[error("Fetch error for {id}: {message}")]
    Fetch {
        /// Publication identifier being fetched
        id: String,
        /// What went wrong
        message: String,
    },

    /// Citation date fragment did not yield a valid calendar date
    #[error("Date resolution error for {fragment:?}: {reason}")]
    DateResolution {
        /// Fragment as it was cut out of the citation text
        fragment: String,
        /// Why resolution failed
        reason: String,
    },

    /// A required field was missing from the scraped page
    #[error("Incomplete extraction: missing {field}")]
    IncompleteExtraction {
        /// Name of the missing field
        field: &'static str,
    },

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Rate limited by NCBI
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// HTML or response parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Grant registry could not be loaded
    #[error("Registry error: {0}")]
    Registry(String),

    /// Publication table is unusable (bad header, already exists, ...)
    #[error("Table error: {0}")]
    Table(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl CsbcError {
    /// Whether this error only invalidates a single publication.
    ///
    /// The batch keeps going for these; anything else aborts the run.
    pub fn is_per_publication(&self) -> bool {
        matches!(
            self,
            CsbcError::Fetch { .. }
                | CsbcError::DateResolution { .. }
                | CsbcError::IncompleteExtraction { .. }
        )
    }
}

/// Result type alias using `CsbcError`
pub type Result<T> = std::result::Result<T, CsbcError>;
