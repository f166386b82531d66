use thiserror::Error;

use crate::apis::SourceError;

/// Errors surfaced to callers of the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Every adapter invoked for the search failed. Distinct from a
    /// successful search that matched nothing.
    #[error("All search sources are currently unavailable ({attempted} attempted)")]
    AllSourcesUnavailable { attempted: usize },

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-paper enrichment failure; the paper is passed through unenriched.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("citation lookup failed for {doi}: {source}")]
    Citations {
        doi: String,
        #[source]
        source: SourceError,
    },

    #[error("author lookup failed for {name}: {source}")]
    Author {
        name: String,
        #[source]
        source: SourceError,
    },
}
