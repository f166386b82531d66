//! Federated academic paper search: concurrent fan-out to six catalogs,
//! merged, deduplicated, filtered, ranked and optionally enriched.

pub mod apis;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod rate_limit;
pub mod scoring;
pub mod search;
pub mod store;

pub use apis::{Paper, PaperSource, Source, SourceError, SourceOutcome};
pub use config::Config;
pub use enrich::{AuthorRegistry, CitationLookup, Enricher, EnrichmentPolicy};
pub use error::{EnrichmentError, SearchError};
pub use search::{SearchEngine, SearchFilters, SearchReport, SearchRun, SortKey, SourceSelection};
