use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::apis::{self, PaperSource, Source};
use crate::enrich::Enricher;
use crate::search::cache::{SearchCache, DEFAULT_TTL};
use crate::search::SearchEngine;
use crate::store::{FileStore, Store};

pub const DEFAULT_CORS_RELAY: &str = "https://api.allorigins.win/raw?url=";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub semantic_scholar_api_key: Option<String>,
    pub openalex_email: Option<String>,
    /// `None` disables the relay fallback.
    pub cors_relay: Option<String>,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub enabled_source_names: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("PAPER_SEARCH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                lookup("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".paper-search")
            });

        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let cors_relay = match lookup("PAPER_SEARCH_CORS_RELAY") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_CORS_RELAY.to_string()),
        };

        let enabled_source_names = lookup("PAPER_SEARCH_SOURCES")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            data_dir,
            semantic_scholar_api_key: lookup("SEMANTIC_SCHOLAR_API_KEY").filter(|k| !k.trim().is_empty()),
            openalex_email: lookup("OPENALEX_EMAIL").filter(|e| !e.trim().is_empty()),
            cors_relay,
            cache_ttl: secs("PAPER_SEARCH_CACHE_TTL_SECS", DEFAULT_TTL),
            request_timeout: secs("PAPER_SEARCH_TIMEOUT_SECS", DEFAULT_TIMEOUT),
            enabled_source_names,
        }
    }

    pub fn is_enabled(&self, source: Source) -> bool {
        self.enabled_source_names.is_empty()
            || self
                .enabled_source_names
                .iter()
                .any(|name| Source::from_slug(name) == Some(source))
    }

    /// Build the enabled paper sources in canonical fan-out order.
    pub fn build_sources(&self) -> Vec<Arc<dyn PaperSource>> {
        let timeout = self.request_timeout;
        Source::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .map(|s| -> Arc<dyn PaperSource> {
                match s {
                    Source::Arxiv => Arc::new(apis::arxiv::ArxivClient::new(self.cors_relay.clone(), timeout)),
                    Source::CrossRef => Arc::new(apis::crossref::CrossRefClient::new()),
                    Source::SemanticScholar => Arc::new(apis::semantic_scholar::SemanticScholarClient::new(
                        self.semantic_scholar_api_key.clone(),
                        timeout,
                    )),
                    Source::OpenAlex => Arc::new(apis::openalex::OpenAlexClient::new(
                        self.openalex_email.clone(),
                        timeout,
                    )),
                    Source::PubMed => Arc::new(apis::pubmed::PubMedClient::new(timeout)),
                    Source::Doaj => Arc::new(apis::doaj::DoajClient::new(timeout)),
                }
            })
            .collect()
    }

    pub fn build_store(&self) -> Arc<dyn Store> {
        Arc::new(FileStore::new(&self.data_dir))
    }

    pub fn build_engine(&self) -> SearchEngine {
        SearchEngine::new(
            self.build_sources(),
            self.build_store(),
            SearchCache::new(self.cache_ttl),
        )
    }

    pub fn build_enricher(&self) -> Enricher {
        Enricher::new(
            Arc::new(apis::opencitations::OpenCitationsClient::new(self.request_timeout)),
            Arc::new(apis::orcid::OrcidClient::new(self.request_timeout)),
        )
    }

    /// Return a list of source status descriptions.
    pub fn source_status(&self) -> Vec<SourceStatus> {
        Source::ALL
            .into_iter()
            .map(|source| {
                let enabled = self.is_enabled(source);
                let note = if !enabled {
                    "Disabled by PAPER_SEARCH_SOURCES filter".to_string()
                } else {
                    match source {
                        Source::Arxiv => match &self.cors_relay {
                            Some(_) => "No API key required; relay fallback enabled".into(),
                            None => "No API key required".into(),
                        },
                        Source::CrossRef => "No API key required (10s timeout)".into(),
                        Source::SemanticScholar => {
                            if self.semantic_scholar_api_key.is_some() {
                                "API key set".into()
                            } else {
                                "No API key (rate limited)".into()
                            }
                        }
                        Source::OpenAlex => {
                            if self.openalex_email.is_some() {
                                "Polite pool email set".into()
                            } else {
                                "No email (limited rate)".into()
                            }
                        }
                        Source::PubMed | Source::Doaj => "No API key required".into(),
                    }
                };
                SourceStatus {
                    name: source.slug().into(),
                    enabled,
                    note,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub enabled: bool,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[("HOME", "/home/u")]);
        assert_eq!(c.data_dir, PathBuf::from("/home/u/.paper-search"));
        assert_eq!(c.cors_relay.as_deref(), Some(DEFAULT_CORS_RELAY));
        assert_eq!(c.cache_ttl, Duration::from_secs(300));
        assert_eq!(c.request_timeout, DEFAULT_TIMEOUT);
        let names: Vec<_> = c.build_sources().iter().map(|s| s.source()).collect();
        assert_eq!(names, Source::ALL.to_vec());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("PAPER_SEARCH_DATA_DIR", "/tmp/ps"),
            ("PAPER_SEARCH_CORS_RELAY", ""),
            ("PAPER_SEARCH_CACHE_TTL_SECS", "5"),
            ("PAPER_SEARCH_TIMEOUT_SECS", "nonsense"),
            ("SEMANTIC_SCHOLAR_API_KEY", "k"),
        ]);
        assert_eq!(c.data_dir, PathBuf::from("/tmp/ps"));
        assert!(c.cors_relay.is_none());
        assert_eq!(c.cache_ttl, Duration::from_secs(5));
        assert_eq!(c.request_timeout, DEFAULT_TIMEOUT);
        assert_eq!(c.semantic_scholar_api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_source_filter_keeps_canonical_order() {
        let c = config(&[("PAPER_SEARCH_SOURCES", "doaj, ArXiv,pubmed")]);
        let names: Vec<_> = c.build_sources().iter().map(|s| s.source()).collect();
        assert_eq!(names, vec![Source::Arxiv, Source::PubMed, Source::Doaj]);

        let status = c.source_status();
        assert_eq!(status.len(), 6);
        let crossref = status.iter().find(|s| s.name == "crossref").unwrap();
        assert!(!crossref.enabled);
    }
}
