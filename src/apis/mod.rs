pub mod arxiv;
pub mod crossref;
pub mod doaj;
pub mod openalex;
pub mod opencitations;
pub mod orcid;
pub mod pubmed;
pub mod semantic_scholar;

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::ImpactMetrics;
use crate::search::SearchFilters;
use opencitations::CitationLink;
use orcid::AuthorProfile;

pub const NO_TITLE: &str = "No title";
pub const NO_ABSTRACT: &str = "No abstract available";
pub const UNKNOWN_JOURNAL: &str = "Unknown journal";

pub(crate) const USER_AGENT: &str = "paper-aggregate/0.1";

/// The external catalogs the engine knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "ArXiv")]
    Arxiv,
    CrossRef,
    #[serde(rename = "Semantic Scholar")]
    SemanticScholar,
    OpenAlex,
    PubMed,
    #[serde(rename = "DOAJ")]
    Doaj,
}

impl Source {
    /// Canonical fan-out order.
    pub const ALL: [Source; 6] = [
        Source::Arxiv,
        Source::CrossRef,
        Source::SemanticScholar,
        Source::OpenAlex,
        Source::PubMed,
        Source::Doaj,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Source::Arxiv => "arxiv",
            Source::CrossRef => "crossref",
            Source::SemanticScholar => "semantic_scholar",
            Source::OpenAlex => "openalex",
            Source::PubMed => "pubmed",
            Source::Doaj => "doaj",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Arxiv => "ArXiv",
            Source::CrossRef => "CrossRef",
            Source::SemanticScholar => "Semantic Scholar",
            Source::OpenAlex => "OpenAlex",
            Source::PubMed => "PubMed",
            Source::Doaj => "DOAJ",
        }
    }

    /// Prefix used for the globally unique `Paper::id`.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Source::SemanticScholar => "semantic",
            other => other.slug(),
        }
    }

    pub fn from_slug(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|s| {
            s.slug() == name || s.display_name().to_lowercase() == name
        })
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Canonical paper record produced by every adapter.
///
/// Text fields are never empty placeholders: missing titles, abstracts and
/// journals carry the `NO_TITLE`, `NO_ABSTRACT` and `UNKNOWN_JOURNAL` sentinels.
/// The score and enrichment fields are only filled in after a search completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub published_date: String,
    pub source: Source,
    pub url: Option<String>,
    pub doi: Option<String>,
    pub download_url: Option<String>,
    pub citation_count: Option<u32>,
    pub influential_citation_count: Option<u32>,
    pub categories: BTreeSet<String>,
    pub journal: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_metrics: Option<ImpactMetrics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citing_papers: Vec<CitationLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cited_papers: Vec<CitationLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author_profiles: Vec<AuthorProfile>,
}

impl Paper {
    /// A record with every field at its default: sentinel text, no identifiers.
    pub fn new(id: impl Into<String>, source: Source) -> Self {
        Self {
            id: id.into(),
            title: NO_TITLE.to_string(),
            abstract_text: NO_ABSTRACT.to_string(),
            authors: Vec::new(),
            published_date: String::new(),
            source,
            url: None,
            doi: None,
            download_url: None,
            citation_count: None,
            influential_citation_count: None,
            categories: BTreeSet::new(),
            journal: UNKNOWN_JOURNAL.to_string(),
            relevance_score: None,
            quality_score: None,
            impact_metrics: None,
            citing_papers: Vec::new(),
            cited_papers: Vec::new(),
            author_profiles: Vec::new(),
        }
    }

    pub fn has_known_journal(&self) -> bool {
        !self.journal.trim().is_empty() && self.journal != UNKNOWN_JOURNAL
    }
}

/// Failures inside a single adapter. These never cross the adapter boundary
/// except as a `SourceOutcome::Failed` count.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::Parse(e.to_string())
        } else {
            SourceError::Http(e)
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Parse(e.to_string())
    }
}

/// Result of one failure-isolated adapter call.
#[derive(Debug)]
pub enum SourceOutcome {
    Papers(Vec<Paper>),
    Failed(SourceError),
}

impl SourceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SourceOutcome::Failed(_))
    }

    /// Papers from a successful call; a failed call yields nothing.
    pub fn into_papers(self) -> Vec<Paper> {
        match self {
            SourceOutcome::Papers(papers) => papers,
            SourceOutcome::Failed(_) => Vec::new(),
        }
    }
}

#[async_trait]
pub trait PaperSource: Send + Sync {
    fn source(&self) -> Source;

    fn name(&self) -> &'static str {
        self.source().slug()
    }

    /// Issue the source-specific request and normalize the response.
    async fn fetch(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Paper>, SourceError>;

    /// Failure-isolated search: network, status, parse and timeout errors are
    /// logged here and reported as `Failed`, never propagated.
    async fn search(&self, query: &str, filters: &SearchFilters) -> SourceOutcome {
        match self.fetch(query, filters).await {
            Ok(papers) => {
                tracing::info!("{}: {} results", self.source(), papers.len());
                SourceOutcome::Papers(papers)
            }
            Err(e) => {
                tracing::warn!("{} search failed, continuing with other sources: {}", self.source(), e);
                SourceOutcome::Failed(e)
            }
        }
    }
}

// ── Shared request helpers ──────────────────────────────────────────────────

pub(crate) fn http_client(user_agent: &str, timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

/// Send a request and turn non-2xx statuses into `SourceError::Status`.
pub(crate) async fn send_checked(req: reqwest::RequestBuilder) -> Result<reqwest::Response, SourceError> {
    let resp = req.send().await?;
    check_status(resp)
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(SourceError::Status {
            status: resp.status().as_u16(),
            url: resp.url().to_string(),
        })
    }
}

/// GET `url` directly; if the request cannot be sent at all, retry the same
/// URL once through `relay`, which proxies the percent-encoded target.
pub(crate) async fn get_text_with_relay(
    client: &reqwest::Client,
    url: &str,
    relay: Option<&str>,
) -> Result<String, SourceError> {
    let resp = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            let Some(prefix) = relay else {
                return Err(e.into());
            };
            tracing::debug!("Direct request failed ({}), retrying through relay", e);
            client.get(relay_url(prefix, url)).send().await?
        }
    };
    Ok(check_status(resp)?.text().await?)
}

pub(crate) fn relay_url(prefix: &str, target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("{}{}", prefix, encoded)
}

/// (limit, offset) for one call, with `limit` capped at the source maximum.
pub(crate) fn page_window(filters: &SearchFilters, cap: u32) -> (u32, u32) {
    let limit = filters.per_page.clamp(1, cap);
    let offset = filters.page.saturating_sub(1).saturating_mul(limit);
    (limit, offset)
}

/// Strip resolver prefixes (`https://doi.org/`, `doi:`) from a DOI.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
        "DOI:",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim();
            break;
        }
    }
    if doi.is_empty() {
        None
    } else {
        Some(doi.to_string())
    }
}

/// Stable fallback id for records without an upstream identifier.
pub(crate) fn synthetic_id(source: Source, seed: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    format!("{}_gen{:016x}", source.id_prefix(), hasher.finish())
}

pub(crate) fn text_or(value: Option<&str>, sentinel: &str) -> String {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => collapse_whitespace(v),
        _ => sentinel.to_string(),
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format `[year, month, day]` date parts; shorter prefixes give `YYYY-MM` or `YYYY`.
pub(crate) fn format_date_parts(parts: &[u32]) -> String {
    match parts {
        [y, m, d, ..] => format!("{:04}-{:02}-{:02}", y, m, d),
        [y, m] => format!("{:04}-{:02}", y, m),
        [y] => format!("{:04}", y),
        [] => String::new(),
    }
}

pub(crate) fn year_date(year: Option<i32>) -> String {
    year.map(|y| format!("{:04}-01-01", y)).unwrap_or_default()
}
