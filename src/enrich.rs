//! Secondary, rate-limited pass over an already-ranked result set.
//!
//! Scores are always applied. Network augmentation (citation links and
//! author identities) only runs for small result sets, and each paper is
//! isolated: a failed lookup leaves that paper exactly as it was.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::apis::opencitations::CitationLink;
use crate::apis::orcid::AuthorProfile;
use crate::apis::{Paper, SourceError};
use crate::error::EnrichmentError;
use crate::rate_limit::RateLimiter;
use crate::scoring;

pub const OPENCITATIONS_RPS: f64 = 5.0;
pub const ORCID_RPS: f64 = 24.0;

#[async_trait]
pub trait CitationLookup: Send + Sync {
    /// Papers citing `doi`, at most `limit`.
    async fn citing(&self, doi: &str, limit: usize) -> Result<Vec<CitationLink>, SourceError>;
    /// Papers `doi` cites, at most `limit`.
    async fn references(&self, doi: &str, limit: usize) -> Result<Vec<CitationLink>, SourceError>;
}

#[async_trait]
pub trait AuthorRegistry: Send + Sync {
    /// `Ok(None)` when the registry has no match for `name`.
    async fn lookup(&self, name: &str) -> Result<Option<AuthorProfile>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentPolicy {
    /// Larger result sets get scores only.
    pub max_results: usize,
    pub max_doi_papers: usize,
    pub max_links: usize,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            max_results: 50,
            max_doi_papers: 20,
            max_links: 10,
        }
    }
}

pub struct Enricher {
    citations: Arc<dyn CitationLookup>,
    authors: Arc<dyn AuthorRegistry>,
    citation_limiter: RateLimiter,
    author_limiter: RateLimiter,
    policy: EnrichmentPolicy,
}

impl Enricher {
    pub fn new(citations: Arc<dyn CitationLookup>, authors: Arc<dyn AuthorRegistry>) -> Self {
        Self {
            citations,
            authors,
            citation_limiter: RateLimiter::per_second(OPENCITATIONS_RPS),
            author_limiter: RateLimiter::per_second(ORCID_RPS),
            policy: EnrichmentPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: EnrichmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limiters(mut self, citations: RateLimiter, authors: RateLimiter) -> Self {
        self.citation_limiter = citations;
        self.author_limiter = authors;
        self
    }

    pub fn policy(&self) -> EnrichmentPolicy {
        self.policy
    }

    pub async fn enrich(&self, mut papers: Vec<Paper>, include_authors: bool, current_year: i32) -> Vec<Paper> {
        for paper in papers.iter_mut() {
            scoring::apply_scores(paper, current_year);
        }

        if papers.len() > self.policy.max_results {
            tracing::info!(
                "Skipping network enrichment for {} results (limit {})",
                papers.len(),
                self.policy.max_results
            );
            return papers;
        }

        self.enrich_citations(&mut papers).await;
        if include_authors {
            self.enrich_authors(&mut papers).await;
        }
        papers
    }

    async fn enrich_citations(&self, papers: &mut [Paper]) {
        let targets: Vec<(String, String)> = papers
            .iter()
            .filter_map(|p| p.doi.as_ref().map(|doi| (p.id.clone(), doi.clone())))
            .take(self.policy.max_doi_papers)
            .collect();

        let mut found: HashMap<String, (Vec<CitationLink>, Vec<CitationLink>)> = HashMap::new();
        for (id, doi) in targets {
            match self.citation_links(&doi).await {
                Ok(links) => {
                    found.insert(id, links);
                }
                Err(e) => tracing::warn!("Leaving {} unenriched: {}", id, e),
            }
        }

        for paper in papers.iter_mut() {
            if let Some((citing, cited)) = found.remove(&paper.id) {
                paper.citing_papers = citing;
                paper.cited_papers = cited;
            }
        }
    }

    async fn citation_links(&self, doi: &str) -> Result<(Vec<CitationLink>, Vec<CitationLink>), EnrichmentError> {
        let limit = self.policy.max_links;
        let wrap = |source| EnrichmentError::Citations {
            doi: doi.to_string(),
            source,
        };

        self.citation_limiter.acquire().await;
        let mut citing = self.citations.citing(doi, limit).await.map_err(wrap)?;
        self.citation_limiter.acquire().await;
        let mut cited = self.citations.references(doi, limit).await.map_err(wrap)?;

        citing.truncate(limit);
        cited.truncate(limit);
        Ok((citing, cited))
    }

    async fn enrich_authors(&self, papers: &mut [Paper]) {
        for paper in papers.iter_mut() {
            match self.author_profiles(&paper.authors).await {
                Ok(profiles) => paper.author_profiles = profiles,
                Err(e) => tracing::warn!("Leaving authors of {} unenriched: {}", paper.id, e),
            }
        }
    }

    async fn author_profiles(&self, names: &[String]) -> Result<Vec<AuthorProfile>, EnrichmentError> {
        let mut profiles = Vec::with_capacity(names.len());
        for name in names {
            self.author_limiter.acquire().await;
            let profile = self
                .authors
                .lookup(name)
                .await
                .map_err(|source| EnrichmentError::Author {
                    name: name.clone(),
                    source,
                })?;
            profiles.push(profile.unwrap_or_else(|| AuthorProfile::unresolved(name.as_str())));
        }
        Ok(profiles)
    }
}
