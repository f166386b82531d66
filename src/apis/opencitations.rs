use std::time::Duration;

use super::{http_client, SourceError, USER_AGENT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::enrich::CitationLookup;

const BASE_URL: &str = "https://opencitations.net/index/api/v1";

/// One edge of the citation graph, as OpenCitations reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationLink {
    pub oci: String,
    pub citing: String,
    pub cited: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<String>,
}

#[derive(Deserialize)]
struct OCRecord {
    #[serde(default)]
    oci: String,
    #[serde(default)]
    citing: String,
    #[serde(default)]
    cited: String,
    creation: Option<String>,
}

/// The index prefixes identifiers with their provenance (`coci => 10.x/y`).
fn strip_provenance(id: &str) -> String {
    id.rsplit("=> ").next().unwrap_or(id).trim().to_string()
}

impl From<OCRecord> for CitationLink {
    fn from(r: OCRecord) -> Self {
        Self {
            oci: r.oci,
            citing: strip_provenance(&r.citing),
            cited: strip_provenance(&r.cited),
            creation: r.creation.filter(|c| !c.trim().is_empty()),
        }
    }
}

pub fn parse_links(body: &str, limit: usize) -> Result<Vec<CitationLink>, SourceError> {
    let records: Vec<OCRecord> = serde_json::from_str(body)?;
    Ok(records.into_iter().take(limit).map(CitationLink::from).collect())
}

pub struct OpenCitationsClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenCitationsClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(USER_AGENT, timeout),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn links(&self, operation: &str, doi: &str, limit: usize) -> Result<Vec<CitationLink>, SourceError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SourceError::Parse(format!("invalid OpenCitations URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Parse("OpenCitations base URL cannot take a path".to_string()))?
            .pop_if_empty()
            .push(operation)
            .push(doi);
        tracing::debug!("OpenCitations {} for {}", operation, doi);

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;
        // Unknown DOIs are a 404, not a failure.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(SourceError::Status {
                status: resp.status().as_u16(),
                url: resp.url().to_string(),
            });
        }
        parse_links(&resp.text().await?, limit)
    }
}

#[async_trait]
impl CitationLookup for OpenCitationsClient {
    async fn citing(&self, doi: &str, limit: usize) -> Result<Vec<CitationLink>, SourceError> {
        self.links("citations", doi, limit).await
    }

    async fn references(&self, doi: &str, limit: usize) -> Result<Vec<CitationLink>, SourceError> {
        self.links("references", doi, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_links_truncates() {
        let body = r#"[
          {"oci": "1-2", "citing": "10.1/a", "cited": "10.1/x", "creation": "2019-02", "timespan": "P1Y"},
          {"oci": "3-4", "citing": "coci => 10.1/b", "cited": "coci => 10.1/x", "creation": ""},
          {"oci": "5-6", "citing": "10.1/c", "cited": "10.1/x"}
        ]"#;
        let links = parse_links(body, 2).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].creation.as_deref(), Some("2019-02"));
        assert_eq!(links[1].citing, "10.1/b");
        assert_eq!(links[1].cited, "10.1/x");
        assert!(links[1].creation.is_none());
    }

    #[test]
    fn test_parse_links_rejects_non_array() {
        assert!(matches!(parse_links("{}", 10), Err(SourceError::Parse(_))));
    }
}
