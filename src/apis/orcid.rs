use std::time::Duration;

use super::{http_client, non_empty, send_checked, SourceError, USER_AGENT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::enrich::AuthorRegistry;

const BASE_URL: &str = "https://pub.orcid.org/v3.0";

/// Author identity resolved against the ORCID registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub name: String,
    pub orcid: Option<String>,
    pub affiliation: Option<String>,
}

impl AuthorProfile {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            orcid: None,
            affiliation: None,
        }
    }
}

#[derive(Deserialize)]
struct ExpandedSearch {
    #[serde(rename = "expanded-result")]
    results: Option<Vec<ExpandedResult>>,
}

#[derive(Deserialize)]
struct ExpandedResult {
    #[serde(rename = "orcid-id")]
    orcid_id: Option<String>,
    #[serde(rename = "institution-name", default)]
    institution_name: Vec<String>,
}

/// Solr query for a display name: first token is the given name, the rest
/// the family name.
pub fn name_query(name: &str) -> Option<String> {
    let mut parts = name.split_whitespace();
    let first = parts.next()?;
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return Some(format!("family-name:\"{}\"", first));
    }
    Some(format!(
        "given-names:\"{}\" AND family-name:\"{}\"",
        first,
        rest.join(" ")
    ))
}

pub fn parse_profile(name: &str, body: &str) -> Result<Option<AuthorProfile>, SourceError> {
    let resp: ExpandedSearch = serde_json::from_str(body)?;
    let Some(hit) = resp.results.and_then(|r| r.into_iter().next()) else {
        return Ok(None);
    };
    Ok(Some(AuthorProfile {
        name: name.to_string(),
        orcid: non_empty(hit.orcid_id.as_deref()),
        affiliation: hit
            .institution_name
            .iter()
            .find_map(|i| non_empty(Some(i))),
    }))
}

pub struct OrcidClient {
    client: reqwest::Client,
    base_url: String,
}

impl OrcidClient {
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
}

#[async_trait]
impl AuthorRegistry for OrcidClient {
    async fn lookup(&self, name: &str) -> Result<Option<AuthorProfile>, SourceError> {
        let Some(q) = name_query(name) else {
            return Ok(None);
        };
        let req = self
            .client
            .get(format!("{}/expanded-search/", self.base_url))
            .header("Accept", "application/json")
            .query(&[("q", q.as_str()), ("rows", "1")]);
        let body = send_checked(req).await?.text().await?;
        parse_profile(name, &body)
    }
}
