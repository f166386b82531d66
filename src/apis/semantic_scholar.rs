use std::time::Duration;

use super::{
    http_client, non_empty, normalize_doi, page_window, send_checked, synthetic_id, text_or,
    year_date, Paper, PaperSource, Source, SourceError, NO_ABSTRACT, NO_TITLE, UNKNOWN_JOURNAL,
    USER_AGENT,
};
use crate::search::SearchFilters;
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const MAX_LIMIT: u32 = 100;
const FIELDS: &str = "title,abstract,authors,year,citationCount,influentialCitationCount,venue,url,openAccessPdf,externalIds,fieldsOfStudy";

pub struct SemanticScholarClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(USER_AGENT, timeout),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct S2SearchResponse {
    data: Option<Vec<S2Paper>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    authors: Option<Vec<S2Author>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    external_ids: Option<S2ExternalIds>,
    citation_count: Option<u32>,
    influential_citation_count: Option<u32>,
    venue: Option<String>,
    url: Option<String>,
    open_access_pdf: Option<S2Pdf>,
    fields_of_study: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Deserialize)]
struct S2Pdf {
    url: Option<String>,
}

fn s2_to_paper(p: S2Paper) -> Paper {
    let id = match p.paper_id.as_deref().and_then(|id| non_empty(Some(id))) {
        Some(id) => format!("semantic_{}", id),
        None => synthetic_id(Source::SemanticScholar, p.title.as_deref().unwrap_or_default()),
    };
    let mut paper = Paper::new(id, Source::SemanticScholar);
    paper.title = text_or(p.title.as_deref(), NO_TITLE);
    paper.abstract_text = text_or(p.abstract_text.as_deref(), NO_ABSTRACT);
    paper.authors = p
        .authors
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| non_empty(a.name.as_deref()))
        .collect();
    paper.published_date = year_date(p.year);
    paper.journal = text_or(p.venue.as_deref(), UNKNOWN_JOURNAL);
    paper.url = non_empty(p.url.as_deref());
    paper.doi = p.external_ids.and_then(|e| e.doi).as_deref().and_then(normalize_doi);
    paper.download_url = p.open_access_pdf.and_then(|pdf| pdf.url);
    paper.citation_count = p.citation_count;
    paper.influential_citation_count = p.influential_citation_count;
    paper.categories = p.fields_of_study.unwrap_or_default().into_iter().collect();
    paper
}

pub fn parse_response(body: &str) -> Result<Vec<Paper>, SourceError> {
    let resp: S2SearchResponse = serde_json::from_str(body)?;
    Ok(resp.data.unwrap_or_default().into_iter().map(s2_to_paper).collect())
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    fn source(&self) -> Source {
        Source::SemanticScholar
    }

    async fn fetch(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Paper>, SourceError> {
        let url = format!("{}/paper/search", self.base_url);
        let (limit, offset) = page_window(filters, MAX_LIMIT);
        let req = self.add_auth(
            self.client
                .get(&url)
                .header("Accept", "application/json")
                .query(&[
                    ("query", query.to_string()),
                    ("limit", limit.to_string()),
                    ("offset", offset.to_string()),
                    ("fields", FIELDS.to_string()),
                ]),
        );
        let body = send_checked(req).await?.text().await?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{"total": 2, "offset": 0, "data": [
          {
            "paperId": "abc123",
            "title": "Attention Is All You Need",
            "abstract": "Transformers.",
            "authors": [{"authorId": "1", "name": "A. Vaswani"}, {"authorId": "2", "name": null}],
            "year": 2017,
            "citationCount": 90000,
            "influentialCitationCount": 12000,
            "venue": "NeurIPS",
            "url": "https://www.semanticscholar.org/paper/abc123",
            "openAccessPdf": {"url": "https://arxiv.org/pdf/1706.03762"},
            "externalIds": {"DOI": "10.5555/3295222", "ArXiv": "1706.03762"},
            "fieldsOfStudy": ["Computer Science"]
          },
          {"paperId": "def", "title": null, "venue": "", "year": null, "openAccessPdf": null}
        ]}"#;
        let papers = parse_response(body).unwrap();
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(p.id, "semantic_abc123");
        assert_eq!(p.authors, vec!["A. Vaswani"]);
        assert_eq!(p.published_date, "2017-01-01");
        assert_eq!(p.journal, "NeurIPS");
        assert_eq!(p.doi.as_deref(), Some("10.5555/3295222"));
        assert_eq!(p.download_url.as_deref(), Some("https://arxiv.org/pdf/1706.03762"));
        assert_eq!(p.influential_citation_count, Some(12000));
        assert!(p.categories.contains("Computer Science"));

        let q = &papers[1];
        assert_eq!(q.title, NO_TITLE);
        assert_eq!(q.journal, UNKNOWN_JOURNAL);
        assert_eq!(q.published_date, "");
        assert!(q.citation_count.is_none());
    }

    #[test]
    fn test_missing_data_is_empty() {
        assert!(parse_response(r#"{"total": 0}"#).unwrap().is_empty());
    }
}
