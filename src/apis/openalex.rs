use std::collections::HashMap;
use std::time::Duration;

use super::{
    http_client, non_empty, normalize_doi, page_window, send_checked, synthetic_id, text_or,
    Paper, PaperSource, Source, SourceError, NO_ABSTRACT, NO_TITLE, UNKNOWN_JOURNAL, USER_AGENT,
};
use crate::scoring;
use crate::search::SearchFilters;
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://api.openalex.org";
const MAX_PER_PAGE: u32 = 200;
const ID_PREFIX: &str = "https://openalex.org/";

pub struct OpenAlexClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAlexClient {
    pub fn new(email: Option<String>, timeout: Duration) -> Self {
        let ua = match email {
            Some(ref e) => format!("{} (mailto:{})", USER_AGENT, e),
            None => USER_AGENT.to_string(),
        };
        Self {
            client: http_client(&ua, timeout),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct OAResponse {
    #[serde(default)]
    results: Vec<OAWork>,
}

#[derive(Deserialize)]
struct OAWork {
    id: Option<String>,
    title: Option<String>,
    authorships: Option<Vec<OAAuthorship>>,
    publication_date: Option<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    open_access: Option<OAOpenAccess>,
    cited_by_count: Option<u32>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    primary_location: Option<OALocation>,
    concepts: Option<Vec<OAConcept>>,
}

#[derive(Deserialize)]
struct OAAuthorship {
    author: Option<OAAuthor>,
}
#[derive(Deserialize)]
struct OAAuthor {
    display_name: Option<String>,
}
#[derive(Deserialize)]
struct OAOpenAccess {
    oa_url: Option<String>,
}
#[derive(Deserialize)]
struct OALocation {
    source: Option<OASource>,
    pdf_url: Option<String>,
}
#[derive(Deserialize)]
struct OASource {
    display_name: Option<String>,
}
#[derive(Deserialize)]
struct OAConcept {
    display_name: Option<String>,
}

/// Rebuild plain text from OpenAlex's `word -> [positions]` abstract index.
pub fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut placed: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&pos| (pos, word.as_str())))
        .collect();
    placed.sort_by_key(|&(pos, _)| pos);
    placed.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ")
}

fn oa_to_paper(w: OAWork) -> Paper {
    let short_id = w
        .id
        .as_deref()
        .map(|id| id.strip_prefix(ID_PREFIX).unwrap_or(id))
        .and_then(|id| non_empty(Some(id)));
    let id = match short_id {
        Some(id) => format!("openalex_{}", id),
        None => synthetic_id(Source::OpenAlex, w.title.as_deref().unwrap_or_default()),
    };

    let mut paper = Paper::new(id, Source::OpenAlex);
    paper.title = text_or(w.title.as_deref(), NO_TITLE);
    paper.abstract_text = text_or(
        w.abstract_inverted_index.as_ref().map(rebuild_abstract).as_deref(),
        NO_ABSTRACT,
    );
    paper.authors = w
        .authorships
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| non_empty(a.author?.display_name.as_deref()))
        .collect();
    paper.published_date = non_empty(w.publication_date.as_deref())
        .unwrap_or_else(|| super::year_date(w.publication_year));

    let (journal, location_pdf) = match w.primary_location {
        Some(loc) => (loc.source.and_then(|s| s.display_name), loc.pdf_url),
        None => (None, None),
    };
    paper.journal = text_or(journal.as_deref(), UNKNOWN_JOURNAL);
    paper.download_url = w.open_access.and_then(|oa| oa.oa_url).or(location_pdf);
    paper.url = non_empty(w.id.as_deref());
    paper.doi = w.doi.as_deref().and_then(normalize_doi);
    paper.citation_count = w.cited_by_count;
    paper.categories = w
        .concepts
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| non_empty(c.display_name.as_deref()))
        .collect();
    paper
}

pub fn parse_response(body: &str) -> Result<Vec<Paper>, SourceError> {
    let resp: OAResponse = serde_json::from_str(body)?;
    Ok(resp.results.into_iter().map(oa_to_paper).collect())
}

#[async_trait]
impl PaperSource for OpenAlexClient {
    fn source(&self) -> Source {
        Source::OpenAlex
    }

    async fn fetch(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Paper>, SourceError> {
        let (per_page, _) = page_window(filters, MAX_PER_PAGE);
        let mut params = vec![
            ("search", query.to_string()),
            ("per-page", per_page.to_string()),
            ("page", filters.page.max(1).to_string()),
            ("sort", "relevance_score:desc".to_string()),
        ];
        if filters.has_year_range() {
            let (from, to) = filters.year_bounds(scoring::current_year());
            params.push(("filter", format!("publication_year:{}-{}", from, to)));
        }

        let req = self
            .client
            .get(format!("{}/works", self.base_url))
            .header("Accept", "application/json")
            .query(&params);
        let body = send_checked(req).await?.text().await?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_abstract() {
        let mut index = HashMap::new();
        index.insert("world".to_string(), vec![1]);
        index.insert("hello".to_string(), vec![0, 2]);
        assert_eq!(rebuild_abstract(&index), "hello world hello");
        assert_eq!(rebuild_abstract(&HashMap::new()), "");
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"meta": {"count": 1}, "results": [{
          "id": "https://openalex.org/W2741809807",
          "title": "The state of OA",
          "doi": "https://doi.org/10.7717/peerj.4375",
          "publication_date": "2018-02-13",
          "publication_year": 2018,
          "cited_by_count": 850,
          "authorships": [{"author": {"display_name": "Heather Piwowar"}}, {"author": null}],
          "abstract_inverted_index": {"Despite": [0], "growing": [1], "interest": [2]},
          "primary_location": {"source": {"display_name": "PeerJ"}, "pdf_url": null},
          "open_access": {"oa_url": "https://peerj.com/articles/4375.pdf"},
          "concepts": [{"display_name": "Open access"}, {"display_name": "Library science"}]
        }, {"id": null, "title": "Bare", "publication_year": 2001, "primary_location": null}]}"#;
        let papers = parse_response(body).unwrap();
        let p = &papers[0];
        assert_eq!(p.id, "openalex_W2741809807");
        assert_eq!(p.url.as_deref(), Some("https://openalex.org/W2741809807"));
        assert_eq!(p.doi.as_deref(), Some("10.7717/peerj.4375"));
        assert_eq!(p.abstract_text, "Despite growing interest");
        assert_eq!(p.authors, vec!["Heather Piwowar"]);
        assert_eq!(p.journal, "PeerJ");
        assert_eq!(p.published_date, "2018-02-13");
        assert_eq!(p.citation_count, Some(850));
        assert_eq!(p.categories.len(), 2);

        let q = &papers[1];
        assert!(q.id.starts_with("openalex_gen"));
        assert_eq!(q.published_date, "2001-01-01");
        assert_eq!(q.abstract_text, NO_ABSTRACT);
        assert_eq!(q.journal, UNKNOWN_JOURNAL);
    }
}
