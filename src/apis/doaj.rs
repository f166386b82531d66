use std::time::Duration;

use super::{
    http_client, non_empty, normalize_doi, page_window, send_checked, synthetic_id, text_or,
    Paper, PaperSource, Source, SourceError, NO_ABSTRACT, NO_TITLE, UNKNOWN_JOURNAL, USER_AGENT,
};
use crate::search::SearchFilters;
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://doaj.org/api/search/articles";
const MAX_PAGE_SIZE: u32 = 100;

pub struct DoajClient {
    client: reqwest::Client,
    base_url: String,
}

impl DoajClient {
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

    /// DOAJ takes the query as the last path segment.
    fn search_url(&self, query: &str) -> Result<reqwest::Url, SourceError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SourceError::Parse(format!("invalid DOAJ URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Parse("DOAJ base URL cannot take a path".to_string()))?
            .pop_if_empty()
            .push(query);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct DoajResponse {
    results: Option<Vec<DoajResult>>,
}
#[derive(Deserialize)]
struct DoajResult {
    #[serde(default)]
    bibjson: DoajBibJson,
    id: Option<String>,
}
#[derive(Deserialize, Default)]
struct DoajBibJson {
    title: Option<String>,
    author: Option<Vec<DoajAuthor>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<String>,
    identifier: Option<Vec<DoajIdentifier>>,
    link: Option<Vec<DoajLink>>,
    journal: Option<DoajJournal>,
    subject: Option<Vec<DoajSubject>>,
}
#[derive(Deserialize)]
struct DoajAuthor {
    name: Option<String>,
}
#[derive(Deserialize)]
struct DoajIdentifier {
    #[serde(rename = "type")]
    id_type: Option<String>,
    id: Option<String>,
}
#[derive(Deserialize)]
struct DoajLink {
    url: Option<String>,
    #[serde(rename = "type")]
    link_type: Option<String>,
    content_type: Option<String>,
}
#[derive(Deserialize)]
struct DoajJournal {
    title: Option<String>,
}
#[derive(Deserialize)]
struct DoajSubject {
    term: Option<String>,
}

fn doaj_to_paper(r: DoajResult) -> Paper {
    let bib = r.bibjson;
    let id = match non_empty(r.id.as_deref()) {
        Some(id) => format!("doaj_{}", id),
        None => synthetic_id(Source::Doaj, bib.title.as_deref().unwrap_or_default()),
    };
    let links = bib.link.unwrap_or_default();

    let mut paper = Paper::new(id, Source::Doaj);
    paper.title = text_or(bib.title.as_deref(), NO_TITLE);
    paper.abstract_text = text_or(bib.abstract_text.as_deref(), NO_ABSTRACT);
    paper.authors = bib
        .author
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| non_empty(a.name.as_deref()))
        .collect();
    paper.published_date = bib
        .year
        .as_deref()
        .and_then(|y| y.trim().parse::<i32>().ok())
        .map(|y| super::year_date(Some(y)))
        .unwrap_or_default();
    paper.journal = text_or(bib.journal.and_then(|j| j.title).as_deref(), UNKNOWN_JOURNAL);
    paper.doi = bib
        .identifier
        .unwrap_or_default()
        .into_iter()
        .find(|i| i.id_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("doi")))
        .and_then(|i| i.id)
        .as_deref()
        .and_then(normalize_doi);
    paper.download_url = links
        .iter()
        .find(|l| {
            l.link_type.as_deref() == Some("fulltext")
                && l.content_type.as_deref().is_some_and(|c| c.eq_ignore_ascii_case("pdf"))
        })
        .and_then(|l| l.url.clone());
    paper.url = links.first().and_then(|l| non_empty(l.url.as_deref()));
    paper.categories = bib
        .subject
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| non_empty(s.term.as_deref()))
        .collect();
    paper
}

pub fn parse_response(body: &str) -> Result<Vec<Paper>, SourceError> {
    let resp: DoajResponse = serde_json::from_str(body)?;
    Ok(resp.results.unwrap_or_default().into_iter().map(doaj_to_paper).collect())
}

#[async_trait]
impl PaperSource for DoajClient {
    fn source(&self) -> Source {
        Source::Doaj
    }

    async fn fetch(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Paper>, SourceError> {
        let (page_size, _) = page_window(filters, MAX_PAGE_SIZE);
        let url = self.search_url(query)?;
        let req = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(&[
                ("pageSize", page_size.to_string()),
                ("page", filters.page.max(1).to_string()),
                ("sort", "relevance".to_string()),
            ]);
        let body = send_checked(req).await?.text().await?;
        parse_response(&body)
    }
}
