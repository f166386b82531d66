use std::time::Duration;

use super::{
    collapse_whitespace, format_date_parts, http_client, non_empty, normalize_doi, page_window,
    send_checked, synthetic_id, text_or, Paper, PaperSource, Source, SourceError, NO_ABSTRACT,
    NO_TITLE, UNKNOWN_JOURNAL, USER_AGENT,
};
use crate::scoring;
use crate::search::SearchFilters;
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://api.crossref.org/works";
const MAX_ROWS: u32 = 1000;
/// CrossRef is slow under load; it gets a tighter bound than the shared default.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CrossRefClient {
    client: reqwest::Client,
    base_url: String,
}

impl CrossRefClient {
    pub fn new() -> Self {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
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

impl Default for CrossRefClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct CRResponse {
    message: CRMessage,
}
#[derive(Deserialize)]
struct CRMessage {
    #[serde(default)]
    items: Vec<CRItem>,
}
#[derive(Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
    author: Option<Vec<CRAuthor>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "is-referenced-by-count")]
    citation_count: Option<u32>,
    #[serde(rename = "published-print")]
    published_print: Option<CRDate>,
    #[serde(rename = "published-online")]
    published_online: Option<CRDate>,
    published: Option<CRDate>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<String>>,
    subject: Option<Vec<String>>,
    link: Option<Vec<CRLink>>,
    #[serde(rename = "URL")]
    url: Option<String>,
}
#[derive(Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}
#[derive(Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts")]
    date_parts: Option<Vec<Vec<Option<u32>>>>,
}
#[derive(Deserialize)]
struct CRLink {
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "content-type")]
    content_type: Option<String>,
}

impl CRDate {
    fn parts(&self) -> Vec<u32> {
        self.date_parts
            .as_ref()
            .and_then(|p| p.first())
            .map(|p| p.iter().map_while(|v| *v).collect())
            .unwrap_or_default()
    }
}

const BLOCK_TAGS: &[&str] = &["p", "sec", "title", "list", "list-item", "br", "div", "abstract"];

/// Block-level tags separate words; inline ones (`italic`, `sub`, ...) do not.
fn is_block_tag(tag: &str) -> bool {
    let name = tag
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default();
    let local = name.rsplit(':').next().unwrap_or(name);
    BLOCK_TAGS.iter().any(|b| local.eq_ignore_ascii_case(b))
}

/// Drop JATS (or any other) tags and collapse the remaining text.
pub fn strip_markup(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut tag: Option<String> = None;
    for c in s.chars() {
        if let Some(name) = tag.as_mut() {
            if c == '>' {
                if is_block_tag(name) {
                    out.push(' ');
                }
                tag = None;
            } else {
                name.push(c);
            }
        } else if c == '<' {
            tag = Some(String::new());
        } else {
            out.push(c);
        }
    }
    collapse_whitespace(&out)
}

fn item_to_paper(item: CRItem) -> Paper {
    let doi = item.doi.as_deref().and_then(normalize_doi);
    let title = item.title.as_ref().and_then(|t| t.first()).map(String::as_str);
    let id = match &doi {
        Some(doi) => format!("crossref_{}", doi),
        None => synthetic_id(Source::CrossRef, title.unwrap_or_default()),
    };

    let mut paper = Paper::new(id, Source::CrossRef);
    paper.title = text_or(title, NO_TITLE);
    paper.authors = item
        .author
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| {
            let name = match a.name {
                Some(name) => name,
                None => format!(
                    "{} {}",
                    a.given.as_deref().unwrap_or(""),
                    a.family.as_deref().unwrap_or("")
                ),
            };
            non_empty(Some(&name))
        })
        .collect();
    paper.abstract_text = text_or(
        item.abstract_text.as_deref().map(strip_markup).as_deref(),
        NO_ABSTRACT,
    );
    paper.published_date = [&item.published_print, &item.published_online, &item.published]
        .into_iter()
        .flatten()
        .map(CRDate::parts)
        .find(|parts| !parts.is_empty())
        .map(|parts| format_date_parts(&parts))
        .unwrap_or_default();
    paper.journal = text_or(
        item.container_title.as_ref().and_then(|t| t.first()).map(String::as_str),
        UNKNOWN_JOURNAL,
    );
    paper.url = doi
        .as_ref()
        .map(|d| format!("https://doi.org/{}", d))
        .or(item.url);
    paper.download_url = item
        .link
        .unwrap_or_default()
        .into_iter()
        .find(|l| l.content_type.as_deref() == Some("application/pdf"))
        .and_then(|l| l.url);
    paper.categories = item.subject.unwrap_or_default().into_iter().collect();
    paper.citation_count = item.citation_count;
    paper.doi = doi;
    paper
}

pub fn parse_response(body: &str) -> Result<Vec<Paper>, SourceError> {
    let resp: CRResponse = serde_json::from_str(body)?;
    Ok(resp.message.items.into_iter().map(item_to_paper).collect())
}

#[async_trait]
impl PaperSource for CrossRefClient {
    fn source(&self) -> Source {
        Source::CrossRef
    }

    async fn fetch(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Paper>, SourceError> {
        let (rows, offset) = page_window(filters, MAX_ROWS);
        let mut params = vec![
            ("query", query.to_string()),
            ("rows", rows.to_string()),
            ("offset", offset.to_string()),
        ];
        if filters.has_year_range() {
            let (from, to) = filters.year_bounds(scoring::current_year());
            params.push(("filter", format!("from-pub-date:{},until-pub-date:{}", from, to)));
        }
        if let Some(author) = filters.author_query() {
            params.push(("query.author", author.to_string()));
        }

        let req = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&params);
        let body = send_checked(req).await?.text().await?;
        parse_response(&body)
    }
}
