//! PubMed via NCBI E-utilities.
//!
//! Searching is two requests: `esearch` resolves the query to PMIDs, then
//! `efetch` returns the full article XML for those ids. A query with no
//! PMIDs never reaches `efetch`.

use std::time::Duration;

use super::{
    collapse_whitespace, http_client, normalize_doi, page_window, send_checked,
    synthetic_id, text_or, Paper, PaperSource, Source, SourceError, NO_ABSTRACT, NO_TITLE,
    UNKNOWN_JOURNAL, USER_AGENT,
};
use crate::search::SearchFilters;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

const BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const MAX_RETMAX: u32 = 200;

pub struct PubMedClient {
    client: reqwest::Client,
    base_url: String,
}

impl PubMedClient {
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

    async fn search_ids(&self, query: &str, filters: &SearchFilters) -> Result<Vec<String>, SourceError> {
        let (retmax, retstart) = page_window(filters, MAX_RETMAX);
        let req = self.client.get(format!("{}/esearch.fcgi", self.base_url)).query(&[
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmax", retmax.to_string()),
            ("retstart", retstart.to_string()),
            ("retmode", "json".to_string()),
            ("sort", "relevance".to_string()),
        ]);
        let body = send_checked(req).await?.text().await?;
        parse_search_ids(&body)
    }

    async fn fetch_records(&self, ids: &[String]) -> Result<Vec<Paper>, SourceError> {
        let req = self.client.get(format!("{}/efetch.fcgi", self.base_url)).query(&[
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ]);
        let body = send_checked(req).await?.text().await?;
        parse_articles(&body)
    }
}

#[derive(Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}
#[derive(Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

pub fn parse_search_ids(body: &str) -> Result<Vec<String>, SourceError> {
    let resp: ESearchResponse = serde_json::from_str(body)?;
    if let Some(err) = resp.esearchresult.error {
        return Err(SourceError::Api(err));
    }
    Ok(resp.esearchresult.idlist)
}

#[async_trait]
impl PaperSource for PubMedClient {
    fn source(&self) -> Source {
        Source::PubMed
    }

    async fn fetch(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Paper>, SourceError> {
        let ids = self.search_ids(query, filters).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("PubMed: fetching {} records", ids.len());
        self.fetch_records(&ids).await
    }
}

fn month_number(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let head = raw.get(..3)?.to_lowercase();
    MONTHS.iter().position(|m| *m == head).map(|i| i as u32 + 1)
}

#[derive(Default)]
struct PubDate {
    year: String,
    month: String,
    day: String,
    medline: String,
}

impl PubDate {
    /// `YYYY-MM-DD` with missing month/day as `01`; `MedlineDate` ("2019 Nov-Dec")
    /// is used when there is no `Year`.
    fn format(&self) -> String {
        let (year, month) = if !self.year.trim().is_empty() {
            (self.year.trim().to_string(), self.month.clone())
        } else {
            let mut parts = self.medline.split_whitespace();
            (
                parts.next().unwrap_or_default().chars().take(4).collect(),
                parts.next().unwrap_or_default().to_string(),
            )
        };
        if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
            return String::new();
        }
        let month = month_number(&month).unwrap_or(1);
        let day = self
            .day
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|d| (1..=31).contains(d))
            .unwrap_or(1);
        format!("{}-{:02}-{:02}", year, month, day)
    }
}

#[derive(Default)]
struct ArticleFields {
    pmid: String,
    title: String,
    abstract_parts: Vec<String>,
    authors: Vec<String>,
    last_name: String,
    fore_name: String,
    collective_name: String,
    journal: String,
    date: PubDate,
    doi: String,
    elocation_doi: String,
    mesh: Vec<String>,
}

impl ArticleFields {
    fn into_paper(self) -> Paper {
        let pmid = self.pmid.trim().to_string();
        let id = if pmid.is_empty() {
            synthetic_id(Source::PubMed, &self.title)
        } else {
            format!("pubmed_{}", pmid)
        };
        let mut paper = Paper::new(id, Source::PubMed);
        paper.title = text_or(Some(&self.title), NO_TITLE);
        paper.abstract_text = text_or(Some(&self.abstract_parts.join(" ")), NO_ABSTRACT);
        paper.authors = self.authors;
        paper.published_date = self.date.format();
        paper.journal = text_or(Some(&self.journal), UNKNOWN_JOURNAL);
        paper.doi = normalize_doi(&self.doi).or_else(|| normalize_doi(&self.elocation_doi));
        paper.url = (!pmid.is_empty()).then(|| format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid));
        paper.categories = self.mesh.into_iter().collect();
        paper
    }

    fn finish_author(&mut self) {
        let name = if self.collective_name.trim().is_empty() {
            collapse_whitespace(&format!("{} {}", self.fore_name, self.last_name))
        } else {
            collapse_whitespace(&self.collective_name)
        };
        if !name.is_empty() {
            self.authors.push(name);
        }
        self.last_name.clear();
        self.fore_name.clear();
        self.collective_name.clear();
    }
}

fn has_attr(e: &BytesStart<'_>, name: &[u8], value: &str) -> bool {
    e.attributes()
        .flatten()
        .any(|a| a.key.as_ref() == name && String::from_utf8_lossy(&a.value).eq_ignore_ascii_case(value))
}

/// Where the current text node goes, decided from the open-element path.
#[derive(Clone, Copy, PartialEq)]
enum Target {
    Pmid,
    Title,
    Abstract,
    LastName,
    ForeName,
    CollectiveName,
    Journal,
    Year,
    Month,
    Day,
    MedlineDate,
    Doi,
    ELocationDoi,
    Mesh,
    Ignore,
}

fn target_for(path: &[String], doi_id: bool, doi_eloc: bool) -> Target {
    let within = |name: &str| path.iter().any(|p| p == name);
    let Some(leaf) = path.last().map(String::as_str) else {
        return Target::Ignore;
    };
    let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
    let grandparent = path.len().checked_sub(3).map(|i| path[i].as_str());

    if within("ArticleTitle") {
        return Target::Title;
    }
    if within("AbstractText") {
        return Target::Abstract;
    }
    match (parent, leaf) {
        (Some("MedlineCitation"), "PMID") => Target::Pmid,
        (Some("Author"), "LastName") => Target::LastName,
        (Some("Author"), "ForeName") => Target::ForeName,
        (Some("Author"), "CollectiveName") => Target::CollectiveName,
        (Some("Journal"), "Title") => Target::Journal,
        (Some("PubDate"), "Year") if within("JournalIssue") => Target::Year,
        (Some("PubDate"), "Month") if within("JournalIssue") => Target::Month,
        (Some("PubDate"), "Day") if within("JournalIssue") => Target::Day,
        (Some("PubDate"), "MedlineDate") if within("JournalIssue") => Target::MedlineDate,
        // Only the article's own id list; ReferenceList entries carry cited DOIs.
        (Some("ArticleIdList"), "ArticleId") if doi_id && grandparent == Some("PubmedData") => Target::Doi,
        (Some("Article"), "ELocationID") if doi_eloc => Target::ELocationDoi,
        (Some("MeshHeading"), "DescriptorName") => Target::Mesh,
        _ => Target::Ignore,
    }
}

/// Parse an `efetch` `PubmedArticleSet` document.
pub fn parse_articles(xml: &str) -> Result<Vec<Paper>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut papers = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut article: Option<ArticleFields> = None;
    let mut doi_id = false;
    let mut doi_eloc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "PubmedArticle" => article = Some(ArticleFields::default()),
                    "AbstractText" if !path.iter().any(|p| p == "AbstractText") => {
                        if let Some(fields) = article.as_mut() {
                            fields.abstract_parts.push(String::new());
                        }
                    }
                    "ArticleId" => doi_id = has_attr(&e, b"IdType", "doi"),
                    "ELocationID" => doi_eloc = has_attr(&e, b"EIdType", "doi"),
                    _ => {}
                }
                path.push(tag);
            }
            Ok(Event::Text(e)) => {
                if let Some(fields) = article.as_mut() {
                    let text = e.unescape().unwrap_or_default();
                    match target_for(&path, doi_id, doi_eloc) {
                        Target::Pmid => fields.pmid.push_str(&text),
                        Target::Title => fields.title.push_str(&text),
                        Target::Abstract => {
                            if let Some(last) = fields.abstract_parts.last_mut() {
                                last.push_str(&text);
                            }
                        }
                        Target::LastName => fields.last_name.push_str(&text),
                        Target::ForeName => fields.fore_name.push_str(&text),
                        Target::CollectiveName => fields.collective_name.push_str(&text),
                        Target::Journal => fields.journal.push_str(&text),
                        Target::Year => fields.date.year.push_str(&text),
                        Target::Month => fields.date.month.push_str(&text),
                        Target::Day => fields.date.day.push_str(&text),
                        Target::MedlineDate => fields.date.medline.push_str(&text),
                        Target::Doi => fields.doi.push_str(&text),
                        Target::ELocationDoi => fields.elocation_doi.push_str(&text),
                        Target::Mesh => {
                            let term = collapse_whitespace(&text);
                            if !term.is_empty() {
                                fields.mesh.push(term);
                            }
                        }
                        Target::Ignore => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                path.pop();
                match tag.as_str() {
                    "PubmedArticle" => {
                        if let Some(fields) = article.take() {
                            papers.push(fields.into_paper());
                        }
                    }
                    "Author" => {
                        if let Some(fields) = article.as_mut() {
                            fields.finish_author();
                        }
                    }
                    "ArticleId" => doi_id = false,
                    "ELocationID" => doi_eloc = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }

        buf.clear();
    }
    Ok(papers)
}
