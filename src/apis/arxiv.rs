use std::time::Duration;

use super::{
    collapse_whitespace, get_text_with_relay, http_client, non_empty, normalize_doi, page_window,
    Paper, PaperSource, Source, SourceError, NO_ABSTRACT, NO_TITLE, USER_AGENT,
};
use crate::search::SearchFilters;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const BASE_URL: &str = "https://export.arxiv.org/api/query";
const MAX_RESULTS: u32 = 1000;

pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
    relay: Option<String>,
}

impl ArxivClient {
    pub fn new(relay: Option<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(USER_AGENT, timeout),
            base_url: BASE_URL.to_string(),
            relay,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    fn source(&self) -> Source {
        Source::Arxiv
    }

    async fn fetch(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Paper>, SourceError> {
        let (max_results, start) = page_window(filters, MAX_RESULTS);
        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("search_query", build_query(query, filters)),
                ("start", start.to_string()),
                ("max_results", max_results.to_string()),
                ("sortBy", "relevance".to_string()),
                ("sortOrder", "descending".to_string()),
            ],
        )
        .map_err(|e| SourceError::Parse(format!("invalid arXiv URL: {}", e)))?;
        tracing::debug!("arXiv search URL: {}", url);

        let body = get_text_with_relay(&self.client, url.as_str(), self.relay.as_deref()).await?;
        parse_atom_feed(&body)
    }
}

fn category_clause(code: &str) -> Option<&'static str> {
    match code.trim().to_lowercase().as_str() {
        "cs" => Some("cat:cs.*"),
        "math" => Some("cat:math.*"),
        "physics" => Some("cat:physics.*"),
        "bio" => Some("cat:q-bio.*"),
        "econ" => Some("cat:econ.*"),
        "stat" => Some("cat:stat.*"),
        _ => None,
    }
}

/// arXiv query syntax: the user query (quoted for exact phrases) followed by
/// `au:` and `cat:` clauses.
pub fn build_query(query: &str, filters: &SearchFilters) -> String {
    let mut q = if filters.exact_phrase {
        format!("\"{}\"", query.trim())
    } else {
        query.trim().to_string()
    };
    if let Some(author) = filters.author_query() {
        q.push_str(&format!(" AND au:\"{}\"", author));
    }
    if let Some(clause) = filters.category.as_deref().and_then(category_clause) {
        q.push_str(" AND ");
        q.push_str(clause);
    }
    q
}

#[derive(Default)]
struct EntryFields {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf: Option<String>,
    doi: String,
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn read_element_attrs(e: &BytesStart<'_>, entry: &mut EntryFields) {
    match e.name().as_ref() {
        b"category" => {
            if let Some(term) = attr(e, b"term") {
                entry.categories.push(term);
            }
        }
        b"link" => {
            let is_pdf = attr(e, b"type").as_deref() == Some("application/pdf")
                || attr(e, b"title").as_deref() == Some("pdf");
            if is_pdf && entry.pdf.is_none() {
                entry.pdf = attr(e, b"href");
            }
        }
        _ => {}
    }
}

fn into_paper(entry: EntryFields) -> Result<Option<Paper>, SourceError> {
    let id_url = entry.id.trim();
    if id_url.contains("/api/errors") {
        return Err(SourceError::Api(collapse_whitespace(&entry.summary)));
    }
    let arxiv_id = id_url.rsplit('/').next().unwrap_or(id_url);
    if arxiv_id.is_empty() {
        return Ok(None);
    }

    let mut paper = Paper::new(format!("arxiv_{}", arxiv_id), Source::Arxiv);
    paper.title = super::text_or(Some(&entry.title), NO_TITLE);
    paper.abstract_text = super::text_or(Some(&entry.summary), NO_ABSTRACT);
    paper.authors = entry.authors;
    paper.published_date = entry
        .published
        .trim()
        .split('T')
        .next()
        .unwrap_or_default()
        .to_string();
    paper.url = non_empty(Some(id_url));
    paper.doi = normalize_doi(&entry.doi);
    paper.download_url = entry.pdf;
    paper.categories = entry.categories.into_iter().collect();
    paper.journal = "ArXiv".to_string();
    Ok(Some(paper))
}

/// Parse an arXiv Atom feed. An error entry from the API is reported as
/// `SourceError::Api`.
pub fn parse_atom_feed(xml: &str) -> Result<Vec<Paper>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut papers = Vec::new();
    let mut entry: Option<EntryFields> = None;
    let mut current_tag = String::new();
    let mut author_name = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "entry" {
                    entry = Some(EntryFields::default());
                } else if let Some(fields) = entry.as_mut() {
                    if tag == "author" {
                        author_name.clear();
                    }
                    read_element_attrs(&e, fields);
                    current_tag = tag;
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(fields) = entry.as_mut() {
                    read_element_attrs(&e, fields);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(fields) = entry.as_mut() {
                    let text = e.unescape().unwrap_or_default();
                    match current_tag.as_str() {
                        "title" => fields.title.push_str(&text),
                        "summary" => fields.summary.push_str(&text),
                        "id" => fields.id.push_str(&text),
                        "published" => fields.published.push_str(&text),
                        "name" => author_name.push_str(&text),
                        "arxiv:doi" => fields.doi.push_str(&text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "entry" {
                    if let Some(fields) = entry.take() {
                        if let Some(paper) = into_paper(fields)? {
                            papers.push(paper);
                        }
                    }
                } else if tag == "author" {
                    if let Some(fields) = entry.as_mut() {
                        let name = collapse_whitespace(&author_name);
                        if !name.is_empty() {
                            fields.authors.push(name);
                        }
                    }
                }
                if tag == current_tag {
                    current_tag.clear();
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

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title>ArXiv Query</title>
  <id>http://arxiv.org/api/feedid</id>
  <entry>
    <id>http://arxiv.org/abs/2301.12345v1</id>
    <title>Test Paper on
      AdS/CFT &amp; Holography</title>
    <summary>This is a test abstract about AdS/CFT correspondence.</summary>
    <published>2023-01-15T00:00:00Z</published>
    <author><name>John Doe</name></author>
    <author><name>Jane Smith</name></author>
    <arxiv:doi>10.1103/PhysRevD.1.2</arxiv:doi>
    <link href="http://arxiv.org/abs/2301.12345v1" rel="alternate" type="text/html"/>
    <link href="http://arxiv.org/pdf/2301.12345v1" title="pdf" type="application/pdf"/>
    <arxiv:primary_category term="hep-th" scheme="http://arxiv.org/schemas/atom"/>
    <category term="hep-th" scheme="http://arxiv.org/schemas/atom"/>
    <category term="gr-qc" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2302.00001v2</id>
    <title>Second</title>
    <published>2023-02-01T10:00:00Z</published>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_atom_feed() {
        let papers = parse_atom_feed(SAMPLE_ATOM).unwrap();
        assert_eq!(papers.len(), 2);
        let p = &papers[0];
        assert_eq!(p.id, "arxiv_2301.12345v1");
        assert_eq!(p.title, "Test Paper on AdS/CFT & Holography");
        assert_eq!(p.authors, vec!["John Doe", "Jane Smith"]);
        assert_eq!(p.published_date, "2023-01-15");
        assert_eq!(p.url.as_deref(), Some("http://arxiv.org/abs/2301.12345v1"));
        assert_eq!(p.download_url.as_deref(), Some("http://arxiv.org/pdf/2301.12345v1"));
        assert_eq!(p.doi.as_deref(), Some("10.1103/PhysRevD.1.2"));
        assert_eq!(p.journal, "ArXiv");
        let cats: Vec<_> = p.categories.iter().map(String::as_str).collect();
        assert_eq!(cats, vec!["gr-qc", "hep-th"]);
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let papers = parse_atom_feed(SAMPLE_ATOM).unwrap();
        let p = &papers[1];
        assert_eq!(p.abstract_text, NO_ABSTRACT);
        assert!(p.authors.is_empty());
        assert!(p.download_url.is_none());
        assert!(p.doi.is_none());
        assert!(p.citation_count.is_none());
    }

    #[test]
    fn test_error_entry_is_api_error() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>http://arxiv.org/api/errors#incorrect_id_format</id>
            <title>Error</title>
            <summary>incorrect id format</summary>
        </entry></feed>"#;
        assert!(matches!(parse_atom_feed(xml), Err(SourceError::Api(m)) if m == "incorrect id format"));
    }

    #[test]
    fn test_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>q</title></feed>"#;
        assert!(parse_atom_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_build_query() {
        let filters = SearchFilters {
            author: Some("Hawking".into()),
            category: Some("bio".into()),
            ..SearchFilters::default()
        };
        assert_eq!(
            build_query("black holes", &filters),
            "black holes AND au:\"Hawking\" AND cat:q-bio.*"
        );

        let filters = SearchFilters {
            exact_phrase: true,
            category: Some("history".into()),
            ..SearchFilters::default()
        };
        assert_eq!(build_query("dark matter", &filters), "\"dark matter\"");
    }
}
