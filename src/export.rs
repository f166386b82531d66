use std::str::FromStr;

use crate::apis::Paper;
use crate::error::SearchError;

const CSV_HEADERS: [&str; 8] = [
    "Title",
    "Authors",
    "Abstract",
    "Published Date",
    "Source",
    "Journal",
    "DOI",
    "URL",
];
const ABSTRACT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(SearchError::UnsupportedFormat(s.to_string())),
        }
    }
}

pub fn export(papers: &[Paper], format: ExportFormat) -> Result<String, SearchError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(papers)?),
        ExportFormat::Csv => Ok(to_csv(papers)),
    }
}

/// CSV with a header row; free-text columns are quoted with `"` doubled.
/// An empty result set exports as an empty string.
pub fn to_csv(papers: &[Paper]) -> String {
    if papers.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(papers.len() + 1);
    lines.push(CSV_HEADERS.join(","));
    for paper in papers {
        let row = [
            quoted(&paper.title),
            quoted(&paper.authors.join("; ")),
            quoted(&truncate_text(&paper.abstract_text, ABSTRACT_PREVIEW_CHARS)),
            paper.published_date.clone(),
            paper.source.to_string(),
            quoted(&paper.journal),
            paper.doi.clone().unwrap_or_default(),
            paper.url.clone().unwrap_or_default(),
        ];
        lines.push(row.join(","));
    }
    lines.join("\n")
}

fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head.trim_end())
}
