use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::apis::{Paper, Source};

pub const DEFAULT_PER_PAGE: u32 = 20;
const DEFAULT_YEAR_FROM: i32 = 1900;

/// Which adapters a search fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SourceSelection {
    #[default]
    All,
    Only(Source),
}

impl SourceSelection {
    pub fn includes(&self, source: Source) -> bool {
        match self {
            SourceSelection::All => true,
            SourceSelection::Only(s) => *s == source,
        }
    }
}

impl From<SourceSelection> for String {
    fn from(sel: SourceSelection) -> Self {
        match sel {
            SourceSelection::All => "all".to_string(),
            SourceSelection::Only(s) => s.slug().to_string(),
        }
    }
}

impl TryFrom<String> for SourceSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for SourceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("all") {
            return Ok(SourceSelection::All);
        }
        Source::from_slug(s)
            .map(SourceSelection::Only)
            .ok_or_else(|| format!("Unknown source: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Date,
    Citations,
    Quality,
    Impact,
    Velocity,
    Title,
    #[default]
    Relevance,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "date" => Ok(SortKey::Date),
            "citations" => Ok(SortKey::Citations),
            "quality" => Ok(SortKey::Quality),
            "impact" => Ok(SortKey::Impact),
            "velocity" => Ok(SortKey::Velocity),
            "title" => Ok(SortKey::Title),
            "relevance" | "" => Ok(SortKey::Relevance),
            other => Err(format!("Unknown sort key: {}", other)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortKey::Date => "date",
            SortKey::Citations => "citations",
            SortKey::Quality => "quality",
            SortKey::Impact => "impact",
            SortKey::Velocity => "velocity",
            SortKey::Title => "title",
            SortKey::Relevance => "relevance",
        };
        f.write_str(s)
    }
}

/// Per-invocation search parameters. `page`/`per_page` drive upstream
/// pagination in each adapter; the rest are post-merge filters or
/// source-specific query translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub source: SourceSelection,
    pub sort: SortKey,
    pub page: u32,
    pub per_page: u32,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub exact_phrase: bool,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            source: SourceSelection::All,
            sort: SortKey::Relevance,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            year_from: None,
            year_to: None,
            author: None,
            category: None,
            exact_phrase: false,
        }
    }
}

impl SearchFilters {
    pub fn has_year_range(&self) -> bool {
        self.year_from.is_some() || self.year_to.is_some()
    }

    /// Inclusive year bounds, defaulting to 1900 and the current year.
    pub fn year_bounds(&self, current_year: i32) -> (i32, i32) {
        (
            self.year_from.unwrap_or(DEFAULT_YEAR_FROM),
            self.year_to.unwrap_or(current_year),
        )
    }

    pub fn author_query(&self) -> Option<&str> {
        self.author.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }
}

/// Best-effort parse of `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or an ISO timestamp.
pub fn parse_published(date: &str) -> Option<NaiveDate> {
    let head = date.trim().split('T').next()?;
    let mut parts = head.split('-');
    let year: i32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.trim().parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.trim().parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn published_year(date: &str) -> Option<i32> {
    parse_published(date).map(|d| d.year())
}

/// Year range first, then author substring. Papers whose date cannot be
/// parsed are dropped while a year range is active.
pub fn apply_filters(papers: Vec<Paper>, filters: &SearchFilters, current_year: i32) -> Vec<Paper> {
    let mut filtered = papers;

    if filters.has_year_range() {
        let (from, to) = filters.year_bounds(current_year);
        filtered.retain(|p| {
            published_year(&p.published_date)
                .map(|y| y >= from && y <= to)
                .unwrap_or(false)
        });
    }

    if let Some(author) = filters.author_query() {
        let needle = author.to_lowercase();
        filtered.retain(|p| p.authors.iter().any(|a| a.to_lowercase().contains(&needle)));
    }

    filtered
}

/// Stable sort by `key`; equal keys keep their merged order.
pub fn sort_papers(papers: &mut [Paper], key: SortKey) {
    match key {
        SortKey::Date => papers.sort_by(|a, b| {
            parse_published(&b.published_date).cmp(&parse_published(&a.published_date))
        }),
        SortKey::Citations => papers.sort_by(|a, b| {
            b.citation_count.unwrap_or(0).cmp(&a.citation_count.unwrap_or(0))
        }),
        SortKey::Quality => papers.sort_by(|a, b| {
            b.quality_score.unwrap_or(0).cmp(&a.quality_score.unwrap_or(0))
        }),
        SortKey::Impact => papers.sort_by(|a, b| {
            let ia = a.impact_metrics.map(|m| m.academic_impact).unwrap_or(0);
            let ib = b.impact_metrics.map(|m| m.academic_impact).unwrap_or(0);
            ib.cmp(&ia)
        }),
        SortKey::Velocity => papers.sort_by(|a, b| {
            let va = a.impact_metrics.map(|m| m.citation_velocity).unwrap_or(0.0);
            let vb = b.impact_metrics.map(|m| m.citation_velocity).unwrap_or(0.0);
            vb.partial_cmp(&va).unwrap_or(Ordering::Equal)
        }),
        SortKey::Title => papers.sort_by(|a, b| {
            a.title.to_lowercase().cmp(&b.title.to_lowercase())
        }),
        SortKey::Relevance => {
            if papers.iter().any(|p| p.relevance_score.is_some()) {
                papers.sort_by(|a, b| {
                    b.relevance_score.unwrap_or(0).cmp(&a.relevance_score.unwrap_or(0))
                });
            }
        }
    }
}
