//! Deterministic ranking heuristics computed from a paper's own fields.
//!
//! Every function takes the reference year explicitly so results do not depend
//! on the wall clock; callers pass [`current_year`].

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::apis::{Paper, Source, NO_ABSTRACT, NO_TITLE};
use crate::search::filters::published_year;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactMetrics {
    pub citation_velocity: f64,
    pub social_impact: u32,
    pub academic_impact: u32,
}

pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// 0–100 blend of citations, recency, abstract, PDF and venue availability.
pub fn relevance_score(paper: &Paper, current_year: i32) -> u32 {
    let mut score = 0.0_f64;

    if let Some(citations) = paper.citation_count.filter(|c| *c > 0) {
        score += (citations as f64 / 100.0).min(1.0) * 30.0;
    }

    if let Some(year) = published_year(&paper.published_date) {
        let age = (current_year - year) as f64;
        score += (1.0 - age / 10.0).clamp(0.0, 1.0) * 20.0;
    }

    if paper.abstract_text.chars().count() > 100 {
        score += 20.0;
    }
    if has_download(paper) {
        score += 15.0;
    }
    if paper.has_known_journal() {
        score += 15.0;
    }

    score.round() as u32
}

/// 0–100 completeness score: title, abstract, authors, DOI.
pub fn quality_score(paper: &Paper) -> u32 {
    let mut score = 0;

    if paper.title != NO_TITLE && paper.title.chars().count() > 10 {
        score += 25;
    }
    if paper.abstract_text != NO_ABSTRACT && paper.abstract_text.chars().count() > 200 {
        score += 35;
    }
    if !paper.authors.is_empty() {
        score += 20;
    }
    if paper.doi.as_deref().is_some_and(|d| !d.is_empty()) {
        score += 20;
    }

    score
}

/// Citations per year since publication, one decimal place.
pub fn citation_velocity(paper: &Paper, current_year: i32) -> f64 {
    let (Some(citations), Some(year)) = (
        paper.citation_count.filter(|c| *c > 0),
        published_year(&paper.published_date),
    ) else {
        return 0.0;
    };
    let years = (current_year - year).max(1) as f64;
    (citations as f64 / years * 10.0).round() / 10.0
}

pub fn social_impact(paper: &Paper) -> u32 {
    let mut score = 0;
    if paper.source == Source::Arxiv {
        score += 5;
    }
    if has_download(paper) {
        score += 10;
    }
    if paper.citation_count.unwrap_or(0) > 50 {
        score += 15;
    }
    score
}

pub fn academic_impact(paper: &Paper) -> u32 {
    let citations = paper.citation_count.unwrap_or(0) as f64;
    let influential = paper.influential_citation_count.unwrap_or(0) as f64;
    ((citations / 10.0).min(50.0) + influential * 2.0).round() as u32
}

pub fn impact_metrics(paper: &Paper, current_year: i32) -> ImpactMetrics {
    ImpactMetrics {
        citation_velocity: citation_velocity(paper, current_year),
        social_impact: social_impact(paper),
        academic_impact: academic_impact(paper),
    }
}

/// Fill in the computed score fields of `paper`.
pub fn apply_scores(paper: &mut Paper, current_year: i32) {
    paper.relevance_score = Some(relevance_score(paper, current_year));
    paper.quality_score = Some(quality_score(paper));
    paper.impact_metrics = Some(impact_metrics(paper, current_year));
}

fn has_download(paper: &Paper) -> bool {
    paper.download_url.as_deref().is_some_and(|u| !u.is_empty())
}
