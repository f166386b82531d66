use serde::Serialize;

use crate::store::HistoryEntry;

const MIN_PREFIX_LEN: usize = 2;
const MAX_SUGGESTIONS: usize = 5;

const COMMON_TERMS: &[&str] = &[
    "machine learning",
    "artificial intelligence",
    "deep learning",
    "neural networks",
    "natural language processing",
    "computer vision",
    "quantum computing",
    "blockchain",
    "bioinformatics",
    "robotics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    History,
    Suggestion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub text: String,
    pub kind: SuggestionKind,
}

/// Past queries containing `prefix` first, then common academic terms.
pub fn suggest(history: &[HistoryEntry], prefix: &str) -> Vec<Suggestion> {
    if prefix.chars().count() < MIN_PREFIX_LEN {
        return Vec::new();
    }
    let needle = prefix.to_lowercase();
    let mut out: Vec<Suggestion> = Vec::new();

    for entry in history {
        if entry.query != prefix && entry.query.to_lowercase().contains(&needle) {
            out.push(Suggestion {
                text: entry.query.clone(),
                kind: SuggestionKind::History,
            });
        }
    }

    for term in COMMON_TERMS {
        if *term != prefix && term.contains(&needle) && !out.iter().any(|s| s.text == *term) {
            out.push(Suggestion {
                text: term.to_string(),
                kind: SuggestionKind::Suggestion,
            });
        }
    }

    out.truncate(MAX_SUGGESTIONS);
    out
}
