use std::collections::HashSet;

use crate::apis::Paper;

/// Merge results across sources, keeping the first paper seen for each
/// normalized title. Input order (adapter order, then upstream rank) is kept.
pub fn deduplicate(papers: Vec<Paper>) -> Vec<Paper> {
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(papers.len());

    for paper in papers {
        let normalized = normalize_title(&paper.title);
        if seen_titles.contains(&normalized) || seen_ids.contains(&paper.id) {
            continue;
        }
        seen_titles.insert(normalized);
        seen_ids.insert(paper.id.clone());
        merged.push(paper);
    }

    merged
}

pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::Source;

    fn paper(id: &str, title: &str, source: Source) -> Paper {
        let mut p = Paper::new(id, source);
        p.title = title.to_string();
        p
    }

    #[test]
    fn test_dedup_by_normalized_title_across_sources() {
        let results = vec![
            paper("arxiv_1", "Deep Learning for X", Source::Arxiv),
            paper("crossref_10.1/x", "deep learning for x!!", Source::CrossRef),
        ];
        let deduped = deduplicate(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].id, "arxiv_1");
    }

    #[test]
    fn test_first_seen_order_kept() {
        let results = vec![
            paper("a", "Zeta", Source::Arxiv),
            paper("b", "Alpha", Source::Doaj),
            paper("c", "ZETA.", Source::PubMed),
            paper("d", "Beta", Source::OpenAlex),
        ];
        let ids: Vec<_> = deduplicate(results).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let results = vec![
            paper("same", "First title", Source::Arxiv),
            paper("same", "Another title", Source::Arxiv),
        ];
        assert_eq!(deduplicate(results).len(), 1);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let results = vec![
            paper("a", "Quantum Error Correction Codes", Source::Arxiv),
            paper("b", "Quantum  error-correction codes", Source::CrossRef),
            paper("c", "Quantum Error Correction codes", Source::OpenAlex),
            paper("d", "Surface codes", Source::Doaj),
        ];
        let once = deduplicate(results);
        let twice = deduplicate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Hello,   World! "), "hello world");
        assert_eq!(normalize_title("A/B-testing (2nd ed.)"), "abtesting 2nd ed");
    }
}
