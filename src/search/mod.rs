pub mod cache;
pub mod dedup;
pub mod filters;
pub mod suggest;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::apis::{Paper, PaperSource, Source, SourceOutcome};
use crate::error::SearchError;
use crate::export::{self, ExportFormat};
use crate::scoring;
use crate::store::{self, HistoryEntry, Store, StoreError};

pub use cache::SearchCache;
pub use filters::{SearchFilters, SortKey, SourceSelection};
pub use suggest::Suggestion;

/// Per-search adapter outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchReport {
    pub found: usize,
    pub empty: usize,
    pub failed: usize,
    pub cached: bool,
}

impl SearchReport {
    pub fn attempted(&self) -> usize {
        self.found + self.empty + self.failed
    }

    pub fn succeeded(&self) -> usize {
        self.found + self.empty
    }
}

/// Results and outcome counts of one completed search.
#[derive(Debug, Clone, Default)]
pub struct SearchRun {
    pub results: Vec<Paper>,
    pub report: SearchReport,
}

/// Snapshot of the last completed search.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub query: String,
    pub filters: SearchFilters,
    pub results: Vec<Paper>,
    pub total: usize,
    pub report: SearchReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub results: Vec<Paper>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Query orchestrator: fans a query out to the configured adapters, merges,
/// filters and sorts the results, and owns the cache and current-search state.
pub struct SearchEngine {
    sources: Vec<Arc<dyn PaperSource>>,
    store: Arc<dyn Store>,
    cache: SearchCache,
    state: Mutex<SearchState>,
    searching: AtomicBool,
}

/// Clears the in-flight flag when the search finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SearchEngine {
    pub fn new(sources: Vec<Arc<dyn PaperSource>>, store: Arc<dyn Store>, cache: SearchCache) -> Self {
        Self {
            sources,
            store,
            cache,
            state: Mutex::new(SearchState::default()),
            searching: AtomicBool::new(false),
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = Source> + '_ {
        self.sources.iter().map(|s| s.source())
    }

    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::Acquire)
    }

    /// Search every selected source concurrently and return the merged,
    /// filtered and sorted results.
    ///
    /// A call made while another search is in flight returns an empty list
    /// immediately. Fails only when every invoked adapter failed.
    pub async fn search_all(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Paper>, SearchError> {
        let run = self.try_search(query, filters).await?;
        Ok(run.map(|r| r.results).unwrap_or_default())
    }

    /// Like [`search_all`](Self::search_all), but reports a rejected
    /// overlapping call as `Ok(None)` and returns this search's own report.
    pub async fn try_search(&self, query: &str, filters: &SearchFilters) -> Result<Option<SearchRun>, SearchError> {
        let Some(_in_flight) = InFlight::enter(&self.searching) else {
            tracing::info!("Search already in progress, rejecting \"{}\"", query);
            return Ok(None);
        };

        let key = SearchCache::key(query, filters);
        if let Some(entry) = self.cache.get(&key).await {
            tracing::debug!("Cache hit for \"{}\" ({} results)", query, entry.total);
            let report = SearchReport { cached: true, ..SearchReport::default() };
            self.set_state(query, filters, entry.results.clone(), entry.total, report).await;
            return Ok(Some(SearchRun {
                results: entry.results,
                report,
            }));
        }

        self.record_history(query).await;

        let active: Vec<Arc<dyn PaperSource>> = self
            .sources
            .iter()
            .filter(|s| filters.source.includes(s.source()))
            .cloned()
            .collect();

        let handles: Vec<_> = active
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let query = query.to_string();
                let filters = filters.clone();
                tokio::spawn(async move { source.search(&query, &filters).await })
            })
            .collect();

        let mut report = SearchReport::default();
        let mut raw = Vec::new();
        for (source, settled) in active.iter().zip(join_all(handles).await) {
            match settled {
                Ok(SourceOutcome::Papers(papers)) if papers.is_empty() => report.empty += 1,
                Ok(SourceOutcome::Papers(papers)) => {
                    report.found += 1;
                    raw.extend(papers);
                }
                Ok(SourceOutcome::Failed(_)) => report.failed += 1,
                Err(e) => {
                    tracing::warn!("{} search task panicked: {}", source.source(), e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Search summary: {}/{} sources successful, {} total results",
            report.succeeded(),
            report.attempted(),
            raw.len()
        );

        if report.succeeded() == 0 {
            return Err(SearchError::AllSourcesUnavailable {
                attempted: report.attempted(),
            });
        }

        let results = process_results(raw, filters, scoring::current_year());
        let total = results.len();

        self.cache.insert(key, results.clone()).await;
        self.set_state(query, filters, results.clone(), total, report).await;

        Ok(Some(SearchRun { results, report }))
    }

    /// Slice of the current results; `page` is 1-based.
    pub async fn get_page(&self, page: usize, per_page: usize) -> Page {
        let state = self.state.lock().await;
        paginate(&state.results, state.total, page, per_page)
    }

    pub async fn current_results(&self) -> Vec<Paper> {
        self.state.lock().await.results.clone()
    }

    pub async fn snapshot(&self) -> SearchState {
        self.state.lock().await.clone()
    }

    pub async fn export_results(&self, format: &str) -> Result<String, SearchError> {
        let format: ExportFormat = format.parse()?;
        let state = self.state.lock().await;
        export::export(&state.results, format)
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.with_store(|store| store.load_history())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load search history: {}", e);
                Vec::new()
            })
    }

    pub async fn suggestions(&self, prefix: &str) -> Vec<Suggestion> {
        suggest::suggest(&self.history().await, prefix)
    }

    /// Bookmark the current result with `id`. `Ok(None)` when no current
    /// result has that id, otherwise whether it was newly added.
    pub async fn bookmark(&self, id: &str) -> Result<Option<bool>, StoreError> {
        let paper = {
            let state = self.state.lock().await;
            state.results.iter().find(|p| p.id == id).cloned()
        };
        let Some(paper) = paper else {
            return Ok(None);
        };
        let added = self
            .with_store(move |store| {
                let mut bookmarks = store.load_bookmarks()?;
                let added = store::add_bookmark(&mut bookmarks, paper);
                if added {
                    store.save_bookmarks(&bookmarks)?;
                }
                Ok(added)
            })
            .await?;
        Ok(Some(added))
    }

    pub async fn bookmarks(&self) -> Result<Vec<Paper>, StoreError> {
        self.with_store(|store| store.load_bookmarks()).await
    }

    async fn record_history(&self, query: &str) {
        let query = query.to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let saved = self
            .with_store(move |store| {
                let history = store.load_history().unwrap_or_else(|e| {
                    tracing::warn!("Failed to load search history: {}", e);
                    Vec::new()
                });
                store.save_history(&store::push_history(history, &query, now))
            })
            .await;
        if let Err(e) = saved {
            tracing::warn!("Failed to save search history: {}", e);
        }
    }

    /// Run blocking store I/O off the async worker threads.
    async fn with_store<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref())).await?
    }

    async fn set_state(
        &self,
        query: &str,
        filters: &SearchFilters,
        results: Vec<Paper>,
        total: usize,
        report: SearchReport,
    ) {
        let mut state = self.state.lock().await;
        *state = SearchState {
            query: query.to_string(),
            filters: filters.clone(),
            results,
            total,
            report,
        };
    }
}

/// Dedup, then filter, then sort.
pub fn process_results(raw: Vec<Paper>, filters: &SearchFilters, current_year: i32) -> Vec<Paper> {
    let merged = dedup::deduplicate(raw);
    let mut filtered = filters::apply_filters(merged, filters, current_year);
    filters::sort_papers(&mut filtered, filters.sort);
    filtered
}

pub fn paginate(results: &[Paper], total: usize, page: usize, per_page: usize) -> Page {
    let per_page = per_page.max(1);
    let page = page.max(1);
    let start = (page - 1).saturating_mul(per_page).min(results.len());
    let end = start.saturating_add(per_page).min(results.len());
    Page {
        results: results[start..end].to_vec(),
        page,
        per_page,
        total,
        total_pages: total.div_ceil(per_page),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn papers(n: usize) -> Vec<Paper> {
        (0..n)
            .map(|i| {
                let mut p = Paper::new(format!("doaj_{}", i), Source::Doaj);
                p.title = format!("Paper number {}", i);
                p
            })
            .collect()
    }

    #[test]
    fn test_paginate_slices() {
        let all = papers(25);
        let page = paginate(&all, all.len(), 3, 10);
        assert_eq!(page.results.len(), 5);
        assert_eq!(page.results[0].id, "doaj_20");
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_paginate_out_of_range_is_empty() {
        let all = papers(4);
        let page = paginate(&all, all.len(), 9, 10);
        assert!(page.results.is_empty());
        assert_eq!(page.total_pages, 1);
        let page = paginate(&[], 0, 1, 0);
        assert_eq!(page.per_page, 1);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_process_results_pipeline() {
        let mut raw = papers(3);
        raw.push({
            let mut dup = Paper::new("arxiv_x", Source::Arxiv);
            dup.title = "PAPER number 1!".into();
            dup
        });
        raw[2].citation_count = Some(9);
        let filters = SearchFilters { sort: SortKey::Citations, ..SearchFilters::default() };
        let out = process_results(raw, &filters, 2026);
        let ids: Vec<_> = out.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["doaj_2", "doaj_0", "doaj_1"]);
    }

    #[test]
    fn test_in_flight_guard_resets_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let guard = InFlight::enter(&flag);
            assert!(guard.is_some());
            assert!(InFlight::enter(&flag).is_none());
        }
        assert!(InFlight::enter(&flag).is_some());
    }
}
