use std::time::{Duration, Instant};

use base64::Engine as _;
use moka::future::Cache;
use serde::Serialize;

use super::SearchFilters;
use crate::apis::Paper;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub results: Vec<Paper>,
    pub total: usize,
    pub timestamp: Instant,
}

/// Memoizes complete searches for a fixed TTL. Expired entries are never
/// returned; a miss overwrites whatever was stored under the key.
#[derive(Clone)]
pub struct SearchCache {
    ttl: Duration,
    entries: Cache<String, CacheEntry>,
}

#[derive(Serialize)]
struct KeyParts<'a> {
    query: &'a str,
    filters: &'a SearchFilters,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder().time_to_live(ttl).build();
        Self { ttl, entries }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deterministic, order-sensitive key for a `(query, filters)` pair.
    pub fn key(query: &str, filters: &SearchFilters) -> String {
        let json = serde_json::to_string(&KeyParts { query, filters })
            .unwrap_or_else(|_| format!("{}|{:?}", query, filters));
        base64::engine::general_purpose::STANDARD.encode(json)
    }

    /// Fresh entry for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).await
    }

    pub async fn insert(&self, key: String, results: Vec<Paper>) {
        let total = results.len();
        let entry = CacheEntry {
            results,
            total,
            timestamp: Instant::now(),
        };
        self.entries.insert(key, entry).await;
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::Source;
    use crate::search::SortKey;

    #[test]
    fn test_key_depends_on_query_and_filters() {
        let f = SearchFilters::default();
        let sorted = SearchFilters { sort: SortKey::Date, ..SearchFilters::default() };
        assert_eq!(SearchCache::key("graphs", &f), SearchCache::key("graphs", &f));
        assert_ne!(SearchCache::key("graphs", &f), SearchCache::key("graph", &f));
        assert_ne!(SearchCache::key("graphs", &f), SearchCache::key("graphs", &sorted));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = SearchCache::new(Duration::from_millis(200));
        let key = SearchCache::key("q", &SearchFilters::default());
        cache.insert(key.clone(), vec![Paper::new("arxiv_1", Source::Arxiv)]).await;
        assert_eq!(cache.get(&key).await.map(|e| e.total), Some(1));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(cache.get(&key).await.is_none());

        cache.insert(key.clone(), Vec::new()).await;
        assert_eq!(cache.get(&key).await.map(|e| e.total), Some(0));
    }

    #[tokio::test]
    async fn test_insert_overwrites_existing_entry() {
        let cache = SearchCache::default();
        let key = SearchCache::key("q", &SearchFilters::default());
        cache.insert(key.clone(), vec![Paper::new("arxiv_1", Source::Arxiv)]).await;
        cache
            .insert(key.clone(), vec![Paper::new("doaj_1", Source::Doaj), Paper::new("doaj_2", Source::Doaj)])
            .await;
        let entry = cache.get(&key).await.unwrap();
        assert_eq!(entry.total, 2);
        assert_eq!(entry.results[0].id, "doaj_1");
    }
}
