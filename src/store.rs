//! Persistence collaborator for search history and bookmarks.
//!
//! The engine only calls through [`Store`]; storage itself lives in the
//! implementations here (in-memory for tests and ephemeral runs, JSON files
//! under the data directory otherwise).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::apis::Paper;

pub const HISTORY_KEY: &str = "paper_search_recent";
pub const BOOKMARKS_KEY: &str = "paper_search_bookmarks";
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid stored data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub trait Store: Send + Sync {
    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError>;
    fn save_history(&self, entries: &[HistoryEntry]) -> Result<(), StoreError>;
    fn load_bookmarks(&self) -> Result<Vec<Paper>, StoreError>;
    fn save_bookmarks(&self, papers: &[Paper]) -> Result<(), StoreError>;
}

/// Most-recent-first history with `query` moved to the front, capped at
/// `HISTORY_LIMIT`. Blank queries leave the history untouched.
pub fn push_history(mut history: Vec<HistoryEntry>, query: &str, timestamp: i64) -> Vec<HistoryEntry> {
    if query.trim().is_empty() {
        return history;
    }
    history.retain(|e| e.query != query);
    history.insert(
        0,
        HistoryEntry {
            query: query.to_string(),
            timestamp,
        },
    );
    history.truncate(HISTORY_LIMIT);
    history
}

/// Append `paper` unless a bookmark with the same id exists. Returns whether
/// it was added.
pub fn add_bookmark(bookmarks: &mut Vec<Paper>, paper: Paper) -> bool {
    if bookmarks.iter().any(|b| b.id == paper.id) {
        return false;
    }
    bookmarks.push(paper);
    true
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    history: Mutex<Vec<HistoryEntry>>,
    bookmarks: Mutex<Vec<Paper>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.history.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save_history(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        *self.history.lock().unwrap_or_else(|e| e.into_inner()) = entries.to_vec();
        Ok(())
    }

    fn load_bookmarks(&self) -> Result<Vec<Paper>, StoreError> {
        Ok(self.bookmarks.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save_bookmarks(&self, papers: &[Paper]) -> Result<(), StoreError> {
        *self.bookmarks.lock().unwrap_or_else(|e| e.into_inner()) = papers.to_vec();
        Ok(())
    }
}

/// One pretty-printed JSON file per logical key under `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(items)?;
        std::fs::write(self.path(key), json)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        self.read(HISTORY_KEY)
    }

    fn save_history(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        self.write(HISTORY_KEY, entries)
    }

    fn load_bookmarks(&self) -> Result<Vec<Paper>, StoreError> {
        self.read(BOOKMARKS_KEY)
    }

    fn save_bookmarks(&self, papers: &[Paper]) -> Result<(), StoreError> {
        self.write(BOOKMARKS_KEY, papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::Source;

    #[test]
    fn test_push_history_moves_repeat_to_front() {
        let h = push_history(Vec::new(), "graphs", 1);
        let h = push_history(h, "trees", 2);
        let h = push_history(h, "graphs", 3);
        let queries: Vec<_> = h.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["graphs", "trees"]);
        assert_eq!(h[0].timestamp, 3);
    }

    #[test]
    fn test_push_history_caps_and_ignores_blank() {
        let mut h = Vec::new();
        for i in 0..15 {
            h = push_history(h, &format!("q{}", i), i);
        }
        assert_eq!(h.len(), HISTORY_LIMIT);
        assert_eq!(h[0].query, "q14");
        let before = h.clone();
        assert_eq!(push_history(h, "   ", 99), before);
    }

    #[test]
    fn test_add_bookmark_ignores_duplicate_ids() {
        let mut marks = Vec::new();
        assert!(add_bookmark(&mut marks, Paper::new("doaj_1", Source::Doaj)));
        assert!(add_bookmark(&mut marks, Paper::new("doaj_2", Source::Doaj)));
        let mut again = Paper::new("doaj_1", Source::Doaj);
        again.title = "Different title".into();
        assert!(!add_bookmark(&mut marks, again));
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].title, crate::apis::NO_TITLE);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert!(store.load_history().unwrap().is_empty());

        let history = push_history(Vec::new(), "protein folding", 42);
        store.save_history(&history).unwrap();
        store.save_bookmarks(&[Paper::new("pubmed_9", Source::PubMed)]).unwrap();

        assert!(dir.path().join("nested/paper_search_recent.json").exists());
        assert_eq!(store.load_history().unwrap(), history);
        assert_eq!(store.load_bookmarks().unwrap()[0].id, "pubmed_9");
    }

    #[test]
    fn test_file_store_rejects_corrupt_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("paper_search_recent.json"), "{not json").unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(store.load_history(), Err(StoreError::Json(_))));
    }
}
