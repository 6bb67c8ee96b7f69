// src/store/mod.rs
// =============================================================================
// The narrow interfaces the engine needs from the outside world.
//
// - BookmarkStore: read bookmarks, delete one by id
// - LedgerStore: the raw deleted-bookmarks table (lookup, insert, delete)
//
// The engine never knows which database sits behind these. Two
// implementations ship with the crate:
// - memory: tokio-Mutex backed stores for tests and embedding
// - sqlite: the deleted_bookmarks table on SQLite via sqlx
// =============================================================================

mod memory;
mod sqlite;

pub use memory::{MemoryBookmarkStore, MemoryLedgerStore};
pub use sqlite::SqliteLedgerStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{BookmarkId, BookmarkRecord, DeletionRecord, LedgerEntry};

pub type StoreResult<T> = Result<T, StoreError>;

/// The sample bookmarks a fresh install is seeded with. Once the user has
/// real data there is no point checking these.
pub const PRESET_URLS: &[&str] = &[
    "https://github.com",
    "https://stackoverflow.com",
    "https://developer.mozilla.org",
    "https://youtube.com",
    "https://twitter.com",
    "https://reddit.com",
    "https://amazon.com",
    "https://google.com",
];

/// Which bookmarks to hand to a check run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkFilter {
    pub exclude_urls: Vec<String>,
}

impl BookmarkFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn excluding_presets() -> Self {
        Self {
            exclude_urls: PRESET_URLS.iter().map(|u| u.to_string()).collect(),
        }
    }

    pub fn matches(&self, bookmark: &BookmarkRecord) -> bool {
        !self.exclude_urls.iter().any(|u| u == &bookmark.url)
    }
}

#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Bookmarks matching `filter`, ordered by id.
    async fn list(&self, filter: &BookmarkFilter) -> StoreResult<Vec<BookmarkRecord>>;

    async fn get(&self, id: BookmarkId) -> StoreResult<Option<BookmarkRecord>>;

    /// Removes a bookmark. Returns false if it was already gone.
    async fn delete_by_id(&self, id: BookmarkId) -> StoreResult<bool>;
}

/// A `(url, original_bookmark_id)` key that appears more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub url: String,
    pub original_bookmark_id: BookmarkId,
    pub count: u64,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_one(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Option<LedgerEntry>>;

    /// Key lookup that never decodes a row. This is what the dedup path
    /// uses, so rows it can't fully read don't get in the way.
    async fn contains_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<bool>;

    /// Appends a row and returns its id.
    ///
    /// Stores that enforce the `(url, original_bookmark_id)` key must report
    /// a violation as [`StoreError::Conflict`].
    async fn insert(&self, record: &DeletionRecord) -> StoreResult<i64>;

    /// Returns how many rows were removed.
    async fn delete_many(&self, ids: &[i64]) -> StoreResult<u64>;

    async fn duplicate_groups(&self) -> StoreResult<Vec<DuplicateGroup>>;

    /// Every row for a key, most recently deleted first.
    async fn find_by_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Vec<LedgerEntry>>;

    /// Row ids for a key, most recently deleted first.
    async fn ids_for_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Vec<i64>>;
}
