// src/store/memory.rs
// =============================================================================
// In-memory stores.
//
// Both stores keep their data behind a tokio Mutex so they can be shared
// across concurrently running probes. They also have a few switches for
// simulating failures (a delete that errors, a store that is down) so the
// error paths of the engine can be exercised without a real database.
// =============================================================================

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{BookmarkFilter, BookmarkStore, DuplicateGroup, LedgerStore, StoreResult};
use crate::error::StoreError;
use crate::models::{BookmarkId, BookmarkRecord, DeletionRecord, LedgerEntry};

#[derive(Debug, Default)]
pub struct MemoryBookmarkStore {
    bookmarks: Mutex<BTreeMap<BookmarkId, BookmarkRecord>>,
    failing_deletes: Mutex<HashSet<BookmarkId>>,
    unavailable: AtomicBool,
}

impl MemoryBookmarkStore {
    pub fn new(bookmarks: impl IntoIterator<Item = BookmarkRecord>) -> Self {
        Self {
            bookmarks: Mutex::new(bookmarks.into_iter().map(|b| (b.id, b)).collect()),
            ..Self::default()
        }
    }

    /// Makes deletes of `id` fail with a write error.
    pub async fn fail_deletes_for(&self, id: BookmarkId) {
        self.failing_deletes.lock().await.insert(id);
    }

    /// Simulates the whole store going down (or coming back).
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub async fn contains(&self, id: BookmarkId) -> bool {
        self.bookmarks.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.bookmarks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bookmarks.lock().await.is_empty()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("bookmark store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn list(&self, filter: &BookmarkFilter) -> StoreResult<Vec<BookmarkRecord>> {
        self.check_available()?;
        let bookmarks = self.bookmarks.lock().await;
        Ok(bookmarks.values().filter(|b| filter.matches(b)).cloned().collect())
    }

    async fn get(&self, id: BookmarkId) -> StoreResult<Option<BookmarkRecord>> {
        self.check_available()?;
        Ok(self.bookmarks.lock().await.get(&id).cloned())
    }

    async fn delete_by_id(&self, id: BookmarkId) -> StoreResult<bool> {
        self.check_available()?;
        if self.failing_deletes.lock().await.contains(&id) {
            return Err(StoreError::Write(format!("delete of bookmark {} rejected", id)));
        }
        Ok(self.bookmarks.lock().await.remove(&id).is_some())
    }
}

#[derive(Debug, Default)]
struct LedgerRows {
    next_id: i64,
    rows: Vec<LedgerEntry>,
}

/// Ledger rows in memory.
///
/// By default the `(url, original_bookmark_id)` key is enforced like a
/// UNIQUE index. [`MemoryLedgerStore::without_unique_key`] gives the legacy
/// behaviour where duplicates can pile up.
#[derive(Debug)]
pub struct MemoryLedgerStore {
    inner: Mutex<LedgerRows>,
    enforce_unique: bool,
    failing: AtomicBool,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerRows::default()),
            enforce_unique: true,
            failing: AtomicBool::new(false),
        }
    }

    pub fn without_unique_key() -> Self {
        Self {
            enforce_unique: false,
            ..Self::new()
        }
    }

    /// Makes every insert fail with a write error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().await.rows.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.rows.is_empty()
    }
}

fn same_key(entry: &LedgerEntry, url: &str, id: BookmarkId) -> bool {
    entry.record.url == url && entry.record.original_bookmark_id == id
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_one(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Option<LedgerEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .iter()
            .find(|e| same_key(e, url, original_bookmark_id))
            .cloned())
    }

    async fn contains_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.rows.iter().any(|e| same_key(e, url, original_bookmark_id)))
    }

    async fn insert(&self, record: &DeletionRecord) -> StoreResult<i64> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Write("ledger insert rejected".to_string()));
        }

        let mut inner = self.inner.lock().await;
        if self.enforce_unique
            && inner
                .rows
                .iter()
                .any(|e| same_key(e, &record.url, record.original_bookmark_id))
        {
            return Err(StoreError::Conflict(format!(
                "deleted_bookmarks.url, deleted_bookmarks.original_bookmark_id ({}, {})",
                record.url, record.original_bookmark_id
            )));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(LedgerEntry {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    async fn delete_many(&self, ids: &[i64]) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.rows.len();
        inner.rows.retain(|e| !ids.contains(&e.id));
        Ok((before - inner.rows.len()) as u64)
    }

    async fn duplicate_groups(&self) -> StoreResult<Vec<DuplicateGroup>> {
        let inner = self.inner.lock().await;
        let mut counts: HashMap<(String, BookmarkId), u64> = HashMap::new();
        for entry in &inner.rows {
            *counts
                .entry((entry.record.url.clone(), entry.record.original_bookmark_id))
                .or_default() += 1;
        }

        let mut groups: Vec<DuplicateGroup> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|((url, original_bookmark_id), count)| DuplicateGroup {
                url,
                original_bookmark_id,
                count,
            })
            .collect();
        groups.sort_by(|a, b| (&a.url, a.original_bookmark_id).cmp(&(&b.url, b.original_bookmark_id)));
        Ok(groups)
    }

    async fn find_by_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Vec<LedgerEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<LedgerEntry> = inner
            .rows
            .iter()
            .filter(|e| same_key(e, url, original_bookmark_id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.record.deleted_at.cmp(&a.record.deleted_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    async fn ids_for_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Vec<i64>> {
        let entries = self.find_by_key(url, original_bookmark_id).await?;
        Ok(entries.into_iter().map(|e| e.id).collect())
    }
}
