// src/ledger.rs
// =============================================================================
// The deleted-bookmarks audit ledger, with idempotent inserts.
//
// Contract: at most one record per (url, original_bookmark_id).
//
// How we keep it:
// 1. Look the key up first; if it exists, skip.
// 2. Otherwise insert.
// 3. If the insert is rejected by a uniqueness constraint, another writer won
//    the race between 1 and 2. That is a skip too, not an error.
//
// Step 1 alone is not enough: two overlapping runs (a manual check started
// while the weekly sweep is still going) can both see "no record" before
// either writes. Step 3 is what makes it safe, provided the store enforces
// the key (see SqliteLedgerStore::enforce_unique_key).
// =============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{LedgerError, StoreError};
use crate::models::{AuditMetadata, BookmarkId, BookmarkRecord, DeletionRecord};
use crate::store::LedgerStore;

/// Counts from [`DedupLedger::insert_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInsertReport {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
    pub error_details: Vec<InsertErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertErrorDetail {
    /// Title, or the url when the title is empty.
    pub bookmark: String,
    pub error: String,
}

/// Counts from [`DedupLedger::cleanup_duplicates`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub duplicate_groups: usize,
    pub records_cleaned: u64,
}

pub struct DedupLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl DedupLedger {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records `bookmark` as deleted unless a record for its key exists.
    ///
    /// Returns true if a new record was written, false if one was already
    /// there (including when a concurrent writer got there first).
    pub async fn insert_if_absent(&self, bookmark: &BookmarkRecord, meta: &AuditMetadata) -> Result<bool, LedgerError> {
        let write_err = |source: StoreError| LedgerError::Write {
            url: bookmark.url.clone(),
            bookmark_id: bookmark.id,
            source,
        };

        if self.store.contains_key(&bookmark.url, bookmark.id).await.map_err(write_err)? {
            debug!(url = bookmark.url.as_str(), bookmark_id = bookmark.id, "deletion record exists, skipping");
            return Ok(false);
        }

        let record = DeletionRecord::from_bookmark(bookmark, meta, self.clock.now());
        match self.store.insert(&record).await {
            Ok(id) => {
                debug!(url = bookmark.url.as_str(), bookmark_id = bookmark.id, ledger_id = id, "deletion record written");
                Ok(true)
            }
            Err(StoreError::Conflict(detail)) => {
                debug!(
                    url = bookmark.url.as_str(),
                    bookmark_id = bookmark.id,
                    detail = detail.as_str(),
                    "deletion record written concurrently, skipping"
                );
                Ok(false)
            }
            Err(source) => Err(write_err(source)),
        }
    }

    /// Inserts one record per bookmark, one at a time, so repeated keys within
    /// `bookmarks` are deduplicated against each other too.
    pub async fn insert_batch(&self, bookmarks: &[BookmarkRecord], meta: &AuditMetadata) -> BatchInsertReport {
        let mut report = BatchInsertReport {
            total: bookmarks.len(),
            ..BatchInsertReport::default()
        };

        for bookmark in bookmarks {
            match self.insert_if_absent(bookmark, meta).await {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    warn!(bookmark_id = bookmark.id, error = %err, "failed to record deletion");
                    report.errors += 1;
                    report.error_details.push(InsertErrorDetail {
                        bookmark: if bookmark.title.is_empty() {
                            bookmark.url.clone()
                        } else {
                            bookmark.title.clone()
                        },
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            total = report.total,
            inserted = report.inserted,
            skipped = report.skipped,
            errors = report.errors,
            "deletion records saved"
        );
        report
    }

    pub async fn contains(&self, url: &str, original_bookmark_id: BookmarkId) -> Result<bool, LedgerError> {
        self.store
            .contains_key(url, original_bookmark_id)
            .await
            .map_err(|source| LedgerError::Write {
                url: url.to_string(),
                bookmark_id: original_bookmark_id,
                source,
            })
    }

    /// Collapses every duplicated key down to its most recently deleted row.
    pub async fn cleanup_duplicates(&self) -> Result<CleanupReport, LedgerError> {
        let groups = self.store.duplicate_groups().await.map_err(LedgerError::Cleanup)?;
        let mut report = CleanupReport {
            duplicate_groups: groups.len(),
            records_cleaned: 0,
        };

        for group in &groups {
            let ids = self
                .store
                .ids_for_key(&group.url, group.original_bookmark_id)
                .await
                .map_err(LedgerError::Cleanup)?;

            // Newest first: keep ids[0].
            let stale: Vec<i64> = ids.into_iter().skip(1).collect();
            if stale.is_empty() {
                continue;
            }
            report.records_cleaned += self.store.delete_many(&stale).await.map_err(LedgerError::Cleanup)?;
        }

        if report.duplicate_groups > 0 {
            info!(
                groups = report.duplicate_groups,
                cleaned = report.records_cleaned,
                "removed duplicate deletion records"
            );
        }
        Ok(report)
    }
}
