// src/batch/summary.rs
// =============================================================================
// The result of one check run.
//
// A CheckRunSummary is built up while a run is in progress (SummaryBuilder)
// and handed out once at the end. After that nobody mutates it. Callers may
// serialize it to keep a history of runs.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checker::ProbeResult;
use crate::models::{BookmarkId, BookmarkRecord};
use crate::reconcile::{LedgerWrite, ReconcileOutcome};

/// Where a bookmark ended up in this run. Every variant is final for the
/// run; a bookmark is pending, then checking, then one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Accessible,
    InaccessibleReported,
    InaccessibleDeleted,
}

/// The full per-bookmark outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub bookmark_id: BookmarkId,
    pub title: String,
    pub state: ItemState,
    pub ledger: LedgerWrite,
    pub result: ProbeResult,
}

/// A short entry for the bounded list of dead links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub bookmark_id: BookmarkId,
    pub title: String,
    pub url: String,
    /// 0 when no HTTP response arrived
    pub status_code: u16,
    pub status_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub bookmark_id: BookmarkId,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRunSummary {
    /// Bookmarks handed to the run
    pub total: usize,
    /// Bookmarks actually probed; less than `total` only if the run aborted
    pub checked: usize,
    pub accessible: usize,
    pub inaccessible: usize,
    /// Dead bookmarks removed from the store (always 0 without auto-delete)
    pub deleted: usize,
    /// How many batches ran
    pub batches: usize,
    /// First few dead links, capped regardless of collection size.
    pub preview: Vec<PreviewEntry>,
    /// Per-item failures, e.g. a delete the store refused
    pub errors: Vec<ItemError>,
    /// Every checked bookmark, in input order.
    pub items: Vec<ItemOutcome>,
    /// When the run finished
    pub checked_at: DateTime<Utc>,
    /// Whether this run was allowed to delete
    pub auto_delete: bool,
}

impl CheckRunSummary {
    /// `"12 accessible, 3 inaccessible, 3 deleted"`
    pub fn message(&self) -> String {
        let mut message = format!("{} accessible, {} inaccessible", self.accessible, self.inaccessible);
        if self.auto_delete {
            message.push_str(&format!(", {} deleted", self.deleted));
        }
        message
    }

    pub fn is_complete(&self) -> bool {
        self.checked == self.total
    }
}

pub(crate) struct SummaryBuilder {
    total: usize,
    checked: usize,
    accessible: usize,
    inaccessible: usize,
    deleted: usize,
    batches: usize,
    preview: Vec<PreviewEntry>,
    errors: Vec<ItemError>,
    items: Vec<ItemOutcome>,
    preview_limit: usize,
    auto_delete: bool,
}

impl SummaryBuilder {
    pub(crate) fn new(total: usize, preview_limit: usize, auto_delete: bool) -> Self {
        Self {
            total,
            checked: 0,
            accessible: 0,
            inaccessible: 0,
            deleted: 0,
            batches: 0,
            preview: Vec::new(),
            errors: Vec::new(),
            items: Vec::with_capacity(total),
            preview_limit,
            auto_delete,
        }
    }

    pub(crate) fn finish_batch(&mut self) {
        self.batches += 1;
    }

    /// Folds one settled bookmark into the counts.
    pub(crate) fn record(&mut self, bookmark: &BookmarkRecord, result: ProbeResult, outcome: &ReconcileOutcome) {
        self.checked += 1;

        if let Some(error) = &outcome.error {
            self.push_error(bookmark, error.clone());
        }

        let state = if result.accessible {
            self.accessible += 1;
            ItemState::Accessible
        } else {
            self.inaccessible += 1;
            if outcome.deleted {
                self.deleted += 1;
            }
            if self.preview.len() < self.preview_limit {
                self.preview.push(PreviewEntry {
                    bookmark_id: bookmark.id,
                    title: bookmark.title.clone(),
                    url: bookmark.url.clone(),
                    status_code: result.status_code,
                    status_text: result.status_text.clone(),
                    error: result.error.clone(),
                    deleted: outcome.deleted,
                });
            }
            if outcome.deleted {
                ItemState::InaccessibleDeleted
            } else {
                ItemState::InaccessibleReported
            }
        };

        self.items.push(ItemOutcome {
            bookmark_id: bookmark.id,
            title: bookmark.title.clone(),
            state,
            ledger: outcome.ledger,
            result,
        });
    }

    pub(crate) fn push_error(&mut self, bookmark: &BookmarkRecord, error: String) {
        self.errors.push(ItemError {
            bookmark_id: bookmark.id,
            url: bookmark.url.clone(),
            error,
        });
    }

    pub(crate) fn finish(self, checked_at: DateTime<Utc>) -> CheckRunSummary {
        CheckRunSummary {
            total: self.total,
            checked: self.checked,
            accessible: self.accessible,
            inaccessible: self.inaccessible,
            deleted: self.deleted,
            batches: self.batches,
            preview: self.preview,
            errors: self.errors,
            items: self.items,
            checked_at,
            auto_delete: self.auto_delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{classify_error, ProbeResult};

    fn dead(id: BookmarkId) -> (BookmarkRecord, ProbeResult) {
        let bookmark = BookmarkRecord::new(id, format!("dead {}", id), format!("https://dead{}.example", id), Utc::now());
        let result = ProbeResult::network_failure(&bookmark.url, classify_error("connection refused"), Utc::now());
        (bookmark, result)
    }

    fn kept() -> ReconcileOutcome {
        ReconcileOutcome {
            deleted: false,
            ledger: LedgerWrite::NotAttempted,
            error: None,
        }
    }

    #[test]
    fn test_preview_is_capped() {
        let mut builder = SummaryBuilder::new(25, 10, false);
        for id in 0..25 {
            let (bookmark, result) = dead(id);
            builder.record(&bookmark, result, &kept());
        }
        let summary = builder.finish(Utc::now());

        assert_eq!(summary.inaccessible, 25);
        assert_eq!(summary.preview.len(), 10);
        assert_eq!(summary.items.len(), 25);
        assert_eq!(summary.preview[0].bookmark_id, 0);
        assert!(summary.is_complete());
    }

    #[test]
    fn test_errors_and_states() {
        let mut builder = SummaryBuilder::new(2, 10, true);
        let (first, result) = dead(1);
        builder.record(
            &first,
            result,
            &ReconcileOutcome {
                deleted: true,
                ledger: LedgerWrite::Inserted,
                error: None,
            },
        );
        let (second, result) = dead(2);
        builder.record(
            &second,
            result,
            &ReconcileOutcome {
                deleted: false,
                ledger: LedgerWrite::Inserted,
                error: Some("store write failed".to_string()),
            },
        );
        let summary = builder.finish(Utc::now());

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.items[0].state, ItemState::InaccessibleDeleted);
        assert_eq!(summary.items[1].state, ItemState::InaccessibleReported);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].bookmark_id, 2);
        assert_eq!(summary.message(), "0 accessible, 2 inaccessible, 1 deleted");
    }
}
