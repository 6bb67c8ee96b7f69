// src/sweep.rs
// =============================================================================
// What callers get back from the three ways a check is started:
//
// - a manual run by the admin (may auto-delete)
// - the weekly scheduled sweep (report only, never deletes)
// - a single bookmark checked on its own (may auto-delete)
//
// Runs also produce a CheckRecord, a serializable snapshot the caller can
// store as run history. Storing it is up to the caller.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::{CheckRunSummary, ItemOutcome, PreviewEntry};
use crate::checker::ProbeResult;
use crate::models::BookmarkId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Manual,
    WeeklyAutoCheck,
}

impl CheckKind {
    fn key_prefix(&self) -> &'static str {
        match self {
            CheckKind::Manual => "link_check",
            CheckKind::WeeklyAutoCheck => "weekly_check",
        }
    }
}

/// A run as it goes into the history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub kind: CheckKind,
    pub checked_at: DateTime<Utc>,
    pub total: usize,
    pub accessible: usize,
    pub inaccessible: usize,
    pub deleted: usize,
    pub auto_delete: bool,
    /// Per-item results, possibly truncated.
    pub results: Vec<ItemOutcome>,
}

impl CheckRecord {
    pub fn from_summary(kind: CheckKind, summary: &CheckRunSummary, results_limit: usize) -> Self {
        Self {
            kind,
            checked_at: summary.checked_at,
            total: summary.total,
            accessible: summary.accessible,
            inaccessible: summary.inaccessible,
            deleted: summary.deleted,
            auto_delete: summary.auto_delete,
            results: summary.items.iter().take(results_limit).cloned().collect(),
        }
    }

    /// `link_check_<millis>` / `weekly_check_<millis>`
    pub fn history_key(&self) -> String {
        format!("{}_{}", self.kind.key_prefix(), self.checked_at.timestamp_millis())
    }
}

/// Raised by the weekly sweep when it finds dead links. Nothing is deleted;
/// someone has to look at these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepNotification {
    pub created_at: DateTime<Utc>,
    pub inaccessible_count: usize,
    pub message: String,
    pub inaccessible: Vec<PreviewEntry>,
}

impl SweepNotification {
    /// None when the sweep found nothing wrong.
    pub fn for_summary(summary: &CheckRunSummary) -> Option<Self> {
        if summary.inaccessible == 0 {
            return None;
        }
        Some(Self {
            created_at: summary.checked_at,
            inaccessible_count: summary.inaccessible,
            message: format!(
                "{} inaccessible link(s) found, review and remove them manually",
                summary.inaccessible
            ),
            inaccessible: summary.preview.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualReport {
    pub summary: CheckRunSummary,
    pub record: CheckRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub summary: CheckRunSummary,
    pub record: CheckRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<SweepNotification>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleCheckOutcome {
    pub bookmark_id: BookmarkId,
    #[serde(flatten)]
    pub result: ProbeResult,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ItemState;
    use crate::checker::{classify_error, ProbeResult};
    use crate::reconcile::LedgerWrite;
    use chrono::TimeZone;

    fn summary(items: usize, inaccessible: usize) -> CheckRunSummary {
        let at = Utc.with_ymd_and_hms(2024, 8, 4, 3, 0, 0).unwrap();
        let outcome = |i: usize| ItemOutcome {
            bookmark_id: i as i64,
            title: format!("item {}", i),
            state: ItemState::InaccessibleReported,
            ledger: LedgerWrite::NotAttempted,
            result: ProbeResult::network_failure("https://x.example", classify_error("timed out"), at),
        };
        CheckRunSummary {
            total: items,
            checked: items,
            accessible: items - inaccessible,
            inaccessible,
            deleted: 0,
            batches: 1,
            preview: Vec::new(),
            errors: Vec::new(),
            items: (0..items).map(outcome).collect(),
            checked_at: at,
            auto_delete: false,
        }
    }

    #[test]
    fn test_record_truncates_results() {
        let record = CheckRecord::from_summary(CheckKind::WeeklyAutoCheck, &summary(80, 2), 50);
        assert_eq!(record.results.len(), 50);
        assert_eq!(record.total, 80);
        assert_eq!(record.history_key(), "weekly_check_1722740400000");
    }

    #[test]
    fn test_notification_only_when_something_is_dead() {
        assert!(SweepNotification::for_summary(&summary(4, 0)).is_none());

        let note = SweepNotification::for_summary(&summary(4, 3)).unwrap();
        assert_eq!(note.inaccessible_count, 3);
        assert!(note.message.starts_with("3 inaccessible"));
    }

    #[test]
    fn test_record_serializes_kind() {
        let record = CheckRecord::from_summary(CheckKind::Manual, &summary(1, 1), usize::MAX);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "manual");
        assert_eq!(json["results"].as_array().unwrap().len(), 1);
    }
}
