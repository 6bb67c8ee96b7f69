// src/reconcile.rs
// =============================================================================
// Decides what happens to a bookmark once we know whether its link is alive.
//
//   accessible, or auto-delete off  ->  nothing, just report
//   dead and auto-delete on         ->  write the audit record, then delete
//
// The order matters and so does what we do when the audit write fails: we
// log it and delete anyway. A clean bookmark list wins over a perfect audit
// trail here.
//
// Bookmarks marked `keep` are NOT spared. The keep status is copied into the
// audit record, but deciding whether `keep` should block auto-delete is a
// product call that has not been made yet, so we only warn about it.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checker::ProbeResult;
use crate::error::StoreError;
use crate::ledger::DedupLedger;
use crate::models::{AuditMetadata, BookmarkRecord, DeletedBy, DeletedReason, KeepStatus};
use crate::store::BookmarkStore;

/// What happened to the audit write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerWrite {
    NotAttempted,
    Inserted,
    /// A record for this key already existed.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub deleted: bool,
    pub ledger: LedgerWrite,
    /// Item-level failure, e.g. the store refused the delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconcileOutcome {
    fn untouched() -> Self {
        Self {
            deleted: false,
            ledger: LedgerWrite::NotAttempted,
            error: None,
        }
    }
}

pub struct ReconciliationPolicy {
    ledger: Arc<DedupLedger>,
    bookmarks: Arc<dyn BookmarkStore>,
    reason: DeletedReason,
}

impl ReconciliationPolicy {
    pub fn new(ledger: Arc<DedupLedger>, bookmarks: Arc<dyn BookmarkStore>) -> Self {
        Self {
            ledger,
            bookmarks,
            reason: DeletedReason::LinkCheckFailed,
        }
    }

    /// The reason stamped on audit records written by this policy.
    pub fn with_reason(mut self, reason: DeletedReason) -> Self {
        self.reason = reason;
        self
    }

    /// Applies the decision for one bookmark.
    ///
    /// Item-level problems are reported in the outcome. Only a store that is
    /// unreachable altogether comes back as `Err`, since that should stop
    /// the run.
    pub async fn reconcile(
        &self,
        bookmark: &BookmarkRecord,
        probe: &ProbeResult,
        auto_delete: bool,
    ) -> Result<ReconcileOutcome, StoreError> {
        if probe.accessible || !auto_delete {
            return Ok(ReconcileOutcome::untouched());
        }

        if bookmark.keep_status == KeepStatus::Keep {
            warn!(
                bookmark_id = bookmark.id,
                url = bookmark.url.as_str(),
                "auto-deleting a bookmark marked keep"
            );
        }

        let ledger = match self.ledger.insert_if_absent(bookmark, &self.audit_metadata(probe)).await {
            Ok(true) => LedgerWrite::Inserted,
            Ok(false) => LedgerWrite::Skipped,
            Err(err) => {
                warn!(bookmark_id = bookmark.id, error = %err, "audit write failed, deleting anyway");
                LedgerWrite::Failed
            }
        };

        match self.bookmarks.delete_by_id(bookmark.id).await {
            Ok(true) => {
                info!(
                    bookmark_id = bookmark.id,
                    url = bookmark.url.as_str(),
                    reason = probe.error.as_deref().unwrap_or(""),
                    "deleted dead bookmark"
                );
                Ok(ReconcileOutcome {
                    deleted: true,
                    ledger,
                    error: None,
                })
            }
            Ok(false) => {
                debug!(bookmark_id = bookmark.id, "bookmark already gone");
                Ok(ReconcileOutcome {
                    deleted: false,
                    ledger,
                    error: None,
                })
            }
            Err(err) if err.is_unavailable() => Err(err),
            Err(err) => {
                warn!(bookmark_id = bookmark.id, error = %err, "failed to delete bookmark");
                Ok(ReconcileOutcome {
                    deleted: false,
                    ledger,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    fn audit_metadata(&self, probe: &ProbeResult) -> AuditMetadata {
        AuditMetadata {
            deleted_reason: self.reason,
            check_status: Some("failed".to_string()),
            status_code: Some(probe.status_code),
            status_text: Some(probe.status_text.clone()),
            error_message: probe.error.clone(),
            keep_status: None,
            deleted_by: DeletedBy::System,
        }
    }
}
