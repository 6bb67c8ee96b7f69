// src/error.rs
// =============================================================================
// Error types that cross module boundaries.
//
// Most failures in this crate are NOT errors: a dead link is a normal probe
// result and a duplicate ledger write is a normal "skipped" outcome. What is
// left lives here:
//
// - StoreError: something went wrong talking to a bookmark or ledger store
// - LedgerError: a ledger write failed for a reason other than a duplicate
// - CheckError: a whole run had to stop (store unreachable), carrying the
//   summary accumulated up to that point
// =============================================================================

use crate::batch::CheckRunSummary;
use crate::models::BookmarkId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached at all. This has no item-level scope and
    /// aborts a run.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A single read or write failed.
    #[error("store write failed: {0}")]
    Write(String),

    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("bookmark {0} not found")]
    NotFound(BookmarkId),
}

impl StoreError {
    /// True when the failure is not scoped to one item.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() || db.message().contains("UNIQUE constraint failed") => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Write(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger write failed for {url} (bookmark {bookmark_id}): {source}")]
    Write {
        url: String,
        bookmark_id: BookmarkId,
        #[source]
        source: StoreError,
    },

    #[error("ledger cleanup failed: {0}")]
    Cleanup(#[source] StoreError),
}

#[derive(Debug, Error)]
pub enum CheckError {
    /// The run stopped early. `summary` holds everything counted so far.
    #[error("check run aborted after {checked} of {total} bookmarks: {source}", checked = .summary.checked, total = .summary.total)]
    Aborted {
        summary: Box<CheckRunSummary>,
        #[source]
        source: StoreError,
    },

    /// Listing bookmarks failed before any probe was issued.
    #[error("could not list bookmarks: {0}")]
    List(#[source] StoreError),
}

impl CheckError {
    /// Whatever progress was made before the failure.
    pub fn partial_summary(&self) -> Option<&CheckRunSummary> {
        match self {
            CheckError::Aborted { summary, .. } => Some(&**summary),
            CheckError::List(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_run_scoped() {
        assert!(StoreError::Unavailable("down".into()).is_unavailable());
        assert!(!StoreError::Write("disk full".into()).is_unavailable());
        assert!(!StoreError::Conflict("dup".into()).is_unavailable());
    }

    #[test]
    fn test_pool_closed_maps_to_unavailable() {
        let err: StoreError = sqlx::Error::PoolClosed.into();
        assert!(err.is_unavailable());
    }
}
