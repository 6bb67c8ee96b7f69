// src/models.rs
// =============================================================================
// Plain data shared by every part of the link health engine.
//
// - BookmarkRecord: a snapshot of a bookmark owned by the external store
// - DeletionRecord: one row of the append-only "deleted bookmarks" ledger
// - Small enums for keep status, deletion reason and who deleted it
//
// The ledger field names are the storage format of the `deleted_bookmarks`
// table, so the serde names are the column names (snake_case).
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bookmark ids as the store hands them out.
pub type BookmarkId = i64;

/// How the user wants a bookmark treated by cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepStatus {
    #[default]
    Normal,
    Keep,
    Ignore,
}

impl KeepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeepStatus::Normal => "normal",
            KeepStatus::Keep => "keep",
            KeepStatus::Ignore => "ignore",
        }
    }
}

impl FromStr for KeepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(KeepStatus::Normal),
            "keep" => Ok(KeepStatus::Keep),
            "ignore" => Ok(KeepStatus::Ignore),
            other => Err(format!("unknown keep status '{}'", other)),
        }
    }
}

/// A bookmark as read from the store. Treated as an immutable snapshot for
/// the duration of one check cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub id: BookmarkId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub favicon_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// User's cleanup preference. Does NOT stop auto-delete.
    #[serde(default)]
    pub keep_status: KeepStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookmarkRecord {
    /// Minimal constructor, mostly for callers that only know id/title/url.
    pub fn new(id: BookmarkId, title: impl Into<String>, url: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            category: None,
            description: None,
            favicon_url: None,
            tags: Vec::new(),
            keep_status: KeepStatus::Normal,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Why a bookmark ended up in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedReason {
    ManualDelete,
    LinkCheckFailed,
    BatchDeleteInaccessible,
}

impl DeletedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletedReason::ManualDelete => "manual_delete",
            DeletedReason::LinkCheckFailed => "link_check_failed",
            DeletedReason::BatchDeleteInaccessible => "batch_delete_inaccessible",
        }
    }
}

impl FromStr for DeletedReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_delete" => Ok(DeletedReason::ManualDelete),
            "link_check_failed" => Ok(DeletedReason::LinkCheckFailed),
            "batch_delete_inaccessible" => Ok(DeletedReason::BatchDeleteInaccessible),
            other => Err(format!("unknown deleted reason '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedBy {
    User,
    System,
}

impl DeletedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletedBy::User => "user",
            DeletedBy::System => "system",
        }
    }
}

impl FromStr for DeletedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(DeletedBy::User),
            "system" => Ok(DeletedBy::System),
            other => Err(format!("unknown deleter '{}'", other)),
        }
    }
}

impl fmt::Display for DeletedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit metadata attached to a ledger write: everything that is not copied
/// from the bookmark itself.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditMetadata {
    pub deleted_reason: DeletedReason,
    pub check_status: Option<String>,
    pub status_code: Option<u16>,
    pub status_text: Option<String>,
    pub error_message: Option<String>,
    /// Overrides the bookmark's own keep status when set.
    pub keep_status: Option<KeepStatus>,
    pub deleted_by: DeletedBy,
}

impl AuditMetadata {
    /// Metadata for a delete the user asked for.
    pub fn manual() -> Self {
        Self {
            deleted_reason: DeletedReason::ManualDelete,
            check_status: None,
            status_code: None,
            status_text: None,
            error_message: None,
            keep_status: None,
            deleted_by: DeletedBy::User,
        }
    }
}

/// One row of the deleted-bookmarks ledger.
///
/// At most one record may exist per `(url, original_bookmark_id)`; the
/// [`DedupLedger`](crate::ledger::DedupLedger) is what upholds that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionRecord {
    /// The id the bookmark had before it was deleted
    pub original_bookmark_id: BookmarkId,
    pub title: String,
    pub url: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub favicon_url: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Newest wins when duplicate rows are collapsed
    pub deleted_at: DateTime<Utc>,
    pub deleted_reason: DeletedReason,
    /// "failed" for link-check deletes, None for manual ones
    pub check_status: Option<String>,
    /// What the failing probe saw, if a probe was involved
    pub status_code: Option<u16>,
    pub status_text: Option<String>,
    pub error_message: Option<String>,
    pub keep_status: KeepStatus,
    pub deleted_by: DeletedBy,
}

impl DeletionRecord {
    /// Builds the ledger row for `bookmark`, stamped with `deleted_at`.
    pub fn from_bookmark(bookmark: &BookmarkRecord, meta: &AuditMetadata, deleted_at: DateTime<Utc>) -> Self {
        Self {
            original_bookmark_id: bookmark.id,
            title: bookmark.title.clone(),
            url: bookmark.url.clone(),
            category: bookmark.category.clone(),
            description: bookmark.description.clone(),
            favicon_url: bookmark.favicon_url.clone(),
            tags: bookmark.tags.clone(),
            created_at: bookmark.created_at,
            updated_at: bookmark.updated_at,
            deleted_at,
            deleted_reason: meta.deleted_reason,
            check_status: meta.check_status.clone(),
            status_code: meta.status_code,
            status_text: meta.status_text.clone(),
            error_message: meta.error_message.clone(),
            keep_status: meta.keep_status.unwrap_or(bookmark.keep_status),
            deleted_by: meta.deleted_by,
        }
    }

    /// The dedup key.
    pub fn key(&self) -> (&str, BookmarkId) {
        (&self.url, self.original_bookmark_id)
    }
}

/// A ledger row together with the id the ledger store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    #[serde(flatten)]
    pub record: DeletionRecord,
}
