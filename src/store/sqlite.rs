// src/store/sqlite.rs
// =============================================================================
// The deleted-bookmarks ledger on SQLite.
//
// Column names match the deleted_bookmarks table the bookmark manager has
// always used, so a restore feature reading the same table keeps working.
// Timestamps are written as RFC 3339 text (UTC, fixed precision).
//
// Rows written before this crate existed use SQLite's CURRENT_TIMESTAMP
// layout ("2024-02-01 10:00:00"); both layouts are read back.
//
// Older databases may already hold duplicate rows, so the UNIQUE index on
// (url, original_bookmark_id) can't go into migrate(). open() collapses the
// duplicates and then adds it.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use super::{DuplicateGroup, LedgerStore, StoreResult};
use crate::config::LedgerConfig;
use crate::error::StoreError;
use crate::models::{BookmarkId, DeletionRecord, LedgerEntry};

const SELECT_COLUMNS: &str = "id, original_bookmark_id, title, url, category, description, favicon_url, tags, \
     created_at, updated_at, deleted_at, deleted_reason, check_status, status_code, status_text, \
     error_message, keep_status, deleted_by";

#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Opens (creating if needed) a ledger database file.
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// A private in-memory database. One connection, kept alive for the
    /// life of the pool, since every new connection would see an empty DB.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Opens the ledger described by `config`, ready for concurrent writers:
    /// the table exists, old duplicate rows are collapsed and the dedup key
    /// is enforced. No path means a throwaway in-memory ledger.
    pub async fn open(config: &LedgerConfig) -> StoreResult<Self> {
        let store = match &config.path {
            Some(path) => Self::connect(path).await?,
            None => Self::in_memory().await?,
        };
        store.migrate().await?;

        let collapsed = store.collapse_duplicates().await?;
        if collapsed > 0 {
            info!(removed = collapsed, "collapsed duplicate deletion records");
        }
        store.enforce_unique_key().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deleted_bookmarks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                original_bookmark_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                category TEXT,
                description TEXT,
                favicon_url TEXT,
                tags TEXT,
                created_at TEXT,
                updated_at TEXT,
                deleted_at TEXT DEFAULT CURRENT_TIMESTAMP,
                deleted_reason TEXT,
                check_status TEXT,
                status_code INTEGER,
                status_text TEXT,
                error_message TEXT,
                keep_status TEXT,
                deleted_by TEXT DEFAULT 'system'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_deleted_bookmarks_original_id ON deleted_bookmarks(original_bookmark_id)",
            "CREATE INDEX IF NOT EXISTS idx_deleted_bookmarks_deleted_at ON deleted_bookmarks(deleted_at)",
            "CREATE INDEX IF NOT EXISTS idx_deleted_bookmarks_url ON deleted_bookmarks(url)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Deletes every row but the most recently deleted one for each key.
    /// Returns how many rows went.
    ///
    /// Works on ids and `deleted_at` only, so rows written by older versions
    /// of the bookmark manager don't need to decode.
    pub async fn collapse_duplicates(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM deleted_bookmarks
            WHERE id NOT IN (
                SELECT id FROM (
                    SELECT id, ROW_NUMBER() OVER (
                        PARTITION BY url, original_bookmark_id
                        ORDER BY julianday(deleted_at) DESC, id DESC
                    ) AS newest
                    FROM deleted_bookmarks
                )
                WHERE newest = 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Adds the UNIQUE index on the dedup key. Fails if duplicates remain.
    pub async fn enforce_unique_key(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_deleted_bookmarks_url_original_id \
             ON deleted_bookmarks(url, original_bookmark_id)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM deleted_bookmarks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// SQLite's own CURRENT_TIMESTAMP layout, used by rows older than this crate.
const SQLITE_TS_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_ts(column: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    SQLITE_TS_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| StoreError::Write(format!("bad {} '{}'", column, raw)))
}

fn parse_optional_ts(column: &str, raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.filter(|value| !value.is_empty())
        .map(|value| parse_ts(column, &value))
        .transpose()
}

fn parse_enum<T: FromStr<Err = String>>(raw: Option<String>, fallback: T) -> StoreResult<T> {
    match raw {
        Some(value) => value.parse().map_err(StoreError::Write),
        None => Ok(fallback),
    }
}

fn row_to_entry(row: &SqliteRow) -> StoreResult<LedgerEntry> {
    let tags: Option<String> = row.try_get("tags")?;
    let tags = match tags {
        Some(raw) if !raw.is_empty() => serde_json::from_str(&raw).unwrap_or_else(|_| vec![raw]),
        _ => Vec::new(),
    };
    let status_code: Option<i64> = row.try_get("status_code")?;
    // Missing creation times fall back to the deletion time.
    let deleted_at = parse_optional_ts("deleted_at", row.try_get("deleted_at")?)?
        .ok_or_else(|| StoreError::Write("deleted_at is NULL".to_string()))?;

    let record = DeletionRecord {
        original_bookmark_id: row.try_get("original_bookmark_id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        favicon_url: row.try_get("favicon_url")?,
        tags,
        created_at: parse_optional_ts("created_at", row.try_get("created_at")?)?.unwrap_or(deleted_at),
        updated_at: parse_optional_ts("updated_at", row.try_get("updated_at")?)?.unwrap_or(deleted_at),
        deleted_at,
        deleted_reason: parse_enum(
            row.try_get("deleted_reason")?,
            crate::models::DeletedReason::ManualDelete,
        )?,
        check_status: row.try_get("check_status")?,
        status_code: status_code.and_then(|c| u16::try_from(c).ok()),
        status_text: row.try_get("status_text")?,
        error_message: row.try_get("error_message")?,
        keep_status: parse_enum(row.try_get("keep_status")?, crate::models::KeepStatus::Normal)?,
        deleted_by: parse_enum(row.try_get("deleted_by")?, crate::models::DeletedBy::System)?,
    };

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        record,
    })
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn find_one(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Option<LedgerEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM deleted_bookmarks WHERE url = ? AND original_bookmark_id = ? LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(url)
        .bind(original_bookmark_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn contains_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM deleted_bookmarks WHERE url = ? AND original_bookmark_id = ? LIMIT 1")
                .bind(url)
                .bind(original_bookmark_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn insert(&self, record: &DeletionRecord) -> StoreResult<i64> {
        let tags = serde_json::to_string(&record.tags).map_err(|e| StoreError::Write(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO deleted_bookmarks (
                original_bookmark_id, title, url, category, description,
                favicon_url, tags, created_at, updated_at, deleted_at, deleted_reason,
                check_status, status_code, status_text, error_message,
                keep_status, deleted_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.original_bookmark_id)
        .bind(&record.title)
        .bind(&record.url)
        .bind(&record.category)
        .bind(&record.description)
        .bind(&record.favicon_url)
        .bind(tags)
        .bind(format_ts(&record.created_at))
        .bind(format_ts(&record.updated_at))
        .bind(format_ts(&record.deleted_at))
        .bind(record.deleted_reason.as_str())
        .bind(&record.check_status)
        .bind(record.status_code.map(i64::from))
        .bind(&record.status_text)
        .bind(&record.error_message)
        .bind(record.keep_status.as_str())
        .bind(record.deleted_by.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn delete_many(&self, ids: &[i64]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM deleted_bookmarks WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn duplicate_groups(&self) -> StoreResult<Vec<DuplicateGroup>> {
        let rows = sqlx::query(
            r#"
            SELECT url, original_bookmark_id, COUNT(*) AS count
            FROM deleted_bookmarks
            GROUP BY url, original_bookmark_id
            HAVING COUNT(*) > 1
            ORDER BY url, original_bookmark_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<DuplicateGroup> {
                let count: i64 = row.try_get("count")?;
                Ok(DuplicateGroup {
                    url: row.try_get("url")?,
                    original_bookmark_id: row.try_get("original_bookmark_id")?,
                    count: count as u64,
                })
            })
            .collect()
    }

    async fn find_by_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM deleted_bookmarks WHERE url = ? AND original_bookmark_id = ? \
             ORDER BY julianday(deleted_at) DESC, id DESC",
            SELECT_COLUMNS
        ))
        .bind(url)
        .bind(original_bookmark_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn ids_for_key(&self, url: &str, original_bookmark_id: BookmarkId) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM deleted_bookmarks WHERE url = ? AND original_bookmark_id = ? \
             ORDER BY julianday(deleted_at) DESC, id DESC",
        )
        .bind(url)
        .bind(original_bookmark_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::ledger::DedupLedger;
    use crate::models::{AuditMetadata, BookmarkRecord, DeletedBy, DeletedReason, KeepStatus};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    // A row as the bookmark manager wrote it before this crate: SQLite
    // timestamps, no created/updated times.
    async fn seed_legacy_row(store: &SqliteLedgerStore, url: &str, id: BookmarkId, deleted_at: &str) {
        sqlx::query(
            "INSERT INTO deleted_bookmarks (original_bookmark_id, title, url, deleted_at, deleted_reason, deleted_by) \
             VALUES (?, 'Old', ?, ?, 'link_check_failed', 'system')",
        )
        .bind(id)
        .bind(url)
        .bind(deleted_at)
        .execute(store.pool())
        .await
        .unwrap();
    }

    async fn ledger() -> SqliteLedgerStore {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn record(id: BookmarkId, url: &str, deleted_at: DateTime<Utc>) -> DeletionRecord {
        let created = Utc.with_ymd_and_hms(2023, 1, 1, 8, 30, 0).unwrap();
        let mut bookmark = BookmarkRecord::new(id, "Docs", url, created);
        bookmark.tags = vec!["rust".to_string(), "docs".to_string()];
        bookmark.keep_status = KeepStatus::Keep;
        let meta = AuditMetadata {
            deleted_reason: DeletedReason::LinkCheckFailed,
            check_status: Some("failed".to_string()),
            status_code: Some(404),
            status_text: Some("Not Found".to_string()),
            error_message: Some("page not found".to_string()),
            keep_status: None,
            deleted_by: DeletedBy::System,
        };
        DeletionRecord::from_bookmark(&bookmark, &meta, deleted_at)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = ledger().await;
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let original = record(5, "https://gone.example", at);

        let id = store.insert(&original).await.unwrap();
        let found = store.find_one("https://gone.example", 5).await.unwrap().unwrap();

        assert_eq!(found.id, id);
        assert_eq!(found.record, original);
        assert!(store.find_one("https://gone.example", 6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_index_reports_conflict() {
        let store = ledger().await;
        store.enforce_unique_key().await.unwrap();
        let at = Utc::now();

        store.insert(&record(1, "https://a.example", at)).await.unwrap();
        let err = store.insert(&record(1, "https://a.example", at)).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unique_index_refused_while_duplicates_exist() {
        let store = ledger().await;
        let at = Utc::now();
        store.insert(&record(1, "https://a.example", at)).await.unwrap();
        store.insert(&record(1, "https://a.example", at)).await.unwrap();

        assert!(store.enforce_unique_key().await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_groups_and_ordering() {
        let store = ledger().await;
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        for days in [0, 5, 2] {
            store.insert(&record(1, "https://a.example", t0 + Duration::days(days))).await.unwrap();
        }
        store.insert(&record(2, "https://b.example", t0)).await.unwrap();

        let groups = store.duplicate_groups().await.unwrap();
        assert_eq!(
            groups,
            vec![DuplicateGroup {
                url: "https://a.example".to_string(),
                original_bookmark_id: 1,
                count: 3
            }]
        );

        let rows = store.find_by_key("https://a.example", 1).await.unwrap();
        let order: Vec<_> = rows.iter().map(|r| r.record.deleted_at).collect();
        assert_eq!(order, vec![t0 + Duration::days(5), t0 + Duration::days(2), t0]);

        let removed = store.delete_many(&[rows[1].id, rows[2].id]).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.delete_many(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            path: Some(dir.path().join("ledger.db")),
        };

        let store = SqliteLedgerStore::open(&config).await.unwrap();
        store.insert(&record(3, "https://d.example", Utc::now())).await.unwrap();
        drop(store);

        let reopened = SqliteLedgerStore::open(&config).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);

        let scratch = SqliteLedgerStore::open(&LedgerConfig::default()).await.unwrap();
        assert_eq!(scratch.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_opened_ledger_writes_once_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            path: Some(dir.path().join("ledger.db")),
        };

        for config in [config, LedgerConfig::default()] {
            let store = SqliteLedgerStore::open(&config).await.unwrap();
            let ledger = DedupLedger::new(Arc::new(store.clone()), Arc::new(SystemClock));
            let b = BookmarkRecord::new(7, "Gone", "https://gone.example", Utc::now());
            let meta = AuditMetadata::manual();

            let (first, second) =
                tokio::join!(ledger.insert_if_absent(&b, &meta), ledger.insert_if_absent(&b, &meta));

            assert!(first.unwrap() ^ second.unwrap());
            assert_eq!(store.count().await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_open_collapses_legacy_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let legacy = SqliteLedgerStore::connect(&path).await.unwrap();
        legacy.migrate().await.unwrap();
        seed_legacy_row(&legacy, "https://a.example", 1, "2024-02-01 10:00:00").await;
        seed_legacy_row(&legacy, "https://a.example", 1, "2024-03-01 10:00:00").await;
        seed_legacy_row(&legacy, "https://a.example", 1, "2024-01-01 10:00:00").await;
        seed_legacy_row(&legacy, "https://b.example", 2, "2024-01-01 10:00:00").await;
        legacy.pool().close().await;

        let store = SqliteLedgerStore::open(&LedgerConfig { path: Some(path) }).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let kept = store.find_one("https://a.example", 1).await.unwrap().unwrap();
        let march = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(kept.record.deleted_at, march);
        assert_eq!(kept.record.created_at, march);

        // The key is enforced from now on.
        let err = store.insert(&record(2, "https://b.example", Utc::now())).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_legacy_rows_are_readable() {
        let store = ledger().await;
        sqlx::query("INSERT INTO deleted_bookmarks (original_bookmark_id, title, url, created_at) VALUES (3, 'Old', ?, ?)")
            .bind("https://c.example")
            .bind("2023-05-06 07:08:09")
            .execute(store.pool())
            .await
            .unwrap();

        let found = store.find_one("https://c.example", 3).await.unwrap().unwrap();

        assert_eq!(found.record.created_at, Utc.with_ymd_and_hms(2023, 5, 6, 7, 8, 9).unwrap());
        assert_eq!(found.record.deleted_by, DeletedBy::System);
        assert_eq!(found.record.deleted_reason, DeletedReason::ManualDelete);
        assert!(found.record.tags.is_empty());
        assert!(store.contains_key("https://c.example", 3).await.unwrap());
    }

    #[test]
    fn test_parse_ts_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_ts("deleted_at", "2024-02-01 10:00:00").unwrap(), expected);
        assert_eq!(parse_ts("deleted_at", "2024-02-01T10:00:00.000Z").unwrap(), expected);
        assert_eq!(parse_ts("deleted_at", "2024-02-01T10:00:00.000000Z").unwrap(), expected);
        assert!(parse_ts("deleted_at", "yesterday").is_err());
    }

    #[tokio::test]
    async fn test_file_backed_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");

        let store = SqliteLedgerStore::connect(&path).await.unwrap();
        store.migrate().await.unwrap();
        store.insert(&record(9, "https://c.example", Utc::now())).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
