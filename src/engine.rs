// src/engine.rs
// =============================================================================
// LinkHealthEngine: one object that wires the prober, the stores, the ledger
// and the batch runner together.
//
// Nothing in here is global. Build an engine with the stores and clock you
// want (real ones in production, in-memory ones in tests) and call it.
//
// Entry points:
// - probe_single:      is this URL alive?
// - run_batch_check:   check a list of bookmarks
// - reconcile_one:     apply the delete/audit decision for one result
// - run_manual_check:  list bookmarks from the store, check, maybe delete
// - run_weekly_sweep:  list, check, report only
// - check_single:      probe one bookmark and maybe delete it
// - cleanup_duplicates: collapse duplicate ledger rows
// =============================================================================

use std::sync::Arc;
use tracing::{info, warn};

use crate::batch::{BatchOptions, BatchOrchestrator, CheckRunSummary};
use crate::checker::{HttpProber, Probe, ProbeResult};
use crate::clock::Clock;
use crate::config::CheckConfig;
use crate::error::{CheckError, LedgerError, StoreError};
use crate::ledger::{CleanupReport, DedupLedger};
use crate::models::{BookmarkId, BookmarkRecord};
use crate::reconcile::{ReconcileOutcome, ReconciliationPolicy};
use crate::store::{BookmarkFilter, BookmarkStore, LedgerStore};
use crate::sweep::{CheckKind, CheckRecord, ManualReport, SingleCheckOutcome, SweepNotification, WeeklyReport};

pub struct LinkHealthEngine {
    config: CheckConfig,
    prober: Arc<dyn Probe>,
    bookmarks: Arc<dyn BookmarkStore>,
    ledger: Arc<DedupLedger>,
    policy: Arc<ReconciliationPolicy>,
    orchestrator: BatchOrchestrator,
}

impl LinkHealthEngine {
    pub fn new(
        config: CheckConfig,
        prober: Arc<dyn Probe>,
        bookmarks: Arc<dyn BookmarkStore>,
        ledger_store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = Arc::new(DedupLedger::new(ledger_store, clock.clone()));
        let policy = Arc::new(ReconciliationPolicy::new(ledger.clone(), bookmarks.clone()));
        let orchestrator = BatchOrchestrator::new(prober.clone(), policy.clone(), clock);

        Self {
            config,
            prober,
            bookmarks,
            ledger,
            policy,
            orchestrator,
        }
    }

    /// An engine that probes over real HTTP with the configured timeouts.
    pub fn with_http_prober(
        config: CheckConfig,
        bookmarks: Arc<dyn BookmarkStore>,
        ledger_store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        let prober = Arc::new(HttpProber::new(config.probe.clone(), clock.clone())?);
        Ok(Self::new(config, prober, bookmarks, ledger_store, clock))
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub async fn probe_single(&self, url: &str) -> ProbeResult {
        self.prober.probe(url).await
    }

    pub async fn run_batch_check(
        &self,
        bookmarks: &[BookmarkRecord],
        options: &BatchOptions,
    ) -> Result<CheckRunSummary, CheckError> {
        self.orchestrator.run(bookmarks, options).await
    }

    pub async fn reconcile_one(
        &self,
        bookmark: &BookmarkRecord,
        result: &ProbeResult,
        auto_delete: bool,
    ) -> Result<ReconcileOutcome, StoreError> {
        self.policy.reconcile(bookmark, result, auto_delete).await
    }

    /// Admin-triggered check of every bookmark matching `filter`.
    pub async fn run_manual_check(&self, filter: &BookmarkFilter, auto_delete: bool) -> Result<ManualReport, CheckError> {
        let bookmarks = self.bookmarks.list(filter).await.map_err(CheckError::List)?;
        let summary = self
            .orchestrator
            .run(&bookmarks, &self.config.batch.options(auto_delete))
            .await?;
        let record = CheckRecord::from_summary(CheckKind::Manual, &summary, usize::MAX);

        info!(key = record.history_key().as_str(), "manual check: {}", summary.message());
        Ok(ManualReport { summary, record })
    }

    /// The weekly scheduled sweep. Always report-only.
    pub async fn run_weekly_sweep(&self, filter: &BookmarkFilter) -> Result<WeeklyReport, CheckError> {
        let bookmarks = self.bookmarks.list(filter).await.map_err(CheckError::List)?;
        let summary = self.orchestrator.run(&bookmarks, &self.config.sweep.options()).await?;

        let record = CheckRecord::from_summary(
            CheckKind::WeeklyAutoCheck,
            &summary,
            self.config.sweep.history_results_limit,
        );
        let notification = SweepNotification::for_summary(&summary);
        if let Some(note) = &notification {
            warn!(inaccessible = note.inaccessible_count, "weekly sweep found dead links");
        }

        info!(key = record.history_key().as_str(), "weekly sweep: {}", summary.message());
        Ok(WeeklyReport {
            summary,
            record,
            notification,
        })
    }

    /// Probes one bookmark's URL and, when `auto_delete` is set and the link
    /// is dead, removes the bookmark.
    ///
    /// Store problems are reported in `delete_error`; the probe result is
    /// always returned.
    pub async fn check_single(&self, bookmark_id: BookmarkId, url: &str, auto_delete: bool) -> SingleCheckOutcome {
        let result = self.prober.probe(url).await;
        let mut outcome = SingleCheckOutcome {
            bookmark_id,
            result,
            deleted: false,
            delete_error: None,
        };

        if !auto_delete || outcome.result.accessible {
            return outcome;
        }

        match self.bookmarks.get(bookmark_id).await {
            Ok(Some(bookmark)) => match self.policy.reconcile(&bookmark, &outcome.result, true).await {
                Ok(reconciled) => {
                    outcome.deleted = reconciled.deleted;
                    outcome.delete_error = reconciled.error;
                }
                Err(err) => outcome.delete_error = Some(err.to_string()),
            },
            Ok(None) => {
                info!(bookmark_id, "bookmark no longer exists, nothing to delete");
            }
            Err(err) => {
                warn!(bookmark_id, error = %err, "could not load bookmark for deletion");
                outcome.delete_error = Some(err.to_string());
            }
        }

        outcome
    }

    pub async fn cleanup_duplicates(&self) -> Result<CleanupReport, LedgerError> {
        self.ledger.cleanup_duplicates().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{classify, classify_error, ProbeMethod};
    use crate::clock::ManualClock;
    use crate::config::parse_config;
    use crate::models::KeepStatus;
    use crate::store::{MemoryBookmarkStore, MemoryLedgerStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;
    use std::collections::HashSet;

    struct DeadSet(HashSet<String>);

    #[async_trait]
    impl Probe for DeadSet {
        async fn probe(&self, url: &str) -> ProbeResult {
            if self.0.contains(url) {
                let verdict = classify(StatusCode::NOT_FOUND, &HeaderMap::new());
                ProbeResult::from_response(url, StatusCode::NOT_FOUND, ProbeMethod::Get, verdict, Utc::now())
            } else if url.is_empty() {
                ProbeResult::network_failure(url, classify_error("dns error"), Utc::now())
            } else {
                let verdict = classify(StatusCode::OK, &HeaderMap::new());
                ProbeResult::from_response(url, StatusCode::OK, ProbeMethod::Head, verdict, Utc::now())
            }
        }
    }

    struct Setup {
        engine: LinkHealthEngine,
        store: Arc<MemoryBookmarkStore>,
        ledger: Arc<MemoryLedgerStore>,
    }

    fn setup(config: CheckConfig) -> Setup {
        let at = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
        let mut keep = BookmarkRecord::new(3, "Archive", "https://gone.example/old", at);
        keep.keep_status = KeepStatus::Keep;
        let store = Arc::new(MemoryBookmarkStore::new(vec![
            BookmarkRecord::new(1, "GitHub", "https://github.com", at),
            BookmarkRecord::new(2, "Rust", "https://www.rust-lang.org", at),
            keep,
            BookmarkRecord::new(4, "Blog", "https://gone.example/blog", at),
        ]));
        let ledger = Arc::new(MemoryLedgerStore::new());
        let prober = Arc::new(DeadSet(
            ["https://gone.example/old", "https://gone.example/blog"]
                .iter()
                .map(|u| u.to_string())
                .collect(),
        ));
        let engine = LinkHealthEngine::new(
            config,
            prober,
            store.clone(),
            ledger.clone(),
            Arc::new(ManualClock::new(at)),
        );
        Setup { engine, store, ledger }
    }

    fn fast_config() -> CheckConfig {
        parse_config("[batch]\ninter_batch_delay_ms = 0\n[sweep]\ninter_batch_delay_ms = 0\n").unwrap()
    }

    #[tokio::test]
    async fn test_weekly_sweep_reports_without_deleting() {
        let s = setup(fast_config());

        let report = s.engine.run_weekly_sweep(&BookmarkFilter::excluding_presets()).await.unwrap();

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.inaccessible, 2);
        assert_eq!(report.summary.deleted, 0);
        assert!(!report.summary.auto_delete);
        assert_eq!(report.record.kind, CheckKind::WeeklyAutoCheck);
        assert_eq!(report.notification.unwrap().inaccessible_count, 2);
        assert_eq!(s.store.len().await, 4);
        assert!(s.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_manual_check_with_auto_delete() {
        let s = setup(fast_config());

        let report = s.engine.run_manual_check(&BookmarkFilter::all(), true).await.unwrap();

        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.deleted, 2);
        assert_eq!(report.record.results.len(), 4);
        // keep status does not protect from auto-delete
        assert!(!s.store.contains(3).await);
        assert_eq!(s.ledger.len().await, 2);
    }

    #[tokio::test]
    async fn test_manual_check_fails_when_store_is_down() {
        let s = setup(fast_config());
        s.store.set_unavailable(true);

        let err = s.engine.run_manual_check(&BookmarkFilter::all(), true).await.unwrap_err();
        assert!(matches!(err, CheckError::List(_)));
        assert!(err.partial_summary().is_none());
    }

    #[tokio::test]
    async fn test_check_single_deletes_dead_bookmark() {
        let s = setup(fast_config());

        let outcome = s.engine.check_single(4, "https://gone.example/blog", true).await;

        assert!(!outcome.result.accessible);
        assert!(outcome.deleted);
        assert_eq!(outcome.delete_error, None);
        assert!(!s.store.contains(4).await);
        assert!(s.engine.ledger().contains("https://gone.example/blog", 4).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_single_report_only_and_missing_bookmark() {
        let s = setup(fast_config());

        let reported = s.engine.check_single(4, "https://gone.example/blog", false).await;
        assert!(!reported.deleted);
        assert!(s.store.contains(4).await);

        let missing = s.engine.check_single(99, "https://gone.example/blog", true).await;
        assert!(!missing.deleted);
        assert_eq!(missing.delete_error, None);
    }

    #[tokio::test]
    async fn test_check_single_surfaces_store_errors() {
        let s = setup(fast_config());
        s.store.set_unavailable(true);

        let outcome = s.engine.check_single(4, "https://gone.example/blog", true).await;

        assert!(!outcome.deleted);
        assert!(outcome.delete_error.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_probe_and_reconcile_one() {
        let s = setup(fast_config());
        let bookmark = BookmarkRecord::new(2, "Rust", "https://www.rust-lang.org", Utc::now());

        let result = s.engine.probe_single(&bookmark.url).await;
        assert!(result.accessible);

        let outcome = s.engine.reconcile_one(&bookmark, &result, true).await.unwrap();
        assert!(!outcome.deleted);
    }
}
