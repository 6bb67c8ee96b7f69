// src/batch/runner.rs
// =============================================================================
// Runs the prober over a whole bookmark collection without hammering the
// sites we check.
//
// How it works:
// 1. Split the bookmarks into fixed-size batches (in input order)
// 2. Probe every bookmark in a batch at the same time
// 3. Wait until ALL of them have settled (join_all), even the slow ones
// 4. Hand each result to the reconciliation policy and fold it into the
//    summary
// 5. Sleep, then start the next batch
//
// Batches never overlap. Inside a batch, probes overlap as in-flight network
// requests on the same task; nothing here spawns threads.
//
// There is no deadline for a whole run. A large collection can take minutes;
// callers that need a bound should wrap run() in their own timeout.
// =============================================================================

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::summary::{CheckRunSummary, SummaryBuilder};
use crate::checker::{Probe, ProbeResult};
use crate::clock::Clock;
use crate::error::{CheckError, StoreError};
use crate::models::BookmarkRecord;
use crate::reconcile::{LedgerWrite, ReconcileOutcome, ReconciliationPolicy};

/// Knobs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Bookmarks probed at once. 0 is treated as 1.
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub auto_delete: bool,
    /// Cap on the dead-link preview in the summary.
    pub preview_limit: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay: Duration::from_secs(1),
            auto_delete: false,
            preview_limit: 10,
        }
    }
}

impl BatchOptions {
    /// How many batches `total` bookmarks will take.
    pub fn batch_count(&self, total: usize) -> usize {
        total.div_ceil(self.batch_size.max(1))
    }
}

pub struct BatchOrchestrator {
    prober: Arc<dyn Probe>,
    policy: Arc<ReconciliationPolicy>,
    clock: Arc<dyn Clock>,
}

impl BatchOrchestrator {
    pub fn new(prober: Arc<dyn Probe>, policy: Arc<ReconciliationPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self { prober, policy, clock }
    }

    /// Checks every bookmark and returns the aggregated summary.
    ///
    /// Per-item failures end up in `summary.errors`. If the bookmark store
    /// becomes unreachable the run stops after the current batch and the
    /// error carries the partial summary.
    pub async fn run(&self, bookmarks: &[BookmarkRecord], options: &BatchOptions) -> Result<CheckRunSummary, CheckError> {
        let batch_size = options.batch_size.max(1);
        let batch_count = options.batch_count(bookmarks.len());
        let mut summary = SummaryBuilder::new(bookmarks.len(), options.preview_limit, options.auto_delete);

        info!(
            total = bookmarks.len(),
            batch_size,
            batches = batch_count,
            auto_delete = options.auto_delete,
            "starting link check"
        );

        for (index, batch) in bookmarks.chunks(batch_size).enumerate() {
            if index > 0 && !options.inter_batch_delay.is_zero() {
                tokio::time::sleep(options.inter_batch_delay).await;
            }

            debug!(batch = index + 1, of = batch_count, size = batch.len(), "checking batch");

            let settled = join_all(batch.iter().map(|bookmark| self.check_one(bookmark, options.auto_delete))).await;

            let mut abort: Option<StoreError> = None;
            for (bookmark, (result, outcome)) in batch.iter().zip(settled) {
                match outcome {
                    Ok(outcome) => summary.record(bookmark, result, &outcome),
                    Err(err) => {
                        let untouched = ReconcileOutcome {
                            deleted: false,
                            ledger: LedgerWrite::NotAttempted,
                            error: Some(err.to_string()),
                        };
                        summary.record(bookmark, result, &untouched);
                        abort.get_or_insert(err);
                    }
                }
            }
            summary.finish_batch();

            if let Some(source) = abort {
                let partial = summary.finish(self.clock.now());
                warn!(
                    checked = partial.checked,
                    total = partial.total,
                    error = %source,
                    "bookmark store unreachable, aborting link check"
                );
                return Err(CheckError::Aborted {
                    summary: Box::new(partial),
                    source,
                });
            }
        }

        let summary = summary.finish(self.clock.now());
        info!(
            checked = summary.checked,
            accessible = summary.accessible,
            inaccessible = summary.inaccessible,
            deleted = summary.deleted,
            errors = summary.errors.len(),
            "link check finished"
        );
        Ok(summary)
    }

    // Probe, then reconcile. The probe itself cannot fail.
    async fn check_one(
        &self,
        bookmark: &BookmarkRecord,
        auto_delete: bool,
    ) -> (ProbeResult, Result<ReconcileOutcome, StoreError>) {
        let result = self.prober.probe(&bookmark.url).await;
        debug!(
            bookmark_id = bookmark.id,
            url = bookmark.url.as_str(),
            accessible = result.accessible,
            status = result.status_code,
            "probed"
        );
        let outcome = self.policy.reconcile(bookmark, &result, auto_delete).await;
        (result, outcome)
    }
}
