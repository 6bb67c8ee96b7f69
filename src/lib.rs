// src/lib.rs
// =============================================================================
// bookmark-link-health: finds dead bookmarks and, when asked, removes them
// while keeping an audit trail of what was removed and why.
//
// Modules:
// - checker:   probe one URL (HEAD, then GET) and classify the answer
// - batch:     probe a whole collection a few at a time
// - reconcile: decide what happens to a bookmark whose link is dead
// - ledger:    the deduplicated record of deleted bookmarks
// - store:     the storage traits plus in-memory and SQLite backends
// - sweep:     reports for manual runs, the weekly sweep and single checks
// - engine:    everything above wired together
//
// Supporting modules: clock, config, error, logging, models
// =============================================================================

pub mod batch;
pub mod checker;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod sweep;

pub use batch::{BatchOptions, BatchOrchestrator, CheckRunSummary};
pub use checker::{HttpProber, LinkStatus, Probe, ProbeMethod, ProbeResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, CheckConfig};
pub use engine::LinkHealthEngine;
pub use error::{CheckError, LedgerError, StoreError};
pub use ledger::DedupLedger;
pub use models::{AuditMetadata, BookmarkId, BookmarkRecord, DeletedReason, DeletionRecord, KeepStatus};
pub use reconcile::{ReconcileOutcome, ReconciliationPolicy};
pub use store::{BookmarkFilter, BookmarkStore, LedgerStore};
