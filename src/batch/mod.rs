// src/batch/mod.rs
// =============================================================================
// Checking whole bookmark collections.
//
// Submodules:
// - runner: The batch orchestrator (rate-limited, batch-at-a-time probing)
// - summary: The aggregated result of one run
// =============================================================================

mod runner;
mod summary;

pub use runner::{BatchOptions, BatchOrchestrator};
pub use summary::{CheckRunSummary, ItemError, ItemOutcome, ItemState, PreviewEntry};
