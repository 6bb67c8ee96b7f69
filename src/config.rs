// src/config.rs
// =============================================================================
// TOML configuration for the link checker.
//
// Every field has a default, so an empty file (or no file at all) gives the
// stock behaviour:
//
//   [probe]   head_timeout_ms = 3000, get_timeout_ms = 8000
//   [batch]   batch_size = 10, inter_batch_delay_ms = 1000, preview_limit = 10
//   [sweep]   batch_size = 5,  inter_batch_delay_ms = 2000, preview_limit = 10,
//             history_results_limit = 50
//   [ledger]  path = (none, keep the ledger in memory)
// =============================================================================

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::BatchOptions;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CheckConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    #[serde(default = "default_head_timeout_ms")]
    pub head_timeout_ms: u64,
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,
    /// Empty means the built-in browser list.
    #[serde(default)]
    pub user_agents: Vec<String>,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            head_timeout_ms: default_head_timeout_ms(),
            get_timeout_ms: default_get_timeout_ms(),
            user_agents: Vec::new(),
            accept_language: default_accept_language(),
        }
    }
}

impl ProbeConfig {
    pub fn head_timeout(&self) -> Duration {
        Duration::from_millis(self.head_timeout_ms)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }
}

fn default_head_timeout_ms() -> u64 {
    3000
}
fn default_get_timeout_ms() -> u64 {
    8000
}
fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

/// Settings for admin-triggered and single-item checks.
#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            preview_limit: default_preview_limit(),
        }
    }
}

impl BatchConfig {
    pub fn options(&self, auto_delete: bool) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            auto_delete,
            preview_limit: self.preview_limit,
        }
    }
}

fn default_batch_size() -> usize {
    10
}
fn default_inter_batch_delay_ms() -> u64 {
    1000
}
fn default_preview_limit() -> usize {
    10
}

/// Settings for the weekly scheduled sweep. Smaller batches and a longer
/// pause than manual runs since nobody is waiting on it.
#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_sweep_delay_ms")]
    pub inter_batch_delay_ms: u64,
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
    /// How many per-item results a history record keeps.
    #[serde(default = "default_history_results_limit")]
    pub history_results_limit: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batch_size: default_sweep_batch_size(),
            inter_batch_delay_ms: default_sweep_delay_ms(),
            preview_limit: default_preview_limit(),
            history_results_limit: default_history_results_limit(),
        }
    }
}

impl SweepConfig {
    /// Sweeps only ever report.
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            auto_delete: false,
            preview_limit: self.preview_limit,
        }
    }
}

fn default_sweep_batch_size() -> usize {
    5
}
fn default_sweep_delay_ms() -> u64 {
    2000
}
fn default_history_results_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LedgerConfig {
    /// SQLite file for the deleted-bookmarks ledger.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<CheckConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<CheckConfig> {
    let config: CheckConfig = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.probe.head_timeout_ms == 0 || config.probe.get_timeout_ms == 0 {
        anyhow::bail!("probe timeouts must be > 0");
    }
    if config.probe.get_timeout_ms < config.probe.head_timeout_ms {
        tracing::warn!(
            head_timeout_ms = config.probe.head_timeout_ms,
            get_timeout_ms = config.probe.get_timeout_ms,
            "GET timeout is shorter than HEAD timeout; the GET fallback will give up sooner than the HEAD attempt"
        );
    }
    if config.batch.batch_size == 0 {
        anyhow::bail!("batch.batch_size must be > 0");
    }
    if config.sweep.batch_size == 0 {
        anyhow::bail!("sweep.batch_size must be > 0");
    }
    if config.batch.preview_limit == 0 || config.sweep.preview_limit == 0 {
        anyhow::bail!("preview_limit must be > 0");
    }

    Ok(config)
}
