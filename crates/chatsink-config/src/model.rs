// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Chatsink sync engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Chatsink configuration.
///
/// Loaded from TOML files with environment variable overrides. All sections
/// are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Transaction timeout settings.
    #[serde(default)]
    pub transaction: TransactionConfig,

    /// Retry/backoff settings for transient storage conflicts.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Volume-tiered batch sizing for bulk backfills.
    #[serde(default)]
    pub batching: BatchingConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("chatsink").join("chatsink.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("chatsink.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Transaction timeout configuration.
///
/// Small single-record operations get the short fixed timeout; bulk batch
/// timeouts come from the volume tier table instead.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionConfig {
    /// Timeout in milliseconds for single-record operations.
    #[serde(default = "default_txn_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_txn_timeout_ms(),
        }
    }
}

fn default_txn_timeout_ms() -> u64 {
    5_000
}

/// Retry/backoff configuration for transient storage conflicts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum attempts per operation (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds; attempt n waits `base * 2^(n-1)` plus jitter.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

/// Volume-tiered batch sizing configuration.
///
/// Tiers are ordered by descending `min_total`; the first tier whose
/// `min_total` the item count exceeds wins. Batch size and concurrency
/// shrink as volume grows so each transaction stays inside its timeout
/// budget; the per-batch timeout grows with volume.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchingConfig {
    /// Log cumulative progress after every Nth completed batch.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,

    /// Volume tiers, descending by `min_total`. The last tier must have
    /// `min_total = 0` so every volume matches something.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<BatchTier>,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            progress_every: default_progress_every(),
            tiers: default_tiers(),
        }
    }
}

/// Used only if the tier table was emptied past validation.
static FALLBACK_TIER: BatchTier = BatchTier {
    min_total: 0,
    batch_size: 500,
    max_concurrent: 5,
    timeout_ms: 20_000,
};

impl BatchingConfig {
    /// Select the tier for a total item count.
    ///
    /// Falls back to the last tier; validation guarantees a `min_total = 0`
    /// catch-all exists.
    pub fn tier_for(&self, total: usize) -> &BatchTier {
        self.tiers
            .iter()
            .find(|t| total > t.min_total)
            .or_else(|| self.tiers.last())
            .unwrap_or(&FALLBACK_TIER)
    }
}

/// One volume tier of the batch table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchTier {
    /// This tier applies when the total item count exceeds `min_total`.
    pub min_total: usize,
    pub batch_size: usize,
    pub max_concurrent: usize,
    /// Per-batch transaction timeout in milliseconds.
    pub timeout_ms: u64,
}

fn default_progress_every() -> usize {
    10
}

fn default_tiers() -> Vec<BatchTier> {
    vec![
        BatchTier {
            min_total: 10_000,
            batch_size: 50,
            max_concurrent: 2,
            timeout_ms: 60_000,
        },
        BatchTier {
            min_total: 5_000,
            batch_size: 100,
            max_concurrent: 3,
            timeout_ms: 45_000,
        },
        BatchTier {
            min_total: 1_000,
            batch_size: 200,
            max_concurrent: 4,
            timeout_ms: 30_000,
        },
        BatchTier {
            min_total: 0,
            batch_size: 500,
            max_concurrent: 5,
            timeout_ms: 20_000,
        },
    ]
}
