// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and a well-formed batch tier table.

use chatsink_core::SyncError;

use crate::model::SyncConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<SyncError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<SyncError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(SyncError::Config(
            "storage.database_path must not be empty".to_string(),
        ));
    }

    if config.transaction.timeout_ms == 0 {
        errors.push(SyncError::Config(
            "transaction.timeout_ms must be positive".to_string(),
        ));
    }

    if config.retry.max_attempts == 0 {
        errors.push(SyncError::Config(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.batching.progress_every == 0 {
        errors.push(SyncError::Config(
            "batching.progress_every must be positive".to_string(),
        ));
    }

    let tiers = &config.batching.tiers;
    if tiers.is_empty() {
        errors.push(SyncError::Config(
            "batching.tiers must not be empty".to_string(),
        ));
        return Err(errors);
    }

    for (i, tier) in tiers.iter().enumerate() {
        if tier.batch_size == 0 {
            errors.push(SyncError::Config(format!(
                "batching.tiers[{i}].batch_size must be positive"
            )));
        }
        if tier.max_concurrent == 0 {
            errors.push(SyncError::Config(format!(
                "batching.tiers[{i}].max_concurrent must be positive"
            )));
        }
        if tier.timeout_ms == 0 {
            errors.push(SyncError::Config(format!(
                "batching.tiers[{i}].timeout_ms must be positive"
            )));
        }
    }

    // Tiers must descend strictly by min_total and end with a catch-all,
    // and batch size/concurrency must not grow with volume.
    for pair in tiers.windows(2) {
        if pair[1].min_total >= pair[0].min_total {
            errors.push(SyncError::Config(format!(
                "batching.tiers must descend by min_total, got {} before {}",
                pair[0].min_total, pair[1].min_total
            )));
        }
        if pair[0].batch_size > pair[1].batch_size {
            errors.push(SyncError::Config(format!(
                "batching.tiers batch_size must shrink as volume grows, got {} above {}",
                pair[0].batch_size, pair[1].batch_size
            )));
        }
        if pair[0].max_concurrent > pair[1].max_concurrent {
            errors.push(SyncError::Config(format!(
                "batching.tiers max_concurrent must shrink as volume grows, got {} above {}",
                pair[0].max_concurrent, pair[1].max_concurrent
            )));
        }
    }

    if let Some(last) = tiers.last()
        && last.min_total != 0
    {
        errors.push(SyncError::Config(
            "batching.tiers must end with a min_total = 0 catch-all tier".to_string(),
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
