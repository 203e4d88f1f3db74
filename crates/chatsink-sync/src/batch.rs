// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Volume-tiered batch planning and bounded-concurrency execution.
//!
//! Large backfills are split into batches sized by the volume tier table:
//! more items means smaller batches and fewer concurrent transactions, so
//! each transaction stays inside its timeout budget and the backend's
//! connection handling is never overwhelmed. One batch is one transaction;
//! a failed batch is surfaced without cancelling its siblings.

use std::time::Duration;

use futures::{Future, StreamExt, stream};
use tracing::{info, warn};

use chatsink_config::BatchingConfig;
use chatsink_core::SyncError;

/// The execution parameters chosen for one bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub batch_timeout: Duration,
}

impl BatchPlan {
    /// Pick the plan for a total item count from the configured tier table.
    pub fn for_volume(total: usize, batching: &BatchingConfig) -> Self {
        let tier = batching.tier_for(total);
        Self {
            batch_size: tier.batch_size.max(1),
            max_concurrent: tier.max_concurrent.max(1),
            batch_timeout: Duration::from_millis(tier.timeout_ms),
        }
    }
}

/// Outcome of a batched run: how much completed and which batches failed.
#[derive(Debug)]
pub struct BatchReport {
    pub total_items: usize,
    pub total_batches: usize,
    pub completed: usize,
    pub failures: Vec<(usize, SyncError)>,
}

impl BatchReport {
    fn empty() -> Self {
        Self {
            total_items: 0,
            total_batches: 0,
            completed: 0,
            failures: Vec::new(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Partition `items` per the plan and run `op` over the batches with bounded
/// concurrency.
///
/// `op` receives the owned batch and its index. Failures are collected (and
/// logged) per batch; already-dispatched sibling batches run to completion
/// regardless. Cumulative progress is logged after every `progress_every`
/// completed batches and at the end.
pub async fn run_batches<T, F, Fut>(
    items: Vec<T>,
    plan: &BatchPlan,
    progress_every: usize,
    label: &str,
    op: F,
) -> BatchReport
where
    T: Send,
    F: Fn(Vec<T>, usize) -> Fut,
    Fut: Future<Output = Result<(), SyncError>>,
{
    let total_items = items.len();
    if total_items == 0 {
        return BatchReport::empty();
    }

    let mut batches: Vec<Vec<T>> = Vec::with_capacity(total_items.div_ceil(plan.batch_size));
    let mut iter = items.into_iter();
    loop {
        let batch: Vec<T> = iter.by_ref().take(plan.batch_size).collect();
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }
    let total_batches = batches.len();
    let progress_every = progress_every.max(1);

    let mut in_flight = stream::iter(batches.into_iter().enumerate().map(|(index, batch)| {
        let fut = op(batch, index);
        async move { (index, fut.await) }
    }))
    .buffer_unordered(plan.max_concurrent);

    let mut completed = 0usize;
    let mut done = 0usize;
    let mut failures = Vec::new();
    while let Some((index, result)) = in_flight.next().await {
        done += 1;
        match result {
            Ok(()) => {
                completed += 1;
                if completed % progress_every == 0 || done == total_batches {
                    info!(
                        label,
                        batches_done = done,
                        total_batches,
                        percent = done * 100 / total_batches,
                        "bulk progress"
                    );
                }
            }
            Err(error) => {
                warn!(label, batch = index, %error, "batch failed");
                failures.push((index, error));
            }
        }
    }

    BatchReport {
        total_items,
        total_batches,
        completed,
        failures,
    }
}
