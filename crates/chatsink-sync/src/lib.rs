// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Chatsink synchronization engine.
//!
//! Keeps a relational store eventually consistent with a live messaging
//! event source: events are sanitized, their identities resolved to
//! canonical addresses, and written through conflict-safe batched
//! transactions with bounded retry. One [`router::SyncEngine`] runs per
//! session; sessions are fully isolated.

pub mod batch;
pub mod keys;
pub mod resolve;
pub mod retry;
pub mod router;
pub mod sanitize;

pub use batch::{BatchPlan, BatchReport, run_batches};
pub use keys::{KeyMutation, KeyStore};
pub use resolve::IdentityResolver;
pub use retry::{RetryPolicy, with_retry};
pub use router::SyncEngine;
pub use sanitize::{CleanRecord, sanitize};
