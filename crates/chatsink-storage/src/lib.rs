// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Chatsink sync engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, typed query
//! modules per entity kind, and the [`EntityStore`] facade used by the
//! event router. Collection fields (reactions, receipts) are merged through
//! the pure functions in [`merge`] inside one transaction per update.

pub mod database;
pub mod merge;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

pub use database::Database;
pub use models::*;
pub use store::EntityStore;
