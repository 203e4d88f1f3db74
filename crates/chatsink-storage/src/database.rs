// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::time::Duration;

use tracing::debug;

use chatsink_core::SyncError;
use chatsink_core::error::is_conflict_message;

/// Convert a tokio-rusqlite error into the engine error taxonomy.
///
/// Lock-contention messages classify as [`SyncError::Conflict`] so callers
/// can route them through retry; everything else is a plain storage error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> SyncError {
    let message = e.to_string();
    if is_conflict_message(&message) {
        SyncError::Conflict { message }
    } else {
        SyncError::Storage {
            source: Box::new(e),
        }
    }
}

/// Handle to the single SQLite connection shared by all query modules.
///
/// Wraps a `tokio_rusqlite::Connection`; every query closure runs on its one
/// background thread, which serializes writes and eliminates SQLITE_BUSY
/// under concurrent access from async tasks.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` with WAL mode enabled and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        Self::open_with_options(path, true).await
    }

    /// Open with explicit control over WAL mode.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, SyncError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| map_tr_err(tokio_rusqlite::Error::Error(e)))?;

        conn.call(move |conn| {
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;
                 PRAGMA temp_store = memory;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        // Migration errors come back as the call's value so refinery's error
        // type never has to cross the closure boundary.
        let migrated: Result<(), SyncError> = conn
            .call(|conn| Ok(crate::migrations::run_migrations(conn)))
            .await
            .map_err(map_tr_err)?;
        migrated?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection handle.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run a query closure under an explicit timeout budget.
    ///
    /// An elapsed timeout surfaces as [`SyncError::Timeout`], which the
    /// retry layer classifies as transient; the operation itself is never
    /// retried here.
    pub async fn call_with_timeout<F, R>(&self, limit: Duration, f: F) -> Result<R, SyncError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        match tokio::time::timeout(limit, self.conn.call(f)).await {
            Ok(result) => result.map_err(map_tr_err),
            Err(_) => Err(SyncError::Timeout { duration: limit }),
        }
    }

    /// Checkpoint the WAL and flush pending writes.
    pub async fn close(&self) -> Result<(), SyncError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_database_and_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("open_test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists(), "database file should be created");

        // All four entity tables exist after migration.
        let count: i64 = db
            .connection()
            .call(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('sessions', 'chats', 'contacts', 'messages')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(count, 4);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_is_idempotent_across_restarts() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen_test.db");
        let path = db_path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();
        drop(db);

        // Second open re-runs the migration runner with nothing pending.
        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn call_with_timeout_surfaces_timeout_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("timeout_test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let result: Result<(), SyncError> = db
            .call_with_timeout(Duration::from_millis(5), |conn| {
                // Busy-loop the background thread past the caller's budget.
                conn.query_row("SELECT 1 WHERE 1 = 0", [], |_| Ok(()))
                    .ok();
                std::thread::sleep(std::time::Duration::from_millis(100));
                Ok(())
            })
            .await;

        match result {
            Err(SyncError::Timeout { .. }) => {}
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_errors_classify_as_transient() {
        let err = SyncError::Timeout {
            duration: Duration::from_millis(5),
        };
        assert!(err.is_transient());
    }
}
