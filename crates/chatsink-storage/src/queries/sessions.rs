// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session (credential/key blob) operations.

use std::time::Duration;

use chatsink_core::SyncError;
use rusqlite::{params, params_from_iter};

use crate::database::Database;
use crate::models::SessionRecord;

/// Create-or-overwrite a session blob keyed by (session_id, id).
pub async fn upsert_session(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    record: &SessionRecord,
) -> Result<(), SyncError> {
    let session_id = session_id.to_string();
    let record = record.clone();
    db.call_with_timeout(timeout, move |conn| {
        conn.execute(
            "INSERT INTO sessions (session_id, id, data) VALUES (?1, ?2, ?3)
             ON CONFLICT (session_id, id) DO UPDATE SET data = excluded.data",
            params![session_id, record.id, record.data],
        )?;
        Ok(())
    })
    .await
}

/// Fetch the blobs for the given ids. Missing ids are simply absent from the
/// result; the caller decides whether that matters.
pub async fn get_sessions(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    ids: &[String],
) -> Result<Vec<SessionRecord>, SyncError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let session_id = session_id.to_string();
    let ids = ids.to_vec();
    db.call_with_timeout(timeout, move |conn| {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, data FROM sessions WHERE session_id = ? AND id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(std::iter::once(session_id).chain(ids)),
            |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    data: row.get(1)?,
                })
            },
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    })
    .await
}

/// Delete the given session blobs. Returns the number of rows removed.
pub async fn delete_sessions(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    ids: &[String],
) -> Result<usize, SyncError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let session_id = session_id.to_string();
    let ids = ids.to_vec();
    db.call_with_timeout(timeout, move |conn| {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql =
            format!("DELETE FROM sessions WHERE session_id = ? AND id IN ({placeholders})");
        let removed = conn.execute(
            &sql,
            params_from_iter(std::iter::once(session_id).chain(ids)),
        )?;
        Ok(removed)
    })
    .await
}

/// Delete every blob for the session except one id (the root credentials).
pub async fn delete_sessions_except(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    keep_id: &str,
) -> Result<usize, SyncError> {
    let session_id = session_id.to_string();
    let keep_id = keep_id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        let removed = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1 AND id != ?2",
            params![session_id, keep_id],
        )?;
        Ok(removed)
    })
    .await
}

/// Delete everything for the session (logout / credential reset).
pub async fn delete_all_sessions(
    db: &Database,
    timeout: Duration,
    session_id: &str,
) -> Result<usize, SyncError> {
    let session_id = session_id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        let removed = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(removed)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn record(id: &str, data: &str) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            data: data.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_round_trips() {
        let (db, _dir) = setup_db().await;

        upsert_session(&db, TIMEOUT, "s1", &record("creds", r#"{"me":"123"}"#))
            .await
            .unwrap();
        upsert_session(&db, TIMEOUT, "s1", &record("pre-key-1", r#"{"k":1}"#))
            .await
            .unwrap();

        let rows = get_sessions(
            &db,
            TIMEOUT,
            "s1",
            &["creds".to_string(), "pre-key-1".to_string(), "missing".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_blob() {
        let (db, _dir) = setup_db().await;

        upsert_session(&db, TIMEOUT, "s1", &record("creds", "v1"))
            .await
            .unwrap();
        upsert_session(&db, TIMEOUT, "s1", &record("creds", "v2"))
            .await
            .unwrap();

        let rows = get_sessions(&db, TIMEOUT, "s1", &["creds".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].data, "v2");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_session_id() {
        let (db, _dir) = setup_db().await;

        upsert_session(&db, TIMEOUT, "s1", &record("creds", "a"))
            .await
            .unwrap();
        upsert_session(&db, TIMEOUT, "s2", &record("creds", "b"))
            .await
            .unwrap();

        let rows = get_sessions(&db, TIMEOUT, "s1", &["creds".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].data, "a");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_except_keeps_only_root_credentials() {
        let (db, _dir) = setup_db().await;

        upsert_session(&db, TIMEOUT, "s1", &record("creds", "root"))
            .await
            .unwrap();
        upsert_session(&db, TIMEOUT, "s1", &record("pre-key-1", "k1"))
            .await
            .unwrap();
        upsert_session(&db, TIMEOUT, "s1", &record("app-state-sync-key-a", "k2"))
            .await
            .unwrap();

        let removed = delete_sessions_except(&db, TIMEOUT, "s1", "creds")
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let rows = get_sessions(
            &db,
            TIMEOUT,
            "s1",
            &["creds".to_string(), "pre-key-1".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "creds");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_all_wipes_the_session() {
        let (db, _dir) = setup_db().await;

        upsert_session(&db, TIMEOUT, "s1", &record("creds", "root"))
            .await
            .unwrap();
        upsert_session(&db, TIMEOUT, "s1", &record("pre-key-1", "k1"))
            .await
            .unwrap();

        let removed = delete_all_sessions(&db, TIMEOUT, "s1").await.unwrap();
        assert_eq!(removed, 2);

        db.close().await.unwrap();
    }
}
