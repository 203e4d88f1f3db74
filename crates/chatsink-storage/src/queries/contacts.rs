// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact operations.
//!
//! Contacts carry only the fixed five-attribute shape; the sanitizer has
//! already dropped everything else by the time a record reaches this module.

use std::collections::HashSet;
use std::time::Duration;

use chatsink_core::SyncError;
use rusqlite::{OptionalExtension, params, params_from_iter};

use crate::database::Database;
use crate::models::Contact;

fn bind_values(c: &Contact) -> [Option<String>; 5] {
    [
        c.name.clone(),
        c.notify.clone(),
        c.verified_name.clone(),
        c.img_url.clone(),
        c.status.clone(),
    ]
}

fn overwrite(
    conn: &rusqlite::Connection,
    session_id: &str,
    contact: &Contact,
) -> Result<usize, rusqlite::Error> {
    let v = bind_values(contact);
    conn.execute(
        "UPDATE contacts SET name = ?3, notify = ?4, verified_name = ?5, img_url = ?6, status = ?7
         WHERE session_id = ?1 AND id = ?2",
        params![session_id, contact.id, v[0], v[1], v[2], v[3], v[4]],
    )
}

fn insert(
    conn: &rusqlite::Connection,
    session_id: &str,
    contact: &Contact,
) -> Result<usize, rusqlite::Error> {
    let v = bind_values(contact);
    conn.execute(
        "INSERT INTO contacts (session_id, id, name, notify, verified_name, img_url, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![session_id, contact.id, v[0], v[1], v[2], v[3], v[4]],
    )
}

/// Create-or-overwrite a contact.
///
/// INSERT first; a unique-constraint violation means the row exists (e.g. a
/// concurrent upsert for the same key), so fall back to a full overwrite
/// instead of surfacing the error.
pub async fn upsert_contact(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    contact: &Contact,
) -> Result<(), SyncError> {
    let session_id = session_id.to_string();
    let contact = contact.clone();
    db.call_with_timeout(timeout, move |conn| {
        match insert(conn, &session_id, &contact) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                overwrite(conn, &session_id, &contact)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    })
    .await
}

/// Bulk create-or-overwrite inside one transaction.
///
/// Pre-reads the existing identity set, bulk-inserts the new subset, and
/// updates the existing subset row by row. Returns (inserted, updated).
pub async fn bulk_upsert_contacts(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    contacts: Vec<Contact>,
) -> Result<(usize, usize), SyncError> {
    if contacts.is_empty() {
        return Ok((0, 0));
    }
    let session_id = session_id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        let tx = conn.transaction()?;

        let existing: HashSet<String> = {
            let ids: Vec<String> = contacts.iter().map(|c| c.id.clone()).collect();
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "SELECT id FROM contacts WHERE session_id = ? AND id IN ({placeholders})"
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(
                params_from_iter(std::iter::once(session_id.clone()).chain(ids)),
                |row| row.get::<_, String>(0),
            )?;
            let mut set = HashSet::new();
            for row in rows {
                set.insert(row?);
            }
            set
        };

        let mut inserted = 0;
        let mut updated = 0;
        for contact in &contacts {
            if existing.contains(&contact.id) {
                updated += overwrite(&tx, &session_id, contact)?;
            } else {
                inserted += insert(&tx, &session_id, contact)?;
            }
        }

        tx.commit()?;
        Ok((inserted, updated))
    })
    .await
}

/// Patch a contact: only fields present in the patch change.
///
/// A missing row falls back to create so an update observed before the
/// upsert loses no data. Returns true when a row was created.
pub async fn update_contact(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    patch: &Contact,
) -> Result<bool, SyncError> {
    let session_id = session_id.to_string();
    let patch = patch.clone();
    db.call_with_timeout(timeout, move |conn| {
        let v = bind_values(&patch);
        let matched = conn.execute(
            "UPDATE contacts SET
                 name = COALESCE(?3, name),
                 notify = COALESCE(?4, notify),
                 verified_name = COALESCE(?5, verified_name),
                 img_url = COALESCE(?6, img_url),
                 status = COALESCE(?7, status)
             WHERE session_id = ?1 AND id = ?2",
            params![session_id, patch.id, v[0], v[1], v[2], v[3], v[4]],
        )?;
        if matched == 0 {
            insert(conn, &session_id, &patch)?;
            return Ok(true);
        }
        Ok(false)
    })
    .await
}

/// Fetch one contact, primarily for tests and diagnostics.
pub async fn get_contact(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    id: &str,
) -> Result<Option<Contact>, SyncError> {
    let session_id = session_id.to_string();
    let id = id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        conn.query_row(
            "SELECT id, name, notify, verified_name, img_url, status
             FROM contacts WHERE session_id = ?1 AND id = ?2",
            params![session_id, id],
            |row| {
                Ok(Contact {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    notify: row.get(2)?,
                    verified_name: row.get(3)?,
                    img_url: row.get(4)?,
                    status: row.get(5)?,
                })
            },
        )
        .optional()
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

    fn contact(id: &str, name: &str) -> Contact {
        Contact {
            id: id.to_string(),
            name: Some(name.to_string()),
            notify: None,
            verified_name: None,
            img_url: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn upsert_twice_is_idempotent() {
        let (db, _dir) = setup_db().await;
        let c = contact("111@s.whatsapp.net", "Alice");

        upsert_contact(&db, TIMEOUT, "s1", &c).await.unwrap();
        upsert_contact(&db, TIMEOUT, "s1", &c).await.unwrap();

        let stored = get_contact(&db, TIMEOUT, "s1", "111@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, c);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_overwrites_all_attributes() {
        let (db, _dir) = setup_db().await;

        let mut c = contact("111@s.whatsapp.net", "Alice");
        c.status = Some("hi".to_string());
        upsert_contact(&db, TIMEOUT, "s1", &c).await.unwrap();

        // Second upsert with no status clears it: upsert is overwrite.
        let c2 = contact("111@s.whatsapp.net", "Alice B");
        upsert_contact(&db, TIMEOUT, "s1", &c2).await.unwrap();

        let stored = get_contact(&db, TIMEOUT, "s1", "111@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name.as_deref(), Some("Alice B"));
        assert!(stored.status.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bulk_upsert_splits_create_and_update() {
        let (db, _dir) = setup_db().await;

        upsert_contact(&db, TIMEOUT, "s1", &contact("1@s.whatsapp.net", "Old"))
            .await
            .unwrap();

        let batch = vec![
            contact("1@s.whatsapp.net", "New"),
            contact("2@s.whatsapp.net", "Two"),
            contact("3@s.whatsapp.net", "Three"),
        ];
        let (inserted, updated) = bulk_upsert_contacts(&db, TIMEOUT, "s1", batch)
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(updated, 1);

        let stored = get_contact(&db, TIMEOUT, "s1", "1@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name.as_deref(), Some("New"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_patches_only_provided_fields() {
        let (db, _dir) = setup_db().await;

        let mut c = contact("1@s.whatsapp.net", "Alice");
        c.notify = Some("Ally".to_string());
        upsert_contact(&db, TIMEOUT, "s1", &c).await.unwrap();

        let patch = Contact {
            id: "1@s.whatsapp.net".to_string(),
            status: Some("busy".to_string()),
            ..Contact::default()
        };
        let created = update_contact(&db, TIMEOUT, "s1", &patch).await.unwrap();
        assert!(!created);

        let stored = get_contact(&db, TIMEOUT, "s1", "1@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name.as_deref(), Some("Alice"));
        assert_eq!(stored.notify.as_deref(), Some("Ally"));
        assert_eq!(stored.status.as_deref(), Some("busy"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_missing_contact_falls_back_to_create() {
        let (db, _dir) = setup_db().await;

        let patch = contact("9@s.whatsapp.net", "Nine");
        let created = update_contact(&db, TIMEOUT, "s1", &patch).await.unwrap();
        assert!(created);

        let stored = get_contact(&db, TIMEOUT, "s1", "9@s.whatsapp.net")
            .await
            .unwrap();
        assert!(stored.is_some());

        db.close().await.unwrap();
    }
}
