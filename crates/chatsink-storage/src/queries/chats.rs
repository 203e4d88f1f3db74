// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat operations.
//!
//! Chat ids are always canonical addresses; the resolver has rewritten any
//! alias form before a record reaches this module. `unread_count` is a
//! counter: positive patch values increment, zero/negative values reset.

use std::collections::HashSet;
use std::time::Duration;

use chatsink_core::SyncError;
use rusqlite::{OptionalExtension, ToSql, params, params_from_iter};

use crate::database::Database;
use crate::models::Chat;

const CHAT_COLUMNS: &str = "session_id, id, conversation_timestamp, unread_count, pinned, \
     archived, name, display_name, read_only, ephemeral_expiration, \
     ephemeral_setting_timestamp, mute_end_time, marked_as_unread, \
     last_message_recv_timestamp, created_at, created_by, description";

const CHAT_ROW_PLACEHOLDER: &str = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Rows per multi-row INSERT statement, kept well under the SQLite
/// bind-variable ceiling at 17 columns per row.
const INSERT_CHUNK: usize = 100;

fn bind_chat_values(c: &Chat) -> Vec<Box<dyn ToSql>> {
    vec![
        Box::new(c.conversation_timestamp),
        Box::new(c.unread_count),
        Box::new(c.pinned),
        Box::new(c.archived),
        Box::new(c.name.clone()),
        Box::new(c.display_name.clone()),
        Box::new(c.read_only),
        Box::new(c.ephemeral_expiration),
        Box::new(c.ephemeral_setting_timestamp),
        Box::new(c.mute_end_time),
        Box::new(c.marked_as_unread),
        Box::new(c.last_message_recv_timestamp),
        Box::new(c.created_at),
        Box::new(c.created_by.clone()),
        Box::new(c.description.clone()),
    ]
}

fn insert(
    conn: &rusqlite::Connection,
    session_id: &str,
    chat: &Chat,
) -> Result<usize, rusqlite::Error> {
    let mut bound: Vec<Box<dyn ToSql>> = vec![
        Box::new(session_id.to_string()),
        Box::new(chat.id.clone()),
    ];
    bound.extend(bind_chat_values(chat));
    conn.execute(
        &format!("INSERT INTO chats ({CHAT_COLUMNS}) VALUES {CHAT_ROW_PLACEHOLDER}"),
        params_from_iter(bound.iter().map(|b| b.as_ref())),
    )
}

fn overwrite(
    conn: &rusqlite::Connection,
    session_id: &str,
    chat: &Chat,
) -> Result<usize, rusqlite::Error> {
    let mut bound = bind_chat_values(chat);
    bound.push(Box::new(session_id.to_string()));
    bound.push(Box::new(chat.id.clone()));
    conn.execute(
        "UPDATE chats SET conversation_timestamp = ?, unread_count = ?, pinned = ?, \
             archived = ?, name = ?, display_name = ?, read_only = ?, \
             ephemeral_expiration = ?, ephemeral_setting_timestamp = ?, mute_end_time = ?, \
             marked_as_unread = ?, last_message_recv_timestamp = ?, created_at = ?, \
             created_by = ?, description = ?
         WHERE session_id = ? AND id = ?",
        params_from_iter(bound.iter().map(|b| b.as_ref())),
    )
}

fn read_chat_row(row: &rusqlite::Row<'_>) -> Result<Chat, rusqlite::Error> {
    Ok(Chat {
        id: row.get(0)?,
        conversation_timestamp: row.get(1)?,
        unread_count: row.get(2)?,
        pinned: row.get(3)?,
        archived: row.get(4)?,
        name: row.get(5)?,
        display_name: row.get(6)?,
        read_only: row.get(7)?,
        ephemeral_expiration: row.get(8)?,
        ephemeral_setting_timestamp: row.get(9)?,
        mute_end_time: row.get(10)?,
        marked_as_unread: row.get(11)?,
        last_message_recv_timestamp: row.get(12)?,
        created_at: row.get(13)?,
        created_by: row.get(14)?,
        description: row.get(15)?,
    })
}

/// Create-or-overwrite a chat keyed by (session_id, id).
///
/// INSERT first; a unique-constraint violation means the row exists, so the
/// write retries as a full overwrite instead of surfacing the error.
pub async fn upsert_chat(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    chat: &Chat,
) -> Result<(), SyncError> {
    let session_id = session_id.to_string();
    let chat = chat.clone();
    db.call_with_timeout(timeout, move |conn| {
        match insert(conn, &session_id, &chat) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                overwrite(conn, &session_id, &chat)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    })
    .await
}

/// Bulk create-or-overwrite inside one transaction.
///
/// Pre-reads which identities already exist, bulk-inserts the new subset in
/// multi-row statements, and updates the existing subset row by row (the
/// composite unique key rules out a bulk update). Returns (inserted, updated).
pub async fn bulk_upsert_chats(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    chats: Vec<Chat>,
) -> Result<(usize, usize), SyncError> {
    if chats.is_empty() {
        return Ok((0, 0));
    }
    let session_id = session_id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        let tx = conn.transaction()?;

        let existing: HashSet<String> = {
            let ids: Vec<String> = chats.iter().map(|c| c.id.clone()).collect();
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql =
                format!("SELECT id FROM chats WHERE session_id = ? AND id IN ({placeholders})");
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

        let (new_chats, known): (Vec<&Chat>, Vec<&Chat>) =
            chats.iter().partition(|c| !existing.contains(&c.id));

        for chunk in new_chats.chunks(INSERT_CHUNK) {
            let sql = format!(
                "INSERT INTO chats ({CHAT_COLUMNS}) VALUES {}",
                vec![CHAT_ROW_PLACEHOLDER; chunk.len()].join(", ")
            );
            let mut bound: Vec<Box<dyn ToSql>> = Vec::with_capacity(chunk.len() * 17);
            for chat in chunk {
                bound.push(Box::new(session_id.clone()));
                bound.push(Box::new(chat.id.clone()));
                bound.extend(bind_chat_values(chat));
            }
            tx.execute(&sql, params_from_iter(bound.iter().map(|b| b.as_ref())))?;
        }

        let mut updated = 0;
        for chat in &known {
            updated += overwrite(&tx, &session_id, chat)?;
        }

        tx.commit()?;
        Ok((new_chats.len(), updated))
    })
    .await
}

/// Patch a chat: only fields present in the patch change.
///
/// `unread_count` follows counter semantics: a positive value increments the
/// stored counter, zero/negative resets it to the given value. A missing row
/// falls back to create. All steps run inside one transaction. Returns true
/// when a row was created.
pub async fn update_chat(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    patch: &Chat,
) -> Result<bool, SyncError> {
    let session_id = session_id.to_string();
    let patch = patch.clone();
    db.call_with_timeout(timeout, move |conn| {
        let tx = conn.transaction()?;

        let mut bound: Vec<Box<dyn ToSql>> = vec![
            Box::new(patch.conversation_timestamp),
            Box::new(patch.pinned),
            Box::new(patch.archived),
            Box::new(patch.name.clone()),
            Box::new(patch.display_name.clone()),
            Box::new(patch.read_only),
            Box::new(patch.ephemeral_expiration),
            Box::new(patch.ephemeral_setting_timestamp),
            Box::new(patch.mute_end_time),
            Box::new(patch.marked_as_unread),
            Box::new(patch.last_message_recv_timestamp),
            Box::new(patch.created_at),
            Box::new(patch.created_by.clone()),
            Box::new(patch.description.clone()),
        ];
        bound.push(Box::new(session_id.clone()));
        bound.push(Box::new(patch.id.clone()));

        let matched = tx.execute(
            "UPDATE chats SET \
                 conversation_timestamp = COALESCE(?, conversation_timestamp), \
                 pinned = COALESCE(?, pinned), \
                 archived = COALESCE(?, archived), \
                 name = COALESCE(?, name), \
                 display_name = COALESCE(?, display_name), \
                 read_only = COALESCE(?, read_only), \
                 ephemeral_expiration = COALESCE(?, ephemeral_expiration), \
                 ephemeral_setting_timestamp = COALESCE(?, ephemeral_setting_timestamp), \
                 mute_end_time = COALESCE(?, mute_end_time), \
                 marked_as_unread = COALESCE(?, marked_as_unread), \
                 last_message_recv_timestamp = COALESCE(?, last_message_recv_timestamp), \
                 created_at = COALESCE(?, created_at), \
                 created_by = COALESCE(?, created_by), \
                 description = COALESCE(?, description) \
             WHERE session_id = ? AND id = ?",
            params_from_iter(bound.iter().map(|b| b.as_ref())),
        )?;

        if matched == 0 {
            // The initial counter value is the delta itself, so insert the
            // patch as-is.
            insert(&tx, &session_id, &patch)?;
            tx.commit()?;
            return Ok(true);
        }

        if let Some(delta) = patch.unread_count {
            if delta > 0 {
                tx.execute(
                    "UPDATE chats SET unread_count = COALESCE(unread_count, 0) + ?3
                     WHERE session_id = ?1 AND id = ?2",
                    params![session_id, patch.id, delta],
                )?;
            } else {
                tx.execute(
                    "UPDATE chats SET unread_count = ?3
                     WHERE session_id = ?1 AND id = ?2",
                    params![session_id, patch.id, delta],
                )?;
            }
        }

        tx.commit()?;
        Ok(false)
    })
    .await
}

/// Whether a chat row exists for the address.
pub async fn chat_exists(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    id: &str,
) -> Result<bool, SyncError> {
    let session_id = session_id.to_string();
    let id = id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM chats WHERE session_id = ?1 AND id = ?2",
                params![session_id, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    })
    .await
}

/// Fetch one chat.
pub async fn get_chat(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    id: &str,
) -> Result<Option<Chat>, SyncError> {
    let session_id = session_id.to_string();
    let id = id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        conn.query_row(
            "SELECT id, conversation_timestamp, unread_count, pinned, archived, name, \
                 display_name, read_only, ephemeral_expiration, ephemeral_setting_timestamp, \
                 mute_end_time, marked_as_unread, last_message_recv_timestamp, created_at, \
                 created_by, description
             FROM chats WHERE session_id = ?1 AND id = ?2",
            params![session_id, id],
            |row| read_chat_row(row),
        )
        .optional()
    })
    .await
}

/// Delete the given chats. Returns the number of rows removed.
pub async fn delete_chats(
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
        let sql = format!("DELETE FROM chats WHERE session_id = ? AND id IN ({placeholders})");
        let removed = conn.execute(
            &sql,
            params_from_iter(std::iter::once(session_id).chain(ids)),
        )?;
        Ok(removed)
    })
    .await
}

/// Wipe the entire chat set for a session (full resynchronization).
pub async fn wipe_chats(
    db: &Database,
    timeout: Duration,
    session_id: &str,
) -> Result<usize, SyncError> {
    let session_id = session_id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        let removed = conn.execute(
            "DELETE FROM chats WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(removed)
    })
    .await
}
