// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message operations.
//!
//! Messages are unique on (session_id, remote_jid, id), both identity parts
//! taken from the structural key. Reaction and receipt lists are merged
//! read-modify-write inside one transaction so concurrent handlers for the
//! same record cannot lose updates.

use std::collections::HashSet;
use std::time::Duration;

use chatsink_core::{EntityKind, SyncError};
use rusqlite::{OptionalExtension, ToSql, params, params_from_iter};
use serde_json::Value;

use crate::database::Database;
use crate::merge;
use crate::models::MessageRecord;

const MESSAGE_COLUMNS: &str = "session_id, remote_jid, id, key, message, message_timestamp, \
     participant, push_name, broadcast, status, message_stub_type, \
     message_stub_parameters, labels, reactions, user_receipt, \
     media_ciphertext_sha256, message_secret";

const MESSAGE_ROW_PLACEHOLDER: &str = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Rows per multi-row INSERT statement, kept well under the SQLite
/// bind-variable ceiling at 17 columns per row.
const INSERT_CHUNK: usize = 100;

/// The (remote_jid, id) identity of a record, if it carries one.
pub fn identity(m: &MessageRecord) -> Option<(String, String)> {
    match (m.remote_jid(), m.id()) {
        (Some(jid), Some(id)) if !jid.is_empty() && !id.is_empty() => {
            Some((jid.to_string(), id.to_string()))
        }
        _ => None,
    }
}

fn json_opt(v: &Option<Value>) -> Option<String> {
    v.as_ref().map(Value::to_string)
}

fn json_list(v: &[Value]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

fn parse_opt(v: Option<String>) -> Option<Value> {
    v.and_then(|s| serde_json::from_str(&s).ok())
}

fn parse_list(v: String) -> Vec<Value> {
    serde_json::from_str(&v).unwrap_or_default()
}

fn bind_message_values(m: &MessageRecord) -> Vec<Box<dyn ToSql>> {
    vec![
        Box::new(m.key.to_string()),
        Box::new(json_opt(&m.message)),
        Box::new(m.message_timestamp),
        Box::new(m.participant.clone()),
        Box::new(m.push_name.clone()),
        Box::new(m.broadcast),
        Box::new(m.status),
        Box::new(m.message_stub_type),
        Box::new(json_opt(&m.message_stub_parameters)),
        Box::new(json_opt(&m.labels)),
        Box::new(json_list(&m.reactions)),
        Box::new(json_list(&m.user_receipt)),
        Box::new(m.media_ciphertext_sha256.clone()),
        Box::new(m.message_secret.clone()),
    ]
}

fn insert(
    conn: &rusqlite::Connection,
    session_id: &str,
    remote_jid: &str,
    id: &str,
    m: &MessageRecord,
) -> Result<usize, rusqlite::Error> {
    let mut bound: Vec<Box<dyn ToSql>> = vec![
        Box::new(session_id.to_string()),
        Box::new(remote_jid.to_string()),
        Box::new(id.to_string()),
    ];
    bound.extend(bind_message_values(m));
    conn.execute(
        &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES {MESSAGE_ROW_PLACEHOLDER}"),
        params_from_iter(bound.iter().map(|b| b.as_ref())),
    )
}

fn overwrite(
    conn: &rusqlite::Connection,
    session_id: &str,
    remote_jid: &str,
    id: &str,
    m: &MessageRecord,
) -> Result<usize, rusqlite::Error> {
    let mut bound = bind_message_values(m);
    bound.push(Box::new(session_id.to_string()));
    bound.push(Box::new(remote_jid.to_string()));
    bound.push(Box::new(id.to_string()));
    conn.execute(
        "UPDATE messages SET key = ?, message = ?, message_timestamp = ?, participant = ?, \
             push_name = ?, broadcast = ?, status = ?, message_stub_type = ?, \
             message_stub_parameters = ?, labels = ?, reactions = ?, user_receipt = ?, \
             media_ciphertext_sha256 = ?, message_secret = ?
         WHERE session_id = ? AND remote_jid = ? AND id = ?",
        params_from_iter(bound.iter().map(|b| b.as_ref())),
    )
}

fn read_message_row(row: &rusqlite::Row<'_>) -> Result<MessageRecord, rusqlite::Error> {
    let key: String = row.get(0)?;
    let message: Option<String> = row.get(1)?;
    let stub_parameters: Option<String> = row.get(8)?;
    let labels: Option<String> = row.get(9)?;
    let reactions: String = row.get(10)?;
    let user_receipt: String = row.get(11)?;
    Ok(MessageRecord {
        key: serde_json::from_str(&key).unwrap_or(Value::Null),
        message: parse_opt(message),
        message_timestamp: row.get(2)?,
        participant: row.get(3)?,
        push_name: row.get(4)?,
        broadcast: row.get(5)?,
        status: row.get(6)?,
        message_stub_type: row.get(7)?,
        message_stub_parameters: parse_opt(stub_parameters),
        labels: parse_opt(labels),
        reactions: parse_list(reactions),
        user_receipt: parse_list(user_receipt),
        media_ciphertext_sha256: row.get(12)?,
        message_secret: row.get(13)?,
    })
}

/// Create-or-overwrite a message keyed by (session_id, remote_jid, id).
///
/// INSERT first; a unique-constraint violation means the row exists (a bulk
/// load racing an incremental upsert, or a duplicate delivery), so the write
/// retries as a full overwrite. Last writer wins.
pub async fn upsert_message(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    m: &MessageRecord,
) -> Result<(), SyncError> {
    let Some((remote_jid, id)) = identity(m) else {
        return Err(SyncError::MissingIdentity {
            kind: EntityKind::Message,
        });
    };
    let session_id = session_id.to_string();
    let m = m.clone();
    db.call_with_timeout(timeout, move |conn| {
        match insert(conn, &session_id, &remote_jid, &id, &m) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                overwrite(conn, &session_id, &remote_jid, &id, &m)?;
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
/// composite unique key rules out a bulk update). Records without identity
/// are ignored; the router has already warned about them. Returns
/// (inserted, updated).
pub async fn bulk_upsert_messages(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    messages: Vec<MessageRecord>,
) -> Result<(usize, usize), SyncError> {
    let keyed: Vec<((String, String), MessageRecord)> = messages
        .into_iter()
        .filter_map(|m| identity(&m).map(|k| (k, m)))
        .collect();
    if keyed.is_empty() {
        return Ok((0, 0));
    }
    let session_id = session_id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        let tx = conn.transaction()?;

        let existing: HashSet<(String, String)> = {
            let values = vec!["(?, ?)"; keyed.len()].join(", ");
            let sql = format!(
                "SELECT remote_jid, id FROM messages
                 WHERE session_id = ? AND (remote_jid, id) IN (VALUES {values})"
            );
            let mut bound: Vec<String> = Vec::with_capacity(keyed.len() * 2 + 1);
            bound.push(session_id.clone());
            for ((jid, id), _) in &keyed {
                bound.push(jid.clone());
                bound.push(id.clone());
            }
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bound), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut set = HashSet::new();
            for row in rows {
                set.insert(row?);
            }
            set
        };

        let (new_msgs, known): (Vec<_>, Vec<_>) = keyed
            .iter()
            .partition(|(k, _)| !existing.contains(k));

        for chunk in new_msgs.chunks(INSERT_CHUNK) {
            let sql = format!(
                "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES {}",
                vec![MESSAGE_ROW_PLACEHOLDER; chunk.len()].join(", ")
            );
            let mut bound: Vec<Box<dyn ToSql>> = Vec::with_capacity(chunk.len() * 17);
            for ((jid, id), m) in chunk {
                bound.push(Box::new(session_id.clone()));
                bound.push(Box::new(jid.clone()));
                bound.push(Box::new(id.clone()));
                bound.extend(bind_message_values(m));
            }
            tx.execute(&sql, params_from_iter(bound.iter().map(|b| b.as_ref())))?;
        }

        let mut updated = 0;
        for ((jid, id), m) in &known {
            updated += overwrite(&tx, &session_id, jid, id, m)?;
        }

        tx.commit()?;
        Ok((new_msgs.len(), updated))
    })
    .await
}

/// Patch a message: only fields present in the patch change.
///
/// Strict semantics: a missing row is NOT created. An update for a record
/// the store has not seen yet is normal operation; the caller logs and
/// skips. Returns true when a row was patched.
pub async fn update_message(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    remote_jid: &str,
    id: &str,
    patch: &MessageRecord,
) -> Result<bool, SyncError> {
    let session_id = session_id.to_string();
    let remote_jid = remote_jid.to_string();
    let id = id.to_string();
    let patch = patch.clone();
    db.call_with_timeout(timeout, move |conn| {
        let bound: Vec<Box<dyn ToSql>> = vec![
            Box::new(json_opt(&patch.message)),
            Box::new(patch.message_timestamp),
            Box::new(patch.participant.clone()),
            Box::new(patch.push_name.clone()),
            Box::new(patch.broadcast),
            Box::new(patch.status),
            Box::new(patch.message_stub_type),
            Box::new(json_opt(&patch.message_stub_parameters)),
            Box::new(json_opt(&patch.labels)),
            Box::new(patch.media_ciphertext_sha256.clone()),
            Box::new(patch.message_secret.clone()),
            Box::new(session_id),
            Box::new(remote_jid),
            Box::new(id),
        ];
        let matched = conn.execute(
            "UPDATE messages SET \
                 message = COALESCE(?, message), \
                 message_timestamp = COALESCE(?, message_timestamp), \
                 participant = COALESCE(?, participant), \
                 push_name = COALESCE(?, push_name), \
                 broadcast = COALESCE(?, broadcast), \
                 status = COALESCE(?, status), \
                 message_stub_type = COALESCE(?, message_stub_type), \
                 message_stub_parameters = COALESCE(?, message_stub_parameters), \
                 labels = COALESCE(?, labels), \
                 media_ciphertext_sha256 = COALESCE(?, media_ciphertext_sha256), \
                 message_secret = COALESCE(?, message_secret) \
             WHERE session_id = ? AND remote_jid = ? AND id = ?",
            params_from_iter(bound.iter().map(|b| b.as_ref())),
        )?;
        Ok(matched > 0)
    })
    .await
}

/// Merge one reaction into a message's reaction list, read-modify-write
/// inside one transaction. Returns false when the message is unknown.
pub async fn set_reaction(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    remote_jid: &str,
    id: &str,
    reaction: Value,
) -> Result<bool, SyncError> {
    merge_collection(
        db,
        timeout,
        session_id,
        remote_jid,
        id,
        "reactions",
        move |existing| merge::merge_reaction(existing, &reaction),
    )
    .await
}

/// Merge one receipt into a message's receipt list, read-modify-write inside
/// one transaction. Returns false when the message is unknown.
pub async fn set_receipt(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    remote_jid: &str,
    id: &str,
    receipt: Value,
) -> Result<bool, SyncError> {
    merge_collection(
        db,
        timeout,
        session_id,
        remote_jid,
        id,
        "user_receipt",
        move |existing| merge::merge_receipt(existing, &receipt),
    )
    .await
}

async fn merge_collection<F>(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    remote_jid: &str,
    id: &str,
    column: &'static str,
    apply: F,
) -> Result<bool, SyncError>
where
    F: FnOnce(Vec<Value>) -> Vec<Value> + Send + 'static,
{
    let session_id = session_id.to_string();
    let remote_jid = remote_jid.to_string();
    let id = id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        let tx = conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                &format!(
                    "SELECT {column} FROM messages
                     WHERE session_id = ?1 AND remote_jid = ?2 AND id = ?3"
                ),
                params![session_id, remote_jid, id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            tx.commit()?;
            return Ok(false);
        };

        let merged = apply(parse_list(current));
        tx.execute(
            &format!(
                "UPDATE messages SET {column} = ?1
                 WHERE session_id = ?2 AND remote_jid = ?3 AND id = ?4"
            ),
            params![json_list(&merged), session_id, remote_jid, id],
        )?;
        tx.commit()?;
        Ok(true)
    })
    .await
}

/// Fetch one message, primarily for tests and diagnostics.
pub async fn get_message(
    db: &Database,
    timeout: Duration,
    session_id: &str,
    remote_jid: &str,
    id: &str,
) -> Result<Option<MessageRecord>, SyncError> {
    let session_id = session_id.to_string();
    let remote_jid = remote_jid.to_string();
    let id = id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        conn.query_row(
            "SELECT key, message, message_timestamp, participant, push_name, broadcast, \
                 status, message_stub_type, message_stub_parameters, labels, reactions, \
                 user_receipt, media_ciphertext_sha256, message_secret
             FROM messages WHERE session_id = ?1 AND remote_jid = ?2 AND id = ?3",
            params![session_id, remote_jid, id],
            |row| read_message_row(row),
        )
        .optional()
    })
    .await
}

/// Count the messages stored for a session.
pub async fn count_messages(
    db: &Database,
    timeout: Duration,
    session_id: &str,
) -> Result<i64, SyncError> {
    let session_id = session_id.to_string();
    db.call_with_timeout(timeout, move |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )
    })
    .await
}
