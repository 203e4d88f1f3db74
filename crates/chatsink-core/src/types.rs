// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity models persisted by the sync engine.
//!
//! All entities are scoped by a `session_id` (the logical account under
//! which the data was observed); the session id itself is carried by the
//! engine, not by these structs. Field names deserialize from the protocol's
//! camelCase payloads; unknown fields are ignored (the sanitizer's allowlist
//! is the real boundary).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The four persisted entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Session,
    Chat,
    Contact,
    Message,
}

/// A conversation row. `id` is always the canonical address, never the
/// hidden alias form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chat {
    pub id: String,
    pub conversation_timestamp: Option<i64>,
    /// Positive incoming values are *increments*; explicit zero or negative
    /// values reset the stored counter.
    pub unread_count: Option<i64>,
    pub pinned: Option<i64>,
    pub archived: Option<bool>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub read_only: Option<bool>,
    pub ephemeral_expiration: Option<i64>,
    pub ephemeral_setting_timestamp: Option<i64>,
    pub mute_end_time: Option<i64>,
    pub marked_as_unread: Option<bool>,
    pub last_message_recv_timestamp: Option<i64>,
    pub created_at: Option<i64>,
    pub created_by: Option<String>,
    pub description: Option<String>,
}

/// An address-book entry. Only these five attributes are ever persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub id: String,
    pub name: Option<String>,
    pub notify: Option<String>,
    pub verified_name: Option<String>,
    pub img_url: Option<String>,
    pub status: Option<String>,
}

/// A message row, unique on (session_id, remote_jid, id) where both
/// identity parts come from the structural `key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRecord {
    /// Structural message key: `{ remoteJid, id, fromMe, participant? }`.
    pub key: serde_json::Value,
    pub message: Option<serde_json::Value>,
    pub message_timestamp: Option<i64>,
    pub participant: Option<String>,
    pub push_name: Option<String>,
    pub broadcast: Option<bool>,
    pub status: Option<i64>,
    pub message_stub_type: Option<i64>,
    pub message_stub_parameters: Option<serde_json::Value>,
    pub labels: Option<serde_json::Value>,
    /// Replace-by-author collection, merged transactionally by the store.
    pub reactions: Vec<serde_json::Value>,
    /// Replace-by-author collection, merged transactionally by the store.
    pub user_receipt: Vec<serde_json::Value>,
    /// Dedicated binary columns, extracted by the sanitizer.
    #[serde(skip)]
    pub media_ciphertext_sha256: Option<Vec<u8>>,
    #[serde(skip)]
    pub message_secret: Option<Vec<u8>>,
}

impl MessageRecord {
    /// The conversation address this message belongs to, from the key.
    pub fn remote_jid(&self) -> Option<&str> {
        self.key.get("remoteJid").and_then(serde_json::Value::as_str)
    }

    /// The message's own id, from the key.
    pub fn id(&self) -> Option<&str> {
        self.key.get("id").and_then(serde_json::Value::as_str)
    }
}

/// A credential/key row: an opaque serialized blob addressed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub data: String,
}
