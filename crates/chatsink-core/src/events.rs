// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain events consumed from (and re-emitted to) the messaging event source.
//!
//! The transport connection itself lives outside this workspace; it feeds
//! these typed events into the router's channel, one stream per session.

use crate::raw::RawObject;

/// How an incremental message upsert was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageUpsertKind {
    /// Backfilled or requested message; does not affect unread state.
    Append,
    /// A live incoming message; may synthesize a chat row.
    Notify,
}

/// One event from the messaging source, scoped to a single session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Bulk backfill of chats, contacts, and messages. When `is_latest`,
    /// the session's chat set is wiped and rebuilt from this payload.
    HistorySet {
        chats: Vec<RawObject>,
        contacts: Vec<RawObject>,
        messages: Vec<RawObject>,
        is_latest: bool,
    },
    ChatsUpsert(Vec<RawObject>),
    ChatsUpdate(Vec<RawObject>),
    ChatsDelete(Vec<String>),
    ContactsUpsert(Vec<RawObject>),
    ContactsUpdate(Vec<RawObject>),
    MessagesUpsert {
        messages: Vec<RawObject>,
        kind: MessageUpsertKind,
    },
    MessagesUpdate(Vec<RawObject>),
    /// Deliberately not executed; kept for wire compatibility.
    MessagesDelete { keys: Vec<RawObject> },
    MessageReceiptUpdate(Vec<RawObject>),
    MessageReactionUpdate(Vec<RawObject>),
}

impl SessionEvent {
    /// Short name used in structured log fields.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::HistorySet { .. } => "history-set",
            SessionEvent::ChatsUpsert(_) => "chats-upsert",
            SessionEvent::ChatsUpdate(_) => "chats-update",
            SessionEvent::ChatsDelete(_) => "chats-delete",
            SessionEvent::ContactsUpsert(_) => "contacts-upsert",
            SessionEvent::ContactsUpdate(_) => "contacts-update",
            SessionEvent::MessagesUpsert { .. } => "messages-upsert",
            SessionEvent::MessagesUpdate(_) => "messages-update",
            SessionEvent::MessagesDelete { .. } => "messages-delete",
            SessionEvent::MessageReceiptUpdate(_) => "message-receipt-update",
            SessionEvent::MessageReactionUpdate(_) => "message-reaction-update",
        }
    }
}
