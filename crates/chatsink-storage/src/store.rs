// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The typed store facade over the query modules.
//!
//! `EntityStore` exclusively owns the on-disk representation; the router and
//! sanitizer never touch storage directly. Single-record operations run
//! under the short fixed transaction timeout from configuration; bulk
//! operations take the tier-scaled timeout chosen by the batch scheduler.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use chatsink_config::TransactionConfig;
use chatsink_core::SyncError;

use crate::database::Database;
use crate::models::{Chat, Contact, MessageRecord, SessionRecord};
use crate::queries;

/// Typed upsert/update/delete operations per entity kind.
#[derive(Clone)]
pub struct EntityStore {
    db: Arc<Database>,
    txn_timeout: Duration,
}

impl EntityStore {
    pub fn new(db: Arc<Database>, transaction: &TransactionConfig) -> Self {
        Self {
            db,
            txn_timeout: Duration::from_millis(transaction.timeout_ms),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Session (credential/key blob) operations ---

    pub async fn upsert_session(
        &self,
        session_id: &str,
        record: &SessionRecord,
    ) -> Result<(), SyncError> {
        queries::sessions::upsert_session(&self.db, self.txn_timeout, session_id, record).await
    }

    pub async fn get_sessions(
        &self,
        session_id: &str,
        ids: &[String],
    ) -> Result<Vec<SessionRecord>, SyncError> {
        queries::sessions::get_sessions(&self.db, self.txn_timeout, session_id, ids).await
    }

    pub async fn delete_sessions(
        &self,
        session_id: &str,
        ids: &[String],
    ) -> Result<usize, SyncError> {
        queries::sessions::delete_sessions(&self.db, self.txn_timeout, session_id, ids).await
    }

    pub async fn delete_sessions_except(
        &self,
        session_id: &str,
        keep_id: &str,
    ) -> Result<usize, SyncError> {
        queries::sessions::delete_sessions_except(&self.db, self.txn_timeout, session_id, keep_id)
            .await
    }

    pub async fn delete_all_sessions(&self, session_id: &str) -> Result<usize, SyncError> {
        queries::sessions::delete_all_sessions(&self.db, self.txn_timeout, session_id).await
    }

    // --- Chat operations ---

    pub async fn upsert_chat(&self, session_id: &str, chat: &Chat) -> Result<(), SyncError> {
        queries::chats::upsert_chat(&self.db, self.txn_timeout, session_id, chat).await
    }

    pub async fn bulk_upsert_chats(
        &self,
        session_id: &str,
        chats: Vec<Chat>,
        timeout: Duration,
    ) -> Result<(usize, usize), SyncError> {
        queries::chats::bulk_upsert_chats(&self.db, timeout, session_id, chats).await
    }

    /// Returns true when the patch fell back to creating the row.
    pub async fn update_chat(&self, session_id: &str, patch: &Chat) -> Result<bool, SyncError> {
        queries::chats::update_chat(&self.db, self.txn_timeout, session_id, patch).await
    }

    pub async fn chat_exists(&self, session_id: &str, id: &str) -> Result<bool, SyncError> {
        queries::chats::chat_exists(&self.db, self.txn_timeout, session_id, id).await
    }

    pub async fn get_chat(&self, session_id: &str, id: &str) -> Result<Option<Chat>, SyncError> {
        queries::chats::get_chat(&self.db, self.txn_timeout, session_id, id).await
    }

    pub async fn delete_chats(
        &self,
        session_id: &str,
        ids: &[String],
    ) -> Result<usize, SyncError> {
        queries::chats::delete_chats(&self.db, self.txn_timeout, session_id, ids).await
    }

    pub async fn wipe_chats(&self, session_id: &str) -> Result<usize, SyncError> {
        queries::chats::wipe_chats(&self.db, self.txn_timeout, session_id).await
    }

    // --- Contact operations ---

    pub async fn upsert_contact(
        &self,
        session_id: &str,
        contact: &Contact,
    ) -> Result<(), SyncError> {
        queries::contacts::upsert_contact(&self.db, self.txn_timeout, session_id, contact).await
    }

    pub async fn bulk_upsert_contacts(
        &self,
        session_id: &str,
        contacts: Vec<Contact>,
        timeout: Duration,
    ) -> Result<(usize, usize), SyncError> {
        queries::contacts::bulk_upsert_contacts(&self.db, timeout, session_id, contacts).await
    }

    /// Returns true when the patch fell back to creating the row.
    pub async fn update_contact(
        &self,
        session_id: &str,
        patch: &Contact,
    ) -> Result<bool, SyncError> {
        queries::contacts::update_contact(&self.db, self.txn_timeout, session_id, patch).await
    }

    pub async fn get_contact(
        &self,
        session_id: &str,
        id: &str,
    ) -> Result<Option<Contact>, SyncError> {
        queries::contacts::get_contact(&self.db, self.txn_timeout, session_id, id).await
    }

    // --- Message operations ---

    pub async fn upsert_message(
        &self,
        session_id: &str,
        message: &MessageRecord,
    ) -> Result<(), SyncError> {
        queries::messages::upsert_message(&self.db, self.txn_timeout, session_id, message).await
    }

    pub async fn bulk_upsert_messages(
        &self,
        session_id: &str,
        messages: Vec<MessageRecord>,
        timeout: Duration,
    ) -> Result<(usize, usize), SyncError> {
        queries::messages::bulk_upsert_messages(&self.db, timeout, session_id, messages).await
    }

    /// Strict update: returns false (and changes nothing) when the row is
    /// missing.
    pub async fn update_message(
        &self,
        session_id: &str,
        remote_jid: &str,
        id: &str,
        patch: &MessageRecord,
    ) -> Result<bool, SyncError> {
        queries::messages::update_message(
            &self.db,
            self.txn_timeout,
            session_id,
            remote_jid,
            id,
            patch,
        )
        .await
    }

    pub async fn set_reaction(
        &self,
        session_id: &str,
        remote_jid: &str,
        id: &str,
        reaction: Value,
    ) -> Result<bool, SyncError> {
        queries::messages::set_reaction(
            &self.db,
            self.txn_timeout,
            session_id,
            remote_jid,
            id,
            reaction,
        )
        .await
    }

    pub async fn set_receipt(
        &self,
        session_id: &str,
        remote_jid: &str,
        id: &str,
        receipt: Value,
    ) -> Result<bool, SyncError> {
        queries::messages::set_receipt(
            &self.db,
            self.txn_timeout,
            session_id,
            remote_jid,
            id,
            receipt,
        )
        .await
    }

    pub async fn get_message(
        &self,
        session_id: &str,
        remote_jid: &str,
        id: &str,
    ) -> Result<Option<MessageRecord>, SyncError> {
        queries::messages::get_message(&self.db, self.txn_timeout, session_id, remote_jid, id)
            .await
    }

    pub async fn count_messages(&self, session_id: &str) -> Result<i64, SyncError> {
        queries::messages::count_messages(&self.db, self.txn_timeout, session_id).await
    }
}
