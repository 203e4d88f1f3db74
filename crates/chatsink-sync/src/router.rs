// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-session event router.
//!
//! Dispatches each incoming [`SessionEvent`] through the handler pipeline
//! (sanitize, resolve identity, then the store, via the batch scheduler and
//! retry executor where the event shape calls for them). Handler errors are
//! caught and logged here; nothing propagates back into the event source.
//!
//! Routing per entity kind is an explicit listen/unlisten toggle so the
//! embedder can attach and detach without emitter bookkeeping; both calls
//! are idempotent.

use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use chatsink_config::{BatchingConfig, SyncConfig};
use chatsink_core::{
    Chat, Contact, EntityKind, MessageRecord, MessageUpsertKind, RawObject, RawValue,
    SessionEvent, SyncError,
};
use chatsink_storage::EntityStore;

use crate::batch::{BatchPlan, run_batches};
use crate::resolve::IdentityResolver;
use crate::retry::{RetryPolicy, with_retry};
use crate::sanitize::{CleanRecord, clean_value, sanitize};

/// Concurrent in-flight upserts for contact set synchronization; contact
/// rows are independent, so they do not share row locks.
const CONTACT_FANOUT: usize = 8;

/// Per-session synchronization engine.
pub struct SyncEngine {
    session_id: String,
    store: EntityStore,
    resolver: IdentityResolver,
    retry: RetryPolicy,
    batching: BatchingConfig,
    listening: Mutex<HashSet<EntityKind>>,
    derived_tx: broadcast::Sender<SessionEvent>,
}

impl SyncEngine {
    pub fn new(
        session_id: impl Into<String>,
        store: EntityStore,
        resolver: IdentityResolver,
        config: &SyncConfig,
    ) -> Self {
        let (derived_tx, _) = broadcast::channel(64);
        Self {
            session_id: session_id.into(),
            store,
            resolver,
            retry: RetryPolicy::from_config(&config.retry),
            batching: config.batching.clone(),
            listening: Mutex::new(HashSet::new()),
            derived_tx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start routing events for an entity kind. A no-op when already
    /// listening.
    pub fn listen(&self, kind: EntityKind) {
        let mut listening = self.listening.lock().unwrap_or_else(|e| e.into_inner());
        if !listening.insert(kind) {
            debug!(session = %self.session_id, %kind, "already listening");
        }
    }

    /// Stop routing events for an entity kind. A no-op when not listening.
    pub fn unlisten(&self, kind: EntityKind) {
        let mut listening = self.listening.lock().unwrap_or_else(|e| e.into_inner());
        if !listening.remove(&kind) {
            debug!(session = %self.session_id, %kind, "not listening");
        }
    }

    pub fn listen_all(&self) {
        for kind in [
            EntityKind::Session,
            EntityKind::Chat,
            EntityKind::Contact,
            EntityKind::Message,
        ] {
            self.listen(kind);
        }
    }

    pub fn is_listening(&self, kind: EntityKind) -> bool {
        self.listening
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&kind)
    }

    /// Subscribe to events the router synthesizes (e.g. the chat upsert
    /// emitted when a message arrives for an unknown conversation).
    pub fn derived_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.derived_tx.subscribe()
    }

    /// Consume events until the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!(session = %self.session_id, "event channel closed, router stopping");
    }

    /// Route one event. Handler errors are logged, never propagated back to
    /// the event source.
    pub async fn handle_event(&self, event: SessionEvent) {
        let name = event.name();
        if let Err(err) = self.dispatch(event).await {
            error!(session = %self.session_id, event = name, error = %err, "event handler failed");
        }
    }

    async fn dispatch(&self, event: SessionEvent) -> Result<(), SyncError> {
        match event {
            SessionEvent::HistorySet {
                chats,
                contacts,
                messages,
                is_latest,
            } => self.handle_history_set(chats, contacts, messages, is_latest).await,
            SessionEvent::ChatsUpsert(records) => {
                if !self.is_listening(EntityKind::Chat) {
                    return Ok(());
                }
                self.handle_chats_upsert(records).await
            }
            SessionEvent::ChatsUpdate(records) => {
                if !self.is_listening(EntityKind::Chat) {
                    return Ok(());
                }
                self.handle_chats_update(records).await
            }
            SessionEvent::ChatsDelete(ids) => {
                if !self.is_listening(EntityKind::Chat) {
                    return Ok(());
                }
                self.handle_chats_delete(ids).await
            }
            SessionEvent::ContactsUpsert(records) => {
                if !self.is_listening(EntityKind::Contact) {
                    return Ok(());
                }
                self.handle_contacts_upsert(records).await
            }
            SessionEvent::ContactsUpdate(records) => {
                if !self.is_listening(EntityKind::Contact) {
                    return Ok(());
                }
                self.handle_contacts_update(records).await
            }
            SessionEvent::MessagesUpsert { messages, kind } => {
                if !self.is_listening(EntityKind::Message) {
                    return Ok(());
                }
                self.handle_messages_upsert(messages, kind).await
            }
            SessionEvent::MessagesUpdate(records) => {
                if !self.is_listening(EntityKind::Message) {
                    return Ok(());
                }
                self.handle_messages_update(records).await
            }
            SessionEvent::MessagesDelete { keys } => {
                // Deliberately not executed; stored messages are immutable
                // from the source's perspective.
                debug!(
                    session = %self.session_id,
                    count = keys.len(),
                    "message delete ignored"
                );
                Ok(())
            }
            SessionEvent::MessageReceiptUpdate(updates) => {
                if !self.is_listening(EntityKind::Message) {
                    return Ok(());
                }
                self.handle_receipt_updates(updates).await
            }
            SessionEvent::MessageReactionUpdate(updates) => {
                if !self.is_listening(EntityKind::Message) {
                    return Ok(());
                }
                self.handle_reaction_updates(updates).await
            }
        }
    }

    // --- Bulk backfill ---

    async fn handle_history_set(
        &self,
        chats: Vec<RawObject>,
        contacts: Vec<RawObject>,
        messages: Vec<RawObject>,
        is_latest: bool,
    ) -> Result<(), SyncError> {
        if is_latest && self.is_listening(EntityKind::Chat) {
            let removed = self.store.wipe_chats(&self.session_id).await?;
            info!(
                session = %self.session_id,
                removed,
                "latest history set, chat set wiped for rebuild"
            );
        }

        if self.is_listening(EntityKind::Chat) {
            let prepared = self.prepare_chats(chats).await?;
            self.bulk_phase("history-chats", prepared, |batch, timeout| async move {
                self.store
                    .bulk_upsert_chats(&self.session_id, batch, timeout)
                    .await
                    .map(|_| ())
            })
            .await;
        }

        if self.is_listening(EntityKind::Contact) {
            let prepared = self.prepare_contacts(contacts).await?;
            self.bulk_phase("history-contacts", prepared, |batch, timeout| async move {
                self.store
                    .bulk_upsert_contacts(&self.session_id, batch, timeout)
                    .await
                    .map(|_| ())
            })
            .await;
        }

        if self.is_listening(EntityKind::Message) {
            let prepared = self.prepare_messages(messages).await?;
            self.bulk_phase("history-messages", prepared, |batch, timeout| async move {
                self.store
                    .bulk_upsert_messages(&self.session_id, batch, timeout)
                    .await
                    .map(|_| ())
            })
            .await;
        }

        Ok(())
    }

    /// Partition records per the volume tier, run one transaction per batch
    /// under retry, with bounded concurrency. Failed batches are surfaced in
    /// the log; their siblings are unaffected.
    async fn bulk_phase<T, F, Fut>(&self, label: &'static str, records: Vec<T>, write: F)
    where
        T: Clone + Send,
        F: Fn(Vec<T>, std::time::Duration) -> Fut,
        Fut: Future<Output = Result<(), SyncError>>,
    {
        if records.is_empty() {
            return;
        }
        let plan = BatchPlan::for_volume(records.len(), &self.batching);
        let timeout = plan.batch_timeout;
        let retry = &self.retry;
        let write = &write;

        let report = run_batches(
            records,
            &plan,
            self.batching.progress_every,
            label,
            |batch, _index| async move {
                with_retry(label, retry, || write(batch.clone(), timeout)).await
            },
        )
        .await;

        if !report.all_succeeded() {
            warn!(
                session = %self.session_id,
                label,
                failed = report.failures.len(),
                total_batches = report.total_batches,
                "bulk phase finished with failed batches"
            );
        }
    }

    // --- Chats ---

    async fn handle_chats_upsert(&self, records: Vec<RawObject>) -> Result<(), SyncError> {
        for raw in records {
            let Some(chat) = self.prepare_chat(raw).await? else {
                continue;
            };
            let outcome = with_retry("upsert-chat", &self.retry, || {
                let chat = chat.clone();
                async move { self.store.upsert_chat(&self.session_id, &chat).await }
            })
            .await;
            if let Err(err) = outcome {
                error!(
                    session = %self.session_id,
                    chat = %chat.id,
                    error = %err,
                    "chat upsert failed"
                );
            }
        }
        Ok(())
    }

    async fn handle_chats_update(&self, records: Vec<RawObject>) -> Result<(), SyncError> {
        for raw in records {
            let Some(patch) = self.prepare_chat(raw).await? else {
                continue;
            };
            match self.store.update_chat(&self.session_id, &patch).await {
                Ok(created) => {
                    if created {
                        debug!(
                            session = %self.session_id,
                            chat = %patch.id,
                            "update created missing chat"
                        );
                    }
                }
                Err(err) => {
                    error!(
                        session = %self.session_id,
                        chat = %patch.id,
                        error = %err,
                        "chat update failed"
                    );
                }
            }
        }
        Ok(())
    }

    async fn handle_chats_delete(&self, ids: Vec<String>) -> Result<(), SyncError> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            match self.resolver.resolve(&id, None).await {
                Ok(canonical) => resolved.push(canonical),
                Err(err) => {
                    warn!(session = %self.session_id, chat = %id, error = %err, "undeletable chat id skipped");
                }
            }
        }
        let removed = self.store.delete_chats(&self.session_id, &resolved).await?;
        info!(session = %self.session_id, removed, "chats deleted");
        Ok(())
    }

    // --- Contacts ---

    async fn handle_contacts_upsert(&self, records: Vec<RawObject>) -> Result<(), SyncError> {
        use futures::StreamExt;

        let prepared = self.prepare_contacts(records).await?;
        let results: Vec<Result<(), (String, SyncError)>> =
            futures::stream::iter(prepared.into_iter().map(|contact| async move {
                let id = contact.id.clone();
                with_retry("upsert-contact", &self.retry, || {
                    let contact = contact.clone();
                    async move { self.store.upsert_contact(&self.session_id, &contact).await }
                })
                .await
                .map_err(|err| (id, err))
            }))
            .buffer_unordered(CONTACT_FANOUT)
            .collect()
            .await;

        for result in results {
            if let Err((id, err)) = result {
                error!(
                    session = %self.session_id,
                    contact = %id,
                    error = %err,
                    "contact upsert failed"
                );
            }
        }
        Ok(())
    }

    async fn handle_contacts_update(&self, records: Vec<RawObject>) -> Result<(), SyncError> {
        for raw in records {
            let Some(patch) = self.prepare_contact(raw).await? else {
                continue;
            };
            match self.store.update_contact(&self.session_id, &patch).await {
                Ok(created) => {
                    if created {
                        debug!(
                            session = %self.session_id,
                            contact = %patch.id,
                            "update created missing contact"
                        );
                    }
                }
                Err(err) => {
                    error!(
                        session = %self.session_id,
                        contact = %patch.id,
                        error = %err,
                        "contact update failed"
                    );
                }
            }
        }
        Ok(())
    }

    // --- Messages ---

    async fn handle_messages_upsert(
        &self,
        records: Vec<RawObject>,
        kind: MessageUpsertKind,
    ) -> Result<(), SyncError> {
        for raw in records {
            let Some(record) = self.prepare_message(raw).await? else {
                continue;
            };
            let remote_jid = record.remote_jid().unwrap_or_default().to_string();

            let outcome = with_retry("upsert-message", &self.retry, || {
                let record = record.clone();
                async move { self.store.upsert_message(&self.session_id, &record).await }
            })
            .await;
            if let Err(err) = outcome {
                error!(
                    session = %self.session_id,
                    chat = %remote_jid,
                    error = %err,
                    "message upsert failed"
                );
                continue;
            }

            // A live message for a conversation the store has never seen
            // implies a chat; synthesize the upsert the source never sent.
            if kind == MessageUpsertKind::Notify
                && !self.store.chat_exists(&self.session_id, &remote_jid).await?
            {
                debug!(
                    session = %self.session_id,
                    chat = %remote_jid,
                    "synthesizing chat for unknown conversation"
                );
                let mut synthesized = RawObject::new();
                synthesized.insert("id".to_string(), RawValue::Str(remote_jid.clone()));
                if let Some(ts) = record.message_timestamp {
                    synthesized.insert(
                        "conversationTimestamp".to_string(),
                        RawValue::Int(ts),
                    );
                }
                synthesized.insert("unreadCount".to_string(), RawValue::Int(1));

                let derived = SessionEvent::ChatsUpsert(vec![synthesized]);
                let _ = self.derived_tx.send(derived.clone());
                if let SessionEvent::ChatsUpsert(records) = derived {
                    self.handle_chats_upsert(records).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_messages_update(&self, records: Vec<RawObject>) -> Result<(), SyncError> {
        for raw in records {
            let Some(patch) = self.prepare_message(raw).await? else {
                continue;
            };
            let (Some(remote_jid), Some(id)) = (
                patch.remote_jid().map(str::to_string),
                patch.id().map(str::to_string),
            ) else {
                continue;
            };
            match self
                .store
                .update_message(&self.session_id, &remote_jid, &id, &patch)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    // Expected in normal operation: an update for a record
                    // the local store has not yet seen.
                    info!(
                        session = %self.session_id,
                        chat = %remote_jid,
                        message = %id,
                        "update for unknown message skipped"
                    );
                }
                Err(err) => {
                    error!(
                        session = %self.session_id,
                        chat = %remote_jid,
                        message = %id,
                        error = %err,
                        "message update failed"
                    );
                }
            }
        }
        Ok(())
    }

    async fn handle_reaction_updates(&self, updates: Vec<RawObject>) -> Result<(), SyncError> {
        for raw in updates {
            let Some((remote_jid, id, reaction)) =
                self.prepare_collection_update(raw, "reaction").await?
            else {
                continue;
            };
            match self
                .store
                .set_reaction(&self.session_id, &remote_jid, &id, reaction)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    info!(
                        session = %self.session_id,
                        chat = %remote_jid,
                        message = %id,
                        "reaction for unknown message skipped"
                    );
                }
                Err(err) => {
                    error!(
                        session = %self.session_id,
                        chat = %remote_jid,
                        message = %id,
                        error = %err,
                        "reaction update failed"
                    );
                }
            }
        }
        Ok(())
    }

    async fn handle_receipt_updates(&self, updates: Vec<RawObject>) -> Result<(), SyncError> {
        for raw in updates {
            let Some((remote_jid, id, receipt)) =
                self.prepare_collection_update(raw, "receipt").await?
            else {
                continue;
            };
            match self
                .store
                .set_receipt(&self.session_id, &remote_jid, &id, receipt)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    info!(
                        session = %self.session_id,
                        chat = %remote_jid,
                        message = %id,
                        "receipt for unknown message skipped"
                    );
                }
                Err(err) => {
                    error!(
                        session = %self.session_id,
                        chat = %remote_jid,
                        message = %id,
                        error = %err,
                        "receipt update failed"
                    );
                }
            }
        }
        Ok(())
    }

    // --- Record preparation: sanitize, then resolve identity ---

    async fn prepare_chats(&self, records: Vec<RawObject>) -> Result<Vec<Chat>, SyncError> {
        let mut prepared = Vec::with_capacity(records.len());
        for raw in records {
            if let Some(chat) = self.prepare_chat(raw).await? {
                prepared.push(chat);
            }
        }
        Ok(prepared)
    }

    async fn prepare_chat(&self, raw: RawObject) -> Result<Option<Chat>, SyncError> {
        let clean = sanitize(raw, EntityKind::Chat);
        self.log_dropped(EntityKind::Chat, &clean);

        let Some(id) = clean.get_str("id").filter(|s| !s.is_empty()).map(str::to_string)
        else {
            warn!(session = %self.session_id, "chat record without id skipped");
            return Ok(None);
        };
        let canonical = self.resolver.resolve(&id, Some(&clean.fields)).await?;

        let mut fields = clean.fields;
        fields.insert("id".to_string(), Value::String(canonical));
        fields.remove("pnJid");

        match serde_json::from_value::<Chat>(Value::Object(fields)) {
            Ok(chat) => Ok(Some(chat)),
            Err(err) => {
                warn!(
                    session = %self.session_id,
                    chat = %id,
                    error = %err,
                    "chat record failed decoding, skipped"
                );
                Ok(None)
            }
        }
    }

    async fn prepare_contacts(&self, records: Vec<RawObject>) -> Result<Vec<Contact>, SyncError> {
        let mut prepared = Vec::with_capacity(records.len());
        for raw in records {
            if let Some(contact) = self.prepare_contact(raw).await? {
                prepared.push(contact);
            }
        }
        Ok(prepared)
    }

    async fn prepare_contact(&self, raw: RawObject) -> Result<Option<Contact>, SyncError> {
        let clean = sanitize(raw, EntityKind::Contact);
        self.log_dropped(EntityKind::Contact, &clean);

        let Some(id) = clean.get_str("id").filter(|s| !s.is_empty()).map(str::to_string)
        else {
            warn!(session = %self.session_id, "contact record without id skipped");
            return Ok(None);
        };
        let canonical = self.resolver.resolve(&id, Some(&clean.fields)).await?;

        let mut fields = clean.fields;
        fields.insert("id".to_string(), Value::String(canonical));
        fields.remove("pnJid");

        match serde_json::from_value::<Contact>(Value::Object(fields)) {
            Ok(contact) => Ok(Some(contact)),
            Err(err) => {
                warn!(
                    session = %self.session_id,
                    contact = %id,
                    error = %err,
                    "contact record failed decoding, skipped"
                );
                Ok(None)
            }
        }
    }

    async fn prepare_messages(
        &self,
        records: Vec<RawObject>,
    ) -> Result<Vec<MessageRecord>, SyncError> {
        let mut prepared = Vec::with_capacity(records.len());
        for raw in records {
            if let Some(record) = self.prepare_message(raw).await? {
                prepared.push(record);
            }
        }
        Ok(prepared)
    }

    async fn prepare_message(&self, raw: RawObject) -> Result<Option<MessageRecord>, SyncError> {
        let clean = sanitize(raw, EntityKind::Message);
        self.log_dropped(EntityKind::Message, &clean);
        let CleanRecord {
            mut fields, blobs, ..
        } = clean;

        let Some(key) = fields.get("key").and_then(Value::as_object).cloned() else {
            warn!(session = %self.session_id, "message record without key skipped");
            return Ok(None);
        };
        let Some(remote_jid) = key
            .get("remoteJid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        else {
            warn!(session = %self.session_id, "message record without remoteJid skipped");
            return Ok(None);
        };
        if key
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .is_none()
        {
            warn!(session = %self.session_id, "message record without id skipped");
            return Ok(None);
        }

        let canonical = self.resolver.resolve(remote_jid, Some(&key)).await?;
        if let Some(Value::Object(key_fields)) = fields.get_mut("key") {
            key_fields.insert("remoteJid".to_string(), Value::String(canonical));
            key_fields.remove("pnJid");
        }

        match serde_json::from_value::<MessageRecord>(Value::Object(fields)) {
            Ok(mut record) => {
                record.media_ciphertext_sha256 = blobs.get("mediaCiphertextSha256").cloned();
                record.message_secret = blobs.get("messageSecret").cloned();
                Ok(Some(record))
            }
            Err(err) => {
                warn!(
                    session = %self.session_id,
                    error = %err,
                    "message record failed decoding, skipped"
                );
                Ok(None)
            }
        }
    }

    /// Clean a reaction/receipt update into (canonical jid, message id,
    /// payload). These are not entity records, so no allowlist applies.
    async fn prepare_collection_update(
        &self,
        raw: RawObject,
        payload_field: &str,
    ) -> Result<Option<(String, String, Value)>, SyncError> {
        let Some(Value::Object(mut update)) = clean_value(RawValue::Object(raw)) else {
            return Ok(None);
        };
        let Some(key) = update.get("key").and_then(Value::as_object).cloned() else {
            warn!(session = %self.session_id, payload_field, "update without key skipped");
            return Ok(None);
        };
        let (Some(remote_jid), Some(id)) = (
            key.get("remoteJid")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty()),
            key.get("id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty()),
        ) else {
            warn!(session = %self.session_id, payload_field, "update without identity skipped");
            return Ok(None);
        };
        let Some(payload) = update.remove(payload_field) else {
            warn!(session = %self.session_id, payload_field, "update without payload skipped");
            return Ok(None);
        };

        let canonical = self.resolver.resolve(remote_jid, Some(&key)).await?;
        Ok(Some((canonical, id.to_string(), payload)))
    }

    fn log_dropped(&self, kind: EntityKind, clean: &CleanRecord) {
        if !clean.dropped.is_empty() {
            debug!(
                session = %self.session_id,
                %kind,
                dropped = ?clean.dropped,
                "filtered unknown fields"
            );
        }
    }
}
