// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests driving the full pipeline: events in, rows out.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::mpsc;

use chatsink_config::SyncConfig;
use chatsink_core::traits::alias::NoAliasLookup;
use chatsink_core::{
    AliasLookup, EntityKind, MessageUpsertKind, RawObject, RawValue, SessionEvent, SyncError,
};
use chatsink_storage::{Database, EntityStore};
use chatsink_sync::{IdentityResolver, SyncEngine};

struct StaticLookup(HashMap<String, String>);

#[async_trait]
impl AliasLookup for StaticLookup {
    async fn canonical_for_alias(&self, alias_user: &str) -> Result<Option<String>, SyncError> {
        Ok(self.0.get(alias_user).cloned())
    }
}

async fn setup(
    lookup: Arc<dyn AliasLookup>,
) -> (Arc<SyncEngine>, EntityStore, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("e2e.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    let config = SyncConfig::default();
    let store = EntityStore::new(Arc::new(db), &config.transaction);
    let engine = SyncEngine::new(
        "session-1",
        store.clone(),
        IdentityResolver::new(lookup),
        &config,
    );
    engine.listen_all();
    (Arc::new(engine), store, dir)
}

fn raw(pairs: &[(&str, RawValue)]) -> RawObject {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn raw_message(jid: &str, id: &str, text: &str, timestamp: i64) -> RawObject {
    raw(&[
        (
            "key",
            RawValue::Object(raw(&[
                ("remoteJid", jid.into()),
                ("id", id.into()),
                ("fromMe", false.into()),
            ])),
        ),
        (
            "message",
            RawValue::Object(raw(&[("conversation", text.into())])),
        ),
        ("messageTimestamp", RawValue::Int(timestamp)),
    ])
}

#[tokio::test]
async fn history_set_then_incremental_upsert_yields_one_chat_row() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;

    engine
        .handle_event(SessionEvent::HistorySet {
            chats: vec![raw(&[("id", "x@s.whatsapp.net".into())])],
            contacts: Vec::new(),
            messages: Vec::new(),
            is_latest: true,
        })
        .await;

    engine
        .handle_event(SessionEvent::ChatsUpsert(vec![raw(&[
            ("id", "x@s.whatsapp.net".into()),
            ("unreadCount", RawValue::Int(1)),
        ])]))
        .await;

    let chat = store
        .get_chat("session-1", "x@s.whatsapp.net")
        .await
        .unwrap()
        .expect("exactly one chat row for x@s.whatsapp.net");
    assert_eq!(chat.unread_count, Some(1));
}

#[tokio::test]
async fn events_flow_through_the_channel_run_loop() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;

    let (tx, rx) = mpsc::channel(16);
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(rx).await })
    };

    tx.send(SessionEvent::ContactsUpsert(vec![raw(&[
        ("id", "111@s.whatsapp.net".into()),
        ("name", "Alice".into()),
        ("ignoredField", "dropped".into()),
    ])]))
    .await
    .unwrap();
    tx.send(SessionEvent::ContactsUpdate(vec![raw(&[
        ("id", "111@s.whatsapp.net".into()),
        ("status", "around".into()),
    ])]))
    .await
    .unwrap();
    drop(tx);
    runner.await.unwrap();

    let contact = store
        .get_contact("session-1", "111@s.whatsapp.net")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(contact.name.as_deref(), Some("Alice"));
    assert_eq!(contact.status.as_deref(), Some("around"));
}

#[tokio::test]
async fn notify_message_for_unknown_conversation_synthesizes_chat() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;
    let mut derived = engine.derived_events();

    engine
        .handle_event(SessionEvent::MessagesUpsert {
            messages: vec![raw_message("999@s.whatsapp.net", "M1", "hey", 1_700_000_123)],
            kind: MessageUpsertKind::Notify,
        })
        .await;

    let chat = store
        .get_chat("session-1", "999@s.whatsapp.net")
        .await
        .unwrap()
        .expect("chat synthesized for unknown conversation");
    assert_eq!(chat.unread_count, Some(1));
    assert_eq!(chat.conversation_timestamp, Some(1_700_000_123));

    // The derived event is re-emitted for observers too.
    match derived.try_recv() {
        Ok(SessionEvent::ChatsUpsert(records)) => assert_eq!(records.len(), 1),
        other => panic!("expected derived chat upsert, got {other:?}"),
    }

    // A second notify for the same conversation synthesizes nothing new.
    engine
        .handle_event(SessionEvent::MessagesUpsert {
            messages: vec![raw_message("999@s.whatsapp.net", "M2", "again", 1_700_000_200)],
            kind: MessageUpsertKind::Notify,
        })
        .await;
    assert!(derived.try_recv().is_err());
}

#[tokio::test]
async fn append_messages_do_not_synthesize_chats() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;

    engine
        .handle_event(SessionEvent::MessagesUpsert {
            messages: vec![raw_message("777@s.whatsapp.net", "M1", "old", 1_600_000_000)],
            kind: MessageUpsertKind::Append,
        })
        .await;

    assert!(
        store
            .get_chat("session-1", "777@s.whatsapp.net")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .get_message("session-1", "777@s.whatsapp.net", "M1")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn latest_history_set_wipes_and_rebuilds_the_chat_set() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;

    engine
        .handle_event(SessionEvent::ChatsUpsert(vec![raw(&[(
            "id",
            "stale@s.whatsapp.net".into(),
        )])]))
        .await;

    engine
        .handle_event(SessionEvent::HistorySet {
            chats: vec![raw(&[("id", "fresh@s.whatsapp.net".into())])],
            contacts: Vec::new(),
            messages: Vec::new(),
            is_latest: true,
        })
        .await;

    assert!(
        store
            .get_chat("session-1", "stale@s.whatsapp.net")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .get_chat("session-1", "fresh@s.whatsapp.net")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn alias_addresses_are_stored_canonically() {
    let lookup = StaticLookup(
        [("555".to_string(), "444@s.whatsapp.net".to_string())]
            .into_iter()
            .collect(),
    );
    let (engine, store, _dir) = setup(Arc::new(lookup)).await;

    // Payload-embedded alternate address takes precedence for this chat.
    engine
        .handle_event(SessionEvent::ChatsUpsert(vec![raw(&[
            ("id", "333@lid".into()),
            ("pnJid", "222:4@s.whatsapp.net".into()),
        ])]))
        .await;
    // This one resolves through the injected directory.
    engine
        .handle_event(SessionEvent::ChatsUpsert(vec![raw(&[(
            "id",
            "555@lid".into(),
        )])]))
        .await;

    assert!(
        store
            .get_chat("session-1", "222@s.whatsapp.net")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .get_chat("session-1", "444@s.whatsapp.net")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .get_chat("session-1", "333@lid")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn reactions_and_receipts_merge_through_events() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;

    engine
        .handle_event(SessionEvent::MessagesUpsert {
            messages: vec![raw_message("g@g.us", "M1", "hello group", 1_700_000_000)],
            kind: MessageUpsertKind::Append,
        })
        .await;

    let reaction = |author: &str, text: &str| {
        raw(&[
            (
                "key",
                RawValue::Object(raw(&[("remoteJid", "g@g.us".into()), ("id", "M1".into())])),
            ),
            (
                "reaction",
                RawValue::Object(raw(&[
                    (
                        "key",
                        RawValue::Object(raw(&[
                            ("remoteJid", "g@g.us".into()),
                            ("participant", author.into()),
                        ])),
                    ),
                    ("text", text.into()),
                ])),
            ),
        ])
    };

    engine
        .handle_event(SessionEvent::MessageReactionUpdate(vec![
            reaction("a@s.whatsapp.net", "👍"),
            reaction("b@s.whatsapp.net", "❤️"),
        ]))
        .await;
    engine
        .handle_event(SessionEvent::MessageReactionUpdate(vec![reaction(
            "a@s.whatsapp.net",
            "😂",
        )]))
        .await;

    engine
        .handle_event(SessionEvent::MessageReceiptUpdate(vec![raw(&[
            (
                "key",
                RawValue::Object(raw(&[("remoteJid", "g@g.us".into()), ("id", "M1".into())])),
            ),
            (
                "receipt",
                RawValue::Object(raw(&[
                    ("userJid", "a@s.whatsapp.net".into()),
                    ("readTimestamp", RawValue::Int(1_700_000_500)),
                ])),
            ),
        ])]))
        .await;

    let message = store
        .get_message("session-1", "g@g.us", "M1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.reactions.len(), 2);
    assert_eq!(message.user_receipt.len(), 1);
    assert_eq!(message.user_receipt[0]["readTimestamp"], 1_700_000_500);
}

#[tokio::test]
async fn message_delete_events_are_a_no_op() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;

    engine
        .handle_event(SessionEvent::MessagesUpsert {
            messages: vec![raw_message("1@s.whatsapp.net", "M1", "keep me", 1_700_000_000)],
            kind: MessageUpsertKind::Append,
        })
        .await;
    engine
        .handle_event(SessionEvent::MessagesDelete {
            keys: vec![raw(&[
                (
                    "key",
                    RawValue::Object(raw(&[
                        ("remoteJid", "1@s.whatsapp.net".into()),
                        ("id", "M1".into()),
                    ])),
                ),
            ])],
        })
        .await;

    assert!(
        store
            .get_message("session-1", "1@s.whatsapp.net", "M1")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn chats_delete_removes_rows() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;

    engine
        .handle_event(SessionEvent::ChatsUpsert(vec![
            raw(&[("id", "1@s.whatsapp.net".into())]),
            raw(&[("id", "2@s.whatsapp.net".into())]),
        ]))
        .await;
    engine
        .handle_event(SessionEvent::ChatsDelete(vec![
            "1@s.whatsapp.net".to_string(),
        ]))
        .await;

    assert!(
        store
            .get_chat("session-1", "1@s.whatsapp.net")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .get_chat("session-1", "2@s.whatsapp.net")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn bulk_history_set_lands_every_record() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;

    let chats: Vec<RawObject> = (0..1200)
        .map(|i| raw(&[("id", format!("{i}@s.whatsapp.net").as_str().into())]))
        .collect();
    let messages: Vec<RawObject> = (0..300)
        .map(|i| raw_message("bulk@s.whatsapp.net", &format!("M{i}"), "m", 1_700_000_000 + i))
        .collect();

    engine
        .handle_event(SessionEvent::HistorySet {
            chats,
            contacts: Vec::new(),
            messages,
            is_latest: false,
        })
        .await;

    assert!(
        store
            .get_chat("session-1", "0@s.whatsapp.net")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .get_chat("session-1", "1199@s.whatsapp.net")
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(store.count_messages("session-1").await.unwrap(), 300);
}

#[tokio::test]
async fn unlistened_kinds_are_ignored_even_in_history_sets() {
    let (engine, store, _dir) = setup(Arc::new(NoAliasLookup)).await;
    engine.unlisten(EntityKind::Contact);

    engine
        .handle_event(SessionEvent::HistorySet {
            chats: vec![raw(&[("id", "c@s.whatsapp.net".into())])],
            contacts: vec![raw(&[("id", "p@s.whatsapp.net".into())])],
            messages: Vec::new(),
            is_latest: false,
        })
        .await;

    assert!(
        store
            .get_chat("session-1", "c@s.whatsapp.net")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .get_contact("session-1", "p@s.whatsapp.net")
            .await
            .unwrap()
            .is_none()
    );
}
