// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential/key persistence on top of the session blob table.
//!
//! The protocol client reads and writes categorized key material
//! (`get(category, ids)` / `set(map)`); each id is written or deleted
//! independently. Rows are addressed `"{category}-{id}"`, with the root
//! credentials under a fixed id. A value that fails JSON round-trip is
//! skipped and logged, never fatal.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use chatsink_core::{SessionRecord, SyncError};
use chatsink_storage::EntityStore;

/// Row id of the root credentials blob.
pub const CREDENTIALS_ID: &str = "creds";

/// Key material to write (`Some`) or delete (`None`), per category and id.
pub type KeyMutation = HashMap<String, HashMap<String, Option<Value>>>;

/// Categorized key store for one session.
#[derive(Clone)]
pub struct KeyStore {
    store: EntityStore,
    session_id: String,
}

impl KeyStore {
    pub fn new(store: EntityStore, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    fn row_id(category: &str, id: &str) -> String {
        format!("{category}-{id}")
    }

    /// Fetch the values for the given ids in one category. Ids with no
    /// stored value are absent from the map.
    pub async fn get(
        &self,
        category: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Value>, SyncError> {
        let row_ids: Vec<String> = ids.iter().map(|id| Self::row_id(category, id)).collect();
        let rows = self.store.get_sessions(&self.session_id, &row_ids).await?;

        let prefix = format!("{category}-");
        let mut values = HashMap::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<Value>(&row.data) {
                Ok(value) => {
                    let id = row.id.strip_prefix(&prefix).unwrap_or(&row.id).to_string();
                    values.insert(id, value);
                }
                Err(error) => {
                    warn!(
                        session = %self.session_id,
                        row = %row.id,
                        %error,
                        "stored key blob failed to decode, skipping"
                    );
                }
            }
        }
        Ok(values)
    }

    /// Apply a categorized mutation map; each id independently written or
    /// deleted. Serialization failures skip that one write.
    pub async fn set(&self, data: KeyMutation) -> Result<(), SyncError> {
        for (category, entries) in data {
            for (id, value) in entries {
                let row_id = Self::row_id(&category, &id);
                match value {
                    Some(value) => match serde_json::to_string(&value) {
                        Ok(data) => {
                            self.store
                                .upsert_session(
                                    &self.session_id,
                                    &SessionRecord { id: row_id, data },
                                )
                                .await?;
                        }
                        Err(error) => {
                            warn!(
                                session = %self.session_id,
                                row = %row_id,
                                %error,
                                "key blob failed serialization round-trip, skipping write"
                            );
                        }
                    },
                    None => {
                        self.store
                            .delete_sessions(&self.session_id, &[row_id])
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Read the root credentials blob, if any.
    pub async fn read_credentials(&self) -> Result<Option<Value>, SyncError> {
        let rows = self
            .store
            .get_sessions(&self.session_id, &[CREDENTIALS_ID.to_string()])
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(serde_json::from_str(&row.data).ok()),
            None => Ok(None),
        }
    }

    /// Persist the root credentials blob.
    pub async fn write_credentials(&self, credentials: &Value) -> Result<(), SyncError> {
        let data = serde_json::to_string(credentials)?;
        self.store
            .upsert_session(
                &self.session_id,
                &SessionRecord {
                    id: CREDENTIALS_ID.to_string(),
                    data,
                },
            )
            .await
    }

    /// Drop all key material except the root credentials.
    pub async fn clear(&self) -> Result<(), SyncError> {
        self.store
            .delete_sessions_except(&self.session_id, CREDENTIALS_ID)
            .await?;
        Ok(())
    }

    /// Drop everything for the session, credentials included.
    pub async fn logout(&self) -> Result<(), SyncError> {
        self.store.delete_all_sessions(&self.session_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsink_config::TransactionConfig;
    use chatsink_storage::Database;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn setup() -> (KeyStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("keys.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let store = EntityStore::new(Arc::new(db), &TransactionConfig::default());
        (KeyStore::new(store, "s1"), dir)
    }

    fn mutation(category: &str, id: &str, value: Option<Value>) -> KeyMutation {
        let mut entries = HashMap::new();
        entries.insert(id.to_string(), value);
        let mut data = HashMap::new();
        data.insert(category.to_string(), entries);
        data
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (keys, _dir) = setup().await;

        keys.set(mutation("pre-key", "1", Some(json!({ "private": "abc" }))))
            .await
            .unwrap();
        keys.set(mutation("pre-key", "2", Some(json!({ "private": "def" }))))
            .await
            .unwrap();

        let got = keys
            .get("pre-key", &["1".to_string(), "2".to_string(), "3".to_string()])
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got["1"], json!({ "private": "abc" }));

        let empty = keys.get("session", &["1".to_string()]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn none_value_deletes_the_id() {
        let (keys, _dir) = setup().await;

        keys.set(mutation("pre-key", "1", Some(json!(1))))
            .await
            .unwrap();
        keys.set(mutation("pre-key", "1", None)).await.unwrap();

        let got = keys.get("pre-key", &["1".to_string()]).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn credentials_round_trip() {
        let (keys, _dir) = setup().await;
        assert!(keys.read_credentials().await.unwrap().is_none());

        keys.write_credentials(&json!({ "me": { "id": "123@s.whatsapp.net" } }))
            .await
            .unwrap();
        let creds = keys.read_credentials().await.unwrap().unwrap();
        assert_eq!(creds["me"]["id"], "123@s.whatsapp.net");
    }

    #[tokio::test]
    async fn clear_keeps_credentials_logout_drops_all() {
        let (keys, _dir) = setup().await;

        keys.write_credentials(&json!({ "registered": true }))
            .await
            .unwrap();
        keys.set(mutation("pre-key", "1", Some(json!(1))))
            .await
            .unwrap();

        keys.clear().await.unwrap();
        assert!(keys.read_credentials().await.unwrap().is_some());
        assert!(
            keys.get("pre-key", &["1".to_string()])
                .await
                .unwrap()
                .is_empty()
        );

        keys.logout().await.unwrap();
        assert!(keys.read_credentials().await.unwrap().is_none());
    }
}
