// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session credential store backed by the storage adapter.
//!
//! Keys are persisted as JSON text under `(session, category, key id)`. The
//! main credential object is loaded once per handle into a
//! [`SharedCredentials`] the protocol client mutates in place;
//! [`save_creds`](AuthStateStore::save_creds) re-serializes that same object.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use palaver_core::auth::{CREDS_CATEGORY, CREDS_KEY};
use palaver_core::traits::storage::AuthWrite;
use palaver_core::{AuthState, KeyStore, PalaverError, SharedCredentials, StorageAdapter};
use serde_json::Value;
use tracing::{debug, warn};

pub struct AuthStateStore {
    session_id: String,
    storage: Arc<dyn StorageAdapter>,
}

impl AuthStateStore {
    pub fn new(session_id: impl Into<String>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            session_id: session_id.into(),
            storage,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Build the auth state handed to a new protocol handle.
    pub async fn load(self: &Arc<Self>) -> Result<AuthState, PalaverError> {
        let creds = self.load_creds().await?;
        Ok(AuthState {
            creds: SharedCredentials::new(creds),
            keys: self.clone(),
        })
    }

    /// The persisted main credentials, or an empty object before pairing.
    pub async fn load_creds(&self) -> Result<Value, PalaverError> {
        let ids = [CREDS_KEY.to_string()];
        let mut found = self.get(CREDS_CATEGORY, &ids).await?;
        Ok(found
            .remove(CREDS_KEY)
            .flatten()
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    /// Persist the current state of the shared credential object.
    pub async fn save_creds(&self, creds: &SharedCredentials) -> Result<(), PalaverError> {
        let snapshot = creds.snapshot().await;
        let write = AuthWrite {
            category: CREDS_CATEGORY.to_string(),
            key_id: CREDS_KEY.to_string(),
            value: Some(serde_json::to_string(&snapshot)?),
        };
        self.storage.auth_set(&self.session_id, vec![write]).await?;
        debug!(session_id = %self.session_id, "credentials saved");
        Ok(())
    }

    /// Remove every credential key of the session.
    pub async fn wipe(&self) -> Result<(), PalaverError> {
        self.remove_all().await
    }
}

#[async_trait]
impl KeyStore for AuthStateStore {
    async fn get(
        &self,
        category: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Option<Value>>, PalaverError> {
        let stored = self.storage.auth_get(&self.session_id, category, ids).await?;
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            let value = match stored.get(id) {
                Some(raw) => match serde_json::from_str(raw) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(
                            session_id = %self.session_id,
                            category,
                            key_id = %id,
                            error = %e,
                            "unreadable credential key, treating as missing"
                        );
                        None
                    }
                },
                None => None,
            };
            out.insert(id.clone(), value);
        }
        Ok(out)
    }

    async fn set(
        &self,
        data: HashMap<String, HashMap<String, Option<Value>>>,
    ) -> Result<(), PalaverError> {
        let mut writes = Vec::new();
        for (category, entries) in data {
            for (key_id, value) in entries {
                let value = value.map(|v| serde_json::to_string(&v)).transpose()?;
                writes.push(AuthWrite {
                    category: category.clone(),
                    key_id,
                    value,
                });
            }
        }
        if writes.is_empty() {
            return Ok(());
        }
        self.storage.auth_set(&self.session_id, writes).await
    }

    async fn remove_all(&self) -> Result<(), PalaverError> {
        self.storage.auth_clear(&self.session_id).await?;
        debug!(session_id = %self.session_id, "credentials wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::auth::{decode_buffer, encode_buffer};
    use palaver_test_utils::temp_storage;
    use serde_json::json;

    #[tokio::test]
    async fn missing_creds_load_as_empty_object() {
        let (storage, _dir) = temp_storage().await;
        let store = Arc::new(AuthStateStore::new("s1", storage));
        let auth = store.load().await.unwrap();
        assert_eq!(auth.creds.snapshot().await, json!({}));
    }

    #[tokio::test]
    async fn save_hook_persists_mutated_object() {
        let (storage, _dir) = temp_storage().await;
        let store = Arc::new(AuthStateStore::new("s1", storage.clone()));
        let auth = store.load().await.unwrap();

        auth.creds
            .update(|v| {
                v["noiseKey"] = encode_buffer(&[9, 8, 7]);
                v["registered"] = json!(true);
            })
            .await;
        store.save_creds(&auth.creds).await.unwrap();

        let reloaded = AuthStateStore::new("s1", storage).load_creds().await.unwrap();
        assert_eq!(reloaded["registered"], true);
        assert_eq!(decode_buffer(&reloaded["noiseKey"]).unwrap(), vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn null_values_delete_keys() {
        let (storage, _dir) = temp_storage().await;
        let store = AuthStateStore::new("s1", storage);

        let mut batch = HashMap::new();
        batch.insert(
            "pre-key".to_string(),
            HashMap::from([
                ("1".to_string(), Some(json!({"k": 1}))),
                ("2".to_string(), Some(json!({"k": 2}))),
            ]),
        );
        store.set(batch).await.unwrap();

        let mut batch = HashMap::new();
        batch.insert("pre-key".to_string(), HashMap::from([("1".to_string(), None)]));
        store.set(batch).await.unwrap();

        let ids = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let got = store.get("pre-key", &ids).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got["1"], None);
        assert_eq!(got["2"], Some(json!({"k": 2})));
        assert_eq!(got["3"], None);
    }

    #[tokio::test]
    async fn remove_all_is_scoped_to_session() {
        let (storage, _dir) = temp_storage().await;
        let a = Arc::new(AuthStateStore::new("a", storage.clone()));
        let b = Arc::new(AuthStateStore::new("b", storage));
        for store in [&a, &b] {
            let auth = store.load().await.unwrap();
            auth.creds.replace(json!({"me": store.session_id()})).await;
            store.save_creds(&auth.creds).await.unwrap();
        }

        a.wipe().await.unwrap();
        assert_eq!(a.load_creds().await.unwrap(), json!({}));
        assert_eq!(b.load_creds().await.unwrap(), json!({"me": "b"}));
    }
}
