// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential material handed to the protocol client.
//!
//! The main credential object is opaque JSON shared by reference: the client
//! mutates it in place and fires
//! [`ProtocolEvent::CredentialsUpdated`](crate::protocol::ProtocolEvent), after
//! which the session layer re-serializes the same object. Binary fields use a
//! reversible `{"type": "Buffer", "data": "<base64>"}` encoding.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::traits::auth::KeyStore;

/// Category under which the main credential object is persisted.
pub const CREDS_CATEGORY: &str = "creds";
/// Key id of the main credential object.
pub const CREDS_KEY: &str = "main";

/// Main credential object shared between the session layer and the client.
#[derive(Debug, Clone, Default)]
pub struct SharedCredentials(Arc<RwLock<Value>>);

impl SharedCredentials {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Snapshot of the current object.
    pub async fn snapshot(&self) -> Value {
        self.0.read().await.clone()
    }

    /// Replace the object wholesale.
    pub async fn replace(&self, value: Value) {
        *self.0.write().await = value;
    }

    /// Mutate the object in place.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Value),
    {
        let mut guard = self.0.write().await;
        f(&mut guard);
    }

    /// True when both handles point at the same object.
    pub fn ptr_eq(&self, other: &SharedCredentials) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Everything a protocol client needs to authenticate one session.
#[derive(Clone)]
pub struct AuthState {
    pub creds: SharedCredentials,
    pub keys: Arc<dyn KeyStore>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("creds", &"[REDACTED]")
            .finish()
    }
}

/// Encode bytes in the reversible buffer form.
pub fn encode_buffer(bytes: &[u8]) -> Value {
    json!({ "type": "Buffer", "data": STANDARD.encode(bytes) })
}

/// Decode a value produced by [`encode_buffer`]. Anything else yields `None`.
pub fn decode_buffer(value: &Value) -> Option<Vec<u8>> {
    let obj = value.as_object()?;
    if obj.get("type")?.as_str()? != "Buffer" {
        return None;
    }
    match obj.get("data")? {
        Value::String(encoded) => STANDARD.decode(encoded).ok(),
        // Older writers stored the raw byte array.
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_encoding_is_reversible() {
        let bytes = [0u8, 1, 2, 254, 255];
        let encoded = encode_buffer(&bytes);
        assert_eq!(encoded["type"], "Buffer");
        assert_eq!(decode_buffer(&encoded).unwrap(), bytes);
    }

    #[test]
    fn decodes_legacy_byte_arrays() {
        let legacy = json!({"type": "Buffer", "data": [104, 105]});
        assert_eq!(decode_buffer(&legacy).unwrap(), b"hi");
    }

    #[test]
    fn rejects_non_buffer_values() {
        assert!(decode_buffer(&json!({"type": "Other", "data": ""})).is_none());
        assert!(decode_buffer(&json!("plain")).is_none());
    }

    #[tokio::test]
    async fn shared_credentials_mutate_by_reference() {
        let creds = SharedCredentials::new(json!({"registered": false}));
        let client_view = creds.clone();
        client_view
            .update(|v| v["registered"] = Value::Bool(true))
            .await;
        assert_eq!(creds.snapshot().await["registered"], true);
        assert!(creds.ptr_eq(&client_view));
    }
}
