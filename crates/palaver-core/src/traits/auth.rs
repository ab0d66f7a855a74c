// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed credential store contract used by protocol clients.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PalaverError;

/// Per-session keyed credential map.
///
/// Values are opaque JSON. A `None` in [`set`](KeyStore::set) deletes the key.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetch the given ids of one category. Missing ids map to `None`.
    async fn get(
        &self,
        category: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Option<Value>>, PalaverError>;

    /// Write or delete keys, grouped by category.
    async fn set(
        &self,
        data: HashMap<String, HashMap<String, Option<Value>>>,
    ) -> Result<(), PalaverError>;

    /// Wipe every key of the session, including the main credentials.
    async fn remove_all(&self) -> Result<(), PalaverError>;
}
