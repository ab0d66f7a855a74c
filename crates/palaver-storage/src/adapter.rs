// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use palaver_config::model::StorageConfig;
use palaver_core::traits::storage::AuthWrite;
use palaver_core::types::{
    ChatActivity, ChatSummary, DeviceRecord, HistoryEntry, HistoryWrite, NewDevice,
    NewHistoryEntry, SessionStatus, StatusUpdate,
};
use palaver_core::{AdapterType, HealthStatus, PalaverError, PluginAdapter, StorageAdapter};

use crate::database::{checkpoint, map_tr_err, Database};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened by
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`](StorageAdapter::initialize) is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already opened database.
    pub fn from_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, PalaverError> {
        self.db.get().ok_or_else(|| PalaverError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        let db = self.db()?;
        let integrity = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                conn.query_row("PRAGMA quick_check", [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)?;
        if integrity == "ok" {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(format!("quick_check: {integrity}")))
        }
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        if let Some(db) = self.db.get() {
            checkpoint(db.connection()).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), PalaverError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| PalaverError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), PalaverError> {
        checkpoint(self.db()?.connection()).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Devices ---

    async fn create_device(&self, device: &NewDevice) -> Result<DeviceRecord, PalaverError> {
        queries::devices::create_device(self.db()?, device).await
    }

    async fn get_device(&self, session_id: &str) -> Result<Option<DeviceRecord>, PalaverError> {
        queries::devices::get_device(self.db()?, session_id).await
    }

    async fn list_devices(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<DeviceRecord>, PalaverError> {
        queries::devices::list_devices(self.db()?, status).await
    }

    async fn update_device_status(
        &self,
        session_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), PalaverError> {
        queries::devices::update_device_status(self.db()?, session_id, update).await
    }

    async fn set_device_phone_number(
        &self,
        session_id: &str,
        phone_number: Option<&str>,
    ) -> Result<(), PalaverError> {
        queries::devices::set_device_phone_number(self.db()?, session_id, phone_number).await
    }

    async fn set_device_ai_enabled(
        &self,
        session_id: &str,
        enabled: bool,
    ) -> Result<(), PalaverError> {
        queries::devices::set_device_ai_enabled(self.db()?, session_id, enabled).await
    }

    async fn archive_device(
        &self,
        session_id: &str,
        reason: Option<&str>,
    ) -> Result<(), PalaverError> {
        queries::devices::archive_device(self.db()?, session_id, reason).await
    }

    // --- Chats ---

    async fn get_chat(
        &self,
        session_id: &str,
        chat_jid: &str,
    ) -> Result<Option<ChatSummary>, PalaverError> {
        queries::chats::get_chat(self.db()?, session_id, chat_jid).await
    }

    async fn upsert_chat_activity(
        &self,
        activity: &ChatActivity,
    ) -> Result<ChatSummary, PalaverError> {
        queries::chats::upsert_chat_activity(self.db()?, activity).await
    }

    async fn list_chats(&self, session_id: &str) -> Result<Vec<ChatSummary>, PalaverError> {
        queries::chats::list_chats(self.db()?, session_id).await
    }

    async fn set_chat_ai_enabled(
        &self,
        session_id: &str,
        chat_jid: &str,
        enabled: bool,
    ) -> Result<bool, PalaverError> {
        queries::chats::set_chat_ai_enabled(self.db()?, session_id, chat_jid, enabled).await
    }

    async fn set_human_takeover(
        &self,
        session_id: &str,
        chat_jid: &str,
        actor: Option<&str>,
    ) -> Result<bool, PalaverError> {
        queries::chats::set_human_takeover(self.db()?, session_id, chat_jid, actor).await
    }

    async fn assign_chat(
        &self,
        session_id: &str,
        chat_jid: &str,
        assignee: Option<&str>,
    ) -> Result<bool, PalaverError> {
        queries::chats::assign_chat(self.db()?, session_id, chat_jid, assignee).await
    }

    async fn delete_chat(&self, session_id: &str, chat_jid: &str) -> Result<bool, PalaverError> {
        queries::chats::delete_chat(self.db()?, session_id, chat_jid).await
    }

    // --- History ---

    async fn record_history(&self, entry: &NewHistoryEntry) -> Result<HistoryWrite, PalaverError> {
        queries::history::record_history(self.db()?, entry).await
    }

    async fn find_history(
        &self,
        session_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<HistoryEntry>, PalaverError> {
        queries::history::find_history(self.db()?, session_id, provider_message_id).await
    }

    async fn recent_history(
        &self,
        session_id: &str,
        chat_jid: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, PalaverError> {
        queries::history::recent_history(self.db()?, session_id, chat_jid, limit).await
    }

    async fn attach_media(
        &self,
        session_id: &str,
        provider_message_id: &str,
        media_url: &str,
        media_mime: Option<&str>,
    ) -> Result<bool, PalaverError> {
        queries::history::attach_media(
            self.db()?,
            session_id,
            provider_message_id,
            media_url,
            media_mime,
        )
        .await
    }

    // --- Credentials ---

    async fn auth_get(
        &self,
        session_id: &str,
        category: &str,
        ids: &[String],
    ) -> Result<HashMap<String, String>, PalaverError> {
        queries::auth::auth_get(self.db()?, session_id, category, ids).await
    }

    async fn auth_set(&self, session_id: &str, writes: Vec<AuthWrite>) -> Result<(), PalaverError> {
        queries::auth::auth_set(self.db()?, session_id, writes).await
    }

    async fn auth_clear(&self, session_id: &str) -> Result<(), PalaverError> {
        queries::auth::auth_clear(self.db()?, session_id).await
    }

    // --- Address mappings ---

    async fn save_address_mapping(
        &self,
        session_id: &str,
        alternate: &str,
        stable: &str,
    ) -> Result<(), PalaverError> {
        queries::addresses::save_address_mapping(self.db()?, session_id, alternate, stable).await
    }

    async fn find_address_mapping(
        &self,
        session_id: &str,
        alternate: &str,
    ) -> Result<Option<String>, PalaverError> {
        queries::addresses::find_address_mapping(self.db()?, session_id, alternate).await
    }
}
