// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::PalaverError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChatActivity, ChatSummary, DeviceRecord, HistoryEntry, HistoryWrite, NewDevice,
    NewHistoryEntry, SessionStatus, StatusUpdate,
};

/// One credential write. `value == None` deletes the key.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthWrite {
    pub category: String,
    pub key_id: String,
    pub value: Option<String>,
}

/// Adapter for storage and persistence backends.
///
/// Holds device records, chat summaries, append-only chat history, per-session
/// credential keys, and alternate-address mappings. Updates are
/// last-write-wins; no cross-session transactions are required.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), PalaverError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), PalaverError>;

    // --- Devices ---

    async fn create_device(&self, device: &NewDevice) -> Result<DeviceRecord, PalaverError>;

    async fn get_device(&self, session_id: &str) -> Result<Option<DeviceRecord>, PalaverError>;

    async fn list_devices(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<DeviceRecord>, PalaverError>;

    async fn update_device_status(
        &self,
        session_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), PalaverError>;

    async fn set_device_phone_number(
        &self,
        session_id: &str,
        phone_number: Option<&str>,
    ) -> Result<(), PalaverError>;

    async fn set_device_ai_enabled(
        &self,
        session_id: &str,
        enabled: bool,
    ) -> Result<(), PalaverError>;

    /// Set status `archived` and stamp the archival metadata.
    async fn archive_device(
        &self,
        session_id: &str,
        reason: Option<&str>,
    ) -> Result<(), PalaverError>;

    // --- Chats ---

    async fn get_chat(
        &self,
        session_id: &str,
        chat_jid: &str,
    ) -> Result<Option<ChatSummary>, PalaverError>;

    /// Create the summary on first contact or fold the activity into it.
    async fn upsert_chat_activity(
        &self,
        activity: &ChatActivity,
    ) -> Result<ChatSummary, PalaverError>;

    async fn list_chats(&self, session_id: &str) -> Result<Vec<ChatSummary>, PalaverError>;

    /// Returns false when the chat does not exist.
    async fn set_chat_ai_enabled(
        &self,
        session_id: &str,
        chat_jid: &str,
        enabled: bool,
    ) -> Result<bool, PalaverError>;

    /// `Some(actor)` takes the chat over, `None` releases it.
    async fn set_human_takeover(
        &self,
        session_id: &str,
        chat_jid: &str,
        actor: Option<&str>,
    ) -> Result<bool, PalaverError>;

    async fn assign_chat(
        &self,
        session_id: &str,
        chat_jid: &str,
        assignee: Option<&str>,
    ) -> Result<bool, PalaverError>;

    /// Delete the summary and its history.
    async fn delete_chat(&self, session_id: &str, chat_jid: &str) -> Result<bool, PalaverError>;

    // --- History ---

    /// Insert, or merge into the row with the same provider message id.
    async fn record_history(&self, entry: &NewHistoryEntry) -> Result<HistoryWrite, PalaverError>;

    async fn find_history(
        &self,
        session_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<HistoryEntry>, PalaverError>;

    /// The most recent `limit` entries of a chat, oldest first.
    async fn recent_history(
        &self,
        session_id: &str,
        chat_jid: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, PalaverError>;

    /// Set the media reference of an existing row. Returns false if no row matched.
    async fn attach_media(
        &self,
        session_id: &str,
        provider_message_id: &str,
        media_url: &str,
        media_mime: Option<&str>,
    ) -> Result<bool, PalaverError>;

    // --- Credentials ---

    async fn auth_get(
        &self,
        session_id: &str,
        category: &str,
        ids: &[String],
    ) -> Result<HashMap<String, String>, PalaverError>;

    async fn auth_set(&self, session_id: &str, writes: Vec<AuthWrite>) -> Result<(), PalaverError>;

    async fn auth_clear(&self, session_id: &str) -> Result<(), PalaverError>;

    // --- Address mappings ---

    async fn save_address_mapping(
        &self,
        session_id: &str,
        alternate: &str,
        stable: &str,
    ) -> Result<(), PalaverError>;

    async fn find_address_mapping(
        &self,
        session_id: &str,
        alternate: &str,
    ) -> Result<Option<String>, PalaverError>;
}
