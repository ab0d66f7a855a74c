// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Palaver workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Protocol,
    Generator,
    Blob,
    Directory,
}

/// Connection status of a session, persisted on the device record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    Connecting,
    Synchronizing,
    Connected,
    Disconnecting,
    Disconnected,
    Reconnecting,
    AuthFailed,
    LoggedOut,
    Error,
    Conflict,
    Archived,
    Deleted,
}

impl SessionStatus {
    /// Terminal states never transition automatically; only a manual restart leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::LoggedOut
                | SessionStatus::Error
                | SessionStatus::Archived
                | SessionStatus::Deleted
        )
    }

    /// States a process restart should resume by opening a new handle.
    pub fn should_resume(self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting
                | SessionStatus::Synchronizing
                | SessionStatus::Connected
                | SessionStatus::Reconnecting
        )
    }
}

/// Message payload classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MessageType {
    /// Whether the payload carries downloadable media.
    pub fn has_media(self) -> bool {
        !matches!(self, MessageType::Text)
    }
}

/// Direction of a message relative to this system's device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Persisted device (session) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub session_id: String,
    pub owner_id: String,
    pub display_name: Option<String>,
    pub status: SessionStatus,
    pub ai_enabled: bool,
    /// Own address once paired.
    pub phone_number: Option<String>,
    pub last_connected_at: Option<String>,
    pub last_error: Option<String>,
    pub archived_at: Option<String>,
    pub archive_reason: Option<String>,
    /// Opaque JSON handed to the reply generator as business configuration.
    pub business_context: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for registering a new device.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub session_id: String,
    pub owner_id: String,
    pub display_name: Option<String>,
    pub ai_enabled: bool,
    pub business_context: Option<String>,
}

/// Status change written to a device record.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: SessionStatus,
    /// `None` clears the stored error.
    pub last_error: Option<String>,
    /// Stamp `last_connected_at` with the current time.
    pub mark_connected: bool,
}

impl StatusUpdate {
    pub fn new(status: SessionStatus) -> Self {
        Self {
            status,
            last_error: None,
            mark_connected: false,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    pub fn connected(mut self) -> Self {
        self.mark_connected = true;
        self
    }
}

/// Persisted per-chat summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub session_id: String,
    pub chat_jid: String,
    pub contact_name: Option<String>,
    pub phone_number: Option<String>,
    pub ai_enabled: bool,
    pub human_takeover: bool,
    pub takeover_by: Option<String>,
    pub takeover_at: Option<String>,
    pub last_message_preview: Option<String>,
    pub last_message_direction: Option<Direction>,
    pub last_message_at: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<String>,
    pub unread_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Message activity folded into a chat summary (creating it on first contact).
#[derive(Debug, Clone)]
pub struct ChatActivity {
    pub session_id: String,
    pub chat_jid: String,
    pub contact_name: Option<String>,
    pub phone_number: Option<String>,
    pub preview: String,
    pub direction: Direction,
    pub at: String,
}

/// Persisted chat history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub session_id: String,
    pub chat_jid: String,
    pub provider_message_id: Option<String>,
    pub direction: Direction,
    pub message_type: MessageType,
    pub content: String,
    pub media_url: Option<String>,
    pub media_mime: Option<String>,
    pub from_me: bool,
    pub is_ai_generated: bool,
    pub timestamp: String,
}

/// A history row to insert or merge into an existing one.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub session_id: String,
    pub chat_jid: String,
    pub provider_message_id: Option<String>,
    pub direction: Direction,
    pub message_type: MessageType,
    pub content: String,
    pub media_url: Option<String>,
    pub media_mime: Option<String>,
    pub from_me: bool,
    pub is_ai_generated: bool,
    pub timestamp: String,
}

/// Outcome of a deduplicating history write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWrite {
    /// A new row was created.
    Inserted(i64),
    /// An existing row gained previously missing fields.
    Enriched(i64),
    /// An existing row already held everything the write carried.
    Unchanged(i64),
}

impl HistoryWrite {
    pub fn row_id(self) -> i64 {
        match self {
            HistoryWrite::Inserted(id) | HistoryWrite::Enriched(id) | HistoryWrite::Unchanged(id) => {
                id
            }
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, HistoryWrite::Inserted(_))
    }
}

/// An inbound message after boundary normalization and address resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub session_id: String,
    pub provider_message_id: Option<String>,
    /// Stable chat address used as the contact key.
    pub chat_jid: String,
    /// Address as it arrived on the wire, when different from `chat_jid`.
    pub raw_chat_jid: Option<String>,
    pub from_me: bool,
    pub push_name: Option<String>,
    pub message_type: MessageType,
    /// Text body or media caption.
    pub text: String,
    pub media_mime: Option<String>,
    pub media_url: Option<String>,
    pub timestamp: String,
}

impl InboundMessage {
    pub fn direction(&self) -> Direction {
        if self.from_me {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }
}

/// Current UTC time in the storage timestamp format.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Convert unix seconds into the storage timestamp format.
pub fn timestamp_from_unix(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(now_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn session_status_uses_snake_case() {
        assert_eq!(SessionStatus::AuthFailed.to_string(), "auth_failed");
        assert_eq!(
            SessionStatus::from_str("logged_out").unwrap(),
            SessionStatus::LoggedOut
        );
        let json = serde_json::to_string(&SessionStatus::Synchronizing).unwrap();
        assert_eq!(json, "\"synchronizing\"");
    }

    #[test]
    fn terminal_states() {
        let terminal: Vec<_> = [
            SessionStatus::Pending,
            SessionStatus::Connecting,
            SessionStatus::Synchronizing,
            SessionStatus::Connected,
            SessionStatus::Disconnecting,
            SessionStatus::Disconnected,
            SessionStatus::Reconnecting,
            SessionStatus::AuthFailed,
            SessionStatus::LoggedOut,
            SessionStatus::Error,
            SessionStatus::Conflict,
            SessionStatus::Archived,
            SessionStatus::Deleted,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(
            terminal,
            vec![
                SessionStatus::LoggedOut,
                SessionStatus::Error,
                SessionStatus::Archived,
                SessionStatus::Deleted
            ]
        );
    }

    #[test]
    fn history_write_exposes_row_id() {
        assert_eq!(HistoryWrite::Enriched(7).row_id(), 7);
        assert!(HistoryWrite::Inserted(1).is_new());
        assert!(!HistoryWrite::Unchanged(1).is_new());
    }

    #[test]
    fn unix_timestamp_formatting() {
        assert_eq!(timestamp_from_unix(0), "1970-01-01T00:00:00.000Z");
    }
}
