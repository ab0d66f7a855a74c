// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event and payload types exchanged with the external chat-protocol client.
//!
//! [`WireMessage`] mirrors the client's message shape as loosely as it
//! arrives; the ingestion boundary normalizes it into
//! [`InboundMessage`](crate::types::InboundMessage) and nothing past that
//! boundary looks at wire fields again.

use serde::{Deserialize, Serialize};

use crate::types::MessageType;

/// Why a protocol connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectCause {
    LoggedOut,
    DeviceRemoved,
    /// Stored credentials are no longer accepted.
    BadSession,
    Forbidden,
    MultideviceMismatch,
    /// Another client opened the same session.
    ConnectionReplaced,
    /// Expected right after successful pairing.
    RestartRequired,
    TimedOut,
    ConnectionLost,
    ConnectionClosed,
    StreamError,
    Unknown(u16),
}

impl DisconnectCause {
    /// Map a protocol status code onto a cause.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => DisconnectCause::LoggedOut,
            403 => DisconnectCause::Forbidden,
            408 => DisconnectCause::TimedOut,
            411 => DisconnectCause::MultideviceMismatch,
            428 => DisconnectCause::ConnectionClosed,
            440 => DisconnectCause::ConnectionReplaced,
            500 => DisconnectCause::BadSession,
            515 => DisconnectCause::RestartRequired,
            other => DisconnectCause::Unknown(other),
        }
    }

    /// Human-readable label used in logs and observer payloads.
    pub fn label(self) -> String {
        match self {
            DisconnectCause::LoggedOut => "logged out".into(),
            DisconnectCause::DeviceRemoved => "device removed".into(),
            DisconnectCause::BadSession => "invalid credentials".into(),
            DisconnectCause::Forbidden => "forbidden".into(),
            DisconnectCause::MultideviceMismatch => "multi-device mismatch".into(),
            DisconnectCause::ConnectionReplaced => "connection replaced".into(),
            DisconnectCause::RestartRequired => "restart required".into(),
            DisconnectCause::TimedOut => "timed out".into(),
            DisconnectCause::ConnectionLost => "connection lost".into(),
            DisconnectCause::ConnectionClosed => "connection closed".into(),
            DisconnectCause::StreamError => "stream error".into(),
            DisconnectCause::Unknown(code) => format!("unknown disconnect ({code})"),
        }
    }
}

/// Kind of a message batch delivered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Live traffic.
    Notify,
    /// History sync or replay.
    Append,
}

/// A group of messages delivered in one client event.
#[derive(Debug, Clone)]
pub struct MessageBatch {
    pub kind: BatchKind,
    pub messages: Vec<WireMessage>,
}

/// Events emitted by a live protocol handle.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    Connecting,
    /// History synchronization started while opening.
    Syncing,
    Qr { code: String },
    Open { own_jid: Option<String> },
    Close {
        cause: DisconnectCause,
        message: Option<String>,
    },
    /// The shared credential object was mutated and must be persisted.
    CredentialsUpdated,
    Messages(MessageBatch),
}

/// Message key as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: String,
    /// Inline alternate-address hint.
    #[serde(default)]
    pub remote_jid_alt: Option<String>,
    /// Phone-number hint some client versions send instead of `remoteJidAlt`.
    #[serde(default)]
    pub sender_pn: Option<String>,
    #[serde(default)]
    pub participant: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: Option<String>,
}

/// A message exactly as the client delivers it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub key: MessageKey,
    #[serde(default)]
    pub push_name: Option<String>,
    /// Seconds since epoch as a number, a numeric string, or a `{low, high}` pair.
    #[serde(default)]
    pub message_timestamp: Option<serde_json::Value>,
    /// Payload node (`conversation`, `imageMessage`, ...).
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    /// Media reference already resolved upstream, if any.
    #[serde(default)]
    pub media_url: Option<String>,
}

/// Presence signals a handle can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Available,
    Unavailable,
    Composing,
    Recording,
    Paused,
}

/// Content handed to a handle for sending.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingContent {
    Text {
        text: String,
    },
    Image {
        data: Vec<u8>,
        mimetype: String,
        caption: Option<String>,
    },
    Video {
        data: Vec<u8>,
        mimetype: String,
        caption: Option<String>,
    },
    Document {
        data: Vec<u8>,
        mimetype: String,
        file_name: String,
        caption: Option<String>,
    },
}

impl OutgoingContent {
    pub fn message_type(&self) -> MessageType {
        match self {
            OutgoingContent::Text { .. } => MessageType::Text,
            OutgoingContent::Image { .. } => MessageType::Image,
            OutgoingContent::Video { .. } => MessageType::Video,
            OutgoingContent::Document { .. } => MessageType::Document,
        }
    }

    /// Text body or caption stored in history.
    pub fn text(&self) -> &str {
        match self {
            OutgoingContent::Text { text } => text,
            OutgoingContent::Image { caption, .. }
            | OutgoingContent::Video { caption, .. }
            | OutgoingContent::Document { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(self, OutgoingContent::Text { .. })
    }

    /// Media bytes and mime type, for media variants.
    pub fn media(&self) -> Option<(&[u8], &str)> {
        match self {
            OutgoingContent::Text { .. } => None,
            OutgoingContent::Image { data, mimetype, .. }
            | OutgoingContent::Video { data, mimetype, .. }
            | OutgoingContent::Document { data, mimetype, .. } => {
                Some((data.as_slice(), mimetype.as_str()))
            }
        }
    }
}

/// What the client reports back after a successful send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
    /// Seconds since epoch.
    pub timestamp: Option<i64>,
}
