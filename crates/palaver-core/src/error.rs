// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Palaver session gateway.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Palaver adapter traits and core operations.
#[derive(Debug, Error)]
pub enum PalaverError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat-protocol client errors (handle construction, send failure, download failure).
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No device record exists for the session id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No chat summary exists for the session and chat address.
    #[error("chat not found: {chat_jid} in session {session_id}")]
    ChatNotFound { session_id: String, chat_jid: String },

    /// The session has no live protocol handle.
    #[error("session not connected: {0}")]
    SessionNotConnected(String),

    /// An outbound send lost the race against its timeout.
    #[error("send timeout after {duration:?}")]
    SendTimeout { duration: Duration },

    /// AI content generator failure.
    #[error("generator error: {message}")]
    Generator { message: String },

    /// Media download, conversion, or blob upload failure.
    #[error("media error: {message}")]
    Media { message: String },

    /// Campaign directory lookup failure.
    #[error("campaign lookup error: {message}")]
    Campaign { message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PalaverError {
    /// Shorthand for a protocol error without an underlying source.
    pub fn protocol(message: impl Into<String>) -> Self {
        PalaverError::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a storage error wrapping any error value.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PalaverError::Storage {
            source: Box::new(err),
        }
    }

    /// Returns true for the distinct send-timeout condition.
    pub fn is_send_timeout(&self) -> bool {
        matches!(self, PalaverError::SendTimeout { .. })
    }
}

impl From<serde_json::Error> for PalaverError {
    fn from(err: serde_json::Error) -> Self {
        PalaverError::Storage {
            source: Box::new(err),
        }
    }
}
