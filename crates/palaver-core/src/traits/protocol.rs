// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-protocol client contract.
//!
//! The transport, encryption, and pairing handshake live in an external client
//! library. Palaver only constructs handles through a
//! [`ProtocolClientFactory`] and consumes their event stream.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::auth::AuthState;
use crate::error::PalaverError;
use crate::protocol::{MessageKey, OutgoingContent, Presence, ProtocolEvent, SendReceipt, WireMessage};

/// A live connection object for one session.
#[async_trait]
pub trait ProtocolHandle: Send + Sync {
    /// Send content to a canonical chat address.
    async fn send(&self, to: &str, content: OutgoingContent) -> Result<SendReceipt, PalaverError>;

    /// Mark messages as read.
    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), PalaverError>;

    /// Emit a presence signal, optionally scoped to one chat.
    async fn send_presence(&self, presence: Presence, to: Option<&str>) -> Result<(), PalaverError>;

    /// Download the media payload of a message.
    async fn download_media(&self, message: &WireMessage) -> Result<Vec<u8>, PalaverError>;

    /// Close the connection without invalidating credentials.
    async fn end(&self) -> Result<(), PalaverError>;

    /// Log the device out, invalidating credentials server-side.
    async fn logout(&self) -> Result<(), PalaverError>;
}

/// A freshly constructed handle with its event stream.
///
/// Dropping `events` detaches every listener of the handle.
pub struct ProtocolConnection {
    pub handle: Arc<dyn ProtocolHandle>,
    pub events: mpsc::Receiver<ProtocolEvent>,
}

/// Builds protocol handles from persisted credentials.
#[async_trait]
pub trait ProtocolClientFactory: Send + Sync {
    async fn connect(
        &self,
        session_id: &str,
        auth: AuthState,
    ) -> Result<ProtocolConnection, PalaverError>;

    /// Drop any client-side cached store for the session.
    fn evict_cache(&self, _session_id: &str) {}
}
