// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time observer channel.
//!
//! Each session has at most one subscriber. Subscribing again replaces the
//! previous subscriber, whose receiver then reports the channel as closed.
//! Publishing never blocks: a full subscriber misses the event.

use dashmap::DashMap;
use palaver_core::types::{ChatSummary, HistoryEntry, InboundMessage};
use palaver_core::SessionStatus;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 256;

/// Event pushed to a session's observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverEvent {
    Status {
        session_id: String,
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
    },
    Qr {
        session_id: String,
        code: String,
        attempt: u32,
    },
    /// An inbound (or own-device echo) message after ingestion.
    Message {
        session_id: String,
        message: InboundMessage,
    },
    /// An outbound message recorded by the dispatcher.
    MessageSent {
        session_id: String,
        entry: HistoryEntry,
    },
    ChatUpdated {
        session_id: String,
        chat: ChatSummary,
    },
    Handover {
        session_id: String,
        chat_jid: String,
        actor: String,
    },
    ChatDeleted {
        session_id: String,
        chat_jid: String,
    },
}

impl ObserverEvent {
    pub fn session_id(&self) -> &str {
        match self {
            ObserverEvent::Status { session_id, .. }
            | ObserverEvent::Qr { session_id, .. }
            | ObserverEvent::Message { session_id, .. }
            | ObserverEvent::MessageSent { session_id, .. }
            | ObserverEvent::ChatUpdated { session_id, .. }
            | ObserverEvent::Handover { session_id, .. }
            | ObserverEvent::ChatDeleted { session_id, .. } => session_id,
        }
    }
}

pub struct ObserverHub {
    subscribers: DashMap<String, mpsc::Sender<ObserverEvent>>,
    capacity: usize,
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ObserverHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Attach the subscriber for `session_id`, disconnecting any prior one.
    pub fn subscribe(&self, session_id: &str) -> mpsc::Receiver<ObserverEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.subscribers.insert(session_id.to_string(), tx).is_some() {
            debug!(session_id, "observer replaced");
        }
        rx
    }

    pub fn unsubscribe(&self, session_id: &str) {
        self.subscribers.remove(session_id);
    }

    pub fn has_subscriber(&self, session_id: &str) -> bool {
        self.subscribers.contains_key(session_id)
    }

    pub fn publish(&self, event: ObserverEvent) {
        let session_id = event.session_id().to_string();
        // Clone out of the map so no shard lock is held while removing.
        let Some(tx) = self.subscribers.get(&session_id).map(|s| s.clone()) else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(session_id = %session_id, "observer lagging, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.subscribers
                    .remove_if(&session_id, |_, current| current.same_channel(&tx));
                debug!(session_id = %session_id, "observer gone, detached");
            }
        }
    }
}
