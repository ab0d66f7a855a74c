// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message dispatch.
//!
//! Sends race a fixed timeout (text and media have separate limits); losing
//! the race yields [`PalaverError::SendTimeout`] and nothing is persisted.
//! After a successful send the chat summary and history are updated and the
//! result is broadcast. Persistence failures at that point are logged
//! rather than returned: the message is already out, and callers that retry
//! on error would send it twice.

use std::sync::Arc;
use std::time::Duration;

use palaver_config::model::DispatchConfig;
use palaver_core::jid::{normalize_recipient, phone_number_of};
use palaver_core::protocol::{OutgoingContent, SendReceipt};
use palaver_core::types::{
    now_timestamp, timestamp_from_unix, ChatActivity, Direction, HistoryEntry, HistoryWrite,
    NewHistoryEntry,
};
use palaver_core::{PalaverError, ProtocolHandle, StorageAdapter};
use palaver_session::{ObserverEvent, ObserverHub};
use tracing::{debug, info, warn};

use crate::media::{normalize_image, MediaOffloader};
use crate::normalize::preview;

#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub text_timeout: Duration,
    pub media_timeout: Duration,
    pub normalize_images: bool,
}

impl From<&DispatchConfig> for DispatchPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            text_timeout: config.text_timeout(),
            media_timeout: config.media_timeout(),
            normalize_images: config.normalize_images,
        }
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_jid: String,
    pub receipt: SendReceipt,
    /// `None` when the history write failed after the send.
    pub history: Option<HistoryWrite>,
}

pub struct OutboundDispatcher {
    storage: Arc<dyn StorageAdapter>,
    observers: Arc<ObserverHub>,
    offloader: Option<Arc<MediaOffloader>>,
    policy: DispatchPolicy,
}

impl OutboundDispatcher {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        observers: Arc<ObserverHub>,
        offloader: Option<Arc<MediaOffloader>>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            storage,
            observers,
            offloader,
            policy,
        }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    fn prepare(&self, content: OutgoingContent) -> Result<OutgoingContent, PalaverError> {
        match content {
            OutgoingContent::Image {
                data,
                mimetype,
                caption,
            } if self.policy.normalize_images => {
                let normalized = normalize_image(data, &mimetype)?;
                Ok(OutgoingContent::Image {
                    data: normalized.data,
                    mimetype: normalized.mimetype,
                    caption,
                })
            }
            other => Ok(other),
        }
    }

    /// Send `content` to `to` through `handle` and record it.
    pub async fn send(
        &self,
        handle: &dyn ProtocolHandle,
        session_id: &str,
        to: &str,
        content: OutgoingContent,
        is_ai_generated: bool,
    ) -> Result<SentMessage, PalaverError> {
        let chat_jid = normalize_recipient(to)
            .ok_or_else(|| PalaverError::protocol(format!("invalid recipient: {to}")))?;
        let content = self.prepare(content)?;

        let limit = if content.is_media() {
            self.policy.media_timeout
        } else {
            self.policy.text_timeout
        };
        let message_type = content.message_type();
        let text = content.text().to_string();
        let media = content
            .media()
            .map(|(data, mime)| (data.to_vec(), mime.to_string()));

        let receipt = match tokio::time::timeout(limit, handle.send(&chat_jid, content)).await {
            Ok(result) => result?,
            Err(_) => {
                let timeout_ms = limit.as_millis() as u64;
                warn!(session_id, chat = %chat_jid, timeout_ms, "send timed out");
                return Err(PalaverError::SendTimeout { duration: limit });
            }
        };
        info!(
            session_id,
            chat = %chat_jid,
            message_id = receipt.message_id.as_deref().unwrap_or(""),
            "message sent"
        );

        let at = receipt
            .timestamp
            .map(timestamp_from_unix)
            .unwrap_or_else(now_timestamp);

        let (media_url, media_mime) = match (media, &self.offloader) {
            (Some((bytes, mime)), Some(offloader)) => {
                let stem = receipt
                    .message_id
                    .clone()
                    .unwrap_or_else(|| format!("out-{}", at.replace([':', '.'], "-")));
                let url = offloader
                    .store_outbound(session_id, bytes, &stem, Some(&mime))
                    .await;
                (url, Some(mime))
            }
            (Some((_, mime)), None) => (None, Some(mime)),
            (None, _) => (None, None),
        };

        let activity = ChatActivity {
            session_id: session_id.to_string(),
            chat_jid: chat_jid.clone(),
            contact_name: None,
            phone_number: phone_number_of(&chat_jid),
            preview: preview(message_type, &text),
            direction: Direction::Outgoing,
            at: at.clone(),
        };
        match self.storage.upsert_chat_activity(&activity).await {
            Ok(chat) => self.observers.publish(ObserverEvent::ChatUpdated {
                session_id: session_id.to_string(),
                chat,
            }),
            Err(e) => warn!(session_id, chat = %chat_jid, error = %e, "failed to update chat after send"),
        }

        let entry = NewHistoryEntry {
            session_id: session_id.to_string(),
            chat_jid: chat_jid.clone(),
            provider_message_id: receipt.message_id.clone(),
            direction: Direction::Outgoing,
            message_type,
            content: text,
            media_url,
            media_mime,
            from_me: true,
            is_ai_generated,
            timestamp: at,
        };
        let history = match self.storage.record_history(&entry).await {
            Ok(write) => {
                debug!(session_id, chat = %chat_jid, row = write.row_id(), "outbound history recorded");
                self.observers.publish(ObserverEvent::MessageSent {
                    session_id: session_id.to_string(),
                    entry: history_entry(write.row_id(), entry),
                });
                Some(write)
            }
            Err(e) => {
                warn!(session_id, chat = %chat_jid, error = %e, "failed to record outbound history");
                None
            }
        };

        Ok(SentMessage {
            chat_jid,
            receipt,
            history,
        })
    }
}

fn history_entry(id: i64, entry: NewHistoryEntry) -> HistoryEntry {
    HistoryEntry {
        id,
        session_id: entry.session_id,
        chat_jid: entry.chat_jid,
        provider_message_id: entry.provider_message_id,
        direction: entry.direction,
        message_type: entry.message_type,
        content: entry.content,
        media_url: entry.media_url,
        media_mime: entry.media_mime,
        from_me: entry.from_me,
        is_ai_generated: entry.is_ai_generated,
        timestamp: entry.timestamp,
    }
}
