// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message ingestion.
//!
//! Each wire message in a batch is filtered for scope, classified, given a
//! stable chat address, recorded in history (deduplicated by provider id),
//! folded into its chat summary, and broadcast. Image media is offloaded
//! in the background. A failure on one message is logged and the rest of
//! the batch continues.

use std::sync::Arc;

use palaver_core::jid::{self, phone_number_of};
use palaver_core::protocol::{BatchKind, MessageBatch, MessageKey, WireMessage};
use palaver_core::types::{
    now_timestamp, timestamp_from_unix, ChatActivity, ChatSummary, HistoryWrite, InboundMessage,
    MessageType, NewHistoryEntry,
};
use palaver_core::{PalaverError, ProtocolHandle, StorageAdapter};
use palaver_session::{ObserverEvent, ObserverHub};
use tracing::{debug, warn};

use crate::address::AddressResolver;
use crate::media::MediaOffloader;
use crate::normalize::{classify, parse_timestamp, preview};

/// Why a wire message was dropped before reaching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Broadcast,
    Group,
    /// Protocol, reaction, or otherwise contentless payload.
    Unsupported,
}

/// A message that made it through ingestion.
#[derive(Debug, Clone)]
pub struct IngestedMessage {
    pub message: InboundMessage,
    pub key: MessageKey,
    pub write: HistoryWrite,
    /// `None` for redeliveries, which leave the summary untouched.
    pub chat: Option<ChatSummary>,
    /// Live, inbound, and seen for the first time.
    pub reply_eligible: bool,
}

#[derive(Debug)]
pub enum IngestOutcome {
    Ingested(Box<IngestedMessage>),
    Skipped(SkipReason),
}

pub struct IngestionPipeline {
    storage: Arc<dyn StorageAdapter>,
    observers: Arc<ObserverHub>,
    resolver: AddressResolver,
    offloader: Option<Arc<MediaOffloader>>,
}

/// Scope filter applied before any work is done.
pub fn scope_filter(remote_jid: &str) -> Option<SkipReason> {
    if jid::is_broadcast(remote_jid) {
        Some(SkipReason::Broadcast)
    } else if jid::is_group(remote_jid) {
        Some(SkipReason::Group)
    } else {
        None
    }
}

impl IngestionPipeline {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        observers: Arc<ObserverHub>,
        offloader: Option<Arc<MediaOffloader>>,
    ) -> Self {
        Self {
            resolver: AddressResolver::new(storage.clone()),
            storage,
            observers,
            offloader,
        }
    }

    /// Ingest a whole batch. Messages that fail are logged and left out.
    pub async fn ingest_batch(
        &self,
        session_id: &str,
        handle: &Arc<dyn ProtocolHandle>,
        batch: &MessageBatch,
    ) -> Vec<IngestedMessage> {
        let mut ingested = Vec::with_capacity(batch.messages.len());
        for wire in &batch.messages {
            match self.ingest(session_id, handle, batch.kind, wire).await {
                Ok(IngestOutcome::Ingested(message)) => ingested.push(*message),
                Ok(IngestOutcome::Skipped(reason)) => {
                    debug!(session_id, chat = %wire.key.remote_jid, ?reason, "message skipped");
                }
                Err(e) => {
                    warn!(
                        session_id,
                        chat = %wire.key.remote_jid,
                        message_id = wire.key.id.as_deref().unwrap_or(""),
                        error = %e,
                        "failed to ingest message"
                    );
                }
            }
        }
        ingested
    }

    pub async fn ingest(
        &self,
        session_id: &str,
        handle: &Arc<dyn ProtocolHandle>,
        kind: BatchKind,
        wire: &WireMessage,
    ) -> Result<IngestOutcome, PalaverError> {
        if let Some(reason) = scope_filter(&wire.key.remote_jid) {
            return Ok(IngestOutcome::Skipped(reason));
        }
        let Some(classified) = wire.message.as_ref().and_then(classify) else {
            return Ok(IngestOutcome::Skipped(SkipReason::Unsupported));
        };

        let address = self.resolver.resolve(session_id, &wire.key).await;
        let timestamp = parse_timestamp(wire.message_timestamp.as_ref())
            .map(timestamp_from_unix)
            .unwrap_or_else(now_timestamp);
        let from_me = wire.key.from_me;

        let message = InboundMessage {
            session_id: session_id.to_string(),
            provider_message_id: wire.key.id.clone(),
            chat_jid: address.chat_jid,
            raw_chat_jid: address.raw,
            from_me,
            push_name: wire.push_name.clone(),
            message_type: classified.message_type,
            text: classified.text,
            media_mime: classified.mime,
            media_url: wire.media_url.clone(),
            timestamp,
        };

        let write = self
            .storage
            .record_history(&NewHistoryEntry {
                session_id: session_id.to_string(),
                chat_jid: message.chat_jid.clone(),
                provider_message_id: message.provider_message_id.clone(),
                direction: message.direction(),
                message_type: message.message_type,
                content: message.text.clone(),
                media_url: message.media_url.clone(),
                media_mime: message.media_mime.clone(),
                from_me,
                is_ai_generated: false,
                timestamp: message.timestamp.clone(),
            })
            .await?;

        // A row without a summary means an earlier attempt stopped between
        // the two writes; that message was never processed.
        let first_seen = write.is_new()
            || self
                .storage
                .get_chat(session_id, &message.chat_jid)
                .await?
                .is_none();

        let chat = if first_seen {
            let activity = ChatActivity {
                session_id: session_id.to_string(),
                chat_jid: message.chat_jid.clone(),
                // Our own pushName is not the contact's.
                contact_name: if from_me { None } else { message.push_name.clone() },
                phone_number: phone_number_of(&message.chat_jid),
                preview: preview(message.message_type, &message.text),
                direction: message.direction(),
                at: message.timestamp.clone(),
            };
            Some(self.storage.upsert_chat_activity(&activity).await?)
        } else {
            debug!(
                session_id,
                chat = %message.chat_jid,
                message_id = message.provider_message_id.as_deref().unwrap_or(""),
                ?write,
                "redelivered message merged"
            );
            None
        };

        self.maybe_offload(session_id, handle, wire, &message, write).await;

        if first_seen || !matches!(write, HistoryWrite::Unchanged(_)) {
            self.observers.publish(ObserverEvent::Message {
                session_id: session_id.to_string(),
                message: message.clone(),
            });
        }
        if let Some(chat) = &chat {
            self.observers.publish(ObserverEvent::ChatUpdated {
                session_id: session_id.to_string(),
                chat: chat.clone(),
            });
        }

        let reply_eligible = !from_me && kind == BatchKind::Notify && first_seen;
        Ok(IngestOutcome::Ingested(Box::new(IngestedMessage {
            message,
            key: wire.key.clone(),
            write,
            chat,
            reply_eligible,
        })))
    }

    async fn maybe_offload(
        &self,
        session_id: &str,
        handle: &Arc<dyn ProtocolHandle>,
        wire: &WireMessage,
        message: &InboundMessage,
        write: HistoryWrite,
    ) {
        let Some(offloader) = &self.offloader else {
            return;
        };
        if !offloader.offload_images()
            || message.message_type != MessageType::Image
            || message.media_url.is_some()
        {
            return;
        }
        let Some(provider_id) = message.provider_message_id.clone() else {
            return;
        };
        if !write.is_new() {
            match self.storage.find_history(session_id, &provider_id).await {
                Ok(Some(row)) if row.media_url.is_some() => return,
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id, message_id = %provider_id, error = %e, "history lookup failed");
                    return;
                }
            }
        }
        offloader.spawn_inbound(
            session_id.to_string(),
            handle.clone(),
            wire.clone(),
            provider_id,
            message.media_mime.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_config::model::MediaConfig;
    use palaver_test_utils::{temp_storage, wait_until, MemoryBlobStore, MockHandle};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        pipeline: IngestionPipeline,
        storage: Arc<dyn StorageAdapter>,
        hub: Arc<ObserverHub>,
        blobs: Arc<MemoryBlobStore>,
        mock: Arc<MockHandle>,
        handle: Arc<dyn ProtocolHandle>,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let (storage, dir) = temp_storage().await;
        let hub = Arc::new(ObserverHub::default());
        let blobs = Arc::new(MemoryBlobStore::new());
        let offloader = Arc::new(MediaOffloader::new(
            storage.clone(),
            blobs.clone(),
            MediaConfig::default(),
        ));
        let mock = Arc::new(MockHandle::new());
        let handle: Arc<dyn ProtocolHandle> = mock.clone();
        Fixture {
            pipeline: IngestionPipeline::new(storage.clone(), hub.clone(), Some(offloader)),
            storage,
            hub,
            blobs,
            mock,
            handle,
            _dir: dir,
        }
    }

    fn wire(value: serde_json::Value) -> WireMessage {
        serde_json::from_value(value).unwrap()
    }

    fn hello(id: &str) -> WireMessage {
        wire(json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "fromMe": false, "id": id},
            "pushName": "Ana",
            "messageTimestamp": 1700000000,
            "message": {"conversation": "Hello"}
        }))
    }

    fn batch(kind: BatchKind, messages: Vec<WireMessage>) -> MessageBatch {
        MessageBatch { kind, messages }
    }

    #[test]
    fn scope_filter_drops_groups_and_broadcasts() {
        assert_eq!(scope_filter("status@broadcast"), Some(SkipReason::Broadcast));
        assert_eq!(scope_filter("123@broadcast"), Some(SkipReason::Broadcast));
        assert_eq!(scope_filter("123-456@g.us"), Some(SkipReason::Group));
        assert_eq!(scope_filter("555@s.whatsapp.net"), None);
        assert_eq!(scope_filter("999@lid"), None);
    }

    #[tokio::test]
    async fn live_text_message_is_recorded_and_broadcast() {
        let f = fixture().await;
        let mut rx = f.hub.subscribe("s1");
        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![hello("M1")]))
            .await;
        assert_eq!(out.len(), 1);
        let msg = &out[0];
        assert!(msg.reply_eligible);
        assert_eq!(msg.message.chat_jid, "555@s.whatsapp.net");
        assert_eq!(msg.message.text, "Hello");
        assert_eq!(msg.message.timestamp, "2023-11-14T22:13:20.000Z");

        let chat = f.storage.get_chat("s1", "555@s.whatsapp.net").await.unwrap().unwrap();
        assert!(chat.ai_enabled);
        assert_eq!(chat.contact_name.as_deref(), Some("Ana"));
        assert_eq!(chat.phone_number.as_deref(), Some("555"));
        assert_eq!(chat.unread_count, 1);

        assert!(matches!(rx.try_recv().unwrap(), ObserverEvent::Message { .. }));
        assert!(matches!(rx.try_recv().unwrap(), ObserverEvent::ChatUpdated { .. }));
    }

    #[tokio::test]
    async fn redelivery_is_deduplicated() {
        let f = fixture().await;
        let b = batch(BatchKind::Notify, vec![hello("M1")]);
        f.pipeline.ingest_batch("s1", &f.handle, &b).await;
        let again = f.pipeline.ingest_batch("s1", &f.handle, &b).await;
        assert_eq!(again.len(), 1);
        assert!(!again[0].reply_eligible);
        assert!(again[0].chat.is_none());

        let history = f.storage.recent_history("s1", "555@s.whatsapp.net", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        let chat = f.storage.get_chat("s1", "555@s.whatsapp.net").await.unwrap().unwrap();
        assert_eq!(chat.unread_count, 1);
    }

    #[tokio::test]
    async fn redelivery_after_an_interrupted_ingest_creates_the_summary() {
        let f = fixture().await;
        // The first attempt stored the row, then failed before the summary.
        f.storage
            .record_history(&NewHistoryEntry {
                session_id: "s1".into(),
                chat_jid: "555@s.whatsapp.net".into(),
                provider_message_id: Some("M1".into()),
                direction: palaver_core::types::Direction::Incoming,
                message_type: MessageType::Text,
                content: "Hello".into(),
                media_url: None,
                media_mime: None,
                from_me: false,
                is_ai_generated: false,
                timestamp: timestamp_from_unix(1_700_000_000),
            })
            .await
            .unwrap();
        let mut rx = f.hub.subscribe("s1");

        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![hello("M1")]))
            .await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].write, HistoryWrite::Unchanged(_)));
        assert!(out[0].reply_eligible);
        let chat = out[0].chat.as_ref().unwrap();
        assert_eq!(chat.unread_count, 1);
        assert_eq!(chat.contact_name.as_deref(), Some("Ana"));
        assert!(rx.try_recv().is_ok_and(|e| matches!(e, ObserverEvent::Message { .. })));

        // From here on it is an ordinary redelivery.
        let again = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![hello("M1")]))
            .await;
        assert!(!again[0].reply_eligible);
        assert!(again[0].chat.is_none());
        let history = f.storage.recent_history("s1", "555@s.whatsapp.net", 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn late_media_reference_enriches_the_existing_row() {
        let f = fixture().await;
        let first = wire(json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "id": "IMG9"},
            "message": {"imageMessage": {"caption": "invoice", "mimetype": "image/jpeg"}}
        }));
        let mut second = first.clone();
        second.media_url = Some("https://cdn.example/IMG9.jpg".into());
        if let Some(node) = second.message.as_mut() {
            node["imageMessage"]["caption"] = json!("a different caption");
        }

        f.pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![first]))
            .await;
        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![second]))
            .await;
        assert!(matches!(out[0].write, HistoryWrite::Enriched(_)));
        assert!(!out[0].reply_eligible);

        let history = f.storage.recent_history("s1", "555@s.whatsapp.net", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "invoice");
        assert_eq!(history[0].media_url.as_deref(), Some("https://cdn.example/IMG9.jpg"));
    }

    #[tokio::test]
    async fn history_sync_and_own_messages_are_not_reply_eligible() {
        let f = fixture().await;
        let mut own = hello("M2");
        own.key.from_me = true;
        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![own]))
            .await;
        assert!(!out[0].reply_eligible);
        let chat = f.storage.get_chat("s1", "555@s.whatsapp.net").await.unwrap().unwrap();
        assert!(chat.contact_name.is_none());

        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Append, vec![hello("M3")]))
            .await;
        assert!(!out[0].reply_eligible);
    }

    #[tokio::test]
    async fn out_of_scope_and_empty_payloads_are_skipped() {
        let f = fixture().await;
        let group = wire(json!({
            "key": {"remoteJid": "123-456@g.us", "id": "G1"},
            "message": {"conversation": "hi all"}
        }));
        let status = wire(json!({
            "key": {"remoteJid": "status@broadcast", "id": "S1"},
            "message": {"conversation": "story"}
        }));
        let reaction = wire(json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "id": "R1"},
            "message": {"reactionMessage": {"text": "+1"}}
        }));
        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![group, status, reaction]))
            .await;
        assert!(out.is_empty());
        assert!(f.storage.list_chats("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn alternate_address_uses_inline_hint() {
        let f = fixture().await;
        let msg = wire(json!({
            "key": {"remoteJid": "98765@lid", "remoteJidAlt": "555@s.whatsapp.net", "id": "L1"},
            "message": {"conversation": "hey"}
        }));
        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![msg]))
            .await;
        assert_eq!(out[0].message.chat_jid, "555@s.whatsapp.net");
        assert_eq!(out[0].message.raw_chat_jid.as_deref(), Some("98765@lid"));
        assert_eq!(
            f.storage.find_address_mapping("s1", "98765@lid").await.unwrap().as_deref(),
            Some("555@s.whatsapp.net")
        );
    }

    #[tokio::test]
    async fn image_media_is_offloaded_in_background() {
        let f = fixture().await;
        f.mock.set_media("IMG1", vec![0xFF, 0xD8, 0xFF, 0xE0]).await;
        let msg = wire(json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "id": "IMG1"},
            "message": {"imageMessage": {"caption": "receipt", "mimetype": "image/jpeg"}}
        }));
        f.pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![msg]))
            .await;

        let storage = f.storage.clone();
        let attached = wait_until(Duration::from_secs(2), move || {
            let storage = storage.clone();
            async move {
                storage
                    .find_history("s1", "IMG1")
                    .await
                    .ok()
                    .flatten()
                    .and_then(|row| row.media_url)
                    .is_some()
            }
        })
        .await;
        assert!(attached);
        assert_eq!(f.blobs.references().await, vec!["memory://media/s1/IMG1.jpg"]);
        let row = f.storage.find_history("s1", "IMG1").await.unwrap().unwrap();
        assert_eq!(row.content, "receipt");
        assert_eq!(row.media_mime.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn failed_offload_leaves_the_message_in_place() {
        let f = fixture().await;
        let msg = wire(json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "id": "IMG2"},
            "message": {"imageMessage": {"mimetype": "image/jpeg"}}
        }));
        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![msg]))
            .await;
        assert_eq!(out.len(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let row = f.storage.find_history("s1", "IMG2").await.unwrap().unwrap();
        assert!(row.media_url.is_none());
        assert!(f.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn oversized_declared_media_is_never_downloaded() {
        let f = fixture().await;
        f.mock.set_media("IMG3", vec![0xFF, 0xD8, 0xFF, 0xE0]).await;
        let msg = wire(json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "id": "IMG3"},
            "message": {"imageMessage": {"mimetype": "image/jpeg", "fileLength": "1073741824"}}
        }));
        let out = f
            .pipeline
            .ingest_batch("s1", &f.handle, &batch(BatchKind::Notify, vec![msg]))
            .await;
        assert_eq!(out.len(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!f.mock.calls().await.iter().any(|c| c == "download"));
        let row = f.storage.find_history("s1", "IMG3").await.unwrap().unwrap();
        assert!(row.media_url.is_none());
        assert!(f.blobs.is_empty().await);
    }
}
