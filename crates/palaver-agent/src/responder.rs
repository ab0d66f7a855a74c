// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automated replies to live inbound messages.

use std::sync::Arc;

use palaver_config::model::ReplyConfig;
use palaver_core::protocol::OutgoingContent;
use palaver_core::traits::{ReplyOutcome, ReplyRequest};
use palaver_core::{BlobStore, PalaverError, ProtocolHandle, ReplyGenerator, StorageAdapter};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chats::ChatControls;
use crate::decision::DecisionEngine;
use crate::dispatch::OutboundDispatcher;
use crate::ingest::IngestedMessage;
use crate::timing::NaturalReplySimulator;

/// Why no generator call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    /// Auto-replies are switched off process-wide.
    Disabled,
    /// Device or chat has AI off, or a human has taken over.
    AiOff,
    /// The device is enrolled in a warming campaign.
    ActiveWarming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Skipped(SkipCause),
    /// The generator failed; nothing was sent.
    GeneratorFailed,
    Generated {
        /// Number of messages that went out (text and media).
        sent: usize,
        handed_over: bool,
    },
}

pub struct AutoResponder {
    storage: Arc<dyn StorageAdapter>,
    decisions: DecisionEngine,
    generator: Arc<dyn ReplyGenerator>,
    simulator: NaturalReplySimulator,
    dispatcher: Arc<OutboundDispatcher>,
    chats: ChatControls,
    blobs: Option<Arc<dyn BlobStore>>,
    config: ReplyConfig,
}

impl AutoResponder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        decisions: DecisionEngine,
        generator: Arc<dyn ReplyGenerator>,
        simulator: NaturalReplySimulator,
        dispatcher: Arc<OutboundDispatcher>,
        chats: ChatControls,
        blobs: Option<Arc<dyn BlobStore>>,
        config: ReplyConfig,
    ) -> Self {
        Self {
            storage,
            decisions,
            generator,
            simulator,
            dispatcher,
            chats,
            blobs,
            config,
        }
    }

    pub async fn respond(
        &self,
        handle: Arc<dyn ProtocolHandle>,
        inbound: &IngestedMessage,
    ) -> Result<ResponseOutcome, PalaverError> {
        if !self.config.enabled {
            return Ok(ResponseOutcome::Skipped(SkipCause::Disabled));
        }
        let message = &inbound.message;
        let session_id = message.session_id.as_str();
        let chat_jid = message.chat_jid.as_str();

        let device = self
            .storage
            .get_device(session_id)
            .await?
            .ok_or_else(|| PalaverError::SessionNotFound(session_id.to_string()))?;
        let chat = self
            .storage
            .get_chat(session_id, chat_jid)
            .await?
            .ok_or_else(|| PalaverError::ChatNotFound {
                session_id: session_id.to_string(),
                chat_jid: chat_jid.to_string(),
            })?;

        let decision = self.decisions.evaluate(&device, &chat).await;
        if !decision.should_use_ai {
            debug!(session_id, chat = chat_jid, "auto-reply skipped, ai off");
            return Ok(ResponseOutcome::Skipped(SkipCause::AiOff));
        }
        if !decision.should_auto_reply {
            debug!(session_id, chat = chat_jid, "auto-reply skipped, warming campaign");
            return Ok(ResponseOutcome::Skipped(SkipCause::ActiveWarming));
        }

        let history = self
            .storage
            .recent_history(session_id, chat_jid, self.config.history_window)
            .await?;
        let request = ReplyRequest {
            session_id: session_id.to_string(),
            chat_jid: chat_jid.to_string(),
            contact_name: chat.contact_name.clone().or_else(|| message.push_name.clone()),
            text: message.text.clone(),
            history,
            business_context: device.business_context.as_deref().map(parse_context),
        };

        let outcome = match self.generator.generate(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id, chat = chat_jid, error = %e, "reply generation failed");
                return Ok(ResponseOutcome::GeneratorFailed);
            }
        };
        Ok(self.deliver(handle, inbound, outcome).await)
    }

    async fn deliver(
        &self,
        handle: Arc<dyn ProtocolHandle>,
        inbound: &IngestedMessage,
        outcome: ReplyOutcome,
    ) -> ResponseOutcome {
        let session_id = inbound.message.session_id.as_str();
        let chat_jid = inbound.message.chat_jid.as_str();
        let mut sent = 0;

        if outcome.should_respond {
            let text = outcome.content.as_deref().map(str::trim).unwrap_or("");
            if !text.is_empty() {
                let content = OutgoingContent::Text {
                    text: text.to_string(),
                };
                match self
                    .simulator
                    .reply(handle.clone(), session_id, chat_jid, Some(&inbound.key), content, true)
                    .await
                {
                    Ok(_) => sent += 1,
                    Err(e) => warn!(session_id, chat = chat_jid, error = %e, "auto-reply not sent"),
                }
            }
            if let Some(reference) = &outcome.media_ref {
                if self.send_media(handle.as_ref(), session_id, chat_jid, reference).await {
                    sent += 1;
                }
            }
        }

        let mut handed_over = false;
        if outcome.needs_handover {
            match self.chats.request_human(session_id, chat_jid).await {
                Ok(_) => handed_over = true,
                Err(e) => warn!(session_id, chat = chat_jid, error = %e, "handover failed"),
            }
        }

        info!(session_id, chat = chat_jid, sent, handed_over, "auto-reply finished");
        ResponseOutcome::Generated { sent, handed_over }
    }

    async fn send_media(
        &self,
        handle: &dyn ProtocolHandle,
        session_id: &str,
        chat_jid: &str,
        reference: &str,
    ) -> bool {
        let Some(blobs) = &self.blobs else {
            warn!(session_id, media_ref = reference, "no blob store configured, media skipped");
            return false;
        };
        let data = match blobs.fetch(reference).await {
            Ok(data) => data,
            Err(e) => {
                warn!(session_id, media_ref = reference, error = %e, "failed to fetch reply media");
                return false;
            }
        };
        let mimetype = image::guess_format(&data)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| "image/jpeg".to_string());
        let content = OutgoingContent::Image {
            data,
            mimetype,
            caption: None,
        };
        match self.dispatcher.send(handle, session_id, chat_jid, content, true).await {
            Ok(_) => true,
            Err(e) => {
                warn!(session_id, chat = chat_jid, error = %e, "reply media not sent");
                false
            }
        }
    }
}

/// Business context is stored as text; JSON is passed through structured.
fn parse_context(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
