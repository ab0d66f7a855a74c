// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator controls over individual chats.
//!
//! Every successful mutation is broadcast to the session's observer.

use std::sync::Arc;

use palaver_core::types::ChatSummary;
use palaver_core::{PalaverError, StorageAdapter};
use palaver_session::{ObserverEvent, ObserverHub};
use tracing::info;

/// Actor recorded when the reply generator asks for a human.
pub const AI_HANDOVER_ACTOR: &str = "ai-handover";

#[derive(Clone)]
pub struct ChatControls {
    storage: Arc<dyn StorageAdapter>,
    observers: Arc<ObserverHub>,
}

impl ChatControls {
    pub fn new(storage: Arc<dyn StorageAdapter>, observers: Arc<ObserverHub>) -> Self {
        Self { storage, observers }
    }

    /// Stop automated replies in a chat; `actor` now owns it.
    pub async fn take_over(
        &self,
        session_id: &str,
        chat_jid: &str,
        actor: &str,
    ) -> Result<ChatSummary, PalaverError> {
        let found = self
            .storage
            .set_human_takeover(session_id, chat_jid, Some(actor))
            .await?;
        ensure_found(found, session_id, chat_jid)?;
        info!(session_id, chat = chat_jid, actor, "chat taken over");
        self.publish_chat(session_id, chat_jid).await
    }

    /// Hand the chat back to automation.
    pub async fn release(&self, session_id: &str, chat_jid: &str) -> Result<ChatSummary, PalaverError> {
        let found = self
            .storage
            .set_human_takeover(session_id, chat_jid, None)
            .await?;
        ensure_found(found, session_id, chat_jid)?;
        info!(session_id, chat = chat_jid, "chat released");
        self.publish_chat(session_id, chat_jid).await
    }

    /// Assign the chat to `actor` and take it over in one step.
    pub async fn hand_over(
        &self,
        session_id: &str,
        chat_jid: &str,
        actor: &str,
    ) -> Result<ChatSummary, PalaverError> {
        let found = self
            .storage
            .assign_chat(session_id, chat_jid, Some(actor))
            .await?;
        ensure_found(found, session_id, chat_jid)?;
        self.storage
            .set_human_takeover(session_id, chat_jid, Some(actor))
            .await?;
        info!(session_id, chat = chat_jid, actor, "chat handed over");
        self.observers.publish(ObserverEvent::Handover {
            session_id: session_id.to_string(),
            chat_jid: chat_jid.to_string(),
            actor: actor.to_string(),
        });
        self.publish_chat(session_id, chat_jid).await
    }

    /// Take the chat over on the reply generator's request.
    pub async fn request_human(&self, session_id: &str, chat_jid: &str) -> Result<ChatSummary, PalaverError> {
        let found = self
            .storage
            .set_human_takeover(session_id, chat_jid, Some(AI_HANDOVER_ACTOR))
            .await?;
        ensure_found(found, session_id, chat_jid)?;
        info!(session_id, chat = chat_jid, "generator requested a human");
        self.observers.publish(ObserverEvent::Handover {
            session_id: session_id.to_string(),
            chat_jid: chat_jid.to_string(),
            actor: AI_HANDOVER_ACTOR.to_string(),
        });
        self.publish_chat(session_id, chat_jid).await
    }

    pub async fn set_ai_enabled(
        &self,
        session_id: &str,
        chat_jid: &str,
        enabled: bool,
    ) -> Result<ChatSummary, PalaverError> {
        let found = self
            .storage
            .set_chat_ai_enabled(session_id, chat_jid, enabled)
            .await?;
        ensure_found(found, session_id, chat_jid)?;
        self.publish_chat(session_id, chat_jid).await
    }

    /// `None` clears the assignment.
    pub async fn assign(
        &self,
        session_id: &str,
        chat_jid: &str,
        assignee: Option<&str>,
    ) -> Result<ChatSummary, PalaverError> {
        let found = self.storage.assign_chat(session_id, chat_jid, assignee).await?;
        ensure_found(found, session_id, chat_jid)?;
        self.publish_chat(session_id, chat_jid).await
    }

    /// Remove the chat summary and all of its history.
    pub async fn delete_chat(&self, session_id: &str, chat_jid: &str) -> Result<(), PalaverError> {
        let found = self.storage.delete_chat(session_id, chat_jid).await?;
        ensure_found(found, session_id, chat_jid)?;
        info!(session_id, chat = chat_jid, "chat deleted");
        self.observers.publish(ObserverEvent::ChatDeleted {
            session_id: session_id.to_string(),
            chat_jid: chat_jid.to_string(),
        });
        Ok(())
    }

    async fn publish_chat(&self, session_id: &str, chat_jid: &str) -> Result<ChatSummary, PalaverError> {
        let chat = self
            .storage
            .get_chat(session_id, chat_jid)
            .await?
            .ok_or_else(|| not_found(session_id, chat_jid))?;
        self.observers.publish(ObserverEvent::ChatUpdated {
            session_id: session_id.to_string(),
            chat: chat.clone(),
        });
        Ok(chat)
    }
}

fn not_found(session_id: &str, chat_jid: &str) -> PalaverError {
    PalaverError::ChatNotFound {
        session_id: session_id.to_string(),
        chat_jid: chat_jid.to_string(),
    }
}

fn ensure_found(found: bool, session_id: &str, chat_jid: &str) -> Result<(), PalaverError> {
    if found {
        Ok(())
    } else {
        Err(not_found(session_id, chat_jid))
    }
}
