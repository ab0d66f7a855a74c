// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI content generator contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PalaverError;
use crate::types::HistoryEntry;

/// Input for one generation call.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyRequest {
    pub session_id: String,
    pub chat_jid: String,
    pub contact_name: Option<String>,
    /// The inbound text being answered.
    pub text: String,
    /// Recent history of the chat, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Business configuration attached to the device.
    pub business_context: Option<serde_json::Value>,
}

/// What the generator decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyOutcome {
    pub should_respond: bool,
    #[serde(default)]
    pub content: Option<String>,
    /// Blob reference of media to send alongside the reply.
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub needs_handover: bool,
}

impl ReplyOutcome {
    /// An outcome that declines to answer.
    pub fn decline() -> Self {
        Self::default()
    }

    /// A plain text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            should_respond: true,
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: ReplyRequest) -> Result<ReplyOutcome, PalaverError>;
}
