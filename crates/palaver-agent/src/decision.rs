// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-reply eligibility.
//!
//! Human takeover always wins. Campaign membership comes from an external
//! directory; when that lookup fails the device is treated as not enrolled.

use std::sync::Arc;

use palaver_core::types::{ChatSummary, DeviceRecord};
use palaver_core::CampaignDirectory;
use tracing::warn;

/// `!human_takeover && device.ai_enabled && chat.ai_enabled`
pub fn should_use_ai(device_ai_enabled: bool, chat_ai_enabled: bool, human_takeover: bool) -> bool {
    !human_takeover && device_ai_enabled && chat_ai_enabled
}

/// `should_use_ai && !in_active_warming`
pub fn should_auto_reply(should_use_ai: bool, in_active_warming: bool) -> bool {
    should_use_ai && !in_active_warming
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyDecision {
    pub should_use_ai: bool,
    pub in_active_warming: bool,
    /// The campaign lookup failed and was treated as not enrolled.
    pub campaign_lookup_failed: bool,
    pub should_auto_reply: bool,
}

pub struct DecisionEngine {
    campaigns: Arc<dyn CampaignDirectory>,
}

impl DecisionEngine {
    pub fn new(campaigns: Arc<dyn CampaignDirectory>) -> Self {
        Self { campaigns }
    }

    pub async fn evaluate(&self, device: &DeviceRecord, chat: &ChatSummary) -> ReplyDecision {
        let use_ai = should_use_ai(device.ai_enabled, chat.ai_enabled, chat.human_takeover);
        if !use_ai {
            // No lookup needed when AI is off anyway.
            return ReplyDecision {
                should_use_ai: false,
                in_active_warming: false,
                campaign_lookup_failed: false,
                should_auto_reply: false,
            };
        }

        let (in_active_warming, campaign_lookup_failed) =
            match self.campaigns.is_in_active_warming(&device.session_id).await {
                Ok(enrolled) => (enrolled, false),
                Err(e) => {
                    warn!(
                        session_id = %device.session_id,
                        error = %e,
                        "campaign lookup failed, treating device as not enrolled"
                    );
                    (false, true)
                }
            };

        ReplyDecision {
            should_use_ai: use_ai,
            in_active_warming,
            campaign_lookup_failed,
            should_auto_reply: should_auto_reply(use_ai, in_active_warming),
        }
    }
}
