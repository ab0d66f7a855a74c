// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Warming-campaign membership lookup.

use async_trait::async_trait;

use crate::error::PalaverError;

/// Answers whether a device is enrolled in an active warming campaign.
///
/// Enrolled devices exchange synthetic traffic and are excluded from normal
/// auto-reply.
#[async_trait]
pub trait CampaignDirectory: Send + Sync {
    async fn is_in_active_warming(&self, session_id: &str) -> Result<bool, PalaverError>;
}
