// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock campaign directory.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use palaver_core::{CampaignDirectory, PalaverError};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MockCampaigns {
    enrolled: Mutex<HashSet<String>>,
    failing: AtomicBool,
    lookups: AtomicUsize,
}

impl MockCampaigns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll a device in an active warming campaign.
    pub async fn enroll(&self, session_id: &str) {
        self.enrolled.lock().await.insert(session_id.to_string());
    }

    /// Make every lookup fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CampaignDirectory for MockCampaigns {
    async fn is_in_active_warming(&self, session_id: &str) -> Result<bool, PalaverError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PalaverError::Campaign {
                message: "campaign directory unavailable".into(),
            });
        }
        Ok(self.enrolled.lock().await.contains(session_id))
    }
}
