// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock reply generator with queued outcomes.

use std::collections::VecDeque;

use async_trait::async_trait;
use palaver_core::traits::generator::{ReplyOutcome, ReplyRequest};
use palaver_core::{PalaverError, ReplyGenerator};
use tokio::sync::Mutex;

/// Pops queued outcomes in FIFO order; declines once the queue is empty.
#[derive(Default)]
pub struct MockGenerator {
    outcomes: Mutex<VecDeque<Result<ReplyOutcome, String>>>,
    requests: Mutex<Vec<ReplyRequest>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: Vec<ReplyOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn push_outcome(&self, outcome: ReplyOutcome) {
        self.outcomes.lock().await.push_back(Ok(outcome));
    }

    /// Queue a generator failure.
    pub async fn push_error(&self, message: &str) {
        self.outcomes.lock().await.push_back(Err(message.to_string()));
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<ReplyRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn generate(&self, request: ReplyRequest) -> Result<ReplyOutcome, PalaverError> {
        self.requests.lock().await.push(request);
        match self.outcomes.lock().await.pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(PalaverError::Generator { message }),
            None => Ok(ReplyOutcome::decline()),
        }
    }
}
