// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-paced replies: read receipt, typing indicator, delay, send.

use std::sync::Arc;
use std::time::Duration;

use palaver_config::model::ReplyConfig;
use palaver_core::protocol::{MessageKey, OutgoingContent, Presence};
use palaver_core::{PalaverError, ProtocolHandle};
use palaver_session::SessionManager;
use tracing::{debug, warn};

use crate::dispatch::{OutboundDispatcher, SentMessage};

/// Delay model for simulated replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTiming {
    pub base: Duration,
    pub per_char: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl ReplyTiming {
    /// `clamp(base + chars * per_char, min, max)`.
    pub fn delay_for(&self, text: &str) -> Duration {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        let raw = self
            .base
            .saturating_add(self.per_char.saturating_mul(chars));
        // min wins when min > max.
        raw.min(self.max).max(self.min)
    }
}

impl From<&ReplyConfig> for ReplyTiming {
    fn from(config: &ReplyConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            per_char: Duration::from_millis(config.per_char_delay_ms),
            min: Duration::from_millis(config.min_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl Default for ReplyTiming {
    fn default() -> Self {
        Self::from(&ReplyConfig::default())
    }
}

pub struct NaturalReplySimulator {
    dispatcher: Arc<OutboundDispatcher>,
    timing: ReplyTiming,
    mark_read: bool,
    simulate_typing: bool,
    sessions: Option<SessionManager>,
}

impl NaturalReplySimulator {
    pub fn new(dispatcher: Arc<OutboundDispatcher>, config: &ReplyConfig) -> Self {
        Self {
            dispatcher,
            timing: ReplyTiming::from(config),
            mark_read: config.mark_read,
            simulate_typing: config.simulate_typing,
            sessions: None,
        }
    }

    pub fn with_timing(mut self, timing: ReplyTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Re-resolve the live handle after the delay, so a session torn down
    /// while "typing" never sends.
    pub fn with_sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn timing(&self) -> ReplyTiming {
        self.timing
    }

    /// Reply to `chat_jid`, pacing the send like a person would.
    ///
    /// Read and presence failures are logged and ignored. If the paced send
    /// fails for any reason other than a timeout, one direct send is
    /// attempted and its result returned.
    pub async fn reply(
        &self,
        handle: Arc<dyn ProtocolHandle>,
        session_id: &str,
        chat_jid: &str,
        inbound: Option<&MessageKey>,
        content: OutgoingContent,
        is_ai_generated: bool,
    ) -> Result<SentMessage, PalaverError> {
        if self.mark_read {
            if let Some(key) = inbound {
                if let Err(e) = handle.read_messages(std::slice::from_ref(key)).await {
                    warn!(session_id, chat = chat_jid, error = %e, "failed to mark message read");
                }
            }
        }
        if self.simulate_typing {
            self.presence(handle.as_ref(), session_id, chat_jid, Presence::Composing)
                .await;
        }

        let delay = self.timing.delay_for(content.text());
        let delay_ms = delay.as_millis() as u64;
        debug!(session_id, chat = chat_jid, delay_ms, "reply delay");
        tokio::time::sleep(delay).await;

        let handle = match &self.sessions {
            Some(sessions) => sessions.current_handle(session_id)?,
            None => handle,
        };

        if self.simulate_typing {
            self.presence(handle.as_ref(), session_id, chat_jid, Presence::Available)
                .await;
        }

        match self
            .dispatcher
            .send(handle.as_ref(), session_id, chat_jid, content.clone(), is_ai_generated)
            .await
        {
            Ok(sent) => Ok(sent),
            Err(e) if e.is_send_timeout() => Err(e),
            Err(e) => {
                warn!(session_id, chat = chat_jid, error = %e, "paced reply failed, sending directly");
                self.dispatcher
                    .send(handle.as_ref(), session_id, chat_jid, content, is_ai_generated)
                    .await
            }
        }
    }

    async fn presence(
        &self,
        handle: &dyn ProtocolHandle,
        session_id: &str,
        chat_jid: &str,
        presence: Presence,
    ) {
        if let Err(e) = handle.send_presence(presence, Some(chat_jid)).await {
            warn!(session_id, chat = chat_jid, error = %e, "failed to send presence");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchPolicy;
    use palaver_session::ObserverHub;
    use palaver_test_utils::{temp_storage, MockHandle};

    fn timing() -> ReplyTiming {
        ReplyTiming {
            base: Duration::from_millis(5),
            per_char: Duration::from_millis(1),
            min: Duration::from_millis(5),
            max: Duration::from_millis(20),
        }
    }

    async fn simulator(policy: DispatchPolicy) -> (NaturalReplySimulator, tempfile::TempDir) {
        let (storage, dir) = temp_storage().await;
        let dispatcher = Arc::new(OutboundDispatcher::new(
            storage,
            Arc::new(ObserverHub::default()),
            None,
            policy,
        ));
        let sim = NaturalReplySimulator::new(dispatcher, &ReplyConfig::default()).with_timing(timing());
        (sim, dir)
    }

    fn fast_policy() -> DispatchPolicy {
        DispatchPolicy {
            text_timeout: Duration::from_millis(50),
            media_timeout: Duration::from_millis(50),
            normalize_images: false,
        }
    }

    fn key() -> MessageKey {
        MessageKey {
            remote_jid: "555@s.whatsapp.net".into(),
            id: Some("IN-1".into()),
            ..Default::default()
        }
    }

    fn text(t: &str) -> OutgoingContent {
        OutgoingContent::Text { text: t.into() }
    }

    #[test]
    fn delay_is_clamped() {
        let t = ReplyTiming {
            base: Duration::from_millis(1000),
            per_char: Duration::from_millis(50),
            min: Duration::from_millis(1500),
            max: Duration::from_millis(8000),
        };
        assert_eq!(t.delay_for("hi"), Duration::from_millis(1500));
        assert_eq!(t.delay_for(&"x".repeat(40)), Duration::from_millis(3000));
        assert_eq!(t.delay_for(&"x".repeat(1000)), Duration::from_millis(8000));
    }

    #[test]
    fn delay_counts_characters_not_bytes() {
        let t = ReplyTiming {
            base: Duration::ZERO,
            per_char: Duration::from_millis(10),
            min: Duration::ZERO,
            max: Duration::from_secs(10),
        };
        assert_eq!(t.delay_for("héllo"), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn reply_runs_read_typing_then_send() {
        let (sim, _dir) = simulator(fast_policy()).await;
        let handle = Arc::new(MockHandle::new());
        sim.reply(handle.clone(), "s1", "555@s.whatsapp.net", Some(&key()), text("Hi!"), true)
            .await
            .unwrap();
        assert_eq!(
            handle.calls().await,
            vec!["read", "presence:composing", "presence:available", "send"]
        );
        assert_eq!(handle.reads().await[0].id.as_deref(), Some("IN-1"));
    }

    #[tokio::test]
    async fn presence_failures_do_not_block_the_send() {
        let (sim, _dir) = simulator(fast_policy()).await;
        let handle = Arc::new(MockHandle::new());
        handle.fail_presence(true);
        sim.reply(handle.clone(), "s1", "555@s.whatsapp.net", Some(&key()), text("Hi!"), true)
            .await
            .unwrap();
        assert_eq!(handle.sent_count().await, 1);
    }

    #[tokio::test]
    async fn failed_send_falls_back_once() {
        let (sim, _dir) = simulator(fast_policy()).await;
        let handle = Arc::new(MockHandle::new());
        handle.fail_next_sends(1);
        sim.reply(handle.clone(), "s1", "555@s.whatsapp.net", None, text("retry me"), true)
            .await
            .unwrap();
        let calls = handle.calls().await;
        assert_eq!(calls.iter().filter(|c| c.starts_with("send")).count(), 2);
        assert_eq!(handle.sent_count().await, 1);
    }

    #[tokio::test]
    async fn fallback_error_is_propagated() {
        let (sim, _dir) = simulator(fast_policy()).await;
        let handle = Arc::new(MockHandle::new());
        handle.fail_next_sends(2);
        let err = sim
            .reply(handle.clone(), "s1", "555@s.whatsapp.net", None, text("nope"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, PalaverError::Protocol { .. }));
        assert_eq!(handle.sent_count().await, 0);
    }

    #[tokio::test]
    async fn send_timeout_is_not_retried() {
        let (sim, _dir) = simulator(fast_policy()).await;
        let handle = Arc::new(MockHandle::new());
        handle.set_send_delay(Duration::from_millis(300));
        let err = sim
            .reply(handle.clone(), "s1", "555@s.whatsapp.net", None, text("slow"), true)
            .await
            .unwrap_err();
        assert!(err.is_send_timeout());
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(handle.sent_count().await, 0);
        assert!(!handle.calls().await.iter().any(|c| c == "send"));
    }
}
