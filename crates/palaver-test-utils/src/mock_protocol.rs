// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat-protocol client.
//!
//! [`MockProtocolFactory`] hands out [`MockHandle`]s and keeps the sending
//! side of every handle's event channel so tests can inject lifecycle and
//! message events. Handles capture everything sent through them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use palaver_core::protocol::{
    MessageKey, OutgoingContent, Presence, ProtocolEvent, SendReceipt, WireMessage,
};
use palaver_core::{AuthState, PalaverError, ProtocolClientFactory, ProtocolConnection, ProtocolHandle};
use tokio::sync::{mpsc, Mutex};

/// A mock protocol handle recording every call.
#[derive(Default)]
pub struct MockHandle {
    sent: Mutex<Vec<(String, OutgoingContent)>>,
    reads: Mutex<Vec<MessageKey>>,
    calls: Mutex<Vec<String>>,
    media: Mutex<HashMap<String, Vec<u8>>>,
    ended: AtomicBool,
    logged_out: AtomicBool,
    send_delay_ms: AtomicU64,
    failing_sends: AtomicUsize,
    failing_presence: AtomicBool,
    next_id: AtomicU64,
}

impl MockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every send by `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        self.send_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail the next `count` sends.
    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Make read receipts and presence updates fail.
    pub fn fail_presence(&self, failing: bool) {
        self.failing_presence.store(failing, Ordering::SeqCst);
    }

    /// Serve `bytes` for downloads of the message with `message_id`.
    pub async fn set_media(&self, message_id: &str, bytes: Vec<u8>) {
        self.media.lock().await.insert(message_id.to_string(), bytes);
    }

    pub async fn sent(&self) -> Vec<(String, OutgoingContent)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn reads(&self) -> Vec<MessageKey> {
        self.reads.lock().await.clone()
    }

    /// Call log in order, e.g. `["read", "presence:composing", "send"]`.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    async fn record(&self, call: impl Into<String>) {
        self.calls.lock().await.push(call.into());
    }
}

fn presence_name(presence: Presence) -> &'static str {
    match presence {
        Presence::Available => "available",
        Presence::Unavailable => "unavailable",
        Presence::Composing => "composing",
        Presence::Recording => "recording",
        Presence::Paused => "paused",
    }
}

#[async_trait]
impl ProtocolHandle for MockHandle {
    async fn send(&self, to: &str, content: OutgoingContent) -> Result<SendReceipt, PalaverError> {
        let delay = self.send_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.record("send:failed").await;
            return Err(PalaverError::protocol("mock send failure"));
        }
        self.record("send").await;
        self.sent.lock().await.push((to.to_string(), content));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SendReceipt {
            message_id: Some(format!("MOCK-{n}")),
            timestamp: None,
        })
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), PalaverError> {
        if self.failing_presence.load(Ordering::SeqCst) {
            self.record("read:failed").await;
            return Err(PalaverError::protocol("mock read failure"));
        }
        self.record("read").await;
        self.reads.lock().await.extend_from_slice(keys);
        Ok(())
    }

    async fn send_presence(&self, presence: Presence, _to: Option<&str>) -> Result<(), PalaverError> {
        let name = presence_name(presence);
        if self.failing_presence.load(Ordering::SeqCst) {
            self.record(format!("presence:{name}:failed")).await;
            return Err(PalaverError::protocol("mock presence failure"));
        }
        self.record(format!("presence:{name}")).await;
        Ok(())
    }

    async fn download_media(&self, message: &WireMessage) -> Result<Vec<u8>, PalaverError> {
        let id = message.key.id.clone().unwrap_or_default();
        self.record("download").await;
        self.media
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PalaverError::protocol(format!("no media for {id}")))
    }

    async fn end(&self) -> Result<(), PalaverError> {
        self.ended.store(true, Ordering::SeqCst);
        self.record("end").await;
        Ok(())
    }

    async fn logout(&self) -> Result<(), PalaverError> {
        self.logged_out.store(true, Ordering::SeqCst);
        self.record("logout").await;
        Ok(())
    }
}

/// One handle built by the factory, plus the means to drive it.
#[derive(Clone)]
pub struct MockConnection {
    pub session_id: String,
    pub handle: Arc<MockHandle>,
    pub auth: AuthState,
    events: mpsc::Sender<ProtocolEvent>,
}

impl MockConnection {
    /// Inject an event. Returns false once the consumer is gone.
    pub async fn emit(&self, event: ProtocolEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

#[derive(Default)]
pub struct MockProtocolFactory {
    connections: Mutex<Vec<MockConnection>>,
    evictions: std::sync::Mutex<Vec<String>>,
    failing_connects: AtomicUsize,
    connect_delay_ms: AtomicU64,
    peak_live: std::sync::Mutex<HashMap<String, usize>>,
}

impl MockProtocolFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connect calls.
    pub fn fail_next_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Delay every connect by `delay`, leaving room for concurrent callers.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Most handles of the session that were live at the same time.
    pub fn peak_live_handles(&self, session_id: &str) -> usize {
        self.peak_live
            .lock()
            .map(|peaks| peaks.get(session_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub async fn connections(&self, session_id: &str) -> Vec<MockConnection> {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn connect_count(&self, session_id: &str) -> usize {
        self.connections(session_id).await.len()
    }

    pub async fn last_connection(&self, session_id: &str) -> Option<MockConnection> {
        self.connections(session_id).await.pop()
    }

    /// Handles of the session that have not been ended.
    pub async fn live_handles(&self, session_id: &str) -> usize {
        self.connections(session_id)
            .await
            .iter()
            .filter(|c| !c.handle.is_ended())
            .count()
    }

    pub fn evictions(&self, session_id: &str) -> usize {
        self.evictions
            .lock()
            .map(|list| list.iter().filter(|id| *id == session_id).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProtocolClientFactory for MockProtocolFactory {
    async fn connect(
        &self,
        session_id: &str,
        auth: AuthState,
    ) -> Result<ProtocolConnection, PalaverError> {
        let failing = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PalaverError::protocol("mock connect failure"));
        }
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let (tx, rx) = mpsc::channel(64);
        let handle = Arc::new(MockHandle::new());
        let mut connections = self.connections.lock().await;
        connections.push(MockConnection {
            session_id: session_id.to_string(),
            handle: handle.clone(),
            auth,
            events: tx,
        });
        let live = connections
            .iter()
            .filter(|c| c.session_id == session_id && !c.handle.is_ended())
            .count();
        drop(connections);
        if let Ok(mut peaks) = self.peak_live.lock() {
            let peak = peaks.entry(session_id.to_string()).or_insert(0);
            *peak = (*peak).max(live);
        }
        Ok(ProtocolConnection { handle, events: rx })
    }

    fn evict_cache(&self, session_id: &str) {
        if let Ok(mut list) = self.evictions.lock() {
            list.push(session_id.to_string());
        }
    }
}
