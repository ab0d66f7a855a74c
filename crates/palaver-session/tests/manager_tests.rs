// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session manager lifecycle tests against temp SQLite and the mock client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use palaver_core::auth::{CREDS_CATEGORY, CREDS_KEY};
use palaver_core::protocol::{BatchKind, DisconnectCause, MessageBatch, ProtocolEvent, WireMessage};
use palaver_core::types::StatusUpdate;
use palaver_core::{ProtocolHandle, SessionStatus, StorageAdapter};
use palaver_session::machine::{MAX_RECONNECTS_MESSAGE, QR_TIMEOUT_MESSAGE};
use palaver_session::{
    ConnectionPolicy, ManagerSettings, MessageEventHandler, ObserverEvent, ObserverHub,
    SessionManager,
};
use palaver_test_utils::{seed_device, temp_storage, wait_until, MockProtocolFactory};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};

const WAIT: Duration = Duration::from_secs(3);

fn fast_settings() -> ManagerSettings {
    ManagerSettings {
        policy: ConnectionPolicy {
            max_qr_attempts: 3,
            max_reconnect_attempts: 10,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(40),
            restart_delay: Duration::from_millis(10),
        },
        settle_delay: Duration::from_millis(5),
        lock_release_delay: Duration::from_millis(5),
    }
}

struct Fixture {
    manager: SessionManager,
    factory: Arc<MockProtocolFactory>,
    storage: Arc<dyn StorageAdapter>,
    _dir: TempDir,
}

async fn fixture_with(settings: ManagerSettings) -> Fixture {
    let (storage, dir) = temp_storage().await;
    let factory = Arc::new(MockProtocolFactory::new());
    let manager = SessionManager::new(
        storage.clone(),
        factory.clone(),
        Arc::new(ObserverHub::default()),
        settings,
    );
    Fixture {
        manager,
        factory,
        storage,
        _dir: dir,
    }
}

async fn fixture() -> Fixture {
    fixture_with(fast_settings()).await
}

/// Wait until `status` is persisted; effects of the transition have run by then.
async fn wait_for_status(f: &Fixture, session_id: &str, status: SessionStatus) -> bool {
    wait_until(WAIT, move || async move {
        let persisted = f
            .storage
            .get_device(session_id)
            .await
            .ok()
            .flatten()
            .map(|d| d.status);
        persisted == Some(status) && f.manager.status(session_id) == Some(status)
    })
    .await
}

async fn wait_for_connects(f: &Fixture, session_id: &str, count: usize) -> bool {
    wait_until(WAIT, move || async move {
        f.factory.connect_count(session_id).await >= count
    })
    .await
}

fn drain(rx: &mut mpsc::Receiver<ObserverEvent>) -> Vec<ObserverEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn pairing_then_open_connects_and_records_number() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    let mut rx = f.manager.subscribe("s1");

    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();
    conn.emit(ProtocolEvent::Qr { code: "qr-1".into() }).await;
    conn.emit(ProtocolEvent::Open {
        own_jid: Some("15551234567:4@s.whatsapp.net".into()),
    })
    .await;

    assert!(wait_for_status(&f, "s1", SessionStatus::Connected).await);
    let device = f.storage.get_device("s1").await.unwrap().unwrap();
    assert_eq!(device.status, SessionStatus::Connected);
    assert_eq!(device.phone_number.as_deref(), Some("15551234567"));
    assert!(device.last_connected_at.is_some());
    assert!(device.last_error.is_none());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ObserverEvent::Qr { code, attempt: 1, .. } if code == "qr-1"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ObserverEvent::Status { status: SessionStatus::Connected, .. }
    )));
}

#[tokio::test]
async fn three_qr_events_end_in_terminal_error() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    let mut rx = f.manager.subscribe("s1");
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();

    conn.auth.creds.replace(json!({"noiseKey": "abc"})).await;
    conn.emit(ProtocolEvent::CredentialsUpdated).await;
    for code in ["q1", "q2", "q3"] {
        conn.emit(ProtocolEvent::Qr { code: code.into() }).await;
    }

    assert!(wait_for_status(&f, "s1", SessionStatus::Error).await);
    let device = f.storage.get_device("s1").await.unwrap().unwrap();
    assert_eq!(device.last_error.as_deref(), Some(QR_TIMEOUT_MESSAGE));
    assert!(conn.handle.is_ended());

    let creds = f
        .storage
        .auth_get("s1", CREDS_CATEGORY, &[CREDS_KEY.to_string()])
        .await
        .unwrap();
    assert!(creds.is_empty(), "credentials are wiped");

    // Nothing happens until a manual restart.
    conn.emit(ProtocolEvent::Qr { code: "q4".into() }).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.manager.status("s1"), Some(SessionStatus::Error));
    assert_eq!(f.factory.connect_count("s1").await, 1);

    let qr_count = drain(&mut rx)
        .iter()
        .filter(|e| matches!(e, ObserverEvent::Qr { .. }))
        .count();
    assert_eq!(qr_count, 2, "the terminal QR is not published");

    assert!(f.manager.start_session("s1").await.is_err());
    f.manager.restart_session("s1").await.unwrap();
    assert_eq!(f.factory.connect_count("s1").await, 2);
    assert_eq!(f.manager.snapshot("s1").unwrap().counters.qr_attempts, 0);
}

#[tokio::test]
async fn restart_required_reconnects_without_counting() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    let mut rx = f.manager.subscribe("s1");
    f.manager.start_session("s1").await.unwrap();
    let first = f.factory.last_connection("s1").await.unwrap();
    first.emit(ProtocolEvent::Open { own_jid: None }).await;
    assert!(wait_for_status(&f, "s1", SessionStatus::Connected).await);

    first
        .emit(ProtocolEvent::Close {
            cause: DisconnectCause::RestartRequired,
            message: None,
        })
        .await;
    assert!(wait_for_connects(&f, "s1", 2).await);

    let second = f.factory.last_connection("s1").await.unwrap();
    assert!(first.handle.is_ended());
    assert_eq!(f.factory.live_handles("s1").await, 1);
    assert!(f.factory.evictions("s1") >= 1);

    second.emit(ProtocolEvent::Open { own_jid: None }).await;
    assert!(wait_for_status(&f, "s1", SessionStatus::Connected).await);
    assert_eq!(f.manager.snapshot("s1").unwrap().counters.reconnect_attempts, 0);

    let reconnecting = drain(&mut rx).into_iter().find_map(|e| match e {
        ObserverEvent::Status {
            status: SessionStatus::Reconnecting,
            attempt,
            delay_ms,
            ..
        } => Some((attempt, delay_ms)),
        _ => None,
    });
    assert_eq!(reconnecting, Some((Some(0), Some(10))));
}

#[tokio::test]
async fn failed_reconnects_escalate_to_error() {
    let mut settings = fast_settings();
    settings.policy.max_reconnect_attempts = 2;
    let f = fixture_with(settings).await;
    seed_device(&f.storage, "s1").await;
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();
    conn.emit(ProtocolEvent::Open { own_jid: None }).await;
    assert!(wait_for_status(&f, "s1", SessionStatus::Connected).await);

    f.factory.fail_next_connects(10);
    conn.emit(ProtocolEvent::Close {
        cause: DisconnectCause::ConnectionLost,
        message: None,
    })
    .await;

    assert!(wait_for_status(&f, "s1", SessionStatus::Error).await);
    let device = f.storage.get_device("s1").await.unwrap().unwrap();
    assert_eq!(device.last_error.as_deref(), Some(MAX_RECONNECTS_MESSAGE));
    assert_eq!(f.factory.live_handles("s1").await, 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.manager.status("s1"), Some(SessionStatus::Error));
    assert!(!f.manager.snapshot("s1").unwrap().reconnecting);
}

#[tokio::test]
async fn stop_session_disconnects_for_good() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();
    conn.emit(ProtocolEvent::Open { own_jid: None }).await;
    assert!(wait_for_status(&f, "s1", SessionStatus::Connected).await);

    f.manager.stop_session("s1").await.unwrap();
    assert_eq!(f.manager.status("s1"), Some(SessionStatus::Disconnected));
    assert!(conn.handle.is_ended());
    assert!(!conn.handle.is_logged_out());

    conn.emit(ProtocolEvent::Close {
        cause: DisconnectCause::ConnectionLost,
        message: None,
    })
    .await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(f.factory.connect_count("s1").await, 1);
    let device = f.storage.get_device("s1").await.unwrap().unwrap();
    assert_eq!(device.status, SessionStatus::Disconnected);
    assert!(f.manager.current_handle("s1").is_err());
}

#[tokio::test]
async fn concurrent_starts_build_exactly_one_handle() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.factory.set_connect_delay(Duration::from_millis(30));

    let (a, b) = tokio::join!(f.manager.start_session("s1"), f.manager.start_session("s1"));
    a.unwrap();
    b.unwrap();

    assert_eq!(f.factory.connect_count("s1").await, 1);
    assert_eq!(f.factory.peak_live_handles("s1"), 1);
    assert_eq!(f.factory.live_handles("s1").await, 1);
    assert!(f.manager.current_handle("s1").is_ok());
    assert!(!f.manager.snapshot("s1").unwrap().opening);
}

#[tokio::test]
async fn restart_racing_start_builds_exactly_one_handle() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.factory.set_connect_delay(Duration::from_millis(30));

    let (a, b) = tokio::join!(f.manager.start_session("s1"), f.manager.restart_session("s1"));
    a.unwrap();
    b.unwrap();

    let manager = &f.manager;
    assert!(wait_until(WAIT, move || async move { manager.current_handle("s1").is_ok() }).await);
    assert_eq!(f.factory.connect_count("s1").await, 1);
    assert_eq!(f.factory.peak_live_handles("s1"), 1);

    // A later restart replaces the handle without overlapping it.
    f.manager.restart_session("s1").await.unwrap();
    assert_eq!(f.factory.connect_count("s1").await, 2);
    assert_eq!(f.factory.peak_live_handles("s1"), 1);
    assert_eq!(f.factory.live_handles("s1").await, 1);
}

#[tokio::test]
async fn stop_during_open_discards_the_new_handle() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.factory.set_connect_delay(Duration::from_millis(80));

    let manager = f.manager.clone();
    let start = tokio::spawn(async move { manager.start_session("s1").await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    f.manager.stop_session("s1").await.unwrap();
    start.await.unwrap().unwrap();

    let conn = f.factory.last_connection("s1").await.unwrap();
    assert!(conn.handle.is_ended());
    assert!(f.manager.current_handle("s1").is_err());
    assert!(wait_for_status(&f, "s1", SessionStatus::Disconnected).await);
}

#[tokio::test]
async fn stop_session_works_before_the_first_start() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;

    f.manager.stop_session("s1").await.unwrap();
    assert!(wait_for_status(&f, "s1", SessionStatus::Disconnected).await);
    assert_eq!(f.factory.connect_count("s1").await, 0);

    let err = f.manager.stop_session("missing").await.unwrap_err();
    assert!(matches!(err, palaver_core::PalaverError::SessionNotFound(_)));
}

#[tokio::test]
async fn logged_out_close_wipes_and_stays_down() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();
    conn.auth.creds.replace(json!({"me": {"id": "1@s.whatsapp.net"}})).await;
    conn.emit(ProtocolEvent::CredentialsUpdated).await;
    conn.emit(ProtocolEvent::Open { own_jid: None }).await;
    conn.emit(ProtocolEvent::Close {
        cause: DisconnectCause::from_status_code(401),
        message: None,
    })
    .await;

    assert!(wait_for_status(&f, "s1", SessionStatus::LoggedOut).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.factory.connect_count("s1").await, 1);
    let creds = f
        .storage
        .auth_get("s1", CREDS_CATEGORY, &[CREDS_KEY.to_string()])
        .await
        .unwrap();
    assert!(creds.is_empty());
}

#[tokio::test]
async fn replaced_connection_becomes_conflict() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();
    conn.emit(ProtocolEvent::Open { own_jid: None }).await;
    conn.emit(ProtocolEvent::Close {
        cause: DisconnectCause::ConnectionReplaced,
        message: None,
    })
    .await;

    assert!(wait_for_status(&f, "s1", SessionStatus::Conflict).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.factory.connect_count("s1").await, 1);
}

#[tokio::test]
async fn credential_updates_persist_the_shared_object() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();

    conn.auth
        .creds
        .update(|v| v["registered"] = json!(true))
        .await;
    conn.emit(ProtocolEvent::CredentialsUpdated).await;

    let storage = f.storage.clone();
    let saved = wait_until(WAIT, || {
        let storage = storage.clone();
        async move {
            storage
                .auth_get("s1", CREDS_CATEGORY, &[CREDS_KEY.to_string()])
                .await
                .ok()
                .and_then(|m| m.get(CREDS_KEY).cloned())
                .is_some_and(|raw| raw.contains("\"registered\":true"))
        }
    })
    .await;
    assert!(saved);

    // A later handle starts from the persisted object.
    f.manager.restart_session("s1").await.unwrap();
    let next = f.factory.last_connection("s1").await.unwrap();
    assert_eq!(next.auth.creds.snapshot().await["registered"], true);
}

#[tokio::test]
async fn resume_all_starts_only_live_sessions() {
    let f = fixture().await;
    for (id, status) in [
        ("live", SessionStatus::Connected),
        ("retrying", SessionStatus::Reconnecting),
        ("fresh", SessionStatus::Pending),
        ("gone", SessionStatus::LoggedOut),
        ("stopped", SessionStatus::Disconnected),
    ] {
        seed_device(&f.storage, id).await;
        f.storage
            .update_device_status(id, &StatusUpdate::new(status))
            .await
            .unwrap();
    }

    assert_eq!(f.manager.resume_all().await.unwrap(), 2);
    assert_eq!(f.factory.connect_count("live").await, 1);
    assert_eq!(f.factory.connect_count("retrying").await, 1);
    assert_eq!(f.factory.connect_count("fresh").await, 0);
    assert_eq!(f.factory.connect_count("gone").await, 0);
}

#[tokio::test]
async fn archived_and_deleted_sessions_refuse_to_start() {
    let f = fixture().await;
    seed_device(&f.storage, "a").await;
    seed_device(&f.storage, "d").await;
    f.manager.start_session("a").await.unwrap();

    f.manager.archive_session("a", Some("churned")).await.unwrap();
    let device = f.storage.get_device("a").await.unwrap().unwrap();
    assert_eq!(device.status, SessionStatus::Archived);
    assert_eq!(device.archive_reason.as_deref(), Some("churned"));
    assert_eq!(f.factory.live_handles("a").await, 0);
    assert!(f.manager.start_session("a").await.is_err());

    f.manager.delete_session("d").await.unwrap();
    assert!(f.manager.status("d").is_none());
    assert!(f.manager.start_session("d").await.is_err());
    assert!(f.manager.start_session("missing").await.is_err());
}

#[tokio::test]
async fn logout_session_calls_logout_and_wipes() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();

    f.manager.logout_session("s1").await.unwrap();
    assert!(conn.handle.is_logged_out());
    assert_eq!(f.manager.status("s1"), Some(SessionStatus::LoggedOut));
    let device = f.storage.get_device("s1").await.unwrap().unwrap();
    assert_eq!(device.status, SessionStatus::LoggedOut);
}

struct Recorder {
    batches: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl MessageEventHandler for Recorder {
    async fn on_messages(
        &self,
        session_id: &str,
        _handle: Arc<dyn ProtocolHandle>,
        batch: MessageBatch,
    ) {
        self.batches
            .lock()
            .await
            .push((session_id.to_string(), batch.messages.len()));
    }
}

#[tokio::test]
async fn message_batches_reach_the_handler() {
    let f = fixture().await;
    let recorder = Arc::new(Recorder {
        batches: Mutex::new(Vec::new()),
    });
    f.manager.set_message_handler(recorder.clone()).unwrap();
    assert!(f.manager.set_message_handler(recorder.clone()).is_err());

    seed_device(&f.storage, "s1").await;
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();
    conn.emit(ProtocolEvent::Messages(MessageBatch {
        kind: BatchKind::Notify,
        messages: vec![WireMessage::default(), WireMessage::default()],
    }))
    .await;

    let seen = recorder.clone();
    let delivered = wait_until(WAIT, move || {
        let seen = seen.clone();
        async move { !seen.batches.lock().await.is_empty() }
    })
    .await;
    assert!(delivered);
    assert_eq!(recorder.batches.lock().await[0], ("s1".to_string(), 2));
}

#[tokio::test]
async fn shutdown_ends_handles_without_changing_status() {
    let f = fixture().await;
    seed_device(&f.storage, "s1").await;
    f.manager.start_session("s1").await.unwrap();
    let conn = f.factory.last_connection("s1").await.unwrap();
    conn.emit(ProtocolEvent::Open { own_jid: None }).await;
    assert!(wait_for_status(&f, "s1", SessionStatus::Connected).await);

    f.manager.shutdown().await;
    assert!(conn.handle.is_ended());
    let device = f.storage.get_device("s1").await.unwrap().unwrap();
    assert_eq!(device.status, SessionStatus::Connected);
}
