// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle orchestration.
//!
//! [`SessionManager`] owns the registry, turns protocol events into state
//! machine inputs, persists and broadcasts every transition, and runs the
//! single-flight reconnect loop. Each handle gets its own event pump task
//! tagged with the generation it was installed under; a pump whose
//! generation is no longer current stops touching the session.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use palaver_config::model::ConnectionConfig;
use palaver_core::jid::phone_number_of;
use palaver_core::protocol::{DisconnectCause, MessageBatch, ProtocolEvent};
use palaver_core::types::{DeviceRecord, NewDevice, StatusUpdate};
use palaver_core::{
    PalaverError, ProtocolClientFactory, ProtocolConnection, ProtocolHandle, SessionStatus,
    SharedCredentials, StorageAdapter,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth_store::AuthStateStore;
use crate::machine::{transition, ConnectionPolicy, Counters, Effect, MachineInput, Transition};
use crate::observer::{ObserverEvent, ObserverHub};
use crate::registry::{OpenReservation, SessionRegistry, SessionSlot, SlotSnapshot};

/// Receives message batches from live handles.
///
/// Called from the session's event pump, so batches of one session arrive
/// in order. Long-running work should be spawned.
#[async_trait]
pub trait MessageEventHandler: Send + Sync {
    async fn on_messages(
        &self,
        session_id: &str,
        handle: Arc<dyn ProtocolHandle>,
        batch: MessageBatch,
    );
}

/// Timing knobs of the manager besides the state machine policy.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub policy: ConnectionPolicy,
    /// Wait between ending an old handle and building its replacement.
    pub settle_delay: Duration,
    /// How long the reconnect lock stays held after a reconnect attempt.
    pub lock_release_delay: Duration,
}

impl From<&ConnectionConfig> for ManagerSettings {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            policy: ConnectionPolicy::from(config),
            settle_delay: config.settle_delay(),
            lock_release_delay: config.lock_release_delay(),
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

struct Inner {
    storage: Arc<dyn StorageAdapter>,
    factory: Arc<dyn ProtocolClientFactory>,
    registry: SessionRegistry,
    observers: Arc<ObserverHub>,
    settings: ManagerSettings,
    handler: OnceLock<Arc<dyn MessageEventHandler>>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        factory: Arc<dyn ProtocolClientFactory>,
        observers: Arc<ObserverHub>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                factory,
                registry: SessionRegistry::new(),
                observers,
                settings,
                handler: OnceLock::new(),
            }),
        }
    }

    /// Install the receiver of message batches. Only the first call wins.
    pub fn set_message_handler(
        &self,
        handler: Arc<dyn MessageEventHandler>,
    ) -> Result<(), PalaverError> {
        self.inner
            .handler
            .set(handler)
            .map_err(|_| PalaverError::Internal("message handler already installed".into()))
    }

    pub fn observers(&self) -> Arc<ObserverHub> {
        self.inner.observers.clone()
    }

    pub fn storage(&self) -> Arc<dyn StorageAdapter> {
        self.inner.storage.clone()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self, session_id: &str) -> mpsc::Receiver<ObserverEvent> {
        self.inner.observers.subscribe(session_id)
    }

    /// In-memory status, if the session has been touched since boot.
    pub fn status(&self, session_id: &str) -> Option<SessionStatus> {
        self.inner.registry.snapshot(session_id).map(|s| s.status)
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SlotSnapshot> {
        self.inner.registry.snapshot(session_id)
    }

    /// The live handle of a session.
    pub fn current_handle(&self, session_id: &str) -> Result<Arc<dyn ProtocolHandle>, PalaverError> {
        self.inner
            .registry
            .get(session_id)
            .and_then(|slot| slot.lock().handle.clone())
            .ok_or_else(|| PalaverError::SessionNotConnected(session_id.to_string()))
    }

    pub async fn register_device(&self, device: NewDevice) -> Result<DeviceRecord, PalaverError> {
        let record = self.inner.storage.create_device(&device).await?;
        self.inner.registry.slot(&record.session_id, record.status);
        info!(session_id = %record.session_id, owner = %record.owner_id, "device registered");
        self.publish_status(&record.session_id, record.status, None, None);
        Ok(record)
    }

    async fn load_device(&self, session_id: &str) -> Result<DeviceRecord, PalaverError> {
        let device = self
            .inner
            .storage
            .get_device(session_id)
            .await?
            .ok_or_else(|| PalaverError::SessionNotFound(session_id.to_string()))?;
        if matches!(device.status, SessionStatus::Archived | SessionStatus::Deleted) {
            return Err(PalaverError::Internal(format!(
                "session {session_id} is {}",
                device.status
            )));
        }
        Ok(device)
    }

    /// Open a handle for the session. A session that already has a handle,
    /// an open in flight, or an armed reconnect is left alone.
    pub async fn start_session(&self, session_id: &str) -> Result<(), PalaverError> {
        let device = self.load_device(session_id).await?;
        let slot = self.inner.registry.slot(session_id, device.status);
        let ticket = {
            let mut state = slot.lock();
            if state.handle.is_some()
                || state.opening.is_some()
                || state.reconnect_timer.is_some()
            {
                debug!(session_id, "session already running");
                return Ok(());
            }
            if state.status.is_terminal() {
                return Err(PalaverError::Internal(format!(
                    "session {session_id} is {}, restart it instead",
                    state.status
                )));
            }
            state.intentional_disconnect = false;
            state.reserve_open()
        };
        let Some(ticket) = ticket else {
            return Ok(());
        };
        let reservation = OpenReservation::new(slot.clone(), ticket);
        self.open_handle(session_id, &slot, reservation).await
    }

    /// Manual restart from any state except archived or deleted.
    pub async fn restart_session(&self, session_id: &str) -> Result<(), PalaverError> {
        let device = self.load_device(session_id).await?;
        let slot = self.inner.registry.slot(session_id, device.status);
        let (old, ticket) = {
            let mut state = slot.lock();
            state.cancel_reconnect();
            let old = state.detach_handle(true);
            state.counters = Counters::default();
            state.intentional_disconnect = false;
            state.status = SessionStatus::Pending;
            (old, state.reserve_open())
        };
        let reservation = ticket.map(|ticket| OpenReservation::new(slot.clone(), ticket));
        if let Some(old) = old {
            end_quietly(session_id, old.as_ref()).await;
        }
        let Some(reservation) = reservation else {
            info!(session_id, "session restarted, joining the open in flight");
            return Ok(());
        };
        self.inner.factory.evict_cache(session_id);
        info!(session_id, "session restarted");
        self.open_handle(session_id, &slot, reservation).await
    }

    /// Intentional disconnect: ends the handle, never reconnects.
    pub async fn stop_session(&self, session_id: &str) -> Result<(), PalaverError> {
        let device = self
            .inner
            .storage
            .get_device(session_id)
            .await?
            .ok_or_else(|| PalaverError::SessionNotFound(session_id.to_string()))?;
        let slot = self.inner.registry.slot(session_id, device.status);
        let old = {
            let mut state = slot.lock();
            state.intentional_disconnect = true;
            state.cancel_reconnect();
            state.detach_handle(true)
        };
        self.apply(session_id, &slot, MachineInput::IntentionalDisconnect, None)
            .await;
        if let Some(old) = old {
            end_quietly(session_id, old.as_ref()).await;
        }
        self.apply(
            session_id,
            &slot,
            MachineInput::Close {
                cause: DisconnectCause::ConnectionClosed,
                message: None,
            },
            None,
        )
        .await;
        info!(session_id, "session stopped");
        Ok(())
    }

    /// Log the device out and forget its credentials.
    pub async fn logout_session(&self, session_id: &str) -> Result<(), PalaverError> {
        let device = self.load_device(session_id).await?;
        let slot = self.inner.registry.slot(session_id, device.status);
        let old = {
            let mut state = slot.lock();
            state.intentional_disconnect = true;
            state.cancel_reconnect();
            state.detach_handle(true)
        };
        if let Some(old) = old {
            if let Err(e) = old.logout().await {
                warn!(session_id, error = %e, "logout call failed");
            }
            end_quietly(session_id, old.as_ref()).await;
        }
        self.wipe_credentials(session_id).await;
        self.force_status(session_id, &slot, SessionStatus::LoggedOut, None)
            .await?;
        info!(session_id, "session logged out");
        Ok(())
    }

    pub async fn archive_session(
        &self,
        session_id: &str,
        reason: Option<&str>,
    ) -> Result<(), PalaverError> {
        let device = self
            .inner
            .storage
            .get_device(session_id)
            .await?
            .ok_or_else(|| PalaverError::SessionNotFound(session_id.to_string()))?;
        let slot = self.inner.registry.slot(session_id, device.status);
        self.teardown(session_id, &slot).await;
        self.inner.storage.archive_device(session_id, reason).await?;
        slot.lock().status = SessionStatus::Archived;
        self.publish_status(session_id, SessionStatus::Archived, reason.map(str::to_string), None);
        info!(session_id, reason = reason.unwrap_or(""), "session archived");
        Ok(())
    }

    /// Mark the device deleted, wipe its credentials, and drop it from memory.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), PalaverError> {
        let device = self
            .inner
            .storage
            .get_device(session_id)
            .await?
            .ok_or_else(|| PalaverError::SessionNotFound(session_id.to_string()))?;
        let slot = self.inner.registry.slot(session_id, device.status);
        self.teardown(session_id, &slot).await;
        self.wipe_credentials(session_id).await;
        self.force_status(session_id, &slot, SessionStatus::Deleted, None)
            .await?;
        self.inner.registry.remove(session_id);
        self.inner.observers.unsubscribe(session_id);
        info!(session_id, "session deleted");
        Ok(())
    }

    /// Start every persisted session that was live when the process stopped.
    ///
    /// Returns the number of sessions started.
    pub async fn resume_all(&self) -> Result<usize, PalaverError> {
        let devices = self.inner.storage.list_devices(None).await?;
        let mut started = 0;
        for device in devices.into_iter().filter(|d| d.status.should_resume()) {
            match self.start_session(&device.session_id).await {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!(session_id = %device.session_id, error = %e, "failed to resume session");
                }
            }
        }
        info!(started, "sessions resumed");
        Ok(started)
    }

    /// End every handle and cancel every timer without touching persisted state.
    pub async fn shutdown(&self) {
        for session_id in self.inner.registry.session_ids() {
            let Some(slot) = self.inner.registry.get(&session_id) else {
                continue;
            };
            let old = {
                let mut state = slot.lock();
                state.intentional_disconnect = true;
                state.cancel_reconnect();
                state.detach_handle(true)
            };
            if let Some(old) = old {
                end_quietly(&session_id, old.as_ref()).await;
            }
        }
        info!("session manager shut down");
    }

    // --- internals ---

    async fn teardown(&self, session_id: &str, slot: &Arc<SessionSlot>) {
        let old = {
            let mut state = slot.lock();
            state.intentional_disconnect = true;
            state.cancel_reconnect();
            state.detach_handle(true)
        };
        if let Some(old) = old {
            end_quietly(session_id, old.as_ref()).await;
        }
        self.inner.factory.evict_cache(session_id);
    }

    /// Load credentials, build a handle, and install it as current.
    ///
    /// The reservation is held across the connect so no second handle is
    /// built for the session meanwhile.
    async fn open_handle(
        &self,
        session_id: &str,
        slot: &Arc<SessionSlot>,
        reservation: OpenReservation,
    ) -> Result<(), PalaverError> {
        self.apply(session_id, slot, MachineInput::Connecting, None).await;
        let store = Arc::new(AuthStateStore::new(session_id, self.inner.storage.clone()));
        let auth = store.load().await?;
        let creds = auth.creds.clone();
        let connection = self.inner.factory.connect(session_id, auth).await?;
        self.install(session_id, slot, connection, store, creds, &reservation)
            .await;
        Ok(())
    }

    async fn install(
        &self,
        session_id: &str,
        slot: &Arc<SessionSlot>,
        connection: ProtocolConnection,
        store: Arc<AuthStateStore>,
        creds: SharedCredentials,
        reservation: &OpenReservation,
    ) {
        let ProtocolConnection { handle, events } = connection;
        let (installed, stopped) = {
            let mut state = slot.lock();
            let stopped = state.intentional_disconnect;
            if stopped || !state.holds_open(reservation.ticket()) {
                (None, stopped)
            } else {
                let previous = state.detach_handle(true);
                state.generation += 1;
                let generation = state.generation;
                state.handle = Some(handle.clone());
                state.creds = Some(creds.clone());
                let pump = tokio::spawn(self.clone().pump(
                    session_id.to_string(),
                    generation,
                    handle.clone(),
                    events,
                    store,
                    creds,
                ));
                state.pump = Some(pump);
                (Some((previous, generation)), false)
            }
        };
        let Some((previous, generation)) = installed else {
            debug!(session_id, stopped, "open superseded, handle discarded");
            end_quietly(session_id, handle.as_ref()).await;
            if stopped {
                // The opener may have moved the status back to connecting.
                self.apply(
                    session_id,
                    slot,
                    MachineInput::Close {
                        cause: DisconnectCause::ConnectionClosed,
                        message: None,
                    },
                    None,
                )
                .await;
            }
            return;
        };
        if let Some(previous) = previous {
            warn!(session_id, "replaced a live handle");
            end_quietly(session_id, previous.as_ref()).await;
        }
        debug!(session_id, generation, "handle installed");
    }

    async fn pump(
        self,
        session_id: String,
        generation: u64,
        handle: Arc<dyn ProtocolHandle>,
        mut events: mpsc::Receiver<ProtocolEvent>,
        store: Arc<AuthStateStore>,
        creds: SharedCredentials,
    ) {
        let Some(slot) = self.inner.registry.get(&session_id) else {
            return;
        };
        while let Some(event) = events.recv().await {
            let current = slot.lock().generation;
            if current != generation {
                debug!(session_id = %session_id, generation, "stale handle event ignored");
                break;
            }
            let input = match event {
                ProtocolEvent::Connecting => MachineInput::Connecting,
                ProtocolEvent::Syncing => MachineInput::Syncing,
                ProtocolEvent::Qr { code } => MachineInput::Qr { code },
                ProtocolEvent::Open { own_jid } => {
                    if let Some(phone) = own_jid.as_deref().and_then(phone_number_of) {
                        if let Err(e) = self
                            .inner
                            .storage
                            .set_device_phone_number(&session_id, Some(&phone))
                            .await
                        {
                            warn!(session_id = %session_id, error = %e, "failed to store own number");
                        }
                    }
                    MachineInput::Open
                }
                ProtocolEvent::Close { cause, message } => MachineInput::Close { cause, message },
                ProtocolEvent::CredentialsUpdated => {
                    if let Err(e) = store.save_creds(&creds).await {
                        warn!(session_id = %session_id, error = %e, "failed to save credentials");
                    }
                    continue;
                }
                ProtocolEvent::Messages(batch) => {
                    if let Some(handler) = self.inner.handler.get() {
                        handler.on_messages(&session_id, handle.clone(), batch).await;
                    }
                    continue;
                }
            };
            self.apply(&session_id, &slot, input, Some(generation)).await;
        }
        debug!(session_id = %session_id, generation, "event pump finished");
    }

    /// Run one input through the state machine, execute its effects, then
    /// persist and broadcast the new status.
    async fn apply(
        &self,
        session_id: &str,
        slot: &Arc<SessionSlot>,
        input: MachineInput,
        generation: Option<u64>,
    ) -> Option<Transition> {
        let next = {
            let mut state = slot.lock();
            if generation.is_some_and(|g| g != state.generation) {
                return None;
            }
            let next = transition(&state.machine_state(), &input, &self.inner.settings.policy)?;
            state.status = next.status;
            state.counters = next.counters;
            next
        };

        let mut scheduled = None;
        for effect in &next.effects {
            match effect {
                Effect::PublishQr { code, attempt } => {
                    self.inner.observers.publish(ObserverEvent::Qr {
                        session_id: session_id.to_string(),
                        code: code.clone(),
                        attempt: *attempt,
                    });
                }
                Effect::WipeCredentials => self.wipe_credentials(session_id).await,
                Effect::EndHandle => self.release_handle(session_id, slot).await,
                Effect::MarkConnected => {}
                Effect::ScheduleReconnect { delay, attempt } => scheduled = Some((*delay, *attempt)),
            }
        }
        if matches!(
            next.status,
            SessionStatus::LoggedOut
                | SessionStatus::Error
                | SessionStatus::AuthFailed
                | SessionStatus::Conflict
        ) {
            self.release_handle(session_id, slot).await;
        }

        let mut update = StatusUpdate::new(next.status);
        update.last_error = next.error.clone();
        update.mark_connected = next.effects.contains(&Effect::MarkConnected);
        if let Err(e) = self.inner.storage.update_device_status(session_id, &update).await {
            warn!(session_id, status = %next.status, error = %e, "failed to persist status");
        }

        match scheduled {
            Some((delay, attempt)) => info!(
                session_id,
                status = %next.status,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "session transition"
            ),
            None => info!(session_id, status = %next.status, "session transition"),
        }
        self.publish_status(session_id, next.status, next.error.clone(), scheduled);

        // Armed last so the timer never races the status write above.
        if let Some((delay, _)) = scheduled {
            self.schedule_reconnect(session_id, slot, delay);
        }
        Some(next)
    }

    /// End the current handle, detaching its pump without aborting it: the
    /// caller may be that pump.
    async fn release_handle(&self, session_id: &str, slot: &Arc<SessionSlot>) {
        let old = slot.lock().detach_handle(false);
        if let Some(old) = old {
            end_quietly(session_id, old.as_ref()).await;
        }
    }

    fn schedule_reconnect(&self, session_id: &str, slot: &Arc<SessionSlot>, delay: Duration) {
        let mut state = slot.lock();
        if state.intentional_disconnect {
            return;
        }
        if state.reconnecting {
            debug!(session_id, "reconnect already in flight, recorded as pending");
            state.pending_reconnect = Some(delay);
            return;
        }
        state.reconnecting = true;
        let manager = self.clone();
        let id = session_id.to_string();
        state.reconnect_timer = Some(tokio::spawn(async move {
            manager.run_reconnect(id, delay).await;
        }));
    }

    async fn run_reconnect(self, session_id: String, delay: Duration) {
        tokio::time::sleep(delay).await;
        let Some(slot) = self.inner.registry.get(&session_id) else {
            return;
        };

        let old = {
            let mut state = slot.lock();
            if state.intentional_disconnect || state.status != SessionStatus::Reconnecting {
                debug!(session_id = %session_id, status = %state.status, "reconnect no longer wanted");
                state.reconnect_timer = None;
                state.reconnecting = false;
                state.pending_reconnect = None;
                return;
            }
            state.detach_handle(true)
        };
        if let Some(old) = old {
            end_quietly(&session_id, old.as_ref()).await;
        }
        self.inner.factory.evict_cache(&session_id);
        tokio::time::sleep(self.inner.settings.settle_delay).await;

        let ticket = {
            let mut state = slot.lock();
            if state.intentional_disconnect {
                state.reconnect_timer = None;
                state.reconnecting = false;
                return;
            }
            state.reserve_open()
        };

        let opened = match ticket {
            Some(ticket) => {
                let reservation = OpenReservation::new(slot.clone(), ticket);
                self.open_handle(&session_id, &slot, reservation).await
            }
            None => {
                debug!(session_id = %session_id, "open already in flight, reconnect skipped");
                Ok(())
            }
        };
        if let Err(e) = opened {
            warn!(session_id = %session_id, error = %e, "reconnect failed to build a handle");
            self.apply(
                &session_id,
                &slot,
                MachineInput::Close {
                    cause: DisconnectCause::ConnectionLost,
                    message: Some(e.to_string()),
                },
                None,
            )
            .await;
        }

        tokio::time::sleep(self.inner.settings.lock_release_delay).await;
        let pending = {
            let mut state = slot.lock();
            state.reconnect_timer = None;
            state.reconnecting = false;
            let pending = state.pending_reconnect.take();
            pending.filter(|_| {
                state.status == SessionStatus::Reconnecting && !state.intentional_disconnect
            })
        };
        if let Some(delay) = pending {
            debug!(session_id = %session_id, "replaying pending reconnect");
            self.schedule_reconnect(&session_id, &slot, delay);
        }
    }

    async fn wipe_credentials(&self, session_id: &str) {
        let store = AuthStateStore::new(session_id, self.inner.storage.clone());
        if let Err(e) = store.wipe().await {
            warn!(session_id, error = %e, "failed to wipe credentials");
        }
        self.inner.factory.evict_cache(session_id);
    }

    async fn force_status(
        &self,
        session_id: &str,
        slot: &Arc<SessionSlot>,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<(), PalaverError> {
        let mut update = StatusUpdate::new(status);
        update.last_error = error.clone();
        self.inner
            .storage
            .update_device_status(session_id, &update)
            .await?;
        slot.lock().status = status;
        self.publish_status(session_id, status, error, None);
        Ok(())
    }

    fn publish_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        error: Option<String>,
        scheduled: Option<(Duration, u32)>,
    ) {
        self.inner.observers.publish(ObserverEvent::Status {
            session_id: session_id.to_string(),
            status,
            error,
            attempt: scheduled.map(|(_, attempt)| attempt),
            delay_ms: scheduled.map(|(delay, _)| delay.as_millis() as u64),
        });
    }
}

async fn end_quietly(session_id: &str, handle: &dyn ProtocolHandle) {
    if let Err(e) = handle.end().await {
        debug!(session_id, error = %e, "ending handle failed");
    }
}
