// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory table of transient per-session state.
//!
//! The registry owns every session's live handle, event pump, counters,
//! and timers. Components never keep their own copies; they read and
//! mutate a [`SessionSlot`] under its lock, and never hold that lock
//! across an await point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use palaver_core::{ProtocolHandle, SessionStatus, SharedCredentials};
use tokio::task::JoinHandle;

use crate::machine::{Counters, MachineState};

/// Transient state of one session.
#[derive(Default)]
pub struct SlotState {
    pub status: SessionStatus,
    /// Identifies the current handle; bumped whenever a handle is installed or retired.
    pub generation: u64,
    pub handle: Option<Arc<dyn ProtocolHandle>>,
    pub pump: Option<JoinHandle<()>>,
    pub creds: Option<SharedCredentials>,
    pub counters: Counters,
    pub reconnect_timer: Option<JoinHandle<()>>,
    pub intentional_disconnect: bool,
    /// Single-flight reconnect lock.
    pub reconnecting: bool,
    /// Delay of a reconnect requested while the lock was held.
    pub pending_reconnect: Option<Duration>,
    /// Ticket of the open in flight. At most one handle is built at a time.
    pub opening: Option<u64>,
    next_ticket: u64,
}

impl SlotState {
    fn new(status: SessionStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn machine_state(&self) -> MachineState {
        MachineState {
            status: self.status,
            counters: self.counters,
            intentional_disconnect: self.intentional_disconnect,
        }
    }

    /// Detach the current handle and return it for ending.
    ///
    /// With `abort_pump` the event pump task is cancelled; otherwise it is
    /// only detached, which is what a pump retiring its own handle needs.
    pub fn detach_handle(&mut self, abort_pump: bool) -> Option<Arc<dyn ProtocolHandle>> {
        self.generation += 1;
        if let Some(pump) = self.pump.take() {
            if abort_pump {
                pump.abort();
            }
        }
        self.creds = None;
        self.handle.take()
    }

    /// Cancel an armed reconnect timer and release the reconnect lock.
    ///
    /// While a timer exists any open in flight is that timer's own, so its
    /// reservation goes with it.
    pub fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
            self.opening = None;
        }
        self.reconnecting = false;
        self.pending_reconnect = None;
    }

    /// Claim the right to build the next handle. `None` while another
    /// open is in flight.
    pub fn reserve_open(&mut self) -> Option<u64> {
        if self.opening.is_some() {
            return None;
        }
        self.next_ticket += 1;
        self.opening = Some(self.next_ticket);
        self.opening
    }

    pub fn holds_open(&self, ticket: u64) -> bool {
        self.opening == Some(ticket)
    }

    fn release_open(&mut self, ticket: u64) {
        if self.opening == Some(ticket) {
            self.opening = None;
        }
    }
}

/// A claimed open. Dropping it releases the claim, including when the task
/// building the handle is aborted mid-connect.
pub struct OpenReservation {
    slot: Arc<SessionSlot>,
    ticket: u64,
}

impl OpenReservation {
    pub fn new(slot: Arc<SessionSlot>, ticket: u64) -> Self {
        Self { slot, ticket }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for OpenReservation {
    fn drop(&mut self) {
        self.slot.lock().release_open(self.ticket);
    }
}

/// One registry entry.
pub struct SessionSlot {
    state: Mutex<SlotState>,
}

impl SessionSlot {
    pub fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read-only view of a slot for callers outside the session crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub status: SessionStatus,
    pub generation: u64,
    pub counters: Counters,
    pub has_handle: bool,
    pub reconnecting: bool,
    pub opening: bool,
}

#[derive(Default)]
pub struct SessionRegistry {
    slots: DashMap<String, Arc<SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `session_id`, created with `status` if absent.
    pub fn slot(&self, session_id: &str, status: SessionStatus) -> Arc<SessionSlot> {
        self.slots
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionSlot {
                    state: Mutex::new(SlotState::new(status)),
                })
            })
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionSlot>> {
        self.slots.get(session_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionSlot>> {
        self.slots.remove(session_id).map(|(_, slot)| slot)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.slots.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SlotSnapshot> {
        let slot = self.get(session_id)?;
        let state = slot.lock();
        Some(SlotSnapshot {
            status: state.status,
            generation: state.generation,
            counters: state.counters,
            has_handle: state.handle.is_some(),
            reconnecting: state.reconnecting,
            opening: state.opening.is_some(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
