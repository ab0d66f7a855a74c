// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle for the Palaver gateway.
//!
//! Holds the in-memory [`SessionRegistry`](registry::SessionRegistry), the
//! pure connection state machine, backoff computation, the credential store
//! adapter, the observer channel, and the [`SessionManager`] tying them to
//! live protocol handles.

pub mod auth_store;
pub mod backoff;
pub mod machine;
pub mod manager;
pub mod observer;
pub mod registry;

pub use auth_store::AuthStateStore;
pub use backoff::backoff_delay;
pub use machine::{ConnectionPolicy, Counters, MachineInput, Transition};
pub use manager::{ManagerSettings, MessageEventHandler, SessionManager};
pub use observer::{ObserverEvent, ObserverHub};
