// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection state machine.
//!
//! [`transition`] is pure: it maps the current state, counters, and one
//! input onto the next state plus the side effects the caller must perform.
//! Persisting, broadcasting, and timer handling live in the session manager.

use std::time::Duration;

use palaver_config::model::ConnectionConfig;
use palaver_core::protocol::DisconnectCause;
use palaver_core::SessionStatus;

use crate::backoff::backoff_delay;

pub const QR_TIMEOUT_MESSAGE: &str = "QR scan timeout";
pub const MAX_RECONNECTS_MESSAGE: &str = "max reconnection attempts reached";

/// Bounds and delays the state machine runs under.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPolicy {
    pub max_qr_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub restart_delay: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for ConnectionPolicy {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            max_qr_attempts: config.max_qr_attempts,
            max_reconnect_attempts: config.max_reconnect_attempts,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
            restart_delay: config.restart_delay(),
        }
    }
}

/// Per-session attempt counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub qr_attempts: u32,
    pub reconnect_attempts: u32,
}

/// Everything the machine reads besides the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineState {
    pub status: SessionStatus,
    pub counters: Counters,
    pub intentional_disconnect: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MachineInput {
    Connecting,
    Syncing,
    Qr { code: String },
    Open,
    Close {
        cause: DisconnectCause,
        message: Option<String>,
    },
    IntentionalDisconnect,
}

/// Side effects requested by a transition, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PublishQr { code: String, attempt: u32 },
    WipeCredentials,
    EndHandle,
    MarkConnected,
    ScheduleReconnect { delay: Duration, attempt: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub status: SessionStatus,
    /// Error text persisted with the status; `None` clears it.
    pub error: Option<String>,
    pub counters: Counters,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(status: SessionStatus, counters: Counters) -> Self {
        Self {
            status,
            error: None,
            counters,
            effects: Vec::new(),
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// The reconnect this transition schedules, if any.
    pub fn scheduled_reconnect(&self) -> Option<(Duration, u32)> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::ScheduleReconnect { delay, attempt } => Some((*delay, *attempt)),
            _ => None,
        })
    }
}

/// States in which a close event is already accounted for.
fn close_is_settled(status: SessionStatus) -> bool {
    matches!(
        status,
        SessionStatus::Disconnected | SessionStatus::AuthFailed | SessionStatus::Conflict
    )
}

/// Compute the next state. `None` means the input is ignored.
pub fn transition(
    state: &MachineState,
    input: &MachineInput,
    policy: &ConnectionPolicy,
) -> Option<Transition> {
    if state.status.is_terminal() {
        return None;
    }
    let counters = state.counters;

    let next = match input {
        MachineInput::Connecting => Transition::to(SessionStatus::Connecting, counters),
        MachineInput::Syncing => Transition::to(SessionStatus::Synchronizing, counters),

        MachineInput::Qr { code } => {
            let attempt = counters.qr_attempts.saturating_add(1);
            let counters = Counters {
                qr_attempts: attempt,
                ..counters
            };
            if attempt >= policy.max_qr_attempts {
                Transition::to(SessionStatus::Error, counters)
                    .with_error(QR_TIMEOUT_MESSAGE)
                    .with_effect(Effect::WipeCredentials)
                    .with_effect(Effect::EndHandle)
            } else {
                Transition::to(SessionStatus::Connecting, counters).with_effect(Effect::PublishQr {
                    code: code.clone(),
                    attempt,
                })
            }
        }

        MachineInput::Open => Transition::to(SessionStatus::Connected, Counters::default())
            .with_effect(Effect::MarkConnected),

        MachineInput::IntentionalDisconnect => Transition::to(SessionStatus::Disconnecting, counters),

        MachineInput::Close { cause, message } => {
            if close_is_settled(state.status) {
                return None;
            }
            if state.intentional_disconnect {
                return Some(Transition::to(SessionStatus::Disconnected, counters));
            }
            let detail = message.clone().unwrap_or_else(|| cause.label());
            close_transition(*cause, detail, counters, policy)
        }
    };

    Some(next)
}

fn close_transition(
    cause: DisconnectCause,
    detail: String,
    counters: Counters,
    policy: &ConnectionPolicy,
) -> Transition {
    match cause {
        DisconnectCause::LoggedOut | DisconnectCause::DeviceRemoved | DisconnectCause::BadSession => {
            Transition::to(SessionStatus::LoggedOut, counters)
                .with_error(detail)
                .with_effect(Effect::WipeCredentials)
        }
        DisconnectCause::Forbidden | DisconnectCause::MultideviceMismatch => {
            Transition::to(SessionStatus::AuthFailed, counters)
                .with_error(detail)
                .with_effect(Effect::WipeCredentials)
        }
        DisconnectCause::ConnectionReplaced => {
            Transition::to(SessionStatus::Conflict, counters).with_error(detail)
        }
        DisconnectCause::RestartRequired => {
            let counters = Counters {
                reconnect_attempts: 0,
                ..counters
            };
            Transition::to(SessionStatus::Reconnecting, counters).with_effect(
                Effect::ScheduleReconnect {
                    delay: policy.restart_delay,
                    attempt: 0,
                },
            )
        }
        DisconnectCause::TimedOut
        | DisconnectCause::ConnectionLost
        | DisconnectCause::ConnectionClosed
        | DisconnectCause::StreamError
        | DisconnectCause::Unknown(_) => {
            let attempt = counters.reconnect_attempts;
            if attempt >= policy.max_reconnect_attempts {
                return Transition::to(SessionStatus::Error, counters)
                    .with_error(MAX_RECONNECTS_MESSAGE);
            }
            let delay = backoff_delay(attempt, policy.backoff_base, policy.backoff_max);
            let counters = Counters {
                reconnect_attempts: attempt + 1,
                ..counters
            };
            Transition::to(SessionStatus::Reconnecting, counters)
                .with_error(detail)
                .with_effect(Effect::ScheduleReconnect {
                    delay,
                    attempt: attempt + 1,
                })
        }
    }
}
