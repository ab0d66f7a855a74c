// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Palaver session gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Palaver configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PalaverConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session connection lifecycle settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Auto-reply timing and context settings.
    #[serde(default)]
    pub reply: ReplyConfig,

    /// Outbound send settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Media offload settings.
    #[serde(default)]
    pub media: MediaConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Instance name, used in log output.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "palaver".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("palaver").join("palaver.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "palaver.db".to_string())
}

fn default_true() -> bool {
    true
}

/// Session connection lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// QR issuances allowed per pairing attempt before the session errors out.
    #[serde(default = "default_max_qr_attempts")]
    pub max_qr_attempts: u32,

    /// Transient reconnects allowed before the session errors out.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Backoff base delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Delay before reconnecting after a restart-required close.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Pause between ending an old handle and building its replacement.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// How long the single-flight reconnect lock is held after a reconnect.
    #[serde(default = "default_lock_release_delay_ms")]
    pub lock_release_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_qr_attempts: default_max_qr_attempts(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            restart_delay_ms: default_restart_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            lock_release_delay_ms: default_lock_release_delay_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn lock_release_delay(&self) -> Duration {
        Duration::from_millis(self.lock_release_delay_ms)
    }
}

fn default_max_qr_attempts() -> u32 {
    3
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    300_000
}

fn default_restart_delay_ms() -> u64 {
    1_000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_lock_release_delay_ms() -> u64 {
    2_000
}

/// Auto-reply configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReplyConfig {
    /// Master switch for the auto-responder.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fixed part of the simulated reply delay.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Delay added per character of the reply text.
    #[serde(default = "default_per_char_delay_ms")]
    pub per_char_delay_ms: u64,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Mark the inbound message read before replying.
    #[serde(default = "default_true")]
    pub mark_read: bool,

    /// Send a `composing` presence while the reply is delayed.
    #[serde(default = "default_true")]
    pub simulate_typing: bool,

    /// History entries handed to the generator as context.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: default_base_delay_ms(),
            per_char_delay_ms: default_per_char_delay_ms(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            mark_read: true,
            simulate_typing: true,
            history_window: default_history_window(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_per_char_delay_ms() -> u64 {
    50
}

fn default_min_delay_ms() -> u64 {
    1_500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_history_window() -> usize {
    20
}

/// Outbound send configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Send timeout for text messages.
    #[serde(default = "default_text_timeout_secs")]
    pub text_timeout_secs: u64,

    /// Send timeout for media messages.
    #[serde(default = "default_media_timeout_secs")]
    pub media_timeout_secs: u64,

    /// Re-encode images other than JPEG/PNG before sending.
    #[serde(default = "default_true")]
    pub normalize_images: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            text_timeout_secs: default_text_timeout_secs(),
            media_timeout_secs: default_media_timeout_secs(),
            normalize_images: true,
        }
    }
}

impl DispatchConfig {
    pub fn text_timeout(&self) -> Duration {
        Duration::from_secs(self.text_timeout_secs)
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }
}

fn default_text_timeout_secs() -> u64 {
    30
}

fn default_media_timeout_secs() -> u64 {
    60
}

/// Media offload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Download inbound images and store them in blob storage.
    #[serde(default = "default_true")]
    pub offload_images: bool,

    /// Root directory of the filesystem blob store.
    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,

    /// Path prefix under which media blobs are stored.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Downloads larger than this are dropped.
    #[serde(default = "default_max_media_bytes")]
    pub max_media_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            offload_images: true,
            blob_dir: default_blob_dir(),
            path_prefix: default_path_prefix(),
            max_media_bytes: default_max_media_bytes(),
        }
    }
}

fn default_blob_dir() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("palaver").join("blobs"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "blobs".to_string())
}

fn default_path_prefix() -> String {
    "media".to_string()
}

fn default_max_media_bytes() -> usize {
    16 * 1024 * 1024
}
