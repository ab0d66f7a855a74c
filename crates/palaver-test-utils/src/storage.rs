// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp SQLite storage and polling helpers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use palaver_config::model::StorageConfig;
use palaver_core::types::{DeviceRecord, NewDevice};
use palaver_core::StorageAdapter;
use palaver_storage::SqliteStorage;
use tempfile::TempDir;

/// Initialized SQLite storage in a fresh temp directory.
///
/// Keep the returned [`TempDir`] alive for as long as the storage is used.
pub async fn temp_storage() -> (Arc<dyn StorageAdapter>, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("palaver-test.db");
    let storage = SqliteStorage::new(StorageConfig {
        database_path: path.to_string_lossy().to_string(),
        wal_mode: true,
    });
    storage.initialize().await.expect("storage initializes");
    (Arc::new(storage), dir)
}

/// Register a device with AI enabled.
pub async fn seed_device(storage: &Arc<dyn StorageAdapter>, session_id: &str) -> DeviceRecord {
    storage
        .create_device(&NewDevice {
            session_id: session_id.to_string(),
            owner_id: "owner-1".to_string(),
            display_name: Some(format!("{session_id} phone")),
            ai_enabled: true,
            business_context: None,
        })
        .await
        .expect("device created")
}

/// Poll `check` every 5ms until it returns true or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
