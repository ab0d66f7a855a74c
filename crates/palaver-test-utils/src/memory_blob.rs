// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory blob store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use palaver_core::{BlobStore, PalaverError};
use tokio::sync::Mutex;

/// Stores blobs in a map keyed by `memory://<path>/<name>` references.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Put bytes under a known reference.
    pub async fn insert(&self, reference: &str, bytes: Vec<u8>) {
        self.blobs.lock().await.insert(reference.to_string(), bytes);
    }

    pub async fn references(&self) -> Vec<String> {
        let mut refs: Vec<String> = self.blobs.lock().await.keys().cloned().collect();
        refs.sort();
        refs
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: Vec<u8>, name: &str, path: &str) -> Result<String, PalaverError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PalaverError::Media {
                message: "blob upload failed".into(),
            });
        }
        let reference = format!("memory://{}/{}", path.trim_matches('/'), name);
        self.blobs.lock().await.insert(reference.clone(), bytes);
        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, PalaverError> {
        self.blobs
            .lock()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| PalaverError::Media {
                message: format!("blob not found: {reference}"),
            })
    }
}
