// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blob storage contract for offloaded media.

use async_trait::async_trait;

use crate::error::PalaverError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` as `name` under `path`, returning a reference URL.
    async fn upload(&self, bytes: Vec<u8>, name: &str, path: &str) -> Result<String, PalaverError>;

    /// Read back a previously stored reference.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, PalaverError>;
}
