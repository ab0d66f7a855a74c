// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem blob store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use palaver_core::{BlobStore, PalaverError};

const SCHEME: &str = "file://";

/// Stores blobs as files under a root directory and hands out `file://` references.
pub struct LocalBlobStore {
    root: PathBuf,
}

fn blob_error(message: impl Into<String>) -> PalaverError {
    PalaverError::Media {
        message: message.into(),
    }
}

/// Reject absolute paths and parent-directory hops.
fn relative(path: &str) -> Result<PathBuf, PalaverError> {
    let candidate = Path::new(path.trim_matches('/'));
    if candidate
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(candidate.to_path_buf())
    } else {
        Err(blob_error(format!("invalid blob path: {path}")))
    }
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, bytes: Vec<u8>, name: &str, path: &str) -> Result<String, PalaverError> {
        let dir = self.root.join(relative(path)?);
        let file = dir.join(relative(name)?);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| blob_error(format!("failed to create {}: {e}", dir.display())))?;
        tokio::fs::write(&file, bytes)
            .await
            .map_err(|e| blob_error(format!("failed to write {}: {e}", file.display())))?;
        Ok(format!("{SCHEME}{}", file.display()))
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, PalaverError> {
        let raw = reference
            .strip_prefix(SCHEME)
            .ok_or_else(|| blob_error(format!("not a file reference: {reference}")))?;
        let path = Path::new(raw);
        let inside = path
            .strip_prefix(&self.root)
            .map_err(|_| blob_error(format!("reference outside blob root: {reference}")))?;
        let file = self.root.join(relative(&inside.to_string_lossy())?);
        tokio::fs::read(&file)
            .await
            .map_err(|e| blob_error(format!("failed to read {}: {e}", file.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_and_fetch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let url = store.upload(vec![7, 7], "m1.jpg", "media/s1").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("media/s1/m1.jpg"));
        assert_eq!(store.fetch(&url).await.unwrap(), vec![7, 7]);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(store.upload(vec![1], "x", "../escape").await.is_err());
        assert!(store.upload(vec![1], "../x", "media").await.is_err());
        assert!(store.fetch("file:///etc/passwd").await.is_err());
        assert!(store.fetch("https://example.com/a.jpg").await.is_err());
    }
}
