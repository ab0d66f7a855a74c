// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media handling: pre-send image normalization and blob offload.
//!
//! Offload is best effort throughout. A failed download, oversize payload,
//! or failed upload is logged and the already stored text or caption stays
//! as it is.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use palaver_config::model::MediaConfig;
use palaver_core::protocol::WireMessage;
use palaver_core::{BlobStore, PalaverError, ProtocolHandle, StorageAdapter};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::normalize::declared_size;

/// Image bytes ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub data: Vec<u8>,
    pub mimetype: String,
    pub converted: bool,
}

fn media_error(message: impl Into<String>) -> PalaverError {
    PalaverError::Media {
        message: message.into(),
    }
}

/// Keep JPEG and PNG as they are; re-encode anything else as JPEG.
pub fn normalize_image(data: Vec<u8>, mimetype: &str) -> Result<NormalizedImage, PalaverError> {
    let format = image::guess_format(&data)
        .map_err(|e| media_error(format!("unrecognized image data: {e}")))?;
    match format {
        ImageFormat::Jpeg => Ok(NormalizedImage {
            data,
            mimetype: "image/jpeg".into(),
            converted: false,
        }),
        ImageFormat::Png => Ok(NormalizedImage {
            data,
            mimetype: "image/png".into(),
            converted: false,
        }),
        other => {
            let decoded = image::load_from_memory_with_format(&data, other)
                .map_err(|e| media_error(format!("failed to decode {mimetype}: {e}")))?;
            let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
            let mut out = Cursor::new(Vec::new());
            rgb.write_to(&mut out, ImageFormat::Jpeg)
                .map_err(|e| media_error(format!("failed to encode jpeg: {e}")))?;
            debug!(from = ?other, "image re-encoded as jpeg");
            Ok(NormalizedImage {
                data: out.into_inner(),
                mimetype: "image/jpeg".into(),
                converted: true,
            })
        }
    }
}

/// File extension for a mime type.
pub fn extension_for(mime: Option<&str>) -> &'static str {
    match mime.map(|m| m.split(';').next().unwrap_or(m).trim()) {
        Some("image/jpeg") => "jpg",
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        Some("video/mp4") => "mp4",
        Some("audio/ogg") => "ogg",
        Some("audio/mpeg") => "mp3",
        Some("application/pdf") => "pdf",
        _ => "bin",
    }
}

/// Moves media payloads into blob storage and records the reference.
pub struct MediaOffloader {
    storage: Arc<dyn StorageAdapter>,
    blobs: Arc<dyn BlobStore>,
    config: MediaConfig,
}

impl MediaOffloader {
    pub fn new(storage: Arc<dyn StorageAdapter>, blobs: Arc<dyn BlobStore>, config: MediaConfig) -> Self {
        Self {
            storage,
            blobs,
            config,
        }
    }

    pub fn offload_images(&self) -> bool {
        self.config.offload_images
    }

    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        self.blobs.clone()
    }

    fn path_for(&self, session_id: &str) -> String {
        format!("{}/{}", self.config.path_prefix.trim_matches('/'), session_id)
    }

    fn check_size(&self, size: u64) -> Result<(), PalaverError> {
        let limit = self.config.max_media_bytes as u64;
        if size > limit {
            return Err(media_error(format!(
                "media of {size} bytes exceeds the {limit} byte limit"
            )));
        }
        Ok(())
    }

    async fn upload(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        stem: &str,
        mime: Option<&str>,
    ) -> Result<String, PalaverError> {
        self.check_size(bytes.len() as u64)?;
        let name = format!("{stem}.{}", extension_for(mime));
        self.blobs.upload(bytes, &name, &self.path_for(session_id)).await
    }

    /// Download an inbound message's media, upload it, and enrich its history row.
    ///
    /// A declared size over the limit is rejected before downloading.
    pub async fn offload_inbound(
        &self,
        session_id: &str,
        handle: &dyn ProtocolHandle,
        wire: &WireMessage,
        provider_message_id: &str,
        mime: Option<&str>,
    ) -> Result<String, PalaverError> {
        if let Some(declared) = wire.message.as_ref().and_then(declared_size) {
            self.check_size(declared)?;
        }
        let bytes = handle.download_media(wire).await?;
        let url = self.upload(session_id, bytes, provider_message_id, mime).await?;
        self.storage
            .attach_media(session_id, provider_message_id, &url, mime)
            .await?;
        Ok(url)
    }

    /// Run [`offload_inbound`](Self::offload_inbound) in the background, logging failures.
    pub fn spawn_inbound(
        self: &Arc<Self>,
        session_id: String,
        handle: Arc<dyn ProtocolHandle>,
        wire: WireMessage,
        provider_message_id: String,
        mime: Option<String>,
    ) -> JoinHandle<()> {
        let offloader = self.clone();
        tokio::spawn(async move {
            match offloader
                .offload_inbound(&session_id, handle.as_ref(), &wire, &provider_message_id, mime.as_deref())
                .await
            {
                Ok(url) => debug!(session_id = %session_id, message_id = %provider_message_id, url = %url, "media offloaded"),
                Err(e) => warn!(session_id = %session_id, message_id = %provider_message_id, error = %e, "media offload failed"),
            }
        })
    }

    /// Store bytes that were just sent. Failures are logged and yield `None`.
    pub async fn store_outbound(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        stem: &str,
        mime: Option<&str>,
    ) -> Option<String> {
        match self.upload(session_id, bytes, stem, mime).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(session_id, error = %e, "outbound media offload failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([200, 10, 10])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn png_and_jpeg_pass_through() {
        let png = encoded(ImageFormat::Png);
        let normalized = normalize_image(png.clone(), "image/png").unwrap();
        assert!(!normalized.converted);
        assert_eq!(normalized.data, png);
        assert_eq!(normalized.mimetype, "image/png");

        let jpeg = encoded(ImageFormat::Jpeg);
        assert!(!normalize_image(jpeg, "image/jpeg").unwrap().converted);
    }

    #[test]
    fn other_formats_become_jpeg() {
        let bmp = encoded(ImageFormat::Bmp);
        let normalized = normalize_image(bmp, "image/bmp").unwrap();
        assert!(normalized.converted);
        assert_eq!(normalized.mimetype, "image/jpeg");
        assert_eq!(image::guess_format(&normalized.data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn garbage_is_a_media_error() {
        let err = normalize_image(vec![1, 2, 3, 4], "image/webp").unwrap_err();
        assert!(matches!(err, PalaverError::Media { .. }));
    }

    #[test]
    fn extensions_ignore_mime_parameters() {
        assert_eq!(extension_for(Some("audio/ogg; codecs=opus")), "ogg");
        assert_eq!(extension_for(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for(None), "bin");
    }
}
