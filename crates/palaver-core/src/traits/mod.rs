// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for Palaver's external collaborators.
//!
//! Adapters that own a resource lifecycle extend the [`PluginAdapter`] base
//! trait. All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod auth;
pub mod blob;
pub mod campaign;
pub mod generator;
pub mod protocol;
pub mod storage;

pub use adapter::PluginAdapter;
pub use auth::KeyStore;
pub use blob::BlobStore;
pub use campaign::CampaignDirectory;
pub use generator::{ReplyGenerator, ReplyOutcome, ReplyRequest};
pub use protocol::{ProtocolClientFactory, ProtocolConnection, ProtocolHandle};
pub use storage::StorageAdapter;
