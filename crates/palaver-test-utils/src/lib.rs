// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Palaver integration tests.
//!
//! Provides mock collaborators and temp storage for fast, deterministic,
//! CI-runnable tests without a real chat-protocol client.
//!
//! # Components
//!
//! - [`MockProtocolFactory`] / [`MockHandle`] - protocol client with event injection and send capture
//! - [`MockGenerator`] - reply generator with queued outcomes
//! - [`MockCampaigns`] - campaign directory with switchable failure
//! - [`MemoryBlobStore`] - in-memory blob storage
//! - [`temp_storage`] - SQLite storage in a temp directory

pub mod memory_blob;
pub mod mock_campaigns;
pub mod mock_generator;
pub mod mock_protocol;
pub mod storage;

pub use memory_blob::MemoryBlobStore;
pub use mock_campaigns::MockCampaigns;
pub use mock_generator::MockGenerator;
pub use mock_protocol::{MockConnection, MockHandle, MockProtocolFactory};
pub use storage::{seed_device, temp_storage, wait_until};
