// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Palaver session gateway.
//!
//! This crate provides the error type, domain types, chat-address helpers,
//! and the trait contracts for every external collaborator: storage, the
//! chat-protocol client, the reply generator, the campaign directory, and
//! blob storage.

pub mod auth;
pub mod error;
pub mod jid;
pub mod protocol;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use auth::{AuthState, SharedCredentials};
pub use error::PalaverError;
pub use types::{AdapterType, HealthStatus, SessionStatus};

pub use traits::{
    BlobStore, CampaignDirectory, KeyStore, PluginAdapter, ProtocolClientFactory,
    ProtocolConnection, ProtocolHandle, ReplyGenerator, StorageAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palaver_error_has_all_variants() {
        let _config = PalaverError::Config("test".into());
        let _storage = PalaverError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _protocol = PalaverError::protocol("test");
        let _not_found = PalaverError::SessionNotFound("s".into());
        let _not_connected = PalaverError::SessionNotConnected("s".into());
        let _no_chat = PalaverError::ChatNotFound {
            session_id: "s".into(),
            chat_jid: "c".into(),
        };
        let _generator = PalaverError::Generator {
            message: "test".into(),
        };
        let _media = PalaverError::Media {
            message: "test".into(),
        };
        let _campaign = PalaverError::Campaign {
            message: "test".into(),
        };
        let _timeout = PalaverError::Timeout {
            duration: std::time::Duration::from_secs(1),
        };
        let _internal = PalaverError::Internal("test".into());
    }

    #[test]
    fn send_timeout_is_distinct() {
        let err = PalaverError::SendTimeout {
            duration: std::time::Duration::from_secs(30),
        };
        assert!(err.is_send_timeout());
        assert_eq!(err.to_string(), "send timeout after 30s");
        assert!(!PalaverError::Timeout {
            duration: std::time::Duration::from_secs(30)
        }
        .is_send_timeout());
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Storage,
            AdapterType::Protocol,
            AdapterType::Generator,
            AdapterType::Blob,
            AdapterType::Directory,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_storage<T: StorageAdapter>() {}
        fn _assert_protocol<T: ProtocolClientFactory>() {}
        fn _assert_handle<T: ProtocolHandle>() {}
        fn _assert_generator<T: ReplyGenerator>() {}
        fn _assert_blob<T: BlobStore>() {}
        fn _assert_campaign<T: CampaignDirectory>() {}
        fn _assert_keys<T: KeyStore>() {}
    }
}
