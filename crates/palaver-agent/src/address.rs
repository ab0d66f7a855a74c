// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alternate-identifier resolution.
//!
//! Inbound chats may be addressed by an opaque `@lid` identifier instead
//! of the stable phone-number form. Resolution order: an inline hint on the
//! message key (persisted as a mapping), a stored mapping, and finally the
//! opaque identifier itself. Storage failures are logged and never block
//! ingestion.

use std::sync::Arc;

use palaver_core::jid::{self, Jid};
use palaver_core::protocol::MessageKey;
use palaver_core::StorageAdapter;
use tracing::{debug, warn};

/// How a chat address was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The address already was in stable form.
    Stable,
    /// Resolved through a hint carried on the message.
    InlineHint,
    /// Resolved through a previously stored mapping.
    StoredMapping,
    /// Could not be resolved; the opaque identifier is the contact key.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// Address used as the contact key.
    pub chat_jid: String,
    /// The wire address, when it differs from `chat_jid`.
    pub raw: Option<String>,
    pub resolution: Resolution,
}

pub struct AddressResolver {
    storage: Arc<dyn StorageAdapter>,
}

fn canonical(raw: &str) -> String {
    Jid::parse(raw)
        .map(|jid| jid.to_bare().to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

/// A hint is only usable when it is itself a stable address.
fn usable_hint(hint: Option<&str>) -> Option<String> {
    let hint = hint?;
    if jid::is_alternate(hint) {
        return None;
    }
    Jid::parse(hint)
        .filter(|j| j.kind() == jid::AddressKind::User)
        .map(|j| j.to_bare().to_string())
}

impl AddressResolver {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    pub async fn resolve(&self, session_id: &str, key: &MessageKey) -> ResolvedAddress {
        let raw = canonical(&key.remote_jid);
        if !jid::is_alternate(&raw) {
            return ResolvedAddress {
                chat_jid: raw,
                raw: None,
                resolution: Resolution::Stable,
            };
        }

        let hint = usable_hint(key.remote_jid_alt.as_deref())
            .or_else(|| usable_hint(key.sender_pn.as_deref()));
        if let Some(stable) = hint {
            if let Err(e) = self
                .storage
                .save_address_mapping(session_id, &raw, &stable)
                .await
            {
                warn!(session_id, alternate = %raw, error = %e, "failed to store address mapping");
            }
            debug!(session_id, alternate = %raw, stable = %stable, "resolved from inline hint");
            return ResolvedAddress {
                chat_jid: stable,
                raw: Some(raw),
                resolution: Resolution::InlineHint,
            };
        }

        match self.storage.find_address_mapping(session_id, &raw).await {
            Ok(Some(stable)) => {
                return ResolvedAddress {
                    chat_jid: stable,
                    raw: Some(raw),
                    resolution: Resolution::StoredMapping,
                };
            }
            Ok(None) => {}
            Err(e) => {
                warn!(session_id, alternate = %raw, error = %e, "address mapping lookup failed");
            }
        }

        debug!(session_id, alternate = %raw, "alternate address left unresolved");
        ResolvedAddress {
            chat_jid: raw,
            raw: None,
            resolution: Resolution::Unresolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_test_utils::temp_storage;

    fn key(remote: &str, alt: Option<&str>) -> MessageKey {
        MessageKey {
            remote_jid: remote.into(),
            remote_jid_alt: alt.map(str::to_string),
            ..MessageKey::default()
        }
    }

    #[tokio::test]
    async fn stable_addresses_pass_through_without_device_suffix() {
        let (storage, _dir) = temp_storage().await;
        let resolver = AddressResolver::new(storage);
        let resolved = resolver.resolve("s1", &key("555:7@s.whatsapp.net", None)).await;
        assert_eq!(resolved.chat_jid, "555@s.whatsapp.net");
        assert_eq!(resolved.resolution, Resolution::Stable);
    }

    #[tokio::test]
    async fn inline_hint_is_used_and_remembered() {
        let (storage, _dir) = temp_storage().await;
        let resolver = AddressResolver::new(storage.clone());

        let first = resolver
            .resolve("s1", &key("abc@lid", Some("555@s.whatsapp.net")))
            .await;
        assert_eq!(first.chat_jid, "555@s.whatsapp.net");
        assert_eq!(first.raw.as_deref(), Some("abc@lid"));
        assert_eq!(first.resolution, Resolution::InlineHint);

        let second = resolver.resolve("s1", &key("abc@lid", None)).await;
        assert_eq!(second.chat_jid, "555@s.whatsapp.net");
        assert_eq!(second.resolution, Resolution::StoredMapping);

        // Mappings are per session.
        let other = resolver.resolve("s2", &key("abc@lid", None)).await;
        assert_eq!(other.chat_jid, "abc@lid");
        assert_eq!(other.resolution, Resolution::Unresolved);
    }

    #[tokio::test]
    async fn sender_pn_hint_and_unusable_hints() {
        let (storage, _dir) = temp_storage().await;
        let resolver = AddressResolver::new(storage);

        let mut k = key("xyz@lid", Some("other@lid"));
        k.sender_pn = Some("777@s.whatsapp.net".into());
        assert_eq!(resolver.resolve("s1", &k).await.chat_jid, "777@s.whatsapp.net");

        let junk = resolver.resolve("s1", &key("q@lid", Some("not-an-address"))).await;
        assert_eq!(junk.chat_jid, "q@lid");
    }
}
