// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat address handling.
//!
//! Addresses take the form `user[:device]@server`. Personal chats use the
//! phone-number server, groups and broadcast lists have their own servers,
//! and the opaque alternate-identifier form lives on the `lid` server.

use std::fmt;

pub const USER_SERVER: &str = "s.whatsapp.net";
pub const LEGACY_USER_SERVER: &str = "c.us";
pub const GROUP_SERVER: &str = "g.us";
pub const BROADCAST_SERVER: &str = "broadcast";
pub const LID_SERVER: &str = "lid";
pub const NEWSLETTER_SERVER: &str = "newsletter";
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Classification of a chat address by its server part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// Stable phone-number-equivalent address.
    User,
    /// Opaque alternate identifier that needs resolving.
    Alternate,
    Group,
    Broadcast,
    Newsletter,
    Unknown,
}

/// A parsed chat address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid {
    pub user: String,
    pub device: Option<u16>,
    pub server: String,
}

impl Jid {
    /// Parse `user[:device]@server`. A missing server yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (user_part, server) = raw.trim().split_once('@')?;
        if server.is_empty() {
            return None;
        }
        let (user, device) = match user_part.split_once(':') {
            Some((user, device)) => (user, device.parse().ok()),
            None => (user_part, None),
        };
        Some(Self {
            user: user.to_string(),
            device,
            server: server.to_string(),
        })
    }

    pub fn kind(&self) -> AddressKind {
        match self.server.as_str() {
            USER_SERVER | LEGACY_USER_SERVER => AddressKind::User,
            LID_SERVER => AddressKind::Alternate,
            GROUP_SERVER => AddressKind::Group,
            BROADCAST_SERVER => AddressKind::Broadcast,
            NEWSLETTER_SERVER => AddressKind::Newsletter,
            _ => AddressKind::Unknown,
        }
    }

    /// The address without its device suffix, with legacy servers canonicalized.
    pub fn to_bare(&self) -> Jid {
        let server = if self.server == LEGACY_USER_SERVER {
            USER_SERVER.to_string()
        } else {
            self.server.clone()
        };
        Jid {
            user: self.user.clone(),
            device: None,
            server,
        }
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device {
            Some(device) => write!(f, "{}:{}@{}", self.user, device, self.server),
            None => write!(f, "{}@{}", self.user, self.server),
        }
    }
}

/// Classify a raw address string.
pub fn address_kind(raw: &str) -> AddressKind {
    Jid::parse(raw)
        .map(|jid| jid.kind())
        .unwrap_or(AddressKind::Unknown)
}

/// Broadcast lists and the status pseudo-chat.
pub fn is_broadcast(raw: &str) -> bool {
    raw == STATUS_BROADCAST || address_kind(raw) == AddressKind::Broadcast
}

pub fn is_group(raw: &str) -> bool {
    address_kind(raw) == AddressKind::Group
}

pub fn is_alternate(raw: &str) -> bool {
    address_kind(raw) == AddressKind::Alternate
}

/// Normalize a recipient into the canonical chat-address form.
///
/// Bare phone numbers (with or without `+`, spaces, or dashes) become
/// `<digits>@s.whatsapp.net`; full addresses lose their device suffix.
pub fn normalize_recipient(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.contains('@') {
        return Jid::parse(trimmed).map(|jid| jid.to_bare().to_string());
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("{digits}@{USER_SERVER}"))
}

/// The phone-number part of a stable user address.
pub fn phone_number_of(raw: &str) -> Option<String> {
    let jid = Jid::parse(raw)?;
    (jid.kind() == AddressKind::User).then_some(jid.user)
}
