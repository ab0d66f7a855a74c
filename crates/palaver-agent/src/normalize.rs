// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire payload normalization.
//!
//! The protocol client delivers loosely shaped JSON: timestamps as numbers,
//! numeric strings, or `{low, high}` pairs; text under `conversation` or
//! `extendedTextMessage`; media nodes wrapped in ephemeral or view-once
//! envelopes. Everything here runs once at the ingestion boundary.

use palaver_core::types::MessageType;
use serde_json::Value;

/// Envelopes whose `message` field holds the real payload.
const WRAPPERS: [&str; 5] = [
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
    "documentWithCaptionMessage",
];

/// The parts of a payload the pipeline cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub message_type: MessageType,
    /// Text body or media caption, possibly empty for media.
    pub text: String,
    pub mime: Option<String>,
}

/// Seconds since epoch from any of the timestamp shapes the client uses.
pub fn parse_timestamp(value: Option<&Value>) -> Option<i64> {
    parse_long(value)
}

/// A 64-bit integer sent as a number, a numeric string, or a `{low, high}` pair.
fn parse_long(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(obj) => {
            let low = obj.get("low")?.as_i64()?;
            let high = obj.get("high").and_then(Value::as_i64).unwrap_or(0);
            // `low` arrives as a signed 32-bit value.
            Some((high << 32) | (low & 0xFFFF_FFFF))
        }
        _ => None,
    }
}

/// Strip ephemeral and view-once envelopes.
pub fn unwrap_payload(message: &Value) -> &Value {
    let mut current = message;
    for _ in 0..4 {
        let inner = WRAPPERS
            .iter()
            .find_map(|key| current.get(key).and_then(|w| w.get("message")));
        match inner {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

fn string_at<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str)
}

fn media(node: &Value, message_type: MessageType, caption_key: &str) -> Classified {
    Classified {
        message_type,
        text: string_at(node, caption_key).unwrap_or_default().to_string(),
        mime: string_at(node, "mimetype").map(str::to_string),
    }
}

/// Media nodes that carry a downloadable payload.
const MEDIA_NODES: [&str; 5] = [
    "imageMessage",
    "videoMessage",
    "audioMessage",
    "documentMessage",
    "stickerMessage",
];

/// Payload size the sender declared in the media node's `fileLength`.
pub fn declared_size(message: &Value) -> Option<u64> {
    let payload = unwrap_payload(message);
    let node = MEDIA_NODES.iter().find_map(|key| payload.get(key))?;
    parse_long(node.get("fileLength")).and_then(|n| u64::try_from(n).ok())
}

/// Derive type, text, and mime from the payload shape.
///
/// Returns `None` for payloads that carry nothing to store: protocol and
/// reaction messages, unknown nodes, and empty text.
pub fn classify(message: &Value) -> Option<Classified> {
    let payload = unwrap_payload(message);

    if let Some(text) = string_at(payload, "conversation") {
        return non_empty_text(text);
    }
    if let Some(node) = payload.get("extendedTextMessage") {
        return non_empty_text(string_at(node, "text").unwrap_or_default());
    }
    if let Some(node) = payload.get("imageMessage") {
        return Some(media(node, MessageType::Image, "caption"));
    }
    if let Some(node) = payload.get("videoMessage") {
        return Some(media(node, MessageType::Video, "caption"));
    }
    if let Some(node) = payload.get("audioMessage") {
        return Some(media(node, MessageType::Audio, "caption"));
    }
    if let Some(node) = payload.get("documentMessage") {
        let mut doc = media(node, MessageType::Document, "caption");
        if doc.text.is_empty() {
            doc.text = string_at(node, "fileName").unwrap_or_default().to_string();
        }
        return Some(doc);
    }
    if let Some(node) = payload.get("stickerMessage") {
        return Some(media(node, MessageType::Sticker, "caption"));
    }
    None
}

fn non_empty_text(text: &str) -> Option<Classified> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(Classified {
        message_type: MessageType::Text,
        text: text.to_string(),
        mime: None,
    })
}

/// Short preview stored on the chat summary.
pub fn preview(message_type: MessageType, text: &str) -> String {
    if !text.is_empty() {
        return text.to_string();
    }
    match message_type {
        MessageType::Text => String::new(),
        MessageType::Image => "[image]".into(),
        MessageType::Video => "[video]".into(),
        MessageType::Audio => "[audio]".into(),
        MessageType::Document => "[document]".into(),
        MessageType::Sticker => "[sticker]".into(),
    }
}
