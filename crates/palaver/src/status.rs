// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `palaver sessions`, `palaver chats` and `palaver history`.
//!
//! Read-only views over the gateway database. `--json` prints the records
//! as stored; otherwise a compact table is printed, colored when stdout is
//! a terminal and `--plain` is not set.

use std::io::IsTerminal;

use palaver_core::types::{ChatSummary, DeviceRecord, Direction, HistoryEntry};
use palaver_core::{PalaverError, SessionStatus, StorageAdapter};
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> Result<(), PalaverError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn use_color(plain: bool) -> bool {
    !plain && std::io::stdout().is_terminal()
}

/// Cut `text` to `max` characters, marking the cut.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

/// Status padded to `width`, colored by severity.
fn status_cell(status: SessionStatus, width: usize, color: bool) -> String {
    let padded = format!("{:<width$}", status.to_string());
    if !color {
        return padded;
    }
    use colored::Colorize;
    match status {
        SessionStatus::Connected => padded.green().to_string(),
        SessionStatus::Connecting | SessionStatus::Synchronizing | SessionStatus::Reconnecting => {
            padded.yellow().to_string()
        }
        SessionStatus::AuthFailed
        | SessionStatus::LoggedOut
        | SessionStatus::Error
        | SessionStatus::Conflict => padded.red().to_string(),
        _ => padded.dimmed().to_string(),
    }
}

pub async fn run_sessions(
    storage: &dyn StorageAdapter,
    status: Option<SessionStatus>,
    json: bool,
    plain: bool,
) -> Result<(), PalaverError> {
    let devices = storage.list_devices(status).await?;
    if json {
        return print_json(&devices);
    }
    print!("{}", render_sessions(&devices, use_color(plain)));
    Ok(())
}

fn render_sessions(devices: &[DeviceRecord], color: bool) -> String {
    if devices.is_empty() {
        return "  no devices\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "  {:<24} {:<14} {:<16} {:<4} {}\n",
        "SESSION", "STATUS", "PHONE", "AI", "LAST ERROR"
    ));
    for device in devices {
        out.push_str(&format!(
            "  {:<24} {} {:<16} {:<4} {}\n",
            truncate(&device.session_id, 24),
            status_cell(device.status, 14, color),
            device.phone_number.as_deref().unwrap_or("-"),
            if device.ai_enabled { "on" } else { "off" },
            device.last_error.as_deref().map(|e| truncate(e, 40)).unwrap_or_default(),
        ));
    }
    out
}

pub async fn run_chats(
    storage: &dyn StorageAdapter,
    session_id: &str,
    json: bool,
    plain: bool,
) -> Result<(), PalaverError> {
    if storage.get_device(session_id).await?.is_none() {
        return Err(PalaverError::SessionNotFound(session_id.to_string()));
    }
    let chats = storage.list_chats(session_id).await?;
    if json {
        return print_json(&chats);
    }
    print!("{}", render_chats(&chats, use_color(plain)));
    Ok(())
}

fn chat_mode(chat: &ChatSummary) -> String {
    if chat.human_takeover {
        format!("human ({})", chat.takeover_by.as_deref().unwrap_or("?"))
    } else if chat.ai_enabled {
        "ai".to_string()
    } else {
        "off".to_string()
    }
}

fn render_chats(chats: &[ChatSummary], color: bool) -> String {
    if chats.is_empty() {
        return "  no chats\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "  {:<32} {:<20} {:<18} {:>6}  {}\n",
        "CHAT", "CONTACT", "MODE", "UNREAD", "LAST MESSAGE"
    ));
    for chat in chats {
        let mode = format!("{:<18}", truncate(&chat_mode(chat), 18));
        let mode = if color && chat.human_takeover {
            use colored::Colorize;
            mode.yellow().to_string()
        } else {
            mode
        };
        let arrow = match chat.last_message_direction {
            Some(Direction::Incoming) => "<",
            Some(Direction::Outgoing) => ">",
            None => " ",
        };
        out.push_str(&format!(
            "  {:<32} {:<20} {} {:>6}  {} {}\n",
            truncate(&chat.chat_jid, 32),
            truncate(chat.contact_name.as_deref().unwrap_or("-"), 20),
            mode,
            chat.unread_count,
            arrow,
            truncate(chat.last_message_preview.as_deref().unwrap_or(""), 48),
        ));
    }
    out
}

pub async fn run_history(
    storage: &dyn StorageAdapter,
    session_id: &str,
    chat_jid: &str,
    limit: usize,
    json: bool,
) -> Result<(), PalaverError> {
    if storage.get_chat(session_id, chat_jid).await?.is_none() {
        return Err(PalaverError::ChatNotFound {
            session_id: session_id.to_string(),
            chat_jid: chat_jid.to_string(),
        });
    }
    let history = storage.recent_history(session_id, chat_jid, limit).await?;
    if json {
        return print_json(&history);
    }
    print!("{}", render_history(&history));
    Ok(())
}

fn render_history(history: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in history {
        let who = match (entry.from_me, entry.is_ai_generated) {
            (true, true) => "ai",
            (true, false) => "me",
            (false, _) => "them",
        };
        let body = if entry.content.is_empty() {
            format!("[{}]", entry.message_type)
        } else {
            entry.content.clone()
        };
        let media = entry
            .media_url
            .as_deref()
            .map(|url| format!("  ({url})"))
            .unwrap_or_default();
        out.push_str(&format!("  {} {:>4}: {body}{media}\n", entry.timestamp, who));
    }
    out
}
