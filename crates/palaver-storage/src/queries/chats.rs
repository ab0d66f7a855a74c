// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat summary operations.

use palaver_core::types::{now_timestamp, ChatActivity, ChatSummary, Direction};
use palaver_core::PalaverError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::queries::parse_column;

const CHAT_COLUMNS: &str = "session_id, chat_jid, contact_name, phone_number, ai_enabled, \
     human_takeover, takeover_by, takeover_at, last_message_preview, last_message_direction, \
     last_message_at, assigned_to, assigned_at, unread_count, created_at, updated_at";

/// True when the incoming activity is not older than the stored last message.
/// Timestamps are fixed-width RFC 3339 text, so they compare as strings.
const NEWER_ACTIVITY: &str =
    "chats.last_message_at IS NULL OR excluded.last_message_at >= chats.last_message_at";

/// Previews longer than this are truncated on a character boundary.
const PREVIEW_CHARS: usize = 200;

fn chat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSummary> {
    let direction: Option<String> = row.get(9)?;
    Ok(ChatSummary {
        session_id: row.get(0)?,
        chat_jid: row.get(1)?,
        contact_name: row.get(2)?,
        phone_number: row.get(3)?,
        ai_enabled: row.get(4)?,
        human_takeover: row.get(5)?,
        takeover_by: row.get(6)?,
        takeover_at: row.get(7)?,
        last_message_preview: row.get(8)?,
        last_message_direction: direction
            .map(|d| parse_column::<Direction>(9, d))
            .transpose()?,
        last_message_at: row.get(10)?,
        assigned_to: row.get(11)?,
        assigned_at: row.get(12)?,
        unread_count: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn select_chat(
    conn: &rusqlite::Connection,
    session_id: &str,
    chat_jid: &str,
) -> rusqlite::Result<Option<ChatSummary>> {
    conn.query_row(
        &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE session_id = ?1 AND chat_jid = ?2"),
        params![session_id, chat_jid],
        chat_from_row,
    )
    .optional()
}

fn preview_of(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

pub async fn get_chat(
    db: &Database,
    session_id: &str,
    chat_jid: &str,
) -> Result<Option<ChatSummary>, PalaverError> {
    let (session_id, chat_jid) = (session_id.to_string(), chat_jid.to_string());
    db.connection()
        .call(move |conn| -> Result<Option<ChatSummary>, rusqlite::Error> {
            select_chat(conn, &session_id, &chat_jid)
        })
        .await
        .map_err(map_tr_err)
}

/// Create the chat on first contact, or fold new activity into it.
///
/// Contact name and phone fill in when known and never get cleared. Inbound
/// activity bumps the unread counter; outbound activity resets it. Activity
/// older than the stored last message (history sync) leaves the last-message
/// fields and the counter alone.
pub async fn upsert_chat_activity(
    db: &Database,
    activity: &ChatActivity,
) -> Result<ChatSummary, PalaverError> {
    let activity = activity.clone();
    let now = now_timestamp();
    let summary = db
        .connection()
        .call(move |conn| -> Result<Option<ChatSummary>, rusqlite::Error> {
            let unread = i64::from(activity.direction == Direction::Incoming);
            let sql = format!(
                "INSERT INTO chats (session_id, chat_jid, contact_name, phone_number,
                                    last_message_preview, last_message_direction, last_message_at,
                                    unread_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(session_id, chat_jid) DO UPDATE SET
                     contact_name = COALESCE(excluded.contact_name, chats.contact_name),
                     phone_number = COALESCE(excluded.phone_number, chats.phone_number),
                     last_message_preview = CASE WHEN {newer}
                         THEN excluded.last_message_preview ELSE chats.last_message_preview END,
                     last_message_direction = CASE WHEN {newer}
                         THEN excluded.last_message_direction ELSE chats.last_message_direction END,
                     unread_count = CASE WHEN NOT ({newer}) THEN chats.unread_count
                                         WHEN excluded.unread_count > 0
                                         THEN chats.unread_count + 1 ELSE 0 END,
                     last_message_at = CASE WHEN {newer}
                         THEN excluded.last_message_at ELSE chats.last_message_at END,
                     updated_at = excluded.updated_at",
                newer = NEWER_ACTIVITY
            );
            conn.execute(
                &sql,
                params![
                    activity.session_id,
                    activity.chat_jid,
                    activity.contact_name,
                    activity.phone_number,
                    preview_of(&activity.preview),
                    activity.direction.to_string(),
                    activity.at,
                    unread,
                    now,
                ],
            )?;
            select_chat(conn, &activity.session_id, &activity.chat_jid)
        })
        .await
        .map_err(map_tr_err)?;
    summary.ok_or_else(|| PalaverError::Internal("upserted chat vanished".into()))
}

/// All chats of a session, most recently active first.
pub async fn list_chats(db: &Database, session_id: &str) -> Result<Vec<ChatSummary>, PalaverError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ChatSummary>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAT_COLUMNS} FROM chats WHERE session_id = ?1
                 ORDER BY COALESCE(last_message_at, created_at) DESC, chat_jid ASC"
            ))?;
            let rows = stmt.query_map(params![session_id], chat_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

async fn update_chat(
    db: &Database,
    sql: &'static str,
    values: Vec<rusqlite::types::Value>,
) -> Result<bool, PalaverError> {
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(sql, rusqlite::params_from_iter(values))
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changed > 0)
}

fn text(value: &str) -> rusqlite::types::Value {
    rusqlite::types::Value::Text(value.to_string())
}

fn opt_text(value: Option<&str>) -> rusqlite::types::Value {
    value.map_or(rusqlite::types::Value::Null, text)
}

pub async fn set_chat_ai_enabled(
    db: &Database,
    session_id: &str,
    chat_jid: &str,
    enabled: bool,
) -> Result<bool, PalaverError> {
    update_chat(
        db,
        "UPDATE chats SET ai_enabled = ?1, updated_at = ?2
         WHERE session_id = ?3 AND chat_jid = ?4",
        vec![
            rusqlite::types::Value::Integer(i64::from(enabled)),
            text(&now_timestamp()),
            text(session_id),
            text(chat_jid),
        ],
    )
    .await
}

/// `Some(actor)` takes the chat over; `None` releases it and clears the actor.
pub async fn set_human_takeover(
    db: &Database,
    session_id: &str,
    chat_jid: &str,
    actor: Option<&str>,
) -> Result<bool, PalaverError> {
    update_chat(
        db,
        "UPDATE chats
         SET human_takeover = (?1 IS NOT NULL),
             takeover_by = ?1,
             takeover_at = CASE WHEN ?1 IS NULL THEN NULL ELSE ?2 END,
             updated_at = ?2
         WHERE session_id = ?3 AND chat_jid = ?4",
        vec![
            opt_text(actor),
            text(&now_timestamp()),
            text(session_id),
            text(chat_jid),
        ],
    )
    .await
}

pub async fn assign_chat(
    db: &Database,
    session_id: &str,
    chat_jid: &str,
    assignee: Option<&str>,
) -> Result<bool, PalaverError> {
    update_chat(
        db,
        "UPDATE chats
         SET assigned_to = ?1,
             assigned_at = CASE WHEN ?1 IS NULL THEN NULL ELSE ?2 END,
             updated_at = ?2
         WHERE session_id = ?3 AND chat_jid = ?4",
        vec![
            opt_text(assignee),
            text(&now_timestamp()),
            text(session_id),
            text(chat_jid),
        ],
    )
    .await
}

/// Delete a chat summary together with its history rows.
pub async fn delete_chat(db: &Database, session_id: &str, chat_jid: &str) -> Result<bool, PalaverError> {
    let (session_id, chat_jid) = (session_id.to_string(), chat_jid.to_string());
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chat_history WHERE session_id = ?1 AND chat_jid = ?2",
                params![session_id, chat_jid],
            )?;
            let removed = tx.execute(
                "DELETE FROM chats WHERE session_id = ?1 AND chat_jid = ?2",
                params![session_id, chat_jid],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}
