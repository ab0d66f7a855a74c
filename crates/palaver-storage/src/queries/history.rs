// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat history operations with provider-id deduplication.
//!
//! A row is unique per (session, provider message id) when the id is known.
//! Re-recording the same id merges into the existing row:
//!
//! - `content`: first write wins, unless the stored content is empty
//! - `media_url` / `media_mime`: last non-null write wins
//! - `from_me` / `is_ai_generated`: sticky once set
//! - everything else keeps the stored value

use palaver_core::types::{HistoryEntry, HistoryWrite, NewHistoryEntry};
use palaver_core::PalaverError;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::database::{map_tr_err, Database};
use crate::queries::parse_column;

const HISTORY_COLUMNS: &str = "id, session_id, chat_jid, provider_message_id, direction, \
     message_type, content, media_url, media_mime, from_me, is_ai_generated, timestamp";

fn history_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get(0)?,
        session_id: row.get(1)?,
        chat_jid: row.get(2)?,
        provider_message_id: row.get(3)?,
        direction: parse_column(4, row.get(4)?)?,
        message_type: parse_column(5, row.get(5)?)?,
        content: row.get(6)?,
        media_url: row.get(7)?,
        media_mime: row.get(8)?,
        from_me: row.get(9)?,
        is_ai_generated: row.get(10)?,
        timestamp: row.get(11)?,
    })
}

fn select_by_provider_id(
    conn: &rusqlite::Connection,
    session_id: &str,
    provider_message_id: &str,
) -> rusqlite::Result<Option<HistoryEntry>> {
    conn.query_row(
        &format!(
            "SELECT {HISTORY_COLUMNS} FROM chat_history
             WHERE session_id = ?1 AND provider_message_id = ?2"
        ),
        params![session_id, provider_message_id],
        history_from_row,
    )
    .optional()
}

/// Apply the merge rule. Returns the merged row when anything changed.
pub(crate) fn merge(existing: &HistoryEntry, incoming: &NewHistoryEntry) -> Option<HistoryEntry> {
    let mut merged = existing.clone();

    if merged.content.is_empty() && !incoming.content.is_empty() {
        merged.content = incoming.content.clone();
    }
    if incoming.media_url.is_some() {
        merged.media_url = incoming.media_url.clone();
    }
    if incoming.media_mime.is_some() {
        merged.media_mime = incoming.media_mime.clone();
    }
    merged.from_me |= incoming.from_me;
    merged.is_ai_generated |= incoming.is_ai_generated;

    (merged != *existing).then_some(merged)
}

/// Insert a history row, or merge into the row sharing its provider id.
///
/// Lookup and write happen inside one transaction on the writer thread, so
/// concurrent records of the same id cannot both insert.
pub async fn record_history(
    db: &Database,
    entry: &NewHistoryEntry,
) -> Result<HistoryWrite, PalaverError> {
    let entry = entry.clone();
    let outcome = db
        .connection()
        .call(move |conn| -> Result<HistoryWrite, rusqlite::Error> {
            let tx = conn.transaction()?;
            let existing = match entry.provider_message_id.as_deref() {
                Some(id) => select_by_provider_id(&tx, &entry.session_id, id)?,
                None => None,
            };

            let outcome = match existing {
                None => {
                    tx.execute(
                        "INSERT INTO chat_history (session_id, chat_jid, provider_message_id,
                             direction, message_type, content, media_url, media_mime,
                             from_me, is_ai_generated, timestamp)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        params![
                            entry.session_id,
                            entry.chat_jid,
                            entry.provider_message_id,
                            entry.direction.to_string(),
                            entry.message_type.to_string(),
                            entry.content,
                            entry.media_url,
                            entry.media_mime,
                            entry.from_me,
                            entry.is_ai_generated,
                            entry.timestamp,
                        ],
                    )?;
                    HistoryWrite::Inserted(tx.last_insert_rowid())
                }
                Some(existing) => match merge(&existing, &entry) {
                    Some(merged) => {
                        tx.execute(
                            "UPDATE chat_history
                             SET content = ?1, media_url = ?2, media_mime = ?3,
                                 from_me = ?4, is_ai_generated = ?5
                             WHERE id = ?6",
                            params![
                                merged.content,
                                merged.media_url,
                                merged.media_mime,
                                merged.from_me,
                                merged.is_ai_generated,
                                merged.id,
                            ],
                        )?;
                        HistoryWrite::Enriched(merged.id)
                    }
                    None => HistoryWrite::Unchanged(existing.id),
                },
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)?;

    debug!(?outcome, "history recorded");
    Ok(outcome)
}

pub async fn find_history(
    db: &Database,
    session_id: &str,
    provider_message_id: &str,
) -> Result<Option<HistoryEntry>, PalaverError> {
    let (session_id, provider_message_id) =
        (session_id.to_string(), provider_message_id.to_string());
    db.connection()
        .call(move |conn| -> Result<Option<HistoryEntry>, rusqlite::Error> {
            select_by_provider_id(conn, &session_id, &provider_message_id)
        })
        .await
        .map_err(map_tr_err)
}

/// The last `limit` rows of a chat, returned oldest first.
pub async fn recent_history(
    db: &Database,
    session_id: &str,
    chat_jid: &str,
    limit: usize,
) -> Result<Vec<HistoryEntry>, PalaverError> {
    let (session_id, chat_jid) = (session_id.to_string(), chat_jid.to_string());
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<HistoryEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {HISTORY_COLUMNS} FROM (
                     SELECT {HISTORY_COLUMNS} FROM chat_history
                     WHERE session_id = ?1 AND chat_jid = ?2
                     ORDER BY id DESC LIMIT ?3
                 ) ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![session_id, chat_jid, limit], history_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Attach a media reference to the row with the given provider id.
pub async fn attach_media(
    db: &Database,
    session_id: &str,
    provider_message_id: &str,
    media_url: &str,
    media_mime: Option<&str>,
) -> Result<bool, PalaverError> {
    let (session_id, provider_message_id, media_url, media_mime) = (
        session_id.to_string(),
        provider_message_id.to_string(),
        media_url.to_string(),
        media_mime.map(str::to_string),
    );
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE chat_history
                 SET media_url = ?1, media_mime = COALESCE(?2, media_mime)
                 WHERE session_id = ?3 AND provider_message_id = ?4",
                params![media_url, media_mime, session_id, provider_message_id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changed > 0)
}
