// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed credential storage.

use std::collections::HashMap;

use palaver_core::traits::storage::AuthWrite;
use palaver_core::types::now_timestamp;
use palaver_core::PalaverError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Fetch the stored values for `ids` of one category. Missing ids are absent.
pub async fn auth_get(
    db: &Database,
    session_id: &str,
    category: &str,
    ids: &[String],
) -> Result<HashMap<String, String>, PalaverError> {
    let (session_id, category, ids) = (session_id.to_string(), category.to_string(), ids.to_vec());
    db.connection()
        .call(move |conn| -> Result<HashMap<String, String>, rusqlite::Error> {
            let mut stmt = conn.prepare_cached(
                "SELECT value FROM auth_keys
                 WHERE session_id = ?1 AND category = ?2 AND key_id = ?3",
            )?;
            let mut found = HashMap::with_capacity(ids.len());
            for id in ids {
                let mut rows = stmt.query(params![session_id, category, id])?;
                if let Some(row) = rows.next()? {
                    found.insert(id, row.get(0)?);
                }
            }
            Ok(found)
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a batch of writes atomically. `None` values delete their key.
pub async fn auth_set(
    db: &Database,
    session_id: &str,
    writes: Vec<AuthWrite>,
) -> Result<(), PalaverError> {
    if writes.is_empty() {
        return Ok(());
    }
    let session_id = session_id.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            for write in writes {
                match write.value {
                    Some(value) => {
                        tx.execute(
                            "INSERT INTO auth_keys (session_id, category, key_id, value, updated_at)
                             VALUES (?1, ?2, ?3, ?4, ?5)
                             ON CONFLICT(session_id, category, key_id)
                             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                            params![session_id, write.category, write.key_id, value, now],
                        )?;
                    }
                    None => {
                        tx.execute(
                            "DELETE FROM auth_keys
                             WHERE session_id = ?1 AND category = ?2 AND key_id = ?3",
                            params![session_id, write.category, write.key_id],
                        )?;
                    }
                }
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Remove every credential key of a session.
pub async fn auth_clear(db: &Database, session_id: &str) -> Result<(), PalaverError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM auth_keys WHERE session_id = ?1", params![session_id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
