// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alternate-identifier to stable-address mappings.

use palaver_core::types::now_timestamp;
use palaver_core::PalaverError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

/// Record (or overwrite) the stable address behind an alternate identifier.
pub async fn save_address_mapping(
    db: &Database,
    session_id: &str,
    alternate: &str,
    stable: &str,
) -> Result<(), PalaverError> {
    let (session_id, alternate, stable) =
        (session_id.to_string(), alternate.to_string(), stable.to_string());
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO address_mappings (session_id, alternate_jid, stable_jid, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id, alternate_jid)
                 DO UPDATE SET stable_jid = excluded.stable_jid, updated_at = excluded.updated_at",
                params![session_id, alternate, stable, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn find_address_mapping(
    db: &Database,
    session_id: &str,
    alternate: &str,
) -> Result<Option<String>, PalaverError> {
    let (session_id, alternate) = (session_id.to_string(), alternate.to_string());
    db.connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT stable_jid FROM address_mappings
                 WHERE session_id = ?1 AND alternate_jid = ?2",
                params![session_id, alternate],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mapping_overwrites_and_is_session_scoped() {
        let db = Database::open(":memory:").await.unwrap();
        save_address_mapping(&db, "s1", "98765@lid", "111@s.whatsapp.net").await.unwrap();
        save_address_mapping(&db, "s1", "98765@lid", "222@s.whatsapp.net").await.unwrap();

        assert_eq!(
            find_address_mapping(&db, "s1", "98765@lid").await.unwrap().as_deref(),
            Some("222@s.whatsapp.net")
        );
        assert!(find_address_mapping(&db, "s2", "98765@lid").await.unwrap().is_none());
    }
}
