// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device record CRUD operations.

use palaver_core::types::{now_timestamp, DeviceRecord, NewDevice, SessionStatus, StatusUpdate};
use palaver_core::PalaverError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::queries::parse_column;

const DEVICE_COLUMNS: &str = "session_id, owner_id, display_name, status, ai_enabled, \
     phone_number, last_connected_at, last_error, archived_at, archive_reason, \
     business_context, created_at, updated_at";

fn device_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceRecord> {
    Ok(DeviceRecord {
        session_id: row.get(0)?,
        owner_id: row.get(1)?,
        display_name: row.get(2)?,
        status: parse_column(3, row.get(3)?)?,
        ai_enabled: row.get(4)?,
        phone_number: row.get(5)?,
        last_connected_at: row.get(6)?,
        last_error: row.get(7)?,
        archived_at: row.get(8)?,
        archive_reason: row.get(9)?,
        business_context: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn select_device(
    conn: &rusqlite::Connection,
    session_id: &str,
) -> rusqlite::Result<Option<DeviceRecord>> {
    conn.query_row(
        &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE session_id = ?1"),
        params![session_id],
        device_from_row,
    )
    .optional()
}

/// Insert a new device in `pending` status and return the stored record.
pub async fn create_device(db: &Database, device: &NewDevice) -> Result<DeviceRecord, PalaverError> {
    let device = device.clone();
    let now = now_timestamp();
    let created = db
        .connection()
        .call(move |conn| -> Result<Option<DeviceRecord>, rusqlite::Error> {
            conn.execute(
                "INSERT INTO devices (session_id, owner_id, display_name, status, ai_enabled,
                                      business_context, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    device.session_id,
                    device.owner_id,
                    device.display_name,
                    SessionStatus::Pending.to_string(),
                    device.ai_enabled,
                    device.business_context,
                    now,
                ],
            )?;
            select_device(conn, &device.session_id)
        })
        .await
        .map_err(map_tr_err)?;
    created.ok_or_else(|| PalaverError::Internal("inserted device vanished".into()))
}

pub async fn get_device(db: &Database, session_id: &str) -> Result<Option<DeviceRecord>, PalaverError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<DeviceRecord>, rusqlite::Error> {
            select_device(conn, &session_id)
        })
        .await
        .map_err(map_tr_err)
}

/// List devices, optionally filtered by status, oldest first.
pub async fn list_devices(
    db: &Database,
    status: Option<SessionStatus>,
) -> Result<Vec<DeviceRecord>, PalaverError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<DeviceRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY created_at ASC, session_id ASC"
            ))?;
            let rows = stmt.query_map(params![status], device_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Run a single-row device UPDATE; zero affected rows means the session is unknown.
async fn update_one(
    db: &Database,
    session_id: &str,
    sql: &'static str,
    values: Vec<rusqlite::types::Value>,
) -> Result<(), PalaverError> {
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(sql, rusqlite::params_from_iter(values))
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(PalaverError::SessionNotFound(session_id.to_string()));
    }
    Ok(())
}

/// Persist a status change. `mark_connected` stamps `last_connected_at`.
pub async fn update_device_status(
    db: &Database,
    session_id: &str,
    update: &StatusUpdate,
) -> Result<(), PalaverError> {
    use rusqlite::types::Value;
    update_one(
        db,
        session_id,
        "UPDATE devices
         SET status = ?1,
             last_error = ?2,
             last_connected_at = CASE WHEN ?3 THEN ?4 ELSE last_connected_at END,
             updated_at = ?4
         WHERE session_id = ?5",
        vec![
            Value::Text(update.status.to_string()),
            update.last_error.clone().map_or(Value::Null, Value::Text),
            Value::Integer(i64::from(update.mark_connected)),
            Value::Text(now_timestamp()),
            Value::Text(session_id.to_string()),
        ],
    )
    .await
}

pub async fn set_device_phone_number(
    db: &Database,
    session_id: &str,
    phone_number: Option<&str>,
) -> Result<(), PalaverError> {
    use rusqlite::types::Value;
    update_one(
        db,
        session_id,
        "UPDATE devices SET phone_number = ?1, updated_at = ?2 WHERE session_id = ?3",
        vec![
            phone_number.map_or(Value::Null, |p| Value::Text(p.to_string())),
            Value::Text(now_timestamp()),
            Value::Text(session_id.to_string()),
        ],
    )
    .await
}

pub async fn set_device_ai_enabled(
    db: &Database,
    session_id: &str,
    enabled: bool,
) -> Result<(), PalaverError> {
    use rusqlite::types::Value;
    update_one(
        db,
        session_id,
        "UPDATE devices SET ai_enabled = ?1, updated_at = ?2 WHERE session_id = ?3",
        vec![
            Value::Integer(i64::from(enabled)),
            Value::Text(now_timestamp()),
            Value::Text(session_id.to_string()),
        ],
    )
    .await
}

pub async fn archive_device(
    db: &Database,
    session_id: &str,
    reason: Option<&str>,
) -> Result<(), PalaverError> {
    use rusqlite::types::Value;
    update_one(
        db,
        session_id,
        "UPDATE devices
         SET status = ?1, archived_at = ?2, archive_reason = ?3, updated_at = ?2
         WHERE session_id = ?4",
        vec![
            Value::Text(SessionStatus::Archived.to_string()),
            Value::Text(now_timestamp()),
            reason.map_or(Value::Null, |r| Value::Text(r.to_string())),
            Value::Text(session_id.to_string()),
        ],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn new_device(id: &str) -> NewDevice {
        NewDevice {
            session_id: id.to_string(),
            owner_id: "owner-1".to_string(),
            display_name: Some("Front desk".to_string()),
            ai_enabled: true,
            business_context: None,
        }
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let (db, _dir) = setup_db().await;
        let device = create_device(&db, &new_device("s1")).await.unwrap();
        assert_eq!(device.status, SessionStatus::Pending);
        assert!(device.ai_enabled);
        assert_eq!(device.display_name.as_deref(), Some("Front desk"));
        assert!(device.last_connected_at.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_session_id_is_rejected() {
        let (db, _dir) = setup_db().await;
        create_device(&db, &new_device("dup")).await.unwrap();
        assert!(create_device(&db, &new_device("dup")).await.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_update_tracks_error_and_connection_time() {
        let (db, _dir) = setup_db().await;
        create_device(&db, &new_device("s1")).await.unwrap();

        update_device_status(
            &db,
            "s1",
            &StatusUpdate::new(SessionStatus::Error).with_error("QR scan timeout"),
        )
        .await
        .unwrap();
        let stored = get_device(&db, "s1").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Error);
        assert_eq!(stored.last_error.as_deref(), Some("QR scan timeout"));

        update_device_status(&db, "s1", &StatusUpdate::new(SessionStatus::Connected).connected())
            .await
            .unwrap();
        let stored = get_device(&db, "s1").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Connected);
        assert!(stored.last_error.is_none());
        assert!(stored.last_connected_at.is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn updating_unknown_session_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = update_device_status(&db, "ghost", &StatusUpdate::new(SessionStatus::Connecting))
            .await
            .unwrap_err();
        assert!(matches!(err, PalaverError::SessionNotFound(id) if id == "ghost"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let (db, _dir) = setup_db().await;
        create_device(&db, &new_device("a")).await.unwrap();
        create_device(&db, &new_device("b")).await.unwrap();
        archive_device(&db, "b", Some("churned")).await.unwrap();

        assert_eq!(list_devices(&db, None).await.unwrap().len(), 2);
        let archived = list_devices(&db, Some(SessionStatus::Archived)).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].session_id, "b");
        assert_eq!(archived[0].archive_reason.as_deref(), Some("churned"));
        assert!(archived[0].archived_at.is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn phone_and_ai_toggle_persist() {
        let (db, _dir) = setup_db().await;
        create_device(&db, &new_device("s1")).await.unwrap();
        set_device_phone_number(&db, "s1", Some("15550001111")).await.unwrap();
        set_device_ai_enabled(&db, "s1", false).await.unwrap();
        let stored = get_device(&db, "s1").await.unwrap().unwrap();
        assert_eq!(stored.phone_number.as_deref(), Some("15550001111"));
        assert!(!stored.ai_enabled);
        db.close().await.unwrap();
    }
}
