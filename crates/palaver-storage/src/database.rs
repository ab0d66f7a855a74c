// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Query modules accept `&Database` and go through [`Database::connection`];
//! no other connection is opened for writes.

use std::path::Path;
use std::time::Duration;

use palaver_core::PalaverError;
use tracing::{debug, info};

use crate::migrations;

/// Map a tokio-rusqlite error onto the storage error variant.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> PalaverError {
    PalaverError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the Palaver SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database at `path` in WAL mode and run pending migrations.
    pub async fn open(path: &str) -> Result<Self, PalaverError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode explicitly.
    ///
    /// Parent directories are created as needed. `:memory:` is accepted.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, PalaverError> {
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(PalaverError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| PalaverError::Storage {
                source: Box::new(e),
            })?;

        let journal_mode = conn
            .call(
                move |conn| -> Result<Result<String, PalaverError>, rusqlite::Error> {
                    let mode = if wal_mode { "WAL" } else { "DELETE" };
                    let applied: String = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        mode,
                        |row| row.get(0),
                    )?;
                    conn.pragma_update(None, "synchronous", "NORMAL")?;
                    conn.pragma_update(None, "foreign_keys", true)?;
                    conn.busy_timeout(Duration::from_secs(5))?;
                    Ok(migrations::run_migrations(conn).map(|()| applied))
                },
            )
            .await
            .map_err(map_tr_err)??;

        info!(path, journal_mode = %journal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), PalaverError> {
        checkpoint(&self.conn).await?;
        self.conn.close().await.map_err(|e| PalaverError::Storage {
            source: Box::new(e),
        })?;
        debug!("database closed");
        Ok(())
    }
}

/// Fold the WAL back into the main database file.
pub(crate) async fn checkpoint(conn: &tokio_rusqlite::Connection) -> Result<(), PalaverError> {
    conn.call(|conn| -> Result<(), rusqlite::Error> {
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    })
    .await
    .map_err(map_tr_err)
}
