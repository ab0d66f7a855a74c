// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `palaver doctor` command implementation.
//!
//! Runs diagnostic checks against the configuration, the database, and the
//! blob directory. The database is opened read-only in spirit: no migrations
//! are applied and nothing is written.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use palaver_config::PalaverConfig;
use palaver_core::{PalaverError, SessionStatus};

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn finish(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `palaver doctor` command.
///
/// With `--deep`, also runs the SQLite integrity check.
pub async fn run_doctor(
    config: &PalaverConfig,
    config_path: Option<&Path>,
    deep: bool,
    plain: bool,
) -> Result<(), PalaverError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let db_path = config.storage.database_path.as_str();

    let mut results = vec![
        check_config(config_path).await,
        check_database(db_path).await,
        check_sessions(db_path).await,
        check_blob_dir(config).await,
    ];
    if deep {
        results.push(check_db_integrity(db_path).await);
    }

    println!();
    println!("  palaver doctor");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in &results {
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!("{}", render_line(result, use_color));
    }

    println!();
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
        if !deep {
            println!("  Run with --deep for detailed diagnostics.");
        }
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal().to_string()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow().to_string()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red().to_string()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<20} {} ({duration_ms}ms)", result.name, result.message)
    }
}

/// Check configuration loads without errors.
async fn check_config(path: Option<&Path>) -> CheckResult {
    let start = Instant::now();
    let loaded = match path {
        Some(path) => palaver_config::load_and_validate_path(path),
        None => palaver_config::load_and_validate(),
    };
    match loaded {
        Ok(_) => CheckResult::finish("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::finish(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Check the database file exists, opens, and carries the schema.
async fn check_database(db_path: &str) -> CheckResult {
    let start = Instant::now();
    if !Path::new(db_path).exists() {
        return CheckResult::finish(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        );
    }

    let conn = match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => conn,
        Err(e) => {
            return CheckResult::finish("Database", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };
    let tables = conn
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('devices', 'chats', 'chat_history')",
                [],
                |row| row.get(0),
            )
        })
        .await;
    match tables {
        Ok(3) => CheckResult::finish("Database", CheckStatus::Pass, "connected", start),
        Ok(_) => CheckResult::finish(
            "Database",
            CheckStatus::Warn,
            "schema incomplete (migrations run on next start)",
            start,
        ),
        Err(e) => CheckResult::finish("Database", CheckStatus::Fail, format!("query failed: {e}"), start),
    }
}

/// Summarize device states; devices stuck in a failure state are a warning.
async fn check_sessions(db_path: &str) -> CheckResult {
    let start = Instant::now();
    if !Path::new(db_path).exists() {
        return CheckResult::finish("Sessions", CheckStatus::Warn, "database not found (skipped)", start);
    }
    let conn = match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => conn,
        Err(e) => {
            return CheckResult::finish("Sessions", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };
    let rows = conn
        .call(|conn| -> Result<Vec<(String, i64)>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM devices GROUP BY status")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await;
    match rows {
        Ok(rows) => summarize_sessions(&rows, start),
        Err(e) => CheckResult::finish("Sessions", CheckStatus::Warn, format!("not readable: {e}"), start),
    }
}

fn summarize_sessions(rows: &[(String, i64)], start: Instant) -> CheckResult {
    let total: i64 = rows.iter().map(|(_, n)| n).sum();
    let failing: i64 = rows
        .iter()
        .filter(|(status, _)| {
            matches!(
                status.parse::<SessionStatus>(),
                Ok(SessionStatus::Error
                    | SessionStatus::AuthFailed
                    | SessionStatus::LoggedOut
                    | SessionStatus::Conflict)
            )
        })
        .map(|(_, n)| n)
        .sum();
    let connected: i64 = rows
        .iter()
        .filter(|(status, _)| status == "connected")
        .map(|(_, n)| n)
        .sum();

    if failing > 0 {
        CheckResult::finish(
            "Sessions",
            CheckStatus::Warn,
            format!("{failing} of {total} need attention (see `palaver sessions`)"),
            start,
        )
    } else {
        CheckResult::finish(
            "Sessions",
            CheckStatus::Pass,
            format!("{total} registered, {connected} connected"),
            start,
        )
    }
}

/// Check the blob directory is writable when media offload is on.
async fn check_blob_dir(config: &PalaverConfig) -> CheckResult {
    let start = Instant::now();
    if !config.media.offload_images {
        return CheckResult::finish("Blob store", CheckStatus::Pass, "offload disabled", start);
    }
    let dir = Path::new(&config.media.blob_dir);
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        return CheckResult::finish(
            "Blob store",
            CheckStatus::Fail,
            format!("cannot create {}: {e}", dir.display()),
            start,
        );
    }
    let marker = dir.join(".palaver-doctor-write-check");
    let written = tokio::fs::write(&marker, b"ok").await;
    let _ = tokio::fs::remove_file(&marker).await;
    match written {
        Ok(()) => CheckResult::finish("Blob store", CheckStatus::Pass, "writable", start),
        Err(e) => CheckResult::finish(
            "Blob store",
            CheckStatus::Fail,
            format!("{} not writable: {e}", dir.display()),
            start,
        ),
    }
}

/// Deep check: SQLite integrity check.
async fn check_db_integrity(db_path: &str) -> CheckResult {
    let start = Instant::now();
    if !Path::new(db_path).exists() {
        return CheckResult::finish(
            "DB integrity",
            CheckStatus::Warn,
            "database not found (skipped)",
            start,
        );
    }

    let conn = match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => conn,
        Err(e) => {
            return CheckResult::finish("DB integrity", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };
    let result = conn
        .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare("PRAGMA integrity_check")?;
            let rows: Vec<String> = stmt
                .query_map([], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
        .await;

    match result {
        Ok(rows) if rows.len() == 1 && rows[0] == "ok" => {
            CheckResult::finish("DB integrity", CheckStatus::Pass, "ok", start)
        }
        Ok(rows) => CheckResult::finish(
            "DB integrity",
            CheckStatus::Fail,
            format!("{} issue(s) found", rows.len()),
            start,
        ),
        Err(e) => CheckResult::finish("DB integrity", CheckStatus::Fail, format!("check failed: {e}"), start),
    }
}
