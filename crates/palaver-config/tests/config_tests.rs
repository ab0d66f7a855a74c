// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Palaver configuration system.

use palaver_config::diagnostic::{suggest_key, ConfigError};
use palaver_config::model::PalaverConfig;
use palaver_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_palaver_config() {
    let toml = r#"
[agent]
name = "edge-1"
log_level = "debug"

[storage]
database_path = "/tmp/test.db"
wal_mode = false

[connection]
max_qr_attempts = 5
max_reconnect_attempts = 4
backoff_base_ms = 250
backoff_max_ms = 10000

[reply]
enabled = false
history_window = 8
simulate_typing = false

[dispatch]
text_timeout_secs = 10
media_timeout_secs = 20
normalize_images = false

[media]
offload_images = false
path_prefix = "inbound"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "edge-1");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.connection.max_qr_attempts, 5);
    assert_eq!(config.connection.max_reconnect_attempts, 4);
    assert_eq!(config.connection.backoff_base().as_millis(), 250);
    assert_eq!(config.connection.backoff_max().as_secs(), 10);
    assert!(!config.reply.enabled);
    assert_eq!(config.reply.history_window, 8);
    assert!(!config.reply.simulate_typing);
    assert!(config.reply.mark_read);
    assert_eq!(config.dispatch.text_timeout().as_secs(), 10);
    assert_eq!(config.dispatch.media_timeout().as_secs(), 20);
    assert!(!config.dispatch.normalize_images);
    assert!(!config.media.offload_images);
    assert_eq!(config.media.path_prefix, "inbound");
}

#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "palaver");
    assert_eq!(config.agent.log_level, "info");
    assert!(config.storage.database_path.ends_with("palaver.db"));
    assert!(config.storage.wal_mode);
    assert_eq!(config.connection.max_qr_attempts, 3);
    assert_eq!(config.connection.max_reconnect_attempts, 10);
    assert_eq!(config.connection.backoff_base_ms, 1_000);
    assert_eq!(config.connection.backoff_max_ms, 300_000);
    assert_eq!(config.connection.restart_delay_ms, 1_000);
    assert_eq!(config.dispatch.text_timeout_secs, 30);
    assert_eq!(config.dispatch.media_timeout_secs, 60);
    assert!(config.dispatch.normalize_images);
    assert!(config.reply.enabled);
    assert!(config.media.offload_images);
}

#[test]
fn unknown_field_in_connection_produces_error() {
    let toml = r#"
[connection]
max_reconect_attempts = 3
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("max_reconect_attempts"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Figment dot-path overrides mirror what the `PALAVER_` env provider produces.
#[test]
fn dotted_override_replaces_toml_value() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: PalaverConfig = Figment::new()
        .merge(Serialized::defaults(PalaverConfig::default()))
        .merge(Toml::string("[reply]\nhistory_window = 5\n"))
        .merge(("reply.history_window", 12))
        .extract()
        .expect("should merge override");

    assert_eq!(config.reply.history_window, 12);
}

#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: PalaverConfig = Figment::new()
        .merge(Serialized::defaults(PalaverConfig::default()))
        .merge(Toml::file("/nonexistent/path/palaver.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.agent.name, "palaver");
}

#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[telemetry]
level = "debug"
"#;

    let err = load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("telemetry"),
        "error should mention unknown field, got: {err_str}"
    );
}

#[test]
fn diagnostic_typo_suggests_key() {
    let valid = &["enabled", "base_delay_ms", "history_window"];
    assert_eq!(
        suggest_key("histroy_window", valid),
        Some("history_window".to_string())
    );
}

#[test]
fn diagnostic_error_includes_unknown_key_and_suggestion() {
    let toml = r#"
[agent]
naem = "test"
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail");
    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                key,
                suggestion,
                valid_keys,
                ..
            } => Some((key.clone(), suggestion.clone(), valid_keys.clone())),
            _ => None,
        })
        .expect("should have an UnknownKey error");
    assert_eq!(unknown.0, "naem");
    assert_eq!(unknown.1.as_deref(), Some("name"));
    assert!(unknown.2.contains("log_level"));
}

#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[connection]
max_qr_attempts = "three"
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail");
    let err_str = format!("{}", errors[0]);
    assert!(
        err_str.contains("invalid type") || err_str.contains("max_qr_attempts"),
        "error should mention type mismatch, got: {err_str}"
    );
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "naem".to_string(),
        suggestion: Some("name".to_string()),
        valid_keys: "name, log_level".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("should have help text").to_string();
    assert!(help.contains("did you mean `name`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("naem"));
}

#[test]
fn load_and_validate_rejects_inverted_delays() {
    let toml = r#"
[reply]
min_delay_ms = 9000
max_delay_ms = 100
"#;

    let errors = load_and_validate_str(toml).expect_err("inverted bounds should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::Validation { message } if message.contains("reply.max_delay_ms")
    )));
}

#[test]
fn load_and_validate_reads_explicit_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("palaver.toml");
    std::fs::write(&path, "[agent]\nname = \"from-file\"\n").expect("write config");

    let config = load_and_validate_path(&path).expect("file config should validate");
    assert_eq!(config.agent.name, "from-file");
}

#[test]
#[serial_test::serial]
fn env_override_applies_to_file_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("palaver.toml");
    std::fs::write(&path, "[connection]\nmax_qr_attempts = 2\n").expect("write config");

    // SAFETY: serialized test; no other thread reads the environment concurrently.
    unsafe { std::env::set_var("PALAVER_CONNECTION_MAX_QR_ATTEMPTS", "7") };
    let result = load_and_validate_path(&path);
    unsafe { std::env::remove_var("PALAVER_CONNECTION_MAX_QR_ATTEMPTS") };

    let config = result.expect("env override should validate");
    assert_eq!(config.connection.max_qr_attempts, 7);
}
