// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, ordered delay bounds, and non-zero limits.

use crate::diagnostic::ConfigError;
use crate::model::PalaverConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &PalaverConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.agent.log_level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "agent.log_level `{}` must be one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let conn = &config.connection;
    if conn.max_qr_attempts == 0 {
        fail("connection.max_qr_attempts must be at least 1".to_string());
    }
    if conn.backoff_base_ms == 0 {
        fail("connection.backoff_base_ms must be greater than 0".to_string());
    }
    if conn.backoff_max_ms < conn.backoff_base_ms {
        fail(format!(
            "connection.backoff_max_ms ({}) must not be below connection.backoff_base_ms ({})",
            conn.backoff_max_ms, conn.backoff_base_ms
        ));
    }

    let reply = &config.reply;
    if reply.max_delay_ms < reply.min_delay_ms {
        fail(format!(
            "reply.max_delay_ms ({}) must not be below reply.min_delay_ms ({})",
            reply.max_delay_ms, reply.min_delay_ms
        ));
    }

    if config.dispatch.text_timeout_secs == 0 {
        fail("dispatch.text_timeout_secs must be greater than 0".to_string());
    }
    if config.dispatch.media_timeout_secs == 0 {
        fail("dispatch.media_timeout_secs must be greater than 0".to_string());
    }

    if config.media.offload_images && config.media.blob_dir.trim().is_empty() {
        fail("media.blob_dir must not be empty when media.offload_images is set".to_string());
    }
    if config.media.max_media_bytes == 0 {
        fail("media.max_media_bytes must be greater than 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = PalaverConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = PalaverConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn inverted_reply_delays_fail_validation() {
        let mut config = PalaverConfig::default();
        config.reply.min_delay_ms = 5_000;
        config.reply.max_delay_ms = 1_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "reply.max_delay_ms"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = PalaverConfig::default();
        config.agent.log_level = "loud".to_string();
        config.connection.max_qr_attempts = 0;
        config.connection.backoff_base_ms = 0;
        config.dispatch.text_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(has_error(&errors, "log_level"));
        assert!(has_error(&errors, "max_qr_attempts"));
        assert!(has_error(&errors, "backoff_base_ms"));
        assert!(has_error(&errors, "text_timeout_secs"));
    }

    #[test]
    fn backoff_cap_below_base_fails() {
        let mut config = PalaverConfig::default();
        config.connection.backoff_base_ms = 2_000;
        config.connection.backoff_max_ms = 1_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "backoff_max_ms"));
    }

    #[test]
    fn unknown_field_in_connection_is_rejected() {
        let toml_str = r#"
[connection]
max_qr_attempt = 3
"#;
        let result = toml::from_str::<PalaverConfig>(toml_str);
        assert!(result.is_err());
    }
}
