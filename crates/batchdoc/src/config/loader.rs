use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::PipelineSettings;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub const ENV_MAX_CONCURRENCY: &str = "BATCHDOC_MAX_CONCURRENCY";
pub const ENV_MAX_ITEMS: &str = "BATCHDOC_MAX_ITEMS";
pub const ENV_MAX_RETRIES: &str = "BATCHDOC_MAX_RETRIES";
pub const ENV_RETRY_INITIAL_DELAY: &str = "BATCHDOC_RETRY_INITIAL_DELAY";
pub const ENV_RETRY_MULTIPLIER: &str = "BATCHDOC_RETRY_MULTIPLIER";
pub const ENV_RETRY_MAX_DELAY: &str = "BATCHDOC_RETRY_MAX_DELAY";
pub const ENV_LEASE_STALE_SECS: &str = "BATCHDOC_LEASE_STALE_SECS";
pub const ENV_DEAD_LETTER_TOPIC: &str = "BATCHDOC_DEAD_LETTER_TOPIC";

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<PipelineSettings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<PipelineSettings, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let settings: PipelineSettings = serde_json::from_value(json_value)?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// Applies `BATCHDOC_*` environment variables on top of loaded settings.
pub fn apply_env_overrides(settings: &mut PipelineSettings) -> Result<(), ConfigError> {
    apply_env_overrides_with(settings, |name| std::env::var(name).ok())
}

/// Same as [`apply_env_overrides`] with an injectable variable lookup.
pub fn apply_env_overrides_with<F>(
    settings: &mut PipelineSettings,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
        settings.max_concurrency = parse_env(ENV_MAX_CONCURRENCY, &value)?;
    }
    if let Some(value) = lookup(ENV_MAX_ITEMS) {
        settings.max_items = parse_env(ENV_MAX_ITEMS, &value)?;
    }
    if let Some(value) = lookup(ENV_MAX_RETRIES) {
        settings.retry.max_attempts = parse_env(ENV_MAX_RETRIES, &value)?;
    }
    if let Some(value) = lookup(ENV_RETRY_INITIAL_DELAY) {
        settings.retry.initial_delay_secs = parse_env(ENV_RETRY_INITIAL_DELAY, &value)?;
    }
    if let Some(value) = lookup(ENV_RETRY_MULTIPLIER) {
        settings.retry.multiplier = parse_env(ENV_RETRY_MULTIPLIER, &value)?;
    }
    if let Some(value) = lookup(ENV_RETRY_MAX_DELAY) {
        settings.retry.max_delay_secs = parse_env(ENV_RETRY_MAX_DELAY, &value)?;
    }
    if let Some(value) = lookup(ENV_LEASE_STALE_SECS) {
        settings.lease.stale_after_secs = parse_env(ENV_LEASE_STALE_SECS, &value)?;
    }
    if let Some(value) = lookup(ENV_DEAD_LETTER_TOPIC) {
        settings.dead_letter.topic = value;
    }

    validate_settings(settings)
}

fn parse_env<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks the schema cannot express. Also run after env overrides.
pub fn validate_settings(settings: &PipelineSettings) -> Result<(), ConfigError> {
    if settings.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported settings version: {}", settings.version),
        });
    }

    if settings.max_concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "max_concurrency must be at least 1".to_string(),
        });
    }

    if settings.max_items == 0 {
        return Err(ConfigError::Validation {
            message: "max_items must be at least 1".to_string(),
        });
    }

    if settings.allowed_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "allowed_extensions must not be empty".to_string(),
        });
    }

    let retry = &settings.retry;
    if retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        return Err(ConfigError::Validation {
            message: format!("retry.multiplier must be >= 1.0, got {}", retry.multiplier),
        });
    }
    for (name, value) in [
        ("retry.initial_delay_secs", retry.initial_delay_secs),
        ("retry.max_delay_secs", retry.max_delay_secs),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation {
                message: format!("{} must be a non-negative number, got {}", name, value),
            });
        }
    }
    if retry.max_delay_secs < retry.initial_delay_secs {
        return Err(ConfigError::Validation {
            message: "retry.max_delay_secs must not be smaller than retry.initial_delay_secs"
                .to_string(),
        });
    }

    if settings.lease.stale_after_secs == 0 {
        return Err(ConfigError::Validation {
            message: "lease.stale_after_secs must be at least 1".to_string(),
        });
    }

    if let Err(e) = regex::Regex::new(&settings.sentinel_pattern) {
        return Err(ConfigError::InvalidPattern {
            pattern: settings.sentinel_pattern.clone(),
            reason: e.to_string(),
        });
    }

    Ok(())
}
