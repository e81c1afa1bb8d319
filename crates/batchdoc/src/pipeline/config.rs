use std::collections::BTreeSet;
use std::time::Duration;

use regex::Regex;

use crate::config::{PipelineSettings, StructuralCheck};
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Runtime view of [`PipelineSettings`], with patterns compiled and
/// durations resolved. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_concurrency: usize,
    pub max_items: usize,
    /// Lowercase extensions without the dot.
    pub allowed_extensions: BTreeSet<String>,
    pub sentinel_pattern: Regex,
    pub batch_timeout: Duration,
    pub retry: RetryPolicy,
    pub lease_stale_after: Duration,
    pub structural_check: StructuralCheck,
    pub dead_letter_topic: String,
}

impl PipelineConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, ConfigError> {
        let sentinel_pattern =
            Regex::new(&settings.sentinel_pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: settings.sentinel_pattern.clone(),
                reason: e.to_string(),
            })?;

        let retry = &settings.retry;
        let initial_delay = Duration::try_from_secs_f64(retry.initial_delay_secs).map_err(|e| {
            ConfigError::Validation {
                message: format!("retry.initial_delay_secs: {}", e),
            }
        })?;
        let max_delay =
            Duration::try_from_secs_f64(retry.max_delay_secs).map_err(|e| ConfigError::Validation {
                message: format!("retry.max_delay_secs: {}", e),
            })?;

        Ok(Self {
            max_concurrency: settings.max_concurrency.max(1),
            max_items: settings.max_items.max(1),
            allowed_extensions: settings
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            sentinel_pattern,
            batch_timeout: Duration::from_secs(settings.batch_timeout_secs),
            retry: RetryPolicy::new(retry.max_attempts, initial_delay, retry.multiplier, max_delay),
            lease_stale_after: Duration::from_secs(settings.lease.stale_after_secs),
            structural_check: settings.validation.structural_check,
            dead_letter_topic: settings.dead_letter.topic.clone(),
        })
    }

    /// Whether the object's base name marks a batch as ready.
    pub fn is_sentinel(&self, object_name: &str) -> bool {
        let base = object_name.rsplit('/').next().unwrap_or(object_name);
        self.sentinel_pattern.is_match(base)
    }

    /// Case-insensitive extension check.
    pub fn is_allowed(&self, object_name: &str) -> bool {
        let base = object_name.rsplit('/').next().unwrap_or(object_name);
        match base.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.allowed_extensions.contains(&ext.to_ascii_lowercase())
            }
            _ => false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
            .expect("default pipeline settings are valid")
    }
}
