//! Interpreting a storage notification as a batch trigger.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TriggerError;
use crate::pipeline::PipelineConfig;
use crate::source::ObjectEntry;

/// Notification that an object was created. Missing fields deserialize as
/// empty strings and are rejected by [`parse_trigger`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub object_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
    /// Pre-supplied members; when present, listing is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<ObjectEntry>>,
}

impl TriggerEvent {
    pub fn new(location: &str, object_name: &str) -> Self {
        Self {
            location: location.to_string(),
            object_name: object_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_trigger_id(mut self, trigger_id: &str) -> Self {
        self.trigger_id = Some(trigger_id.to_string());
        self
    }

    pub fn with_members(mut self, members: Vec<ObjectEntry>) -> Self {
        self.members = Some(members);
        self
    }
}

/// A sentinel notification resolved to the batch it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTrigger {
    pub batch_id: String,
    pub location: String,
    /// Member prefix, empty or ending in `/`.
    pub prefix: String,
    pub sentinel_name: String,
    pub trigger_id: Option<String>,
    pub members: Option<Vec<ObjectEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAction {
    /// The object is not a sentinel; nothing to do.
    Ignore,
    Process(BatchTrigger),
}

pub fn parse_trigger(
    event: &TriggerEvent,
    config: &PipelineConfig,
) -> Result<TriggerAction, TriggerError> {
    let location = event.location.trim();
    if location.is_empty() {
        return Err(TriggerError::MissingLocation);
    }
    let object_name = event.object_name.trim();
    if object_name.is_empty() {
        return Err(TriggerError::MissingObjectName);
    }

    if object_name.ends_with('/') || !config.is_sentinel(object_name) {
        return Ok(TriggerAction::Ignore);
    }

    let prefix = sentinel_prefix(object_name);
    Ok(TriggerAction::Process(BatchTrigger {
        batch_id: derive_batch_id(&prefix),
        location: location.to_string(),
        prefix,
        sentinel_name: object_name.to_string(),
        trigger_id: event.trigger_id.clone(),
        members: event.members.clone(),
    }))
}

/// The folder part of a sentinel object name: `a/b/is_ready` -> `a/b/`.
pub fn sentinel_prefix(object_name: &str) -> String {
    match object_name.rsplit_once('/') {
        Some((folder, _)) => normalize_prefix(folder),
        None => String::new(),
    }
}

/// Trims whitespace and leading slashes; non-empty results end in `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_start_matches('/');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '/') {
        return String::new();
    }
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Deterministic for a non-empty prefix (its segments joined with `-`), so a
/// redelivered trigger lands on the same batch. Random otherwise.
pub fn derive_batch_id(prefix: &str) -> String {
    let segments: Vec<&str> = prefix
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        let suffix = Uuid::new_v4().simple().to_string();
        return format!("BATCH-{}", &suffix[..8]);
    }
    segments.join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(event: &TriggerEvent) -> BatchTrigger {
        match parse_trigger(event, &PipelineConfig::default()).unwrap() {
            TriggerAction::Process(trigger) => trigger,
            TriggerAction::Ignore => panic!("expected a batch trigger"),
        }
    }

    #[test]
    fn test_sentinel_resolves_to_batch() {
        let trigger = process(&TriggerEvent::new("inbox", "clients/acme/is_ready").with_trigger_id("evt-1"));
        assert_eq!(trigger.prefix, "clients/acme/");
        assert_eq!(trigger.batch_id, "clients-acme");
        assert_eq!(trigger.location, "inbox");
        assert_eq!(trigger.trigger_id.as_deref(), Some("evt-1"));
    }

    #[test]
    fn test_root_sentinel_gets_random_batch_id() {
        let first = process(&TriggerEvent::new("inbox", "is_ready"));
        let second = process(&TriggerEvent::new("inbox", "is_ready"));
        assert_eq!(first.prefix, "");
        assert!(first.batch_id.starts_with("BATCH-"));
        assert_eq!(first.batch_id.len(), "BATCH-".len() + 8);
        assert_ne!(first.batch_id, second.batch_id);
    }

    #[test]
    fn test_non_sentinel_is_ignored() {
        let config = PipelineConfig::default();
        for name in ["folio/a.pdf", "folio/is_ready.txt", "folio/not_is_ready", "folio/"] {
            let action = parse_trigger(&TriggerEvent::new("inbox", name), &config).unwrap();
            assert_eq!(action, TriggerAction::Ignore, "{}", name);
        }
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let config = PipelineConfig::default();
        assert_eq!(
            parse_trigger(&TriggerEvent::new("", "folio/is_ready"), &config),
            Err(TriggerError::MissingLocation)
        );
        assert_eq!(
            parse_trigger(&TriggerEvent::new("inbox", "  "), &config),
            Err(TriggerError::MissingObjectName)
        );
    }

    #[test]
    fn test_event_deserializes_with_missing_fields() {
        let event: TriggerEvent = serde_json::from_str(r#"{"objectName": "folio/is_ready"}"#).unwrap();
        assert_eq!(event.location, "");
        assert!(event.members.is_none());
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(" a/b "), "a/b/");
        assert_eq!(normalize_prefix("/a/b/"), "a/b/");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("//"), "");
    }

    #[test]
    fn test_batch_id_is_deterministic() {
        assert_eq!(derive_batch_id("2026/folio-17/"), "2026-folio-17");
        assert_eq!(derive_batch_id("2026/folio-17/"), derive_batch_id("2026/folio-17/"));
    }
}
