//! Classification and extraction payloads returned by the document engines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_LABEL: &str = "UNKNOWN";
pub const EXTRACTION_SCHEMA_VERSION: &str = "v1.0";
pub const FALLBACK_PROCESSOR: &str = "fallback";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub label: String,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
    pub classifier_version: String,
    /// Set when the label was substituted after the classifier was unavailable
    /// or returned nothing.
    #[serde(default)]
    pub degraded: bool,
}

impl Classification {
    pub fn new(label: &str, confidence: f64, classifier_version: &str) -> Self {
        Self {
            label: label.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            classifier_version: classifier_version.to_string(),
            degraded: false,
        }
    }

    pub fn unknown(classifier_version: &str) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence: 0.0,
            classifier_version: classifier_version.to_string(),
            degraded: true,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRef {
    pub page: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding_box: Vec<Vertex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    pub value: String,
    pub confidence: f64,
    #[serde(default)]
    pub position_refs: Vec<PositionRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    pub page_count: u32,
    pub processor_version: String,
    pub schema_version: String,
    /// Set when the extractor was unavailable and an empty result was substituted.
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub fields: BTreeMap<String, FieldValue>,
    pub metadata: ExtractionMetadata,
}

impl Extraction {
    /// Empty extraction used when the extractor could not be reached.
    pub fn fallback() -> Self {
        Self {
            fields: BTreeMap::new(),
            metadata: ExtractionMetadata {
                page_count: 0,
                processor_version: FALLBACK_PROCESSOR.to_string(),
                schema_version: EXTRACTION_SCHEMA_VERSION.to_string(),
                degraded: true,
            },
        }
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata.degraded
    }
}

/// Immutable entry in a document's extraction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub id: String,
    pub document_id: String,
    pub extraction: Extraction,
    pub created_at: DateTime<Utc>,
}

impl ExtractionRecord {
    pub fn new(document_id: &str, extraction: Extraction, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("extraction-{}", now.format("%Y%m%dT%H%M%S%.6fZ")),
            document_id: document_id.to_string(),
            extraction,
            created_at: now,
        }
    }
}
