//! Per-document record, identity and error detail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::extraction::{Classification, Extraction};

/// Lifecycle status of a document record. A document with no record is new.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Leased,
    Done,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Leased => "leased",
            DocumentStatus::Done => "done",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "leased" => Some(DocumentStatus::Leased),
            "done" => Some(DocumentStatus::Done),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one physical object version in a storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub location: String,
    pub object_name: String,
    /// Opaque version marker such as a storage generation number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_version: Option<String>,
}

impl DocumentRef {
    pub fn new(location: &str, object_name: &str, content_version: Option<&str>) -> Self {
        Self {
            location: location.to_string(),
            object_name: object_name.to_string(),
            content_version: content_version.map(|v| v.to_string()),
        }
    }

    /// File identity within the location. The full object name, so files
    /// with the same base name in different subfolders stay distinct.
    pub fn file_id(&self) -> &str {
        self.object_name.trim_start_matches('/')
    }

    /// Fully qualified reference, e.g. `gs://bucket/folio/a.pdf`.
    pub fn uri(&self) -> String {
        format!(
            "{}/{}",
            self.location.trim_end_matches('/'),
            self.object_name.trim_start_matches('/')
        )
    }
}

/// Deterministic document id for a (batch, file, version) triple.
///
/// The same physical file version always maps to the same id, so a
/// redelivered trigger resolves to records that already exist.
pub fn document_id(batch_id: &str, file_id: &str, content_version: Option<&str>) -> String {
    let combined = match content_version {
        Some(version) if !version.is_empty() => format!("{}:{}:{}", batch_id, file_id, version),
        _ => format!("{}:{}", batch_id, file_id),
    };
    let digest = Sha256::digest(combined.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Kind of terminal per-document failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Failed structural validation; never retried.
    InvalidDocument,
    /// An adapter call failed after the retry budget or non-transiently.
    ProcessingFailed,
    /// The worker panicked or hit an unexpected internal condition.
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidDocument => "INVALID_DOCUMENT",
            ErrorKind::ProcessingFailed => "PROCESSING_FAILED",
            ErrorKind::Unexpected => "UNEXPECTED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentError {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

impl DocumentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts,
        }
    }
}

/// Durable state of one document within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub batch_id: String,
    pub source: DocumentRef,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Extraction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DocumentError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leased_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// A freshly leased record, as written when a worker claims a document.
    pub fn leased(id: &str, batch_id: &str, source: DocumentRef, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            batch_id: batch_id.to_string(),
            source,
            status: DocumentStatus::Leased,
            classification: None,
            extraction: None,
            error: None,
            leased_at: Some(now),
            completed_at: None,
            updated_at: now,
        }
    }

    /// Age of the current lease. A lease with no timestamp is treated as
    /// infinitely old; a timestamp in the future counts as zero age.
    pub fn lease_age(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let leased_at = self.leased_at?;
        Some((now - leased_at).to_std().unwrap_or_default())
    }

    /// Status the batch counters already reflect for this record. A lease
    /// taken over an earlier failure still carries that error, so it stays
    /// counted as failed until a terminal write moves it.
    pub fn counted_status(&self) -> DocumentStatus {
        match self.status {
            DocumentStatus::Leased if self.error.is_some() => DocumentStatus::Failed,
            status => status,
        }
    }

    pub fn mark_done(
        &mut self,
        classification: Classification,
        extraction: Extraction,
        now: DateTime<Utc>,
    ) {
        self.status = DocumentStatus::Done;
        self.classification = Some(classification);
        self.extraction = Some(extraction);
        self.error = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: DocumentError, now: DateTime<Utc>) {
        self.status = DocumentStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
