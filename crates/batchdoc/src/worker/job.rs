use serde::{Deserialize, Serialize};

use crate::model::{document_id, Classification, DocumentError, DocumentRef, ErrorKind};

/// One document to process within a batch.
#[derive(Debug, Clone)]
pub struct DocumentJob {
    pub batch_id: String,
    pub document_id: String,
    pub source: DocumentRef,
}

impl DocumentJob {
    pub fn new(batch_id: &str, source: DocumentRef) -> Self {
        let id = document_id(batch_id, source.file_id(), source.content_version.as_deref());
        Self {
            batch_id: batch_id.to_string(),
            document_id: id,
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Done,
    Failed,
    /// Failed structural validation.
    Rejected,
    /// Another worker holds a fresh lease; neither done nor failed.
    Skipped,
    /// The batch deadline passed first. The lease goes stale and a later
    /// trigger finishes the document.
    TimedOut,
}

impl OutcomeStatus {
    /// Whether this outcome makes the batch `done_with_errors`.
    pub fn is_error(&self) -> bool {
        matches!(self, OutcomeStatus::Failed | OutcomeStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub document_id: String,
    pub object_name: String,
    pub uri: String,
    pub status: OutcomeStatus,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub extraction_degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DocumentError>,
    /// False when the result could not be written to the store.
    pub persisted: bool,
}

impl DocumentOutcome {
    fn base(job: &DocumentJob, status: OutcomeStatus) -> Self {
        Self {
            document_id: job.document_id.clone(),
            object_name: job.source.object_name.clone(),
            uri: job.source.uri(),
            status,
            from_cache: false,
            classification: None,
            extraction_degraded: false,
            error: None,
            persisted: true,
        }
    }

    pub fn done(job: &DocumentJob, classification: Classification, extraction_degraded: bool) -> Self {
        Self {
            classification: Some(classification),
            extraction_degraded,
            ..Self::base(job, OutcomeStatus::Done)
        }
    }

    pub fn cached(job: &DocumentJob, classification: Option<Classification>, extraction_degraded: bool) -> Self {
        Self {
            from_cache: true,
            classification,
            extraction_degraded,
            ..Self::base(job, OutcomeStatus::Done)
        }
    }

    pub fn failed(job: &DocumentJob, error: DocumentError) -> Self {
        let status = match error.kind {
            ErrorKind::InvalidDocument => OutcomeStatus::Rejected,
            _ => OutcomeStatus::Failed,
        };
        Self {
            error: Some(error),
            ..Self::base(job, status)
        }
    }

    pub fn skipped(job: &DocumentJob) -> Self {
        Self::base(job, OutcomeStatus::Skipped)
    }

    /// Nothing was written for this document by the collecting side.
    pub fn timed_out(job: &DocumentJob) -> Self {
        Self {
            persisted: false,
            ..Self::base(job, OutcomeStatus::TimedOut)
        }
    }

    pub fn with_persisted(mut self, persisted: bool) -> Self {
        self.persisted = persisted;
        self
    }
}
