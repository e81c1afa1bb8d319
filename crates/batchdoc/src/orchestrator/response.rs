//! What an invocation hands back to the delivery mechanism.

use serde::{Deserialize, Serialize};

use crate::error::BatchdocError;
use crate::model::BatchStatus;
use crate::worker::job::{DocumentOutcome, OutcomeStatus};

/// Result of one batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub batch_id: String,
    pub status: BatchStatus,
    pub document_count: usize,
    pub outcomes: Vec<DocumentOutcome>,
    /// Discovery stopped at `max_items`.
    pub truncated: bool,
    /// The batch deadline passed before every document finished.
    pub timed_out: bool,
}

impl BatchSummary {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_error()).count()
    }

    pub fn from_cache_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.from_cache).count()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Done,
    DoneWithErrors,
    NoFiles,
    /// The deadline passed first; the batch stays `processing`.
    Incomplete,
    /// The notification was not for a sentinel object.
    Ignored,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub stage: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<DocumentOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResponse {
    pub http_status: u16,
    pub body: ResponseBody,
}

impl InvocationResponse {
    pub fn from_summary(summary: &BatchSummary) -> Self {
        let status = if summary.document_count == 0 {
            ResponseStatus::NoFiles
        } else if summary.timed_out {
            ResponseStatus::Incomplete
        } else if summary.status == BatchStatus::DoneWithErrors {
            ResponseStatus::DoneWithErrors
        } else {
            ResponseStatus::Done
        };

        Self {
            http_status: 200,
            body: ResponseBody {
                batch_id: Some(summary.batch_id.clone()),
                status,
                document_count: Some(summary.document_count),
                results: Some(summary.outcomes.clone()),
                message: summary_message(summary),
                error: None,
            },
        }
    }

    pub fn ignored(object_name: &str) -> Self {
        Self {
            http_status: 200,
            body: ResponseBody {
                batch_id: None,
                status: ResponseStatus::Ignored,
                document_count: None,
                results: None,
                message: Some(format!("not a sentinel object: {}", object_name)),
                error: None,
            },
        }
    }

    /// 400 for a malformed trigger, 500 for anything else.
    pub fn error(batch_id: Option<&str>, error: &BatchdocError) -> Self {
        Self {
            http_status: if error.is_client_error() { 400 } else { 500 },
            body: ResponseBody {
                batch_id: batch_id.map(|id| id.to_string()),
                status: ResponseStatus::Error,
                document_count: None,
                results: None,
                message: None,
                error: Some(ErrorDetail {
                    stage: error.stage().to_string(),
                    code: error.code().to_string(),
                    message: error.to_string(),
                }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.http_status == 200
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.body)
    }
}

fn summary_message(summary: &BatchSummary) -> Option<String> {
    let mut notes = Vec::new();
    if summary.timed_out {
        notes.push(format!(
            "batch deadline elapsed with {} documents unfinished",
            summary.count(OutcomeStatus::TimedOut)
        ));
    }
    if summary.truncated {
        notes.push(format!(
            "discovery stopped at {} documents, the rest were not processed",
            summary.document_count
        ));
    }
    (!notes.is_empty()).then(|| notes.join("; "))
}
