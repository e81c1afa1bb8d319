//! Batch record and its aggregate counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::DocumentStatus;

/// Status of a batch run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Done,
    DoneWithErrors,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Done => "done",
            BatchStatus::DoneWithErrors => "done_with_errors",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(BatchStatus::Processing),
            "done" => Some(BatchStatus::Done),
            "done_with_errors" => Some(BatchStatus::DoneWithErrors),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Processing)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One triggered processing run over the documents under a prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: String,
    /// Storage location (bucket) the batch was discovered in.
    pub location: String,
    /// Member prefix, with trailing slash, or empty for the location root.
    pub prefix: String,
    /// Number of discovered members; unknown until discovery ran.
    pub member_count: Option<u64>,
    pub status: BatchStatus,
    pub document_count: u64,
    pub processed_count: u64,
    pub failed_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchRecord {
    pub fn new(id: &str, location: &str, prefix: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            location: location.to_string(),
            prefix: prefix.to_string(),
            member_count: None,
            status: BatchStatus::Processing,
            document_count: 0,
            processed_count: 0,
            failed_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Signed adjustment applied atomically to a batch's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub documents: i64,
    pub processed: i64,
    pub failed: i64,
}

impl CounterDelta {
    /// Counter movement for a document going from `previous` to `next`.
    ///
    /// A first terminal write counts the document once. A document that failed
    /// in an earlier run and now succeeds moves one unit from failed to
    /// processed, so redelivered batches never count a member twice.
    pub fn for_transition(previous: Option<DocumentStatus>, next: DocumentStatus) -> Self {
        match (previous, next) {
            (None | Some(DocumentStatus::Leased), DocumentStatus::Done) => Self {
                documents: 1,
                processed: 1,
                failed: 0,
            },
            (None | Some(DocumentStatus::Leased), DocumentStatus::Failed) => Self {
                documents: 1,
                processed: 0,
                failed: 1,
            },
            (Some(DocumentStatus::Failed), DocumentStatus::Done) => Self {
                documents: 0,
                processed: 1,
                failed: -1,
            },
            _ => Self::default(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.documents == 0 && self.processed == 0 && self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BatchStatus::Processing,
            BatchStatus::Done,
            BatchStatus::DoneWithErrors,
        ] {
            assert_eq!(BatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BatchStatus::parse("unknown"), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&BatchStatus::DoneWithErrors).unwrap();
        assert_eq!(json, "\"done_with_errors\"");
    }

    #[test]
    fn test_first_terminal_write_counts_document_once() {
        let done = CounterDelta::for_transition(None, DocumentStatus::Done);
        assert_eq!((done.documents, done.processed, done.failed), (1, 1, 0));

        let failed = CounterDelta::for_transition(Some(DocumentStatus::Leased), DocumentStatus::Failed);
        assert_eq!((failed.documents, failed.processed, failed.failed), (1, 0, 1));
    }

    #[test]
    fn test_recovered_document_moves_from_failed_to_processed() {
        let delta = CounterDelta::for_transition(Some(DocumentStatus::Failed), DocumentStatus::Done);
        assert_eq!((delta.documents, delta.processed, delta.failed), (0, 1, -1));
    }

    #[test]
    fn test_repeated_failure_does_not_count_again() {
        let delta =
            CounterDelta::for_transition(Some(DocumentStatus::Failed), DocumentStatus::Failed);
        assert!(delta.is_zero());
    }
}
