//! Document progress broadcaster, backed by a tokio broadcast channel so any
//! number of observers can follow a batch without slowing the workers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Stage a document is in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPhase {
    Queued,
    Leasing,
    Validating,
    Classifying,
    Extracting,
    Persisting,
    Completed,
    Rejected,
    Failed,
    /// Another worker holds a fresh lease.
    Skipped,
}

impl DocumentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentPhase::Completed
                | DocumentPhase::Rejected
                | DocumentPhase::Failed
                | DocumentPhase::Skipped
        )
    }
}

impl std::fmt::Display for DocumentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentPhase::Queued => write!(f, "Queued"),
            DocumentPhase::Leasing => write!(f, "Acquiring lease"),
            DocumentPhase::Validating => write!(f, "Validating"),
            DocumentPhase::Classifying => write!(f, "Classifying"),
            DocumentPhase::Extracting => write!(f, "Extracting"),
            DocumentPhase::Persisting => write!(f, "Persisting"),
            DocumentPhase::Completed => write!(f, "Completed"),
            DocumentPhase::Rejected => write!(f, "Rejected"),
            DocumentPhase::Failed => write!(f, "Failed"),
            DocumentPhase::Skipped => write!(f, "Skipped"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProgressEvent {
    pub batch_id: String,
    pub document_id: String,
    /// Base name of the object; never the full path.
    pub file_name: String,
    pub phase: DocumentPhase,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Classification label (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Set on completion when a degraded result was recorded.
    #[serde(default)]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentProgressEvent {
    pub fn new(
        batch_id: &str,
        document_id: &str,
        file_name: &str,
        phase: DocumentPhase,
        message: &str,
    ) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            phase,
            message: message.to_string(),
            timestamp: Utc::now(),
            label: None,
            degraded: false,
            error: None,
        }
    }
}

#[derive(Clone)]
pub struct DocumentProgressBroadcaster {
    sender: Arc<broadcast::Sender<DocumentProgressEvent>>,
}

impl DocumentProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: DocumentProgressEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentProgressEvent> {
        self.sender.subscribe()
    }

    /// Starts tracking a document and emits its `Queued` event.
    pub fn start_document(
        &self,
        batch_id: &str,
        document_id: &str,
        file_name: &str,
    ) -> DocumentProgressTracker {
        let tracker =
            DocumentProgressTracker::new(batch_id, document_id, file_name, Arc::clone(&self.sender));
        tracker.update_phase(DocumentPhase::Queued, "Document queued for processing");
        tracker
    }

    pub fn sender(&self) -> Arc<broadcast::Sender<DocumentProgressEvent>> {
        Arc::clone(&self.sender)
    }
}

impl Default for DocumentProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Emits events for a single document.
pub struct DocumentProgressTracker {
    batch_id: String,
    document_id: String,
    file_name: String,
    sender: Arc<broadcast::Sender<DocumentProgressEvent>>,
}

impl DocumentProgressTracker {
    pub fn new(
        batch_id: &str,
        document_id: &str,
        file_name: &str,
        sender: Arc<broadcast::Sender<DocumentProgressEvent>>,
    ) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            sender,
        }
    }

    fn event(&self, phase: DocumentPhase, message: &str) -> DocumentProgressEvent {
        DocumentProgressEvent::new(
            &self.batch_id,
            &self.document_id,
            &self.file_name,
            phase,
            message,
        )
    }

    pub fn update_phase(&self, phase: DocumentPhase, message: &str) {
        let _ = self.sender.send(self.event(phase, message));
    }

    pub fn completed(&self, label: &str, degraded: bool, from_cache: bool) {
        let message = if from_cache {
            "Result served from a previous run"
        } else {
            "Processing completed"
        };
        let mut event = self.event(DocumentPhase::Completed, message);
        event.label = Some(label.to_string());
        event.degraded = degraded;
        let _ = self.sender.send(event);
    }

    /// Terminal failure; `phase` is `Rejected` or `Failed`.
    pub fn failed(&self, phase: DocumentPhase, error: &str) {
        let mut event = self.event(phase, "Processing failed");
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }
}
