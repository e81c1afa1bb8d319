use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broadcast::document_progress::{
    DocumentPhase, DocumentProgressEvent, DocumentProgressTracker,
};

/// Events emitted by the document worker while it runs.
pub enum ProgressEvent {
    Phase {
        phase: DocumentPhase,
        message: String,
    },
    Completed {
        label: String,
        degraded: bool,
        from_cache: bool,
    },
    /// Terminal failure; `phase` is `Rejected` or `Failed`.
    Failed {
        phase: DocumentPhase,
        error: String,
    },
    Skipped {
        message: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Reporter that drops everything.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges worker events onto a [`DocumentProgressTracker`].
pub struct BroadcastProgress {
    tracker: DocumentProgressTracker,
}

impl BroadcastProgress {
    pub fn new(
        batch_id: &str,
        document_id: &str,
        file_name: &str,
        sender: Arc<broadcast::Sender<DocumentProgressEvent>>,
    ) -> Self {
        Self {
            tracker: DocumentProgressTracker::new(batch_id, document_id, file_name, sender),
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => {
                self.tracker.update_phase(phase, &message);
            }
            ProgressEvent::Completed {
                label,
                degraded,
                from_cache,
            } => {
                self.tracker.completed(&label, degraded, from_cache);
            }
            ProgressEvent::Failed { phase, error } => {
                self.tracker.failed(phase, &error);
            }
            ProgressEvent::Skipped { message } => {
                self.tracker.update_phase(DocumentPhase::Skipped, &message);
            }
        }
    }
}
