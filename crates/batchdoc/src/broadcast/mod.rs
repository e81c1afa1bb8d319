//! Real-time progress events for documents moving through a batch.

pub mod document_progress;

pub use document_progress::{
    DocumentPhase, DocumentProgressBroadcaster, DocumentProgressEvent, DocumentProgressTracker,
};
