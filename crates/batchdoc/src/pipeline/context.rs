use crate::adapters::AdapterCall;
use crate::model::{Classification, DocumentStatus, Extraction};
use crate::worker::job::DocumentJob;

/// State carried through one document's stages.
pub struct DocumentContext {
    pub job: DocumentJob,

    /// Status found before this run claimed the document.
    pub previous: Option<DocumentStatus>,

    /// Set after the classify stage.
    pub classification: Option<AdapterCall<Classification>>,

    /// Set after the extract stage.
    pub extraction: Option<AdapterCall<Extraction>>,
}

impl DocumentContext {
    pub fn new(job: DocumentJob) -> Self {
        Self {
            job,
            previous: None,
            classification: None,
            extraction: None,
        }
    }

    /// Attempts spent in the adapter stages so far.
    pub fn attempts(&self) -> u32 {
        self.classification.as_ref().map_or(0, |c| c.attempts)
            + self.extraction.as_ref().map_or(0, |e| e.attempts)
    }

    pub fn is_degraded(&self) -> bool {
        self.classification
            .as_ref()
            .is_some_and(|c| c.is_degraded())
            || self.extraction.as_ref().is_some_and(|e| e.is_degraded())
    }
}
