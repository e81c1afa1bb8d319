use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::model::{CounterDelta, DocumentRecord, DocumentStatus, ExtractionRecord};
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub persisted: bool,
    pub error: Option<String>,
}

impl PersistReport {
    fn ok() -> Self {
        Self {
            persisted: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            persisted: false,
            error: Some(error),
        }
    }
}

/// Writes terminal document state and rolls it up into the batch counters.
pub struct ResultPersister {
    store: Arc<dyn DocumentStore>,
}

impl ResultPersister {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persists a terminal record. `previous` is the status the document had
    /// before this run claimed it. Never fails; problems are reported on the
    /// returned [`PersistReport`].
    pub fn persist(
        &self,
        record: &DocumentRecord,
        previous: Option<DocumentStatus>,
    ) -> PersistReport {
        if let Err(e) = self.store.merge_document(record) {
            error!(status = %record.status, error = %e, "Failed to write document record");
            return PersistReport::failed(e.to_string());
        }

        if let Some(extraction) = record.extraction.as_ref().filter(|e| e.has_fields()) {
            let history = ExtractionRecord::new(&record.id, extraction.clone(), Utc::now());
            if let Err(e) = self.store.append_extraction(&record.batch_id, &history) {
                // The document record already carries the extraction.
                warn!(error = %e, "Failed to append extraction history");
            }
        }

        let delta = CounterDelta::for_transition(previous, record.status);
        if delta.is_zero() {
            return PersistReport::ok();
        }

        match self.store.increment_counters(&record.batch_id, delta) {
            Ok(()) => {
                debug!(
                    documents = delta.documents,
                    processed = delta.processed,
                    failed = delta.failed,
                    "Batch counters updated"
                );
                PersistReport::ok()
            }
            Err(e) => {
                error!(error = %e, "Failed to update batch counters");
                PersistReport::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BatchRecord, Classification, DocumentError, DocumentRef, ErrorKind, Extraction, FieldValue,
    };
    use crate::store::InMemoryStore;

    fn setup() -> (Arc<InMemoryStore>, ResultPersister) {
        let store = Arc::new(InMemoryStore::new());
        store
            .ensure_batch(&BatchRecord::new("b1", "inbox", "folio/", Utc::now()))
            .unwrap();
        (store.clone(), ResultPersister::new(store))
    }

    fn leased() -> DocumentRecord {
        DocumentRecord::leased(
            "d1",
            "b1",
            DocumentRef::new("inbox", "folio/a.pdf", Some("1")),
            Utc::now(),
        )
    }

    fn extraction_with_field() -> Extraction {
        let mut extraction = Extraction::fallback();
        extraction.metadata.degraded = false;
        extraction.fields.insert(
            "closing_balance".to_string(),
            FieldValue {
                value: "1200.00".to_string(),
                confidence: 0.5,
                position_refs: vec![],
            },
        );
        extraction
    }

    #[test]
    fn test_done_counts_and_appends_history() {
        let (store, persister) = setup();
        let mut record = leased();
        record.mark_done(
            Classification::new("BANK_STATEMENT", 0.9, "v1"),
            extraction_with_field(),
            Utc::now(),
        );

        let report = persister.persist(&record, None);
        assert!(report.persisted);

        let batch = store.get_batch("b1").unwrap().unwrap();
        assert_eq!(
            (batch.document_count, batch.processed_count, batch.failed_count),
            (1, 1, 0)
        );
        assert_eq!(store.list_extractions("b1", "d1").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_extraction_skips_history() {
        let (store, persister) = setup();
        let mut record = leased();
        record.mark_done(Classification::unknown("error"), Extraction::fallback(), Utc::now());

        assert!(persister.persist(&record, None).persisted);
        assert!(store.list_extractions("b1", "d1").unwrap().is_empty());
    }

    #[test]
    fn test_recovery_moves_failed_to_processed() {
        let (store, persister) = setup();
        let mut record = leased();
        record.mark_failed(
            DocumentError::new(ErrorKind::ProcessingFailed, "engine down", 3),
            Utc::now(),
        );
        persister.persist(&record, None);

        record.mark_done(
            Classification::new("BANK_STATEMENT", 0.9, "v1"),
            extraction_with_field(),
            Utc::now(),
        );
        persister.persist(&record, Some(DocumentStatus::Failed));

        let batch = store.get_batch("b1").unwrap().unwrap();
        assert_eq!(
            (batch.document_count, batch.processed_count, batch.failed_count),
            (1, 1, 0)
        );
        assert!(store.get_document("b1", "d1").unwrap().unwrap().error.is_none());
    }

    #[test]
    fn test_store_outage_is_reported_not_raised() {
        let (store, persister) = setup();
        store.set_offline(true);
        let mut record = leased();
        record.mark_failed(
            DocumentError::new(ErrorKind::InvalidDocument, "bad header", 1),
            Utc::now(),
        );

        let report = persister.persist(&record, None);
        assert!(!report.persisted);
        assert!(report.error.is_some());
    }
}
