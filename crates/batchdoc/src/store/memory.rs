use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{BatchInit, DocumentStore, StoreError};
use crate::model::{
    BatchRecord, BatchStatus, CounterDelta, DocumentRecord, DocumentStatus, ExtractionRecord,
};

type DocKey = (String, String);

#[derive(Default)]
struct State {
    batches: HashMap<String, BatchRecord>,
    documents: BTreeMap<DocKey, DocumentRecord>,
    extractions: HashMap<DocKey, Vec<ExtractionRecord>>,
    done_writes: HashMap<DocKey, u32>,
}

/// Store kept entirely in process memory. Each operation holds the state
/// lock for its whole read-modify-write, which gives the same atomicity the
/// durable backends provide.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every operation fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of merges that wrote status `done` for a document.
    pub fn done_writes(&self, batch_id: &str, document_id: &str) -> u32 {
        self.state
            .lock()
            .map(|s| {
                s.done_writes
                    .get(&(batch_id.to_string(), document_id.to_string()))
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))
    }
}

fn key(batch_id: &str, document_id: &str) -> DocKey {
    (batch_id.to_string(), document_id.to_string())
}

fn apply_delta(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

impl DocumentStore for InMemoryStore {
    fn ensure_batch(&self, batch: &BatchRecord) -> Result<BatchInit, StoreError> {
        let mut state = self.lock()?;
        match state.batches.get_mut(&batch.id) {
            Some(existing) => {
                existing.status = BatchStatus::Processing;
                existing.completed_at = None;
                existing.updated_at = batch.updated_at;
                Ok(BatchInit::Refreshed)
            }
            None => {
                state.batches.insert(batch.id.clone(), batch.clone());
                Ok(BatchInit::Created)
            }
        }
    }

    fn get_batch(&self, batch_id: &str) -> Result<Option<BatchRecord>, StoreError> {
        Ok(self.lock()?.batches.get(batch_id).cloned())
    }

    fn set_member_count(&self, batch_id: &str, member_count: u64) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let batch = state
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))?;
        batch.member_count = Some(member_count);
        batch.updated_at = Utc::now();
        Ok(())
    }

    fn complete_batch(
        &self,
        batch_id: &str,
        status: BatchStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let batch = state
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))?;
        if batch.status != BatchStatus::Processing {
            return Ok(false);
        }
        batch.status = status;
        batch.completed_at = Some(completed_at);
        batch.updated_at = completed_at;
        Ok(true)
    }

    fn increment_counters(&self, batch_id: &str, delta: CounterDelta) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let batch = state
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))?;
        batch.document_count = apply_delta(batch.document_count, delta.documents);
        batch.processed_count = apply_delta(batch.processed_count, delta.processed);
        batch.failed_count = apply_delta(batch.failed_count, delta.failed);
        batch.updated_at = Utc::now();
        Ok(())
    }

    fn get_document(
        &self,
        batch_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self
            .lock()?
            .documents
            .get(&key(batch_id, document_id))
            .cloned())
    }

    fn create_document(&self, record: &DocumentRecord) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let k = key(&record.batch_id, &record.id);
        if state.documents.contains_key(&k) {
            return Ok(false);
        }
        state.documents.insert(k, record.clone());
        Ok(true)
    }

    fn merge_document(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let k = key(&record.batch_id, &record.id);
        let mut merged = record.clone();
        if merged.leased_at.is_none() {
            merged.leased_at = state.documents.get(&k).and_then(|d| d.leased_at);
        }
        if merged.status == DocumentStatus::Done {
            *state.done_writes.entry(k.clone()).or_insert(0) += 1;
        }
        state.documents.insert(k, merged);
        Ok(())
    }

    fn append_extraction(
        &self,
        batch_id: &str,
        record: &ExtractionRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state
            .extractions
            .entry(key(batch_id, &record.document_id))
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn list_documents(&self, batch_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        Ok(self
            .lock()?
            .documents
            .iter()
            .filter(|((b, _), _)| b == batch_id)
            .map(|(_, d)| d.clone())
            .collect())
    }

    fn list_extractions(
        &self,
        batch_id: &str,
        document_id: &str,
    ) -> Result<Vec<ExtractionRecord>, StoreError> {
        Ok(self
            .lock()?
            .extractions
            .get(&key(batch_id, document_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Classification, DocumentRef, Extraction};

    fn batch(id: &str) -> BatchRecord {
        BatchRecord::new(id, "inbox", "folio/", Utc::now())
    }

    fn leased(id: &str) -> DocumentRecord {
        DocumentRecord::leased(
            id,
            "b1",
            DocumentRef::new("inbox", "folio/a.pdf", Some("1")),
            Utc::now(),
        )
    }

    #[test]
    fn test_ensure_batch_refreshes_existing() {
        let store = InMemoryStore::new();
        assert_eq!(store.ensure_batch(&batch("b1")).unwrap(), BatchInit::Created);
        store
            .increment_counters(
                "b1",
                CounterDelta::for_transition(None, DocumentStatus::Done),
            )
            .unwrap();
        store
            .complete_batch("b1", BatchStatus::Done, Utc::now())
            .unwrap();

        assert_eq!(store.ensure_batch(&batch("b1")).unwrap(), BatchInit::Refreshed);
        let stored = store.get_batch("b1").unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Processing);
        assert_eq!(stored.processed_count, 1);
        assert!(stored.completed_at.is_none());
    }

    #[test]
    fn test_complete_batch_only_from_processing() {
        let store = InMemoryStore::new();
        store.ensure_batch(&batch("b1")).unwrap();
        assert!(store
            .complete_batch("b1", BatchStatus::DoneWithErrors, Utc::now())
            .unwrap());
        assert!(!store
            .complete_batch("b1", BatchStatus::Done, Utc::now())
            .unwrap());
        assert_eq!(
            store.get_batch("b1").unwrap().unwrap().status,
            BatchStatus::DoneWithErrors
        );
    }

    #[test]
    fn test_create_document_is_conditional() {
        let store = InMemoryStore::new();
        assert!(store.create_document(&leased("d1")).unwrap());
        assert!(!store.create_document(&leased("d1")).unwrap());
    }

    #[test]
    fn test_merge_keeps_lease_timestamp_and_counts_done_writes() {
        let store = InMemoryStore::new();
        let record = leased("d1");
        let leased_at = record.leased_at;
        store.create_document(&record).unwrap();

        let mut done = record.clone();
        done.leased_at = None;
        done.mark_done(
            Classification::new("INVOICE", 0.9, "v1"),
            Extraction::fallback(),
            Utc::now(),
        );
        store.merge_document(&done).unwrap();

        let stored = store.get_document("b1", "d1").unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Done);
        assert_eq!(stored.leased_at, leased_at);
        assert_eq!(store.done_writes("b1", "d1"), 1);
    }

    #[test]
    fn test_negative_delta_saturates() {
        let store = InMemoryStore::new();
        store.ensure_batch(&batch("b1")).unwrap();
        store
            .increment_counters(
                "b1",
                CounterDelta {
                    documents: 0,
                    processed: 1,
                    failed: -1,
                },
            )
            .unwrap();
        let stored = store.get_batch("b1").unwrap().unwrap();
        assert_eq!(stored.failed_count, 0);
        assert_eq!(stored.processed_count, 1);
    }

    #[test]
    fn test_offline_store_fails() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get_batch("b1"),
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(store.get_batch("b1").unwrap().is_none());
    }

    #[test]
    fn test_counters_on_missing_batch() {
        let store = InMemoryStore::new();
        let result = store.increment_counters("nope", CounterDelta::default());
        assert!(matches!(result, Err(StoreError::BatchNotFound(_))));
    }
}
