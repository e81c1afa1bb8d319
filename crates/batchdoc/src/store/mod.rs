//! Durable record store for batches, documents and extraction history.
//!
//! Records are keyed hierarchically: `batches/{batch_id}` holds
//! `documents/{document_id}`, which holds `extractions/{extraction_id}`.
//! Every operation is a single atomic step on the backend; no caller ever
//! holds a lock across external I/O.

pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::DatabaseError;
use crate::model::{BatchRecord, BatchStatus, CounterDelta, DocumentRecord, ExtractionRecord};

pub use memory::InMemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Corrupt record '{id}': {reason}")]
    Corrupt { id: String, reason: String },
}

/// Outcome of [`DocumentStore::ensure_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchInit {
    Created,
    /// The batch already existed and was set back to `processing`.
    Refreshed,
}

pub trait DocumentStore: Send + Sync {
    /// Creates the batch if absent; otherwise refreshes its status to
    /// `processing` and bumps `updated_at`, keeping counters intact.
    fn ensure_batch(&self, batch: &BatchRecord) -> Result<BatchInit, StoreError>;

    fn get_batch(&self, batch_id: &str) -> Result<Option<BatchRecord>, StoreError>;

    fn set_member_count(&self, batch_id: &str, member_count: u64) -> Result<(), StoreError>;

    /// Writes a terminal status only if the batch is still `processing`.
    /// Returns whether the write happened.
    fn complete_batch(
        &self,
        batch_id: &str,
        status: BatchStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Applies a signed counter delta atomically.
    fn increment_counters(&self, batch_id: &str, delta: CounterDelta) -> Result<(), StoreError>;

    fn get_document(
        &self,
        batch_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, StoreError>;

    /// Inserts the record only if no document with that id exists. Returns
    /// `false` when another writer got there first.
    fn create_document(&self, record: &DocumentRecord) -> Result<bool, StoreError>;

    /// Upserts the record. An absent `leased_at` keeps the stored value.
    fn merge_document(&self, record: &DocumentRecord) -> Result<(), StoreError>;

    fn append_extraction(
        &self,
        batch_id: &str,
        record: &ExtractionRecord,
    ) -> Result<(), StoreError>;

    fn list_documents(&self, batch_id: &str) -> Result<Vec<DocumentRecord>, StoreError>;

    fn list_extractions(
        &self,
        batch_id: &str,
        document_id: &str,
    ) -> Result<Vec<ExtractionRecord>, StoreError>;
}
