//! [`DocumentStore`] backed by SQLite.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::batch_repo::{self, BatchRow};
use super::document_repo::{self, DocumentRow, ExtractionRow};
use super::{Database, DatabaseError};
use crate::model::{
    BatchRecord, BatchStatus, CounterDelta, DocumentRecord, DocumentRef, DocumentStatus,
    ExtractionRecord,
};
use crate::store::{BatchInit, DocumentStore, StoreError};

#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

fn parse_opt_ts(id: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|v| parse_ts(id, v)).transpose()
}

fn to_json<T: Serialize>(value: Option<&T>) -> Result<Option<String>, StoreError> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

fn from_json<T: DeserializeOwned>(id: &str, value: Option<&str>) -> Result<Option<T>, StoreError> {
    value
        .map(|v| {
            serde_json::from_str(v).map_err(|e| StoreError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn batch_to_row(batch: &BatchRecord) -> BatchRow {
    BatchRow {
        id: batch.id.clone(),
        location: batch.location.clone(),
        prefix: batch.prefix.clone(),
        member_count: batch.member_count.map(to_i64),
        status: batch.status.as_str().to_string(),
        document_count: to_i64(batch.document_count),
        processed_count: to_i64(batch.processed_count),
        failed_count: to_i64(batch.failed_count),
        created_at: ts(batch.created_at),
        updated_at: ts(batch.updated_at),
        completed_at: batch.completed_at.map(ts),
    }
}

fn row_to_batch(row: BatchRow) -> Result<BatchRecord, StoreError> {
    let status = BatchStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
        id: row.id.clone(),
        reason: format!("unknown batch status '{}'", row.status),
    })?;
    Ok(BatchRecord {
        created_at: parse_ts(&row.id, &row.created_at)?,
        updated_at: parse_ts(&row.id, &row.updated_at)?,
        completed_at: parse_opt_ts(&row.id, row.completed_at.as_deref())?,
        member_count: row.member_count.map(to_u64),
        document_count: to_u64(row.document_count),
        processed_count: to_u64(row.processed_count),
        failed_count: to_u64(row.failed_count),
        status,
        location: row.location,
        prefix: row.prefix,
        id: row.id,
    })
}

fn document_to_row(doc: &DocumentRecord) -> Result<DocumentRow, StoreError> {
    Ok(DocumentRow {
        batch_id: doc.batch_id.clone(),
        id: doc.id.clone(),
        location: doc.source.location.clone(),
        object_name: doc.source.object_name.clone(),
        content_version: doc.source.content_version.clone(),
        status: doc.status.as_str().to_string(),
        classification: to_json(doc.classification.as_ref())?,
        extraction: to_json(doc.extraction.as_ref())?,
        error: to_json(doc.error.as_ref())?,
        leased_at: doc.leased_at.map(ts),
        completed_at: doc.completed_at.map(ts),
        updated_at: ts(doc.updated_at),
    })
}

fn row_to_document(row: DocumentRow) -> Result<DocumentRecord, StoreError> {
    let id = row.id.as_str();
    let status = DocumentStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("unknown document status '{}'", row.status),
    })?;
    Ok(DocumentRecord {
        id: row.id.clone(),
        batch_id: row.batch_id.clone(),
        source: DocumentRef {
            location: row.location.clone(),
            object_name: row.object_name.clone(),
            content_version: row.content_version.clone(),
        },
        status,
        classification: from_json(id, row.classification.as_deref())?,
        extraction: from_json(id, row.extraction.as_deref())?,
        error: from_json(id, row.error.as_deref())?,
        leased_at: parse_opt_ts(id, row.leased_at.as_deref())?,
        completed_at: parse_opt_ts(id, row.completed_at.as_deref())?,
        updated_at: parse_ts(id, &row.updated_at)?,
    })
}

impl DocumentStore for SqliteStore {
    fn ensure_batch(&self, batch: &BatchRecord) -> Result<BatchInit, StoreError> {
        let created = batch_repo::ensure(&self.db, &batch_to_row(batch))?;
        Ok(if created {
            BatchInit::Created
        } else {
            BatchInit::Refreshed
        })
    }

    fn get_batch(&self, batch_id: &str) -> Result<Option<BatchRecord>, StoreError> {
        batch_repo::find_by_id(&self.db, batch_id)?
            .map(row_to_batch)
            .transpose()
    }

    fn set_member_count(&self, batch_id: &str, member_count: u64) -> Result<(), StoreError> {
        let changed =
            batch_repo::set_member_count(&self.db, batch_id, to_i64(member_count), &ts(Utc::now()))?;
        if changed == 0 {
            return Err(StoreError::BatchNotFound(batch_id.to_string()));
        }
        Ok(())
    }

    fn complete_batch(
        &self,
        batch_id: &str,
        status: BatchStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(batch_repo::complete(
            &self.db,
            batch_id,
            status.as_str(),
            &ts(completed_at),
        )?)
    }

    fn increment_counters(&self, batch_id: &str, delta: CounterDelta) -> Result<(), StoreError> {
        let changed = batch_repo::increment_counters(
            &self.db,
            batch_id,
            delta.documents,
            delta.processed,
            delta.failed,
            &ts(Utc::now()),
        )?;
        if changed == 0 {
            return Err(StoreError::BatchNotFound(batch_id.to_string()));
        }
        Ok(())
    }

    fn get_document(
        &self,
        batch_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        document_repo::find(&self.db, batch_id, document_id)?
            .map(row_to_document)
            .transpose()
    }

    fn create_document(&self, record: &DocumentRecord) -> Result<bool, StoreError> {
        Ok(document_repo::insert_if_absent(
            &self.db,
            &document_to_row(record)?,
        )?)
    }

    fn merge_document(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        Ok(document_repo::upsert(&self.db, &document_to_row(record)?)?)
    }

    fn append_extraction(
        &self,
        batch_id: &str,
        record: &ExtractionRecord,
    ) -> Result<(), StoreError> {
        let row = ExtractionRow {
            batch_id: batch_id.to_string(),
            document_id: record.document_id.clone(),
            id: record.id.clone(),
            payload: serde_json::to_string(&record.extraction)?,
            created_at: ts(record.created_at),
        };
        Ok(document_repo::insert_extraction(&self.db, &row)?)
    }

    fn list_documents(&self, batch_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        document_repo::list_by_batch(&self.db, batch_id)?
            .into_iter()
            .map(row_to_document)
            .collect()
    }

    fn list_extractions(
        &self,
        batch_id: &str,
        document_id: &str,
    ) -> Result<Vec<ExtractionRecord>, StoreError> {
        document_repo::list_extractions(&self.db, batch_id, document_id)?
            .into_iter()
            .map(|row| {
                let extraction = from_json(&row.id, Some(&row.payload))?.ok_or_else(|| {
                    StoreError::Corrupt {
                        id: row.id.clone(),
                        reason: "empty extraction payload".to_string(),
                    }
                })?;
                Ok(ExtractionRecord {
                    created_at: parse_ts(&row.id, &row.created_at)?,
                    document_id: row.document_id,
                    id: row.id,
                    extraction,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Classification, DocumentError, ErrorKind, Extraction, FieldValue, PositionRef, Vertex,
    };

    fn store_with_batch() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .ensure_batch(&BatchRecord::new("b1", "inbox", "folio/", Utc::now()))
            .unwrap();
        store
    }

    fn leased(id: &str) -> DocumentRecord {
        DocumentRecord::leased(
            id,
            "b1",
            DocumentRef::new("inbox", "folio/a.pdf", Some("42")),
            Utc::now(),
        )
    }

    #[test]
    fn test_batch_round_trip() {
        let store = store_with_batch();
        store.set_member_count("b1", 4).unwrap();
        let batch = store.get_batch("b1").unwrap().unwrap();
        assert_eq!(batch.member_count, Some(4));
        assert_eq!(batch.status, BatchStatus::Processing);
        assert_eq!(batch.prefix, "folio/");
    }

    #[test]
    fn test_done_document_round_trip() {
        let store = store_with_batch();
        let mut record = leased("d1");
        assert!(store.create_document(&record).unwrap());

        let mut extraction = Extraction::fallback();
        extraction.metadata.degraded = false;
        extraction.metadata.processor_version = "ocr-2".to_string();
        extraction.fields.insert(
            "total".to_string(),
            FieldValue {
                value: "104.50".to_string(),
                confidence: 0.875,
                position_refs: vec![PositionRef {
                    page: 1,
                    bounding_box: vec![Vertex { x: 0.25, y: 0.5 }],
                }],
            },
        );
        record.mark_done(
            Classification::new("INVOICE", 0.75, "clf-3"),
            extraction.clone(),
            Utc::now(),
        );
        store.merge_document(&record).unwrap();
        store
            .append_extraction("b1", &ExtractionRecord::new("d1", extraction.clone(), Utc::now()))
            .unwrap();

        let stored = store.get_document("b1", "d1").unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Done);
        assert_eq!(stored.classification.unwrap().label, "INVOICE");
        assert_eq!(stored.extraction.as_ref(), Some(&extraction));
        assert_eq!(stored.source.content_version.as_deref(), Some("42"));

        let history = store.list_extractions("b1", "d1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].extraction, extraction);
    }

    #[test]
    fn test_failed_document_keeps_error() {
        let store = store_with_batch();
        let mut record = leased("d2");
        store.create_document(&record).unwrap();
        record.mark_failed(
            DocumentError::new(ErrorKind::InvalidDocument, "missing %PDF- header", 1),
            Utc::now(),
        );
        store.merge_document(&record).unwrap();

        let stored = store.get_document("b1", "d2").unwrap().unwrap();
        let error = stored.error.unwrap();
        assert_eq!(error.kind, ErrorKind::InvalidDocument);
        assert_eq!(error.attempts, 1);
    }

    #[test]
    fn test_counters_and_completion() {
        let store = store_with_batch();
        store
            .increment_counters("b1", CounterDelta::for_transition(None, DocumentStatus::Done))
            .unwrap();
        store
            .increment_counters(
                "b1",
                CounterDelta::for_transition(None, DocumentStatus::Failed),
            )
            .unwrap();
        assert!(store
            .complete_batch("b1", BatchStatus::DoneWithErrors, Utc::now())
            .unwrap());

        let batch = store.get_batch("b1").unwrap().unwrap();
        assert_eq!(
            (batch.document_count, batch.processed_count, batch.failed_count),
            (2, 1, 1)
        );
        assert_eq!(batch.status, BatchStatus::DoneWithErrors);
        assert!(batch.completed_at.is_some());
    }

    #[test]
    fn test_unknown_batch_counters() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.increment_counters("nope", CounterDelta::default()),
            Err(StoreError::BatchNotFound(_))
        ));
    }
}
