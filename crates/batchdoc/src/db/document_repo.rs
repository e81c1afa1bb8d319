//! Document and extraction-history repository.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw document row. JSON columns hold serialized model values.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub batch_id: String,
    pub id: String,
    pub location: String,
    pub object_name: String,
    pub content_version: Option<String>,
    pub status: String,
    pub classification: Option<String>,
    pub extraction: Option<String>,
    pub error: Option<String>,
    pub leased_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            batch_id: row.get("batch_id")?,
            id: row.get("id")?,
            location: row.get("location")?,
            object_name: row.get("object_name")?,
            content_version: row.get("content_version")?,
            status: row.get("status")?,
            classification: row.get("classification")?,
            extraction: row.get("extraction")?,
            error: row.get("error")?,
            leased_at: row.get("leased_at")?,
            completed_at: row.get("completed_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRow {
    pub batch_id: String,
    pub document_id: String,
    pub id: String,
    pub payload: String,
    pub created_at: String,
}

impl ExtractionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            batch_id: row.get("batch_id")?,
            document_id: row.get("document_id")?,
            id: row.get("id")?,
            payload: row.get("payload")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts the row unless the (batch, id) key already exists.
pub fn insert_if_absent(db: &Database, doc: &DocumentRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT INTO documents (batch_id, id, location, object_name, content_version, status,
             classification, extraction, error, leased_at, completed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(batch_id, id) DO NOTHING",
            params![
                doc.batch_id,
                doc.id,
                doc.location,
                doc.object_name,
                doc.content_version,
                doc.status,
                doc.classification,
                doc.extraction,
                doc.error,
                doc.leased_at,
                doc.completed_at,
                doc.updated_at,
            ],
        )?;
        Ok(inserted == 1)
    })
}

/// Inserts or overwrites the row. A NULL `leased_at` keeps the stored lease
/// timestamp.
pub fn upsert(db: &Database, doc: &DocumentRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (batch_id, id, location, object_name, content_version, status,
             classification, extraction, error, leased_at, completed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(batch_id, id) DO UPDATE SET
                location = excluded.location,
                object_name = excluded.object_name,
                content_version = excluded.content_version,
                status = excluded.status,
                classification = excluded.classification,
                extraction = excluded.extraction,
                error = excluded.error,
                leased_at = COALESCE(excluded.leased_at, documents.leased_at),
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at",
            params![
                doc.batch_id,
                doc.id,
                doc.location,
                doc.object_name,
                doc.content_version,
                doc.status,
                doc.classification,
                doc.extraction,
                doc.error,
                doc.leased_at,
                doc.completed_at,
                doc.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find(
    db: &Database,
    batch_id: &str,
    id: &str,
) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM documents WHERE batch_id = ?1 AND id = ?2",
                params![batch_id, id],
                DocumentRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn list_by_batch(db: &Database, batch_id: &str) -> Result<Vec<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM documents WHERE batch_id = ?1 ORDER BY object_name, id")?;
        let rows = stmt
            .query_map(params![batch_id], DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn insert_extraction(db: &Database, row: &ExtractionRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO extractions (batch_id, document_id, id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.batch_id,
                row.document_id,
                row.id,
                row.payload,
                row.created_at
            ],
        )?;
        Ok(())
    })
}

pub fn list_extractions(
    db: &Database,
    batch_id: &str,
    document_id: &str,
) -> Result<Vec<ExtractionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM extractions WHERE batch_id = ?1 AND document_id = ?2
             ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![batch_id, document_id], ExtractionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
