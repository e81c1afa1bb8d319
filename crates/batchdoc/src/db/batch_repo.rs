//! Batch repository: the `batches` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct BatchRow {
    pub id: String,
    pub location: String,
    pub prefix: String,
    pub member_count: Option<i64>,
    pub status: String,
    pub document_count: i64,
    pub processed_count: i64,
    pub failed_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl BatchRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            location: row.get("location")?,
            prefix: row.get("prefix")?,
            member_count: row.get("member_count")?,
            status: row.get("status")?,
            document_count: row.get("document_count")?,
            processed_count: row.get("processed_count")?,
            failed_count: row.get("failed_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Inserts the batch, or resets an existing one to `processing`. Returns
/// `true` when a new row was created. Both steps run under one lock.
pub fn ensure(db: &Database, batch: &BatchRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT INTO batches (id, location, prefix, member_count, status, document_count,
             processed_count, failed_count, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO NOTHING",
            params![
                batch.id,
                batch.location,
                batch.prefix,
                batch.member_count,
                batch.status,
                batch.document_count,
                batch.processed_count,
                batch.failed_count,
                batch.created_at,
                batch.updated_at,
                batch.completed_at,
            ],
        )?;
        if inserted == 1 {
            return Ok(true);
        }

        conn.execute(
            "UPDATE batches SET status = 'processing', completed_at = NULL, updated_at = ?2
             WHERE id = ?1",
            params![batch.id, batch.updated_at],
        )?;
        Ok(false)
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<BatchRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM batches WHERE id = ?1",
                params![id],
                BatchRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns the number of rows touched (0 when the batch does not exist).
pub fn set_member_count(
    db: &Database,
    id: &str,
    member_count: i64,
    updated_at: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE batches SET member_count = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, member_count, updated_at],
        )?;
        Ok(changed)
    })
}

/// Writes a terminal status only while the batch is `processing`.
pub fn complete(
    db: &Database,
    id: &str,
    status: &str,
    completed_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE batches SET status = ?2, completed_at = ?3, updated_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id, status, completed_at],
        )?;
        Ok(changed == 1)
    })
}

/// Applies signed counter deltas in a single statement. Counters never go
/// below zero.
pub fn increment_counters(
    db: &Database,
    id: &str,
    documents: i64,
    processed: i64,
    failed: i64,
    updated_at: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE batches SET
                document_count = MAX(document_count + ?2, 0),
                processed_count = MAX(processed_count + ?3, 0),
                failed_count = MAX(failed_count + ?4, 0),
                updated_at = ?5
             WHERE id = ?1",
            params![id, documents, processed, failed, updated_at],
        )?;
        Ok(changed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> BatchRow {
        BatchRow {
            id: id.to_string(),
            location: "inbox".to_string(),
            prefix: "folio/".to_string(),
            member_count: None,
            status: "processing".to_string(),
            document_count: 0,
            processed_count: 0,
            failed_count: 0,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn test_ensure_inserts_then_refreshes() {
        let db = Database::open_in_memory().unwrap();
        assert!(ensure(&db, &sample("b1")).unwrap());
        assert!(complete(&db, "b1", "done", "2026-01-01T01:00:00Z").unwrap());

        let mut again = sample("b1");
        again.updated_at = "2026-01-02T00:00:00Z".to_string();
        assert!(!ensure(&db, &again).unwrap());

        let row = find_by_id(&db, "b1").unwrap().unwrap();
        assert_eq!(row.status, "processing");
        assert!(row.completed_at.is_none());
        assert_eq!(row.updated_at, "2026-01-02T00:00:00Z");
        assert_eq!(row.created_at, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn test_complete_is_conditional() {
        let db = Database::open_in_memory().unwrap();
        ensure(&db, &sample("b1")).unwrap();
        assert!(complete(&db, "b1", "done_with_errors", "2026-01-01T01:00:00Z").unwrap());
        assert!(!complete(&db, "b1", "done", "2026-01-01T02:00:00Z").unwrap());
        assert_eq!(find_by_id(&db, "b1").unwrap().unwrap().status, "done_with_errors");
    }

    #[test]
    fn test_increment_counters() {
        let db = Database::open_in_memory().unwrap();
        ensure(&db, &sample("b1")).unwrap();
        increment_counters(&db, "b1", 1, 0, 1, "2026-01-01T00:00:01Z").unwrap();
        increment_counters(&db, "b1", 0, 1, -1, "2026-01-01T00:00:02Z").unwrap();

        let row = find_by_id(&db, "b1").unwrap().unwrap();
        assert_eq!(
            (row.document_count, row.processed_count, row.failed_count),
            (1, 1, 0)
        );
    }

    #[test]
    fn test_missing_batch_touches_nothing() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(
            increment_counters(&db, "nope", 1, 1, 0, "2026-01-01T00:00:00Z").unwrap(),
            0
        );
        assert!(find_by_id(&db, "nope").unwrap().is_none());
    }
}
