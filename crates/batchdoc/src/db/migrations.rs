//! Schema migrations, tracked in a `_migrations` table and applied in order.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const CREATE_BATCHES: &str = "
CREATE TABLE IF NOT EXISTS batches (
    id TEXT PRIMARY KEY NOT NULL,
    location TEXT NOT NULL,
    prefix TEXT NOT NULL,
    member_count INTEGER,
    status TEXT NOT NULL DEFAULT 'processing',
    document_count INTEGER NOT NULL DEFAULT 0,
    processed_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);
";

const CREATE_DOCUMENTS: &str = "
CREATE TABLE IF NOT EXISTS documents (
    batch_id TEXT NOT NULL REFERENCES batches(id),
    id TEXT NOT NULL,
    location TEXT NOT NULL,
    object_name TEXT NOT NULL,
    content_version TEXT,
    status TEXT NOT NULL,
    classification TEXT,
    extraction TEXT,
    error TEXT,
    leased_at TEXT,
    completed_at TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (batch_id, id)
);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(batch_id, status);
";

const CREATE_EXTRACTIONS: &str = "
CREATE TABLE IF NOT EXISTS extractions (
    batch_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    id TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (batch_id, document_id, id),
    FOREIGN KEY (batch_id, document_id) REFERENCES documents(batch_id, id)
);
";

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_batches_table",
        sql: CREATE_BATCHES,
    },
    Migration {
        version: 2,
        description: "create_documents_table",
        sql: CREATE_DOCUMENTS,
    },
    Migration {
        version: 3,
        description: "create_extractions_table",
        sql: CREATE_EXTRACTIONS,
    },
];

pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}
