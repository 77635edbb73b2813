use chrono::{DateTime, NaiveDate, Utc};
use radar_models::memory::{MemoryRecord, Provenance};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::MemoryError;

/// Records are append-only; the outcome column may go from NULL to a label once.
pub const MEMORY_DDL: &str = "\
CREATE TABLE IF NOT EXISTS memory_records (
    id              TEXT PRIMARY KEY,
    embedding_json  TEXT NOT NULL,
    source_text     TEXT NOT NULL,
    outcome         TEXT,
    created_at      TEXT NOT NULL,
    run_id          TEXT NOT NULL,
    instrument      TEXT NOT NULL,
    as_of           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memory_records_created ON memory_records(created_at);

CREATE TRIGGER IF NOT EXISTS trg_memory_records_outcome_once
BEFORE UPDATE OF outcome ON memory_records
WHEN OLD.outcome IS NOT NULL
BEGIN
    SELECT RAISE(FAIL, 'outcome already recorded');
END;
";

/// Write-through persistence for the memory store.
pub struct MemoryDb {
    conn: Connection,
}

impl MemoryDb {
    pub fn open(path: &str) -> Result<Self, MemoryError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(MEMORY_DDL)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MEMORY_DDL)?;
        Ok(Self { conn })
    }

    /// Every stored record, oldest first.
    pub fn load_all(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, embedding_json, source_text, outcome, created_at, run_id, instrument, as_of \
             FROM memory_records ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                parse_uuid(row.get::<_, String>(0)?, 0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, DateTime<Utc>>(4)?,
                parse_uuid(row.get::<_, String>(5)?, 5)?,
                row.get::<_, String>(6)?,
                row.get::<_, NaiveDate>(7)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, embedding_json, source_text, outcome, created_at, run_id, instrument, as_of) =
                row?;
            records.push(MemoryRecord {
                id,
                embedding: serde_json::from_str(&embedding_json)?,
                source_text,
                outcome,
                created_at,
                provenance: Provenance {
                    run_id,
                    instrument,
                    as_of,
                },
            });
        }
        Ok(records)
    }

    pub fn insert(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let embedding_json = serde_json::to_string(&record.embedding)?;
        self.conn.execute(
            "INSERT INTO memory_records \
             (id, embedding_json, source_text, outcome, created_at, run_id, instrument, as_of) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                embedding_json,
                record.source_text,
                record.outcome,
                record.created_at,
                record.provenance.run_id.to_string(),
                record.provenance.instrument,
                record.provenance.as_of,
            ],
        )?;
        Ok(())
    }

    pub fn set_outcome(&self, id: Uuid, label: &str) -> Result<(), MemoryError> {
        let updated = self.conn.execute(
            "UPDATE memory_records SET outcome = ?2 WHERE id = ?1",
            params![id.to_string(), label],
        )?;
        if updated == 0 {
            return Err(MemoryError::NotFound(id));
        }
        Ok(())
    }

    pub fn delete(&self, ids: &[Uuid]) -> Result<usize, MemoryError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM memory_records WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }
}

fn parse_uuid(raw: String, column: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
