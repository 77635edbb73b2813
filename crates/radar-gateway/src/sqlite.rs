use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::GatewayError;
use crate::memory::CachedEntry;

/// Schema of the warm cache tier.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS tool_cache (
///     key           TEXT PRIMARY KEY,
///     payload_json  TEXT NOT NULL,
///     source        TEXT NOT NULL,
///     fetched_at    TEXT NOT NULL
/// );
/// ```
pub const TOOL_CACHE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS tool_cache (
    key           TEXT PRIMARY KEY,
    payload_json  TEXT NOT NULL,
    source        TEXT NOT NULL,
    fetched_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tool_cache_fetched ON tool_cache(fetched_at);
";

/// SQLite-backed warm tier. Survives restarts, so a process that comes up
/// while a provider is down can still serve stale fallbacks.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, GatewayError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(TOOL_CACHE_DDL)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, GatewayError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(TOOL_CACHE_DDL)?;
        Ok(Self { conn })
    }

    /// Get the entry for a key regardless of age. Freshness is the caller's call.
    pub fn get(&self, key: &str) -> Result<Option<CachedEntry>, GatewayError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT payload_json, source, fetched_at FROM tool_cache WHERE key = ?1",
        )?;

        let row = stmt
            .query_row(rusqlite::params![key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                ))
            })
            .optional()?;

        match row {
            Some((payload_json, source, fetched_at)) => Ok(Some(CachedEntry {
                payload: serde_json::from_str(&payload_json)?,
                fetched_at,
                source,
            })),
            None => Ok(None),
        }
    }

    pub fn upsert(&self, key: &str, entry: &CachedEntry) -> Result<(), GatewayError> {
        let payload_json = serde_json::to_string(&entry.payload)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO tool_cache (key, payload_json, source, fetched_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key, payload_json, entry.source, entry.fetched_at],
        )?;
        Ok(())
    }

    /// Delete entries fetched before `cutoff`. Returns the number removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, GatewayError> {
        let deleted = self.conn.execute(
            "DELETE FROM tool_cache WHERE fetched_at < ?1",
            rusqlite::params![cutoff],
        )?;
        Ok(deleted)
    }

    pub fn len(&self) -> Result<usize, GatewayError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tool_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, GatewayError> {
        Ok(self.len()? == 0)
    }
}
