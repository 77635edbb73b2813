use std::cmp::Ordering;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use radar_models::memory::{MemoryMatch, MemoryRecord};
use tracing::{debug, info};
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::MemoryError;
use crate::sqlite::MemoryDb;

/// Maintenance policies for [`MemoryStore::prune`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrunePolicy {
    /// Drop records created longer ago than this.
    MaxAge(chrono::Duration),
    /// Keep only the newest `n` records.
    KeepNewest(usize),
}

/// Embedding-indexed store of past analyses.
///
/// Reads run concurrently under a `RwLock`. Appends, outcome updates and
/// prunes take the write lock, and with persistence enabled they write
/// through to SQLite before touching the in-memory index.
pub struct MemoryStore {
    dimension: usize,
    records: RwLock<Vec<MemoryRecord>>,
    db: Option<Mutex<MemoryDb>>,
}

impl MemoryStore {
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(Vec::new()),
            db: None,
        }
    }

    /// Open a SQLite-backed store and load every persisted record.
    pub fn open(path: &str, dimension: usize) -> Result<Self, MemoryError> {
        let db = MemoryDb::open(path)?;
        let records = db.load_all()?;
        for record in &records {
            check_dimension(dimension, &record.embedding)?;
        }
        info!(path, records = records.len(), "Opened memory store");
        Ok(Self {
            dimension,
            records: RwLock::new(records),
            db: Some(Mutex::new(db)),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The `k` most similar records, most similar first. Equal similarity
    /// prefers the newer record.
    pub fn query(&self, embedding: &[f32], k: usize) -> Result<MemoryMatches, MemoryError> {
        validate_embedding(self.dimension, embedding)?;
        let records = self.read()?;

        let mut matches: Vec<MemoryMatch> = records
            .iter()
            .map(|record| MemoryMatch {
                similarity: cosine_similarity(embedding, &record.embedding),
                record: record.clone(),
            })
            .collect();
        drop(records);

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        });
        matches.truncate(k);
        debug!(k, returned = matches.len(), "Memory query");

        Ok(MemoryMatches {
            inner: matches.into_iter(),
        })
    }

    pub fn append(&self, record: MemoryRecord) -> Result<Uuid, MemoryError> {
        validate_embedding(self.dimension, &record.embedding)?;
        let mut records = self.write()?;
        if let Some(db) = &self.db {
            self.lock_db(db)?.insert(&record)?;
        }
        let id = record.id;
        info!(
            record_id = %id,
            instrument = %record.provenance.instrument,
            run_id = %record.provenance.run_id,
            "Memory record appended"
        );
        records.push(record);
        Ok(id)
    }

    /// Attach the realised outcome to a record. Allowed exactly once.
    pub fn update_outcome(&self, id: Uuid, label: &str) -> Result<(), MemoryError> {
        let mut records = self.write()?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(MemoryError::NotFound(id))?;
        if record.outcome.is_some() {
            return Err(MemoryError::OutcomeAlreadyRecorded(id));
        }
        if let Some(db) = &self.db {
            self.lock_db(db)?.set_outcome(id, label)?;
        }
        record.outcome = Some(label.to_string());
        info!(record_id = %id, label, "Memory outcome recorded");
        Ok(())
    }

    /// Remove records per `policy`. Returns how many were removed.
    pub fn prune(&self, policy: PrunePolicy) -> Result<usize, MemoryError> {
        let mut records = self.write()?;

        let doomed: Vec<Uuid> = match policy {
            PrunePolicy::MaxAge(max_age) => {
                let cutoff = Utc::now() - max_age;
                records
                    .iter()
                    .filter(|r| r.created_at < cutoff)
                    .map(|r| r.id)
                    .collect()
            }
            PrunePolicy::KeepNewest(n) => {
                let mut by_age: Vec<&MemoryRecord> = records.iter().collect();
                by_age.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                by_age.iter().skip(n).map(|r| r.id).collect()
            }
        };

        if doomed.is_empty() {
            return Ok(0);
        }
        if let Some(db) = &self.db {
            self.lock_db(db)?.delete(&doomed)?;
        }
        records.retain(|r| !doomed.contains(&r.id));
        info!(removed = doomed.len(), ?policy, "Memory store pruned");
        Ok(doomed.len())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(self.read()?.iter().find(|r| r.id == id).cloned())
    }

    pub fn len(&self) -> Result<usize, MemoryError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<MemoryRecord>>, MemoryError> {
        self.records
            .read()
            .map_err(|e| MemoryError::Unavailable(format!("memory lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<MemoryRecord>>, MemoryError> {
        self.records
            .write()
            .map_err(|e| MemoryError::Unavailable(format!("memory lock poisoned: {e}")))
    }

    fn lock_db<'a>(
        &self,
        db: &'a Mutex<MemoryDb>,
    ) -> Result<std::sync::MutexGuard<'a, MemoryDb>, MemoryError> {
        db.lock()
            .map_err(|e| MemoryError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }
}

/// Result of a similarity query. Consuming and not restartable: run the
/// query again for a fresh pass.
#[derive(Debug)]
pub struct MemoryMatches {
    inner: std::vec::IntoIter<MemoryMatch>,
}

impl Iterator for MemoryMatches {
    type Item = MemoryMatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MemoryMatches {}

fn check_dimension(expected: usize, embedding: &[f32]) -> Result<(), MemoryError> {
    if embedding.len() != expected {
        return Err(MemoryError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}

fn validate_embedding(expected: usize, embedding: &[f32]) -> Result<(), MemoryError> {
    check_dimension(expected, embedding)?;
    if let Some(pos) = embedding.iter().position(|x| !x.is_finite()) {
        return Err(MemoryError::InvalidEmbedding(format!(
            "non-finite component at index {pos}"
        )));
    }
    Ok(())
}
