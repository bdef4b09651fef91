//! StateStore — redb-backed state persistence for Surge.
//!
//! Provides typed operations over workloads, utilization samples and
//! decision history. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing and `--ephemeral` daemons).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Disambiguates decisions recorded within the same millisecond.
    decision_seq: Arc<AtomicU64>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            decision_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        txn.open_table(DECISIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Workloads ──────────────────────────────────────────────────

    /// Insert or replace a workload.
    pub fn put_workload(&self, workload: &Workload) -> StateResult<()> {
        let key = workload.table_key();
        let value = serde_json::to_vec(workload).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, replicas = workload.replicas, "workload stored");
        Ok(())
    }

    /// Insert a workload only if its key is free. Returns true if inserted.
    pub fn insert_workload_if_absent(&self, workload: &Workload) -> StateResult<bool> {
        let key = workload.table_key();
        let value = serde_json::to_vec(workload).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            inserted = table.get(key.as_str()).map_err(map_err!(Read))?.is_none();
            if inserted {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(inserted)
    }

    /// Get a workload by `namespace/name` key.
    pub fn get_workload(&self, key: &str) -> StateResult<Option<Workload>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let workload: Workload =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(workload))
            }
            None => Ok(None),
        }
    }

    /// List all workloads.
    pub fn list_workloads(&self) -> StateResult<Vec<Workload>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let workload: Workload =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(workload);
        }
        Ok(results)
    }

    /// Delete a workload along with its samples and decisions.
    /// Returns true if the workload existed.
    pub fn delete_workload(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        for def in [SAMPLES, DECISIONS] {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let (start, end) = child_range(key);
            let keys = collect_keys(&table, &start, &end)?;
            for k in &keys {
                table.remove(k.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "workload deleted");
        Ok(existed)
    }

    /// Set a workload's replica count.
    ///
    /// With `expected_generation`, the write only succeeds if the stored
    /// generation still matches (compare-and-set). The generation is bumped
    /// whenever the replica count actually changes.
    pub fn set_replicas(
        &self,
        key: &str,
        replicas: u32,
        expected_generation: Option<u64>,
    ) -> StateResult<Workload> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let mut workload: Workload = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key.to_string())),
            };

            if let Some(expected) = expected_generation
                && expected != workload.generation
            {
                return Err(StateError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual: workload.generation,
                });
            }

            if workload.replicas != replicas {
                workload.replicas = replicas;
                workload.generation += 1;
                workload.updated_at_ms = surge_core::epoch_millis();
                let value = serde_json::to_vec(&workload).map_err(map_err!(Serialize))?;
                table
                    .insert(key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            updated = workload;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, replicas, generation = updated.generation, "replicas set");
        Ok(updated)
    }

    // ── Samples ────────────────────────────────────────────────────

    /// Insert a utilization sample. A sample with the same timestamp replaces the old one.
    pub fn put_sample(&self, record: &SampleRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// The most recent sample for a workload.
    pub fn latest_sample(&self, workload: &str) -> StateResult<Option<SampleRecord>> {
        Ok(self.list_samples(workload, 1)?.into_iter().next())
    }

    /// Recent samples for a workload, newest first.
    pub fn list_samples(&self, workload: &str, limit: usize) -> StateResult<Vec<SampleRecord>> {
        self.list_newest(SAMPLES, workload, limit)
    }

    /// Keep only the newest `keep` samples for a workload. Returns the number removed.
    pub fn prune_samples(&self, workload: &str, keep: usize) -> StateResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            let (start, end) = child_range(workload);
            let keys = collect_keys(&table, &start, &end)?;
            let excess = keys.len().saturating_sub(keep);
            // Keys are in ascending time order, so the oldest come first.
            for k in &keys[..excess] {
                table.remove(k.as_str()).map_err(map_err!(Write))?;
            }
            removed = excess;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if removed > 0 {
            debug!(%workload, removed, "samples pruned");
        }
        Ok(removed)
    }

    // ── Decisions ──────────────────────────────────────────────────

    /// Append a decision to the workload's history.
    pub fn put_decision(&self, record: &DecisionRecord) -> StateResult<()> {
        let seq = self.decision_seq.fetch_add(1, Ordering::Relaxed);
        let key = record.table_key(seq);
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Recent decisions for a workload, newest first.
    pub fn list_decisions(
        &self,
        workload: &str,
        limit: usize,
    ) -> StateResult<Vec<DecisionRecord>> {
        self.list_newest(DECISIONS, workload, limit)
    }

    fn list_newest<T: serde::de::DeserializeOwned>(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
        workload: &str,
        limit: usize,
    ) -> StateResult<Vec<T>> {
        let (start, end) = child_range(workload);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
            .take(limit)
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }
}

/// Collect the keys in `[start, end)` so they can be removed afterwards.
fn collect_keys<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
    start: &str,
    end: &str,
) -> StateResult<Vec<String>> {
    let mut keys = Vec::new();
    for entry in table.range(start..end).map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        keys.push(key.value().to_string());
    }
    Ok(keys)
}
