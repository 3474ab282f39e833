//! DuckDB-backed persistence for per-generation chromosome records.

use duckdb::{Connection, Transaction, params};
use mechminer_core::{GenerationRecord, GenerationSink};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error};

const DEFAULT_RECORD_BUFFER: usize = 256;

/// Storage error wrapper.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fitness aggregate for one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationFitness {
    pub generation: u32,
    pub chromosomes: u64,
    pub mean_fitness: f64,
    /// Population standard deviation.
    pub stddev_fitness: f64,
    pub best_fitness: f64,
}

/// Highest-scoring stored chromosome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestRecord {
    pub generation: u32,
    pub id: String,
    pub lineage_id: String,
    pub fitness: f64,
    pub object_id: Option<String>,
    pub component_id: Option<String>,
    pub field_id: Option<String>,
    pub modifier: Option<String>,
    pub archive_len: u64,
}

/// DuckDB-backed generation sink with buffered writes.
pub struct Storage {
    conn: Connection,
    buffer: Vec<GenerationRecord>,
    flush_threshold: usize,
}

impl Storage {
    /// Open or create a database at `path` with the default buffer size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_threshold(path, DEFAULT_RECORD_BUFFER)
    }

    /// Open with a custom number of buffered records per flush.
    pub fn with_threshold(path: impl AsRef<Path>, threshold: usize) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let mut storage = Self {
            conn,
            buffer: Vec::new(),
            flush_threshold: threshold.max(1),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    /// In-memory database, mostly for tests and dry runs.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self {
            conn,
            buffer: Vec::new(),
            flush_threshold: DEFAULT_RECORD_BUFFER,
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&mut self) -> Result<(), StorageError> {
        self.conn.execute(
            "create table if not exists generations (
                generation integer not null,
                chromosome_id varchar not null,
                lineage_id varchar not null,
                genotype_hash bigint not null,
                fitness double not null,
                object_id varchar,
                component_id varchar,
                field_id varchar,
                modifier varchar,
                value_kind varchar,
                step_count bigint not null,
                archive_len bigint not null,
                archive varchar,
                terminal_trajectories varchar,
                primary key (generation, chromosome_id)
            )",
            [],
        )?;
        Ok(())
    }

    /// Buffer `records`, flushing once the threshold is reached.
    pub fn persist(&mut self, records: &[GenerationRecord]) -> Result<(), StorageError> {
        self.buffer.extend_from_slice(records);
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn insert_records(
        tx: &Transaction<'_>,
        rows: &[GenerationRecord],
    ) -> Result<(), duckdb::Error> {
        let mut stmt = tx.prepare(
            "insert or replace into generations (
                generation, chromosome_id, lineage_id, genotype_hash, fitness,
                object_id, component_id, field_id, modifier, value_kind,
                step_count, archive_len, archive, terminal_trajectories
            ) values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.generation,
                row.id,
                row.lineage_id,
                // Stored bit-for-bit; DuckDB bigint is signed.
                row.hash as i64,
                row.fitness,
                row.object_id,
                row.component_id,
                row.field_id,
                row.modifier,
                row.value_kind,
                i64::try_from(row.step_count).unwrap_or(i64::MAX),
                i64::try_from(row.archive_len).unwrap_or(i64::MAX),
                row.archive_json,
                row.terminal_trajectories_json,
            ])?;
        }
        Ok(())
    }

    /// Force buffered records to disk.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        Self::insert_records(&tx, &self.buffer)?;
        tx.commit()?;
        debug!(records = self.buffer.len(), "flushed generation records");
        self.buffer.clear();
        Ok(())
    }

    /// Mean, standard deviation and best fitness per generation, oldest first.
    pub fn fitness_by_generation(&mut self) -> Result<Vec<GenerationFitness>, StorageError> {
        self.flush()?;
        let mut stmt = self.conn.prepare(
            "select generation,
                    count(*) as chromosomes,
                    avg(fitness) as mean_fitness,
                    coalesce(stddev_pop(fitness), 0.0) as stddev_fitness,
                    max(fitness) as best_fitness
             from generations
             group by generation
             order by generation asc",
        )?;
        let mut rows = stmt.query([])?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            summaries.push(GenerationFitness {
                generation: row.get::<_, i32>(0)? as u32,
                chromosomes: row.get::<_, i64>(1)? as u64,
                mean_fitness: row.get(2)?,
                stddev_fitness: row.get(3)?,
                best_fitness: row.get(4)?,
            });
        }
        Ok(summaries)
    }

    /// The `limit` fittest records across all generations.
    pub fn best_records(&mut self, limit: usize) -> Result<Vec<BestRecord>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.flush()?;
        let mut stmt = self.conn.prepare(
            "select generation, chromosome_id, lineage_id, fitness,
                    object_id, component_id, field_id, modifier, archive_len
             from generations
             order by fitness desc, generation asc, chromosome_id asc
             limit ?",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut records = Vec::with_capacity(limit.min(16));
        while let Some(row) = rows.next()? {
            records.push(BestRecord {
                generation: row.get::<_, i32>(0)? as u32,
                id: row.get(1)?,
                lineage_id: row.get(2)?,
                fitness: row.get(3)?,
                object_id: row.get(4)?,
                component_id: row.get(5)?,
                field_id: row.get(6)?,
                modifier: row.get(7)?,
                archive_len: row.get::<_, i64>(8)? as u64,
            });
        }
        Ok(records)
    }

    /// Archive of one stored chromosome, decoded from JSON.
    pub fn archive_of(
        &mut self,
        generation: u32,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        self.flush()?;
        let mut stmt = self.conn.prepare(
            "select archive
             from generations
             where generation = ? and chromosome_id = ?",
        )?;
        let mut rows = stmt.query(params![generation, id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let raw: Option<String> = row.get(0)?;
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StorageError::from)
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            error!(%err, "failed to flush generation buffer on drop");
        }
    }
}

impl GenerationSink for Storage {
    fn on_generation(&mut self, records: &[GenerationRecord]) {
        if let Err(err) = self.persist(records) {
            let generation = records.first().map(|record| record.generation);
            error!(%err, ?generation, "failed to persist generation records");
        }
    }
}

/// Sink handle sharing one [`Storage`] with the code that queries it.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<Storage>>,
}

impl SharedStorage {
    #[must_use]
    pub fn new(inner: Arc<Mutex<Storage>>) -> Self {
        Self { inner }
    }
}

impl GenerationSink for SharedStorage {
    fn on_generation(&mut self, records: &[GenerationRecord]) {
        match self.inner.lock() {
            Ok(mut storage) => storage.on_generation(records),
            Err(_) => error!("storage mutex poisoned; dropping generation records"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(generation: u32, id: &str, fitness: f64) -> GenerationRecord {
        GenerationRecord {
            generation,
            lineage_id: id.to_string(),
            id: id.to_string(),
            hash: u64::MAX - 3,
            fitness,
            object_id: Some("player".into()),
            component_id: Some("PlayerController".into()),
            field_id: Some("speed".into()),
            modifier: Some("double".into()),
            value_kind: Some("number".into()),
            step_count: 120,
            archive_len: 2,
            archive_json: r#"[{"position":{"x":1,"y":1}}]"#.into(),
            terminal_trajectories_json: "[]".into(),
        }
    }

    #[test]
    fn aggregates_fitness_per_generation() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = Storage::in_memory()?;
        storage.persist(&[record(0, "a", 0.2), record(0, "b", 0.4)])?;
        storage.persist(&[record(1, "c", 0.5), record(1, "d", 0.5)])?;

        let summary = storage.fitness_by_generation()?;
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].generation, 0);
        assert_eq!(summary[0].chromosomes, 2);
        assert!((summary[0].mean_fitness - 0.3).abs() < 1e-9);
        assert!((summary[0].stddev_fitness - 0.1).abs() < 1e-9);
        assert!((summary[0].best_fitness - 0.4).abs() < 1e-9);
        assert!(summary[1].stddev_fitness.abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn best_records_are_ordered_and_limited() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = Storage::in_memory()?;
        storage.on_generation(&[record(0, "a", 0.2), record(0, "b", 0.9), record(0, "c", 0.5)]);
        let best = storage.best_records(2)?;
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].id, "b");
        assert_eq!(best[1].id, "c");
        assert_eq!(best[0].field_id.as_deref(), Some("speed"));
        assert!(storage.best_records(0)?.is_empty());
        Ok(())
    }

    #[test]
    fn archives_decode_from_json() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = Storage::in_memory()?;
        storage.persist(&[record(3, "z", 0.1)])?;
        let archive = storage.archive_of(3, "z")?.expect("stored archive");
        assert_eq!(archive[0]["position"]["x"], 1);
        assert!(storage.archive_of(3, "missing")?.is_none());
        Ok(())
    }
}
