//! redb-based [`KvStore`] backend.
//!
//! All keys live in a single ordered table. Each [`WriteBatch`] is applied
//! inside one redb write transaction, so a batch is durable and visible in
//! full after `commit` or not at all.

use std::fmt::Display;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Instant;

use metrics::{Counter, Histogram};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, trace};
use vertex_storage::{BatchOp, DatabaseError, KvStore, ScanVisitor, WriteBatch};

/// Table definition for every key.
/// Key: raw ordered key bytes
/// Value: raw value bytes
const ENTRIES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

fn open_err(err: impl Display) -> DatabaseError {
    DatabaseError::Open(err.to_string())
}

fn read_err(err: impl Display) -> DatabaseError {
    DatabaseError::Read(err.to_string())
}

fn write_err(err: impl Display) -> DatabaseError {
    DatabaseError::Write(err.to_string())
}

fn commit_err(err: impl Display) -> DatabaseError {
    DatabaseError::Commit(err.to_string())
}

#[derive(Clone, Debug)]
struct RedbMetrics {
    batches_total: Counter,
    batch_ops_total: Counter,
    batch_commit_seconds: Histogram,
}

impl Default for RedbMetrics {
    fn default() -> Self {
        Self {
            batches_total: metrics::counter!("storage.redb.batches_total"),
            batch_ops_total: metrics::counter!("storage.redb.batch_ops_total"),
            batch_commit_seconds: metrics::histogram!("storage.redb.batch_commit_seconds"),
        }
    }
}

/// redb-based store.
///
/// Thread-safe for concurrent reads and writes; redb serializes write
/// transactions internally.
pub struct RedbStore {
    db: Database,
    metrics: RedbMetrics,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let db = Database::create(path.as_ref()).map_err(open_err)?;

        // Ensure the table exists so read transactions never miss it.
        let write_txn = db.begin_write().map_err(open_err)?;
        {
            let _ = write_txn.open_table(ENTRIES_TABLE).map_err(open_err)?;
        }
        write_txn.commit().map_err(commit_err)?;

        debug!(path = %path.as_ref().display(), "Opened redb store");
        Ok(Self {
            db,
            metrics: RedbMetrics::default(),
        })
    }
}

impl KvStore for RedbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        let read_txn = self.db.begin_read().map_err(read_err)?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(read_err)?;
        Ok(table
            .get(key)
            .map_err(read_err)?
            .map(|value| value.value().to_vec()))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), DatabaseError> {
        let started = Instant::now();
        let ops = batch.len();

        let write_txn = self.db.begin_write().map_err(write_err)?;
        {
            let mut table = write_txn.open_table(ENTRIES_TABLE).map_err(write_err)?;
            for op in batch {
                match op {
                    BatchOp::Put { key, value } => {
                        table
                            .insert(key.as_slice(), value.as_slice())
                            .map_err(write_err)?;
                    }
                    BatchOp::Delete { key } => {
                        table.remove(key.as_slice()).map_err(write_err)?;
                    }
                }
            }
        }
        // Dropping an uncommitted transaction aborts it, so an error above
        // leaves the database untouched.
        write_txn.commit().map_err(commit_err)?;

        self.metrics.batches_total.increment(1);
        self.metrics.batch_ops_total.increment(ops as u64);
        self.metrics
            .batch_commit_seconds
            .record(started.elapsed().as_secs_f64());
        trace!(ops, "Committed batch");
        Ok(())
    }

    fn scan(
        &self,
        prefix: &[u8],
        start: &[u8],
        visitor: &mut ScanVisitor<'_>,
    ) -> Result<(), DatabaseError> {
        let from = start.max(prefix);
        let read_txn = self.db.begin_read().map_err(read_err)?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(read_err)?;

        for entry in table.range::<&[u8]>(from..).map_err(read_err)? {
            let (key, value) = entry.map_err(read_err)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            if let ControlFlow::Break(()) = visitor(key, value.value()) {
                break;
            }
        }

        Ok(())
    }
}
