//! In-memory store for tests and ephemeral nodes.

use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow};

use parking_lot::RwLock;

use crate::{BatchOp, DatabaseError, KvStore, ScanVisitor, WriteBatch};

/// Ordered in-memory store. A batch is applied under one write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn has(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(self.entries.read().contains_key(key))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), DatabaseError> {
        let mut entries = self.entries.write();
        for op in batch {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan(
        &self,
        prefix: &[u8],
        start: &[u8],
        visitor: &mut ScanVisitor<'_>,
    ) -> Result<(), DatabaseError> {
        let from = start.max(prefix);
        let entries = self.entries.read();
        for (key, value) in entries.range::<[u8], _>((Bound::Included(from), Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            if visitor(key, value).is_break() {
                break;
            }
        }
        Ok(())
    }
}
