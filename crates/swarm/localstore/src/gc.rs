//! Persisted count of GC index entries.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use vertex_storage::{DatabaseError, Decode, Encode, KvStore, WriteBatch};

/// Store key of the persisted counter. Prefix `0x00` is the metadata space.
pub const GC_SIZE_KEY: &[u8] = b"\x00gc-size";

/// In-memory GC size mirrored by a persisted value.
///
/// The persisted value is written in the same batch as the index changes it
/// counts, and the in-memory value is published only after that batch
/// commits. Batches go through [`commit`](Self::commit) one at a time so
/// the absolute value written is never based on a stale read.
#[derive(Debug, Default)]
pub struct GcSize {
    value: AtomicU64,
    commit_lock: Mutex<()>,
}

impl GcSize {
    /// Load the persisted value, `0` for a fresh store.
    pub fn load<S: KvStore>(store: &S) -> Result<Self, DatabaseError> {
        let value = match store.get(GC_SIZE_KEY)? {
            Some(bytes) => u64::decode(&bytes)?,
            None => 0,
        };
        Ok(Self {
            value: AtomicU64::new(value),
            commit_lock: Mutex::new(()),
        })
    }

    /// Current committed value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Add `delta` to the counter inside `batch` and commit the batch.
    ///
    /// Returns the new value. On error nothing is written and the counter
    /// keeps its previous value.
    pub fn commit<S: KvStore>(
        &self,
        store: &S,
        mut batch: WriteBatch,
        delta: i64,
    ) -> Result<u64, DatabaseError> {
        let _guard = self.commit_lock.lock();
        let current = self.get();
        let next = current.checked_add_signed(delta).ok_or_else(|| {
            DatabaseError::Other(format!("gc size out of range: {current} {delta:+}"))
        })?;

        if delta != 0 {
            batch.put(GC_SIZE_KEY, next.encode());
        }
        if !batch.is_empty() {
            store.write_batch(batch)?;
        }

        self.value.store(next, Ordering::Release);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use vertex_storage::MemoryStore;

    use super::*;

    #[test]
    fn test_commit_persists_with_batch() {
        let store = MemoryStore::new();
        let gc_size = GcSize::load(&store).unwrap();
        assert_eq!(gc_size.get(), 0);

        let mut batch = WriteBatch::new();
        batch.put(b"\x06entry".to_vec(), Vec::new());
        assert_eq!(gc_size.commit(&store, batch, 1).unwrap(), 1);
        assert!(store.has(b"\x06entry").unwrap());

        assert_eq!(GcSize::load(&store).unwrap().get(), 1);
    }

    #[test]
    fn test_zero_delta_leaves_key_untouched() {
        let store = MemoryStore::new();
        let gc_size = GcSize::load(&store).unwrap();

        gc_size.commit(&store, WriteBatch::new(), 0).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_underflow_is_rejected() {
        let store = MemoryStore::new();
        let gc_size = GcSize::load(&store).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(b"\x06entry".to_vec());
        assert!(matches!(
            gc_size.commit(&store, batch, -1),
            Err(DatabaseError::Other(_))
        ));
        assert_eq!(gc_size.get(), 0);
        assert!(store.is_empty());
    }
}
