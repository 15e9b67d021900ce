//! Mode-set transitions.

use vertex_storage::{KvStore, WriteBatch};

use crate::{
    ChunkAddress, ChunkItem, GcIndex, Index, LocalStore, LocalStoreError, LocalStoreResult,
};

/// State transition applied to a single chunk.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::FromRepr,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ModeSet {
    /// The chunk was read or delivered.
    Access = 0,
    /// A push-sync receipt for the chunk was confirmed.
    Sync = 1,
    /// The chunk is evicted or explicitly deleted.
    Remove = 2,
}

impl TryFrom<u8> for ModeSet {
    type Error = LocalStoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(LocalStoreError::InvalidMode(value))
    }
}

/// A [`LocalStore`] handle bound to one transition mode.
#[derive(Debug, Clone)]
pub struct Setter<S> {
    store: LocalStore<S>,
    mode: ModeSet,
}

impl<S: KvStore + 'static> Setter<S> {
    pub(crate) fn new(store: LocalStore<S>, mode: ModeSet) -> Self {
        Self { store, mode }
    }

    /// The bound mode.
    pub fn mode(&self) -> ModeSet {
        self.mode
    }

    /// Apply the bound transition to `address`.
    pub fn set(&self, address: &ChunkAddress) -> LocalStoreResult<()> {
        self.store.set(self.mode, address)
    }
}

/// Index operations planned by one transition, plus their effect on the GC
/// size.
///
/// GC membership is checked against the store and against operations
/// already staged here, so the delta counts exactly the entries that appear
/// or disappear when the batch commits.
pub(crate) struct Transition<'a, S> {
    gc: &'a Index<S, GcIndex>,
    batch: WriteBatch,
    gc_delta: i64,
}

impl<'a, S: KvStore> Transition<'a, S> {
    pub(crate) fn new(gc: &'a Index<S, GcIndex>) -> Self {
        Self {
            gc,
            batch: WriteBatch::new(),
            gc_delta: 0,
        }
    }

    pub(crate) fn batch(&mut self) -> &mut WriteBatch {
        &mut self.batch
    }

    /// Stage a GC entry for `address` at `access_timestamp`.
    pub(crate) fn insert_gc(
        &mut self,
        address: ChunkAddress,
        access_timestamp: u64,
    ) -> LocalStoreResult<()> {
        let item = ChunkItem::new(address).with_access_timestamp(access_timestamp);
        if !self.gc.has_in_batch(&self.batch, &item)? {
            self.gc_delta += 1;
        }
        self.gc.put_in_batch(&mut self.batch, &item)?;
        Ok(())
    }

    /// Stage removal of the GC entry for `address` at `access_timestamp`.
    pub(crate) fn remove_gc(
        &mut self,
        address: ChunkAddress,
        access_timestamp: u64,
    ) -> LocalStoreResult<()> {
        let item = ChunkItem::new(address).with_access_timestamp(access_timestamp);
        if self.gc.has_in_batch(&self.batch, &item)? {
            self.gc_delta -= 1;
        }
        self.gc.delete_in_batch(&mut self.batch, &item);
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (WriteBatch, i64) {
        (self.batch, self.gc_delta)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use vertex_storage::MemoryStore;

    use super::*;

    #[test]
    fn test_mode_from_u8() {
        assert_eq!(ModeSet::try_from(0).unwrap(), ModeSet::Access);
        assert_eq!(ModeSet::try_from(1).unwrap(), ModeSet::Sync);
        assert_eq!(ModeSet::try_from(2).unwrap(), ModeSet::Remove);
        assert_matches!(ModeSet::try_from(3), Err(LocalStoreError::InvalidMode(3)));
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(ModeSet::Sync.to_string(), "sync");
        assert_eq!("remove".parse::<ModeSet>().unwrap(), ModeSet::Remove);
        assert!("evict".parse::<ModeSet>().is_err());
    }

    #[test]
    fn test_transition_counts_membership_changes() {
        let store = Arc::new(MemoryStore::new());
        let gc = Index::<_, GcIndex>::new(Arc::clone(&store));
        let address = ChunkAddress::new([1; 32]);
        gc.put(&ChunkItem::new(address).with_access_timestamp(10))
            .unwrap();

        let mut transition = Transition::new(&gc);
        // Present entry: counted once however often it is removed.
        transition.remove_gc(address, 10).unwrap();
        transition.remove_gc(address, 10).unwrap();
        // Absent entry: removal does not count.
        transition.remove_gc(address, 11).unwrap();
        // New entry: counted once however often it is inserted.
        transition.insert_gc(address, 20).unwrap();
        transition.insert_gc(address, 20).unwrap();
        // Re-inserting the removed entry counts again.
        transition.insert_gc(address, 10).unwrap();

        let (batch, delta) = transition.into_parts();
        assert_eq!(delta, 1);
        store.write_batch(batch).unwrap();
        assert_eq!(gc.count().unwrap(), 2);
    }
}
