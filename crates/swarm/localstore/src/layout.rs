//! Storage layouts for the canonical retrieval record.
//!
//! The store keeps one authoritative record of a chunk's payload and
//! timestamps. [`CompositeLayout`] keeps it in a single index,
//! [`SplitLayout`] spreads it over a data index and an access index. The
//! layout is chosen once at open and the mode-set handlers only talk to the
//! [`RetrievalLayout`] trait.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vertex_storage::{DatabaseError, KvStore, WriteBatch};

use crate::{
    ChunkAddress, ChunkItem, Index, RetrievalAccessIndex, RetrievalCompositeIndex,
    RetrievalDataIndex,
};

/// Which indexes hold the canonical record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LayoutMode {
    /// Payload and store time in one index, access time in another.
    #[default]
    Split,
    /// Payload and both timestamps in a single index.
    Composite,
}

/// Canonical state of one address, as read before a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalState {
    /// Stored record with payload and store timestamp. `None` if the chunk
    /// is not stored.
    pub stored: Option<ChunkItem>,
    /// Last access time, if the chunk was ever accessed.
    pub access_timestamp: Option<u64>,
}

/// Read and write access to the canonical record.
pub trait RetrievalLayout: Send + Sync + fmt::Debug {
    /// Layout implemented by this strategy.
    fn mode(&self) -> LayoutMode;

    /// Read the canonical state of `address`.
    fn load(&self, address: ChunkAddress) -> Result<RetrievalState, DatabaseError>;

    /// Stage a write of the full record: payload, store timestamp and, if
    /// set, access timestamp.
    fn put_in_batch(&self, batch: &mut WriteBatch, item: &ChunkItem) -> Result<(), DatabaseError>;

    /// Stage an update of the access timestamp of a stored record.
    ///
    /// `item` must carry the fields returned by [`load`](Self::load) so
    /// layouts that rewrite the whole record keep the payload.
    fn put_access_in_batch(
        &self,
        batch: &mut WriteBatch,
        item: &ChunkItem,
    ) -> Result<(), DatabaseError>;

    /// Stage the access timestamp of a chunk that has no stored record.
    ///
    /// Never creates a stored record. Layouts without a separate access
    /// index stage nothing.
    fn put_unstored_access_in_batch(
        &self,
        batch: &mut WriteBatch,
        item: &ChunkItem,
    ) -> Result<(), DatabaseError>;

    /// Stage removal of every canonical entry of `address`.
    fn delete_in_batch(&self, batch: &mut WriteBatch, address: ChunkAddress);
}

/// Build the layout strategy for `mode`.
pub fn layout_for<S: KvStore + 'static>(
    mode: LayoutMode,
    store: &Arc<S>,
) -> Box<dyn RetrievalLayout> {
    match mode {
        LayoutMode::Split => Box::new(SplitLayout::new(Arc::clone(store))),
        LayoutMode::Composite => Box::new(CompositeLayout::new(Arc::clone(store))),
    }
}

fn non_zero(timestamp: u64) -> Option<u64> {
    (timestamp != 0).then_some(timestamp)
}

/// Single index keyed by address.
pub struct CompositeLayout<S> {
    composite: Index<S, RetrievalCompositeIndex>,
}

impl<S: KvStore> CompositeLayout<S> {
    /// Create the layout over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            composite: Index::new(store),
        }
    }
}

impl<S> fmt::Debug for CompositeLayout<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeLayout").finish_non_exhaustive()
    }
}

impl<S: KvStore> RetrievalLayout for CompositeLayout<S> {
    fn mode(&self) -> LayoutMode {
        LayoutMode::Composite
    }

    fn load(&self, address: ChunkAddress) -> Result<RetrievalState, DatabaseError> {
        let stored = self.composite.get(&ChunkItem::new(address))?;
        let access_timestamp = stored
            .as_ref()
            .and_then(|item| non_zero(item.access_timestamp));
        Ok(RetrievalState {
            stored,
            access_timestamp,
        })
    }

    fn put_in_batch(&self, batch: &mut WriteBatch, item: &ChunkItem) -> Result<(), DatabaseError> {
        self.composite.put_in_batch(batch, item)
    }

    fn put_access_in_batch(
        &self,
        batch: &mut WriteBatch,
        item: &ChunkItem,
    ) -> Result<(), DatabaseError> {
        self.composite.put_in_batch(batch, item)
    }

    fn put_unstored_access_in_batch(
        &self,
        _batch: &mut WriteBatch,
        _item: &ChunkItem,
    ) -> Result<(), DatabaseError> {
        Ok(())
    }

    fn delete_in_batch(&self, batch: &mut WriteBatch, address: ChunkAddress) {
        self.composite.delete_in_batch(batch, &ChunkItem::new(address));
    }
}

/// Data index plus access index, both keyed by address.
pub struct SplitLayout<S> {
    data: Index<S, RetrievalDataIndex>,
    access: Index<S, RetrievalAccessIndex>,
}

impl<S: KvStore> SplitLayout<S> {
    /// Create the layout over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            data: Index::new(Arc::clone(&store)),
            access: Index::new(store),
        }
    }
}

impl<S> fmt::Debug for SplitLayout<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitLayout").finish_non_exhaustive()
    }
}

impl<S: KvStore> RetrievalLayout for SplitLayout<S> {
    fn mode(&self) -> LayoutMode {
        LayoutMode::Split
    }

    fn load(&self, address: ChunkAddress) -> Result<RetrievalState, DatabaseError> {
        let key = ChunkItem::new(address);
        let access_timestamp = self
            .access
            .get(&key)?
            .and_then(|item| non_zero(item.access_timestamp));
        let stored = self.data.get(&key)?.map(|item| {
            item.with_access_timestamp(access_timestamp.unwrap_or_default())
        });
        Ok(RetrievalState {
            stored,
            access_timestamp,
        })
    }

    fn put_in_batch(&self, batch: &mut WriteBatch, item: &ChunkItem) -> Result<(), DatabaseError> {
        self.data.put_in_batch(batch, item)?;
        if item.is_accessed() {
            self.access.put_in_batch(batch, item)?;
        }
        Ok(())
    }

    fn put_access_in_batch(
        &self,
        batch: &mut WriteBatch,
        item: &ChunkItem,
    ) -> Result<(), DatabaseError> {
        self.access.put_in_batch(batch, item)
    }

    fn put_unstored_access_in_batch(
        &self,
        batch: &mut WriteBatch,
        item: &ChunkItem,
    ) -> Result<(), DatabaseError> {
        self.access.put_in_batch(batch, item)
    }

    fn delete_in_batch(&self, batch: &mut WriteBatch, address: ChunkAddress) {
        let key = ChunkItem::new(address);
        self.data.delete_in_batch(batch, &key);
        self.access.delete_in_batch(batch, &key);
    }
}

#[cfg(test)]
mod tests {
    use vertex_storage::MemoryStore;

    use super::*;

    fn item() -> ChunkItem {
        ChunkItem::new(ChunkAddress::new([7; 32]))
            .with_data(b"chunk".to_vec())
            .with_store_timestamp(100)
    }

    fn commit(store: &MemoryStore, apply: impl FnOnce(&mut WriteBatch)) {
        let mut batch = WriteBatch::new();
        apply(&mut batch);
        store.write_batch(batch).unwrap();
    }

    fn check_layout(mode: LayoutMode) {
        let store = Arc::new(MemoryStore::new());
        let layout = layout_for(mode, &store);
        assert_eq!(layout.mode(), mode);

        let address = item().address;
        assert_eq!(layout.load(address).unwrap(), RetrievalState::default());

        commit(&store, |batch| layout.put_in_batch(batch, &item()).unwrap());
        let state = layout.load(address).unwrap();
        assert_eq!(state.stored, Some(item()));
        assert_eq!(state.access_timestamp, None);

        let accessed = item().with_access_timestamp(250);
        commit(&store, |batch| layout.put_access_in_batch(batch, &accessed).unwrap());
        let state = layout.load(address).unwrap();
        assert_eq!(state.access_timestamp, Some(250));
        assert_eq!(state.stored, Some(accessed));

        commit(&store, |batch| layout.delete_in_batch(batch, address));
        assert_eq!(layout.load(address).unwrap(), RetrievalState::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_unstored_access_never_creates_record() {
        for mode in [LayoutMode::Split, LayoutMode::Composite] {
            let store = Arc::new(MemoryStore::new());
            let layout = layout_for(mode, &store);
            let address = item().address;

            let accessed = ChunkItem::new(address).with_access_timestamp(300);
            commit(&store, |batch| {
                layout.put_unstored_access_in_batch(batch, &accessed).unwrap()
            });

            let state = layout.load(address).unwrap();
            assert_eq!(state.stored, None);
            let expected = (mode == LayoutMode::Split).then_some(300);
            assert_eq!(state.access_timestamp, expected, "{mode}");
        }
    }

    #[test]
    fn test_split_layout() {
        check_layout(LayoutMode::Split);
    }

    #[test]
    fn test_composite_layout() {
        check_layout(LayoutMode::Composite);
    }

    #[test]
    fn test_layout_mode_names() {
        assert_eq!(LayoutMode::default(), LayoutMode::Split);
        assert_eq!(LayoutMode::Composite.to_string(), "composite");
        assert_eq!("split".parse::<LayoutMode>().unwrap(), LayoutMode::Split);
    }
}
