//! Typed index views over the key-value store.
//!
//! An [`Index`] pairs a shared store handle with an [`IndexSchema`], which
//! decides which [`ChunkItem`] fields form the ordered key and which go into
//! the value. Every index lives under its own one-byte key prefix.

use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

use vertex_storage::{DatabaseError, KvStore, WriteBatch};

use crate::ChunkItem;

/// Key and value encoding for one index.
pub trait IndexSchema: Send + Sync + 'static {
    /// Human-readable index name.
    const NAME: &'static str;

    /// Key prefix separating this index from the others in the store.
    const PREFIX: u8;

    /// Encode the key fields of `item`, without the prefix.
    fn encode_key(item: &ChunkItem) -> Vec<u8>;

    /// Decode key fields into an item.
    fn decode_key(key: &[u8]) -> Result<ChunkItem, DatabaseError>;

    /// Encode the value fields of `item`.
    fn encode_value(item: &ChunkItem) -> Result<Vec<u8>, DatabaseError>;

    /// Merge value fields into the item decoded from the key.
    fn decode_value(keys: ChunkItem, value: &[u8]) -> Result<ChunkItem, DatabaseError>;
}

/// Typed view over one index.
pub struct Index<S, I> {
    store: Arc<S>,
    _schema: PhantomData<fn() -> I>,
}

impl<S, I> Clone for Index<S, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _schema: PhantomData,
        }
    }
}

impl<S, I: IndexSchema> std::fmt::Debug for Index<S, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").field("name", &I::NAME).finish()
    }
}

impl<S: KvStore, I: IndexSchema> Index<S, I> {
    /// Create a view over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _schema: PhantomData,
        }
    }

    /// Index name.
    pub fn name(&self) -> &'static str {
        I::NAME
    }

    /// Full store key for `item`, prefix included.
    pub fn key(&self, item: &ChunkItem) -> Vec<u8> {
        let encoded = I::encode_key(item);
        let mut key = Vec::with_capacity(1 + encoded.len());
        key.push(I::PREFIX);
        key.extend_from_slice(&encoded);
        key
    }

    fn decode(key: &[u8], value: &[u8]) -> Result<ChunkItem, DatabaseError> {
        let fields = key.get(1..).ok_or(DatabaseError::Decode)?;
        I::decode_value(I::decode_key(fields)?, value)
    }

    /// Look up the stored item with the same key fields as `item`.
    ///
    /// `None` is the not-found condition.
    pub fn get(&self, item: &ChunkItem) -> Result<Option<ChunkItem>, DatabaseError> {
        let key = self.key(item);
        match self.store.get(&key)? {
            Some(value) => Ok(Some(Self::decode(&key, &value)?)),
            None => Ok(None),
        }
    }

    /// Returns true if an entry with the key fields of `item` exists.
    pub fn has(&self, item: &ChunkItem) -> Result<bool, DatabaseError> {
        self.store.has(&self.key(item))
    }

    /// Like [`has`](Self::has), but operations staged in `batch` take
    /// precedence over what is committed.
    pub fn has_in_batch(&self, batch: &WriteBatch, item: &ChunkItem) -> Result<bool, DatabaseError> {
        let key = self.key(item);
        match batch.pending(&key) {
            Some(op) => Ok(op.is_put()),
            None => self.store.has(&key),
        }
    }

    /// Insert or overwrite `item` immediately.
    pub fn put(&self, item: &ChunkItem) -> Result<(), DatabaseError> {
        let mut batch = WriteBatch::new();
        self.put_in_batch(&mut batch, item)?;
        self.store.write_batch(batch)
    }

    /// Stage an insert or overwrite of `item`.
    pub fn put_in_batch(&self, batch: &mut WriteBatch, item: &ChunkItem) -> Result<(), DatabaseError> {
        batch.put(self.key(item), I::encode_value(item)?);
        Ok(())
    }

    /// Remove `item` immediately.
    pub fn delete(&self, item: &ChunkItem) -> Result<(), DatabaseError> {
        let mut batch = WriteBatch::new();
        self.delete_in_batch(&mut batch, item);
        self.store.write_batch(batch)
    }

    /// Stage removal of `item`.
    pub fn delete_in_batch(&self, batch: &mut WriteBatch, item: &ChunkItem) {
        batch.delete(self.key(item));
    }

    /// Visit entries in key order, starting at `start` (inclusive) or at the
    /// beginning of the index.
    pub fn iterate<F>(&self, start: Option<&ChunkItem>, mut visitor: F) -> Result<(), DatabaseError>
    where
        F: FnMut(ChunkItem) -> ControlFlow<()>,
    {
        let prefix = [I::PREFIX];
        let start = start.map_or_else(|| prefix.to_vec(), |item| self.key(item));

        let mut failure = None;
        self.store.scan(&prefix, &start, &mut |key, value| {
            match Self::decode(key, value) {
                Ok(item) => visitor(item),
                Err(err) => {
                    failure = Some(err);
                    ControlFlow::Break(())
                }
            }
        })?;

        failure.map_or(Ok(()), Err)
    }

    /// First entry in key order.
    pub fn first(&self) -> Result<Option<ChunkItem>, DatabaseError> {
        let mut first = None;
        self.iterate(None, |item| {
            first = Some(item);
            ControlFlow::Break(())
        })?;
        Ok(first)
    }

    /// Number of entries. Walks the whole index.
    pub fn count(&self) -> Result<u64, DatabaseError> {
        let mut count = 0u64;
        self.iterate(None, |_| {
            count += 1;
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }
}
