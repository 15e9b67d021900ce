//! The local store and its mode-set engine.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};
use vertex_storage::KvStore;

use crate::layout::layout_for;
use crate::mode_set::Transition;
use crate::{
    AddressLocks, ChunkAddress, ChunkItem, GcIndex, GcSize, Index, LayoutMode, LocalStoreConfig,
    LocalStoreError, LocalStoreResult, ModeSet, PullIndex, PushIndex, RetrievalAccessIndex,
    RetrievalCompositeIndex, RetrievalDataIndex, RetrievalLayout, Setter, TimestampIndex,
    metrics::LocalStoreMetrics,
};

/// Source of timestamps, in Unix nanoseconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Current system time in Unix nanoseconds.
pub fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Chunk indexes and the transitions that move chunks between them.
///
/// Cloning is cheap; clones share the same store, locks and counter.
pub struct LocalStore<S> {
    inner: Arc<LocalStoreInner<S>>,
}

struct LocalStoreInner<S> {
    store: Arc<S>,
    layout: Box<dyn RetrievalLayout>,

    retrieval_data: Index<S, RetrievalDataIndex>,
    retrieval_access: Index<S, RetrievalAccessIndex>,
    retrieval_composite: Index<S, RetrievalCompositeIndex>,
    pull: Index<S, PullIndex>,
    push: Index<S, PushIndex>,
    gc: Index<S, GcIndex>,
    timestamps: Index<S, TimestampIndex>,

    locks: AddressLocks,
    gc_size: GcSize,
    clock: Clock,
    metrics: LocalStoreMetrics,
}

impl<S> Clone for LocalStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for LocalStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("layout", &self.inner.layout)
            .field("gc_size", &self.inner.gc_size.get())
            .field("locks", &self.inner.locks)
            .finish_non_exhaustive()
    }
}

/// Result of comparing the GC size counter with the GC index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcSizeCheck {
    /// Value of the counter.
    pub counter: u64,
    /// Entries found in the GC index.
    pub indexed: u64,
}

impl GcSizeCheck {
    /// Returns true if the counter matches the index.
    pub fn is_consistent(&self) -> bool {
        self.counter == self.indexed
    }
}

impl<S: KvStore + 'static> LocalStore<S> {
    /// Open a local store over `store` using the system clock.
    pub fn open(store: Arc<S>, config: &impl LocalStoreConfig) -> LocalStoreResult<Self> {
        Self::with_clock(store, config, system_clock)
    }

    /// Open a local store that takes timestamps from `clock`.
    pub fn with_clock(
        store: Arc<S>,
        config: &impl LocalStoreConfig,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> LocalStoreResult<Self> {
        let gc_size = GcSize::load(&*store)?;
        let layout = layout_for(config.layout(), &store);
        debug!(
            layout = %layout.mode(),
            gc_size = gc_size.get(),
            lock_timeout = ?config.address_lock_timeout(),
            "opened local store"
        );

        let inner = LocalStoreInner {
            retrieval_data: Index::new(Arc::clone(&store)),
            retrieval_access: Index::new(Arc::clone(&store)),
            retrieval_composite: Index::new(Arc::clone(&store)),
            pull: Index::new(Arc::clone(&store)),
            push: Index::new(Arc::clone(&store)),
            gc: Index::new(Arc::clone(&store)),
            timestamps: Index::new(Arc::clone(&store)),
            store,
            layout,
            locks: AddressLocks::new(config.address_lock_timeout()),
            gc_size,
            clock: Arc::new(clock),
            metrics: LocalStoreMetrics::default(),
        };
        inner.metrics.gc_size.set(inner.gc_size.get() as f64);

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Layout chosen at open.
    pub fn layout(&self) -> LayoutMode {
        self.inner.layout.mode()
    }

    /// Number of entries in the GC index, as of the last commit.
    pub fn gc_size(&self) -> u64 {
        self.inner.gc_size.get()
    }

    /// Bind `mode` to this store.
    pub fn new_setter(&self, mode: ModeSet) -> Setter<S> {
        Setter::new(self.clone(), mode)
    }

    /// Apply the transition with raw mode value `mode` to `address`.
    ///
    /// Unknown values fail with [`LocalStoreError::InvalidMode`] before
    /// anything is read or written.
    pub fn set_raw(&self, mode: u8, address: &ChunkAddress) -> LocalStoreResult<()> {
        let mode = ModeSet::try_from(mode).inspect_err(|_| self.inner.metrics.inc_errors())?;
        self.set(mode, address)
    }

    /// Apply `mode` to `address` as one atomic batch.
    ///
    /// Transitions on the same address run one at a time. On error nothing
    /// was committed.
    pub fn set(&self, mode: ModeSet, address: &ChunkAddress) -> LocalStoreResult<()> {
        let result = self.inner.set(mode, *address);
        if let Err(err) = &result {
            self.inner.metrics.inc_errors();
            debug!(%mode, %address, %err, "mode set failed");
        }
        result
    }

    /// Store a new chunk: canonical record plus pull and push entries.
    ///
    /// A zero `store_timestamp` is stamped from the clock. Storing an
    /// address that is already stored leaves it unchanged. A chunk that was
    /// accessed before it was stored keeps the timestamps of that access.
    pub fn put(&self, item: &ChunkItem) -> LocalStoreResult<()> {
        self.inner.put(item)
    }

    /// Canonical record of `address`, with payload and both timestamps.
    pub fn get(&self, address: &ChunkAddress) -> LocalStoreResult<ChunkItem> {
        self.inner
            .layout
            .load(*address)?
            .stored
            .ok_or(LocalStoreError::NotFound(*address))
    }

    /// Compare the GC size counter with a full count of the GC index.
    ///
    /// Only meaningful while no transitions are running.
    pub fn check_gc_size(&self) -> LocalStoreResult<GcSizeCheck> {
        Ok(GcSizeCheck {
            counter: self.inner.gc_size.get(),
            indexed: self.inner.gc.count()?,
        })
    }

    /// Pull index.
    pub fn pull_index(&self) -> &Index<S, PullIndex> {
        &self.inner.pull
    }

    /// Push index.
    pub fn push_index(&self) -> &Index<S, PushIndex> {
        &self.inner.push
    }

    /// GC index.
    pub fn gc_index(&self) -> &Index<S, GcIndex> {
        &self.inner.gc
    }

    /// Retrieval data index (split layout).
    pub fn retrieval_data_index(&self) -> &Index<S, RetrievalDataIndex> {
        &self.inner.retrieval_data
    }

    /// Retrieval access index (split layout).
    pub fn retrieval_access_index(&self) -> &Index<S, RetrievalAccessIndex> {
        &self.inner.retrieval_access
    }

    /// Retrieval composite index (composite layout).
    pub fn retrieval_composite_index(&self) -> &Index<S, RetrievalCompositeIndex> {
        &self.inner.retrieval_composite
    }

    /// Timestamp index.
    pub fn timestamp_index(&self) -> &Index<S, TimestampIndex> {
        &self.inner.timestamps
    }
}

impl<S: KvStore + 'static> LocalStoreInner<S> {
    fn now(&self) -> u64 {
        (self.clock)()
    }

    fn set(&self, mode: ModeSet, address: ChunkAddress) -> LocalStoreResult<()> {
        if address.is_zero() {
            return Err(LocalStoreError::EmptyAddress);
        }
        let _guard = self.locks.lock(address)?;

        let mut transition = Transition::new(&self.gc);
        match mode {
            ModeSet::Access => self.plan_access(&mut transition, address)?,
            ModeSet::Sync => self.plan_sync(&mut transition, address)?,
            ModeSet::Remove => self.plan_remove(&mut transition, address)?,
        }

        let (batch, gc_delta) = transition.into_parts();
        let ops = batch.len();
        let gc_size = self.gc_size.commit(&*self.store, batch, gc_delta)?;
        self.metrics.record_committed(mode, gc_size);
        debug!(%mode, %address, ops, gc_delta, gc_size, "mode set committed");
        Ok(())
    }

    /// Access: refresh the access time, move the chunk to the back of the
    /// GC order and make sure it can be pulled.
    ///
    /// An unstored chunk gets no canonical record. Its timestamps go to the
    /// timestamp index, and to the access index in split layout.
    fn plan_access(&self, t: &mut Transition<'_, S>, address: ChunkAddress) -> LocalStoreResult<()> {
        let now = self.now();
        let state = self.layout.load(address)?;
        let is_stored = state.stored.is_some();

        let (item, previous) = match state.stored {
            Some(stored) => (stored, state.access_timestamp),
            None => {
                trace!(%address, "access on unstored chunk");
                let stamps = self.stage_push_removal(t, address)?;
                let store_timestamp = stamps.as_ref().map_or(now, |stamps| stamps.store_timestamp);
                let previous = state.access_timestamp.or_else(|| {
                    stamps
                        .filter(ChunkItem::is_accessed)
                        .map(|stamps| stamps.access_timestamp)
                });
                (ChunkItem::new(address).with_store_timestamp(store_timestamp), previous)
            }
        };

        if let Some(previous) = previous {
            t.remove_gc(address, previous)?;
        }
        let access_timestamp = previous.map_or(now, |previous| now.max(previous));
        let item = item.with_access_timestamp(access_timestamp);

        if is_stored {
            self.layout.put_access_in_batch(t.batch(), &item)?;
        } else {
            self.layout.put_unstored_access_in_batch(t.batch(), &item)?;
        }
        self.pull.put_in_batch(t.batch(), &item)?;
        self.timestamps.put_in_batch(t.batch(), &item)?;
        t.insert_gc(address, access_timestamp)
    }

    /// Sync: the chunk leaves the push index and becomes a GC candidate.
    ///
    /// An existing access time is kept as is, so syncing does not move an
    /// accessed chunk within the GC order.
    fn plan_sync(&self, t: &mut Transition<'_, S>, address: ChunkAddress) -> LocalStoreResult<()> {
        let state = self.layout.load(address)?;
        let Some(stored) = state.stored else {
            trace!(%address, "sync on unstored chunk");
            self.stage_push_removal(t, address)?;
            return Ok(());
        };

        let access_timestamp = match state.access_timestamp {
            Some(previous) => {
                t.remove_gc(address, previous)?;
                previous
            }
            None => {
                let now = self.now();
                let item = stored.clone().with_access_timestamp(now);
                self.layout.put_access_in_batch(t.batch(), &item)?;
                now
            }
        };

        let item = stored.with_access_timestamp(access_timestamp);
        self.push.delete_in_batch(t.batch(), &item);
        self.timestamps.put_in_batch(t.batch(), &item)?;
        t.insert_gc(address, access_timestamp)
    }

    /// Remove: delete the chunk from every index.
    fn plan_remove(&self, t: &mut Transition<'_, S>, address: ChunkAddress) -> LocalStoreResult<()> {
        let state = self.layout.load(address)?;
        let stored = state.stored.ok_or(LocalStoreError::NotFound(address))?;

        self.layout.delete_in_batch(t.batch(), address);
        self.pull.delete_in_batch(t.batch(), &stored);
        self.push.delete_in_batch(t.batch(), &stored);
        self.timestamps.delete_in_batch(t.batch(), &stored);
        if let Some(access_timestamp) = state.access_timestamp {
            t.remove_gc(address, access_timestamp)?;
        }
        Ok(())
    }

    /// Stage removal of the push entry of an unstored `address`.
    ///
    /// The entry key is rebuilt from the timestamp index, which is returned.
    fn stage_push_removal(
        &self,
        t: &mut Transition<'_, S>,
        address: ChunkAddress,
    ) -> LocalStoreResult<Option<ChunkItem>> {
        let stamps = self.timestamps.get(&ChunkItem::new(address))?;
        if let Some(stamps) = &stamps {
            trace!(%address, store_timestamp = stamps.store_timestamp, "dropping push entry");
            self.push.delete_in_batch(t.batch(), stamps);
        }
        Ok(stamps)
    }

    fn put(&self, item: &ChunkItem) -> LocalStoreResult<()> {
        let address = item.address;
        if address.is_zero() {
            return Err(LocalStoreError::EmptyAddress);
        }
        let _guard = self.locks.lock(address)?;

        let state = self.layout.load(address)?;
        if state.stored.is_some() {
            trace!(%address, "chunk already stored");
            return Ok(());
        }

        let (store_timestamp, access_timestamp) =
            match self.timestamps.get(&ChunkItem::new(address))? {
                Some(stamps) => {
                    trace!(%address, "storing accessed chunk");
                    let access_timestamp =
                        state.access_timestamp.unwrap_or(stamps.access_timestamp);
                    (stamps.store_timestamp, access_timestamp)
                }
                None => match item.store_timestamp {
                    0 => (self.now(), 0),
                    timestamp => (timestamp, 0),
                },
            };
        let item = item
            .clone()
            .with_store_timestamp(store_timestamp)
            .with_access_timestamp(access_timestamp);

        let mut t = Transition::new(&self.gc);
        self.layout.put_in_batch(t.batch(), &item)?;
        self.pull.put_in_batch(t.batch(), &item)?;
        self.push.put_in_batch(t.batch(), &item)?;
        self.timestamps.put_in_batch(t.batch(), &item)?;

        let (batch, gc_delta) = t.into_parts();
        self.gc_size.commit(&*self.store, batch, gc_delta)?;
        debug!(%address, store_timestamp, "stored chunk");
        Ok(())
    }
}
