//! Swarm local store.
//!
//! Chunks are tracked through a set of ordered indexes over a [`KvStore`]:
//!
//! - a canonical retrieval record holding the payload and timestamps, laid
//!   out according to [`LayoutMode`]
//! - the [`PullIndex`] of chunks peers may pull, by store time
//! - the [`PushIndex`] of chunks not yet confirmed synced, by store time
//! - the [`GcIndex`] of eviction candidates, by access time
//! - the [`TimestampIndex`] of both timestamps by address, which locates the
//!   pull and push entries of chunks that were accessed but never stored
//!
//! [`LocalStore::set`] moves a chunk between these with one of the
//! [`ModeSet`] transitions. Each transition runs under a per-address lock
//! and commits as a single atomic batch together with the persisted GC size,
//! so [`LocalStore::gc_size`] always equals the number of GC index entries.
//!
//! ```ignore
//! let store = LocalStore::open(Arc::new(MemoryStore::new()), &LocalStoreArgs::default())?;
//! store.put(&ChunkItem::new(address).with_data(payload))?;
//! store.new_setter(ModeSet::Access).set(&address)?;
//! assert_eq!(store.gc_size(), 1);
//! ```
//!
//! [`KvStore`]: vertex_storage::KvStore

mod address;
mod args;
mod error;
mod gc;
mod index;
mod item;
mod layout;
mod locks;
mod metrics;
mod mode_set;
mod schema;
mod store;

pub use address::ChunkAddress;
pub use args::{LocalStoreArgs, LocalStoreConfig};
pub use error::{LocalStoreError, LocalStoreResult};
pub use gc::{GC_SIZE_KEY, GcSize};
pub use index::{Index, IndexSchema};
pub use item::ChunkItem;
pub use layout::{
    CompositeLayout, LayoutMode, RetrievalLayout, RetrievalState, SplitLayout, layout_for,
};
pub use locks::{AddressGuard, AddressLocks, DEFAULT_ADDRESS_LOCK_TIMEOUT};
pub use mode_set::{ModeSet, Setter};
pub use schema::{
    GcIndex, PullIndex, PushIndex, RetrievalAccessIndex, RetrievalCompositeIndex,
    RetrievalDataIndex, TimestampIndex,
};
pub use store::{Clock, GcSizeCheck, LocalStore, system_clock};
