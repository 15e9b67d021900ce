//! Ordered key-value storage abstractions.
//!
//! Backends implement [`KvStore`]: point reads, ordered prefix scans and
//! all-or-nothing [`WriteBatch`] commits. Higher layers (chunk indexes, work
//! queues) build typed views on top of the raw byte keys.

use std::fmt::Debug;
use std::ops::ControlFlow;

mod batch;
mod memory;
pub mod queue;

pub use batch::{BatchOp, WriteBatch};
pub use memory::MemoryStore;
pub use queue::{PersistentQueue, QueueEntry, QueueError, RESERVED_PREFIX_END, Trigger};

/// Trait that will transform the data to be saved in the DB.
pub trait Encode: Send + Sync + Sized + Debug {
    /// Encoded type.
    type Encoded: AsRef<[u8]> + Into<Vec<u8>> + Send + Sync + Ord + Debug;

    /// Encodes data going into the database.
    fn encode(self) -> Self::Encoded;
}

/// Trait that will transform the data to be read from the DB.
pub trait Decode: Send + Sync + Sized + Debug {
    /// Decodes data coming from the database.
    fn decode(value: &[u8]) -> Result<Self, DatabaseError>;

    /// Decodes owned data coming from the database.
    fn decode_owned(value: Vec<u8>) -> Result<Self, DatabaseError> {
        Self::decode(&value)
    }
}

/// Big-endian, so byte order matches numeric order.
impl Encode for u64 {
    type Encoded = [u8; 8];

    fn encode(self) -> Self::Encoded {
        self.to_be_bytes()
    }
}

impl Decode for u64 {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        let bytes: [u8; 8] = value.try_into().map_err(|_| DatabaseError::Decode)?;
        Ok(u64::from_be_bytes(bytes))
    }
}

/// Visitor passed to [`KvStore::scan`]. Return [`ControlFlow::Break`] to stop.
pub type ScanVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> ControlFlow<()> + 'a;

/// Durable, ordered byte-key store.
///
/// Implementations must apply a [`WriteBatch`] atomically: readers observe
/// either none or all of its operations.
#[auto_impl::auto_impl(&, Arc)]
pub trait KvStore: Send + Sync {
    /// Point read. `None` means the key does not exist.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError>;

    /// Existence check.
    fn has(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(self.get(key)?.is_some())
    }

    /// Commit every operation in `batch` as one unit, in insertion order.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), DatabaseError>;

    /// Visit keys starting with `prefix` in ascending order, beginning at the
    /// first key `>= start`.
    ///
    /// The visitor runs while the backend holds a read snapshot; it must not
    /// write to the same store.
    fn scan(
        &self,
        prefix: &[u8],
        start: &[u8],
        visitor: &mut ScanVisitor<'_>,
    ) -> Result<(), DatabaseError>;
}

/// Database error type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to open the database.
    #[error("failed to open the database: {0}")]
    Open(String),
    /// Failed to read a value from the database.
    #[error("failed to read from the database: {0}")]
    Read(String),
    /// Failed to stage a write.
    #[error("failed to write to the database: {0}")]
    Write(String),
    /// Failed to commit transaction changes into the database.
    #[error("failed to commit transaction changes: {0}")]
    Commit(String),
    /// Failed to decode a key or value from the database.
    #[error("failed to decode a key or value from the database")]
    Decode,
    /// Other unspecified error.
    #[error("{0}")]
    Other(String),
}
