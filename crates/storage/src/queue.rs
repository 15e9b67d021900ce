//! Durable FIFO work queue stored alongside other data in a [`KvStore`].
//!
//! Producers stage entries into their own [`WriteBatch`] and fire the
//! returned [`Trigger`] once the batch has been committed. Consumers call
//! [`PersistentQueue::next`], which hands back the oldest entry together with
//! the shared ordering lock so the entry can be deleted in the consumer's own
//! batch before anyone else looks at the queue.

use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{MutexGuard, Notify};
use tokio::time::{Instant, timeout_at};
use tracing::trace;

use crate::{DatabaseError, Decode, Encode, KvStore, WriteBatch};

/// Separates the queue prefix from the sequence number.
const SEPARATOR: u8 = 0x00;

/// Leading key bytes below this value belong to the chunk indexes and
/// store metadata. Queue prefixes must start at or above it.
pub const RESERVED_PREFIX_END: u8 = 0x10;

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Underlying store failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// Value could not be serialized.
    #[error("failed to encode queue value: {0}")]
    Encode(postcard::Error),
    /// Stored value could not be deserialized.
    #[error("failed to decode queue value: {0}")]
    Decode(postcard::Error),
    /// The deadline passed before an entry became available.
    #[error("timed out waiting for a queue entry")]
    Timeout,
    /// The prefix is empty or starts in the reserved range.
    #[error("queue prefix {0:02x?} overlaps the reserved key range")]
    ReservedPrefix(Vec<u8>),
}

/// Wakes a consumer blocked in [`PersistentQueue::next`].
///
/// Fire only after the batch carrying the entry has been committed. A trigger
/// fired while nobody waits is remembered for the next waiter.
#[derive(Debug, Clone)]
#[must_use = "the trigger must be fired after the batch is committed"]
pub struct Trigger {
    notify: Arc<Notify>,
}

impl Trigger {
    /// Signal that a new entry is visible.
    pub fn fire(self) {
        self.notify.notify_one();
    }
}

/// Oldest queue entry, handed out with the ordering lock still held.
#[derive(Debug)]
pub struct QueueEntry<'a, V> {
    /// Store key of the entry; pass to [`PersistentQueue::delete`].
    pub key: Vec<u8>,
    /// Decoded value.
    pub value: V,
    _ordering: MutexGuard<'a, ()>,
}

impl<V> QueueEntry<'_, V> {
    /// Release the ordering lock.
    pub fn release(self) {}
}

/// FIFO queue persisted under a key prefix.
#[derive(Debug)]
pub struct PersistentQueue<S> {
    store: Arc<S>,
    prefix: Vec<u8>,
    sequence: Mutex<u64>,
    notify: Arc<Notify>,
}

impl<S: KvStore> PersistentQueue<S> {
    /// Open the queue stored under `prefix`, resuming after the newest entry.
    ///
    /// The first byte of `prefix` must be at least [`RESERVED_PREFIX_END`].
    pub fn new(store: Arc<S>, prefix: impl AsRef<[u8]>) -> Result<Self, QueueError> {
        let prefix = prefix.as_ref();
        if prefix.first().is_none_or(|&first| first < RESERVED_PREFIX_END) {
            return Err(QueueError::ReservedPrefix(prefix.to_vec()));
        }
        let mut full_prefix = prefix.to_vec();
        full_prefix.push(SEPARATOR);

        let mut last = 0;
        let mut failure = None;
        store.scan(&full_prefix, &full_prefix, &mut |key, _| {
            match key.get(full_prefix.len()..).map(u64::decode) {
                Some(Ok(sequence)) => {
                    last = sequence;
                    ControlFlow::Continue(())
                }
                _ => {
                    failure = Some(DatabaseError::Decode);
                    ControlFlow::Break(())
                }
            }
        })?;
        if let Some(err) = failure {
            return Err(err.into());
        }

        trace!(last, "opened persistent queue");
        Ok(Self {
            store,
            prefix: full_prefix,
            sequence: Mutex::new(last),
            notify: Arc::new(Notify::new()),
        })
    }

    fn key(&self, sequence: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + 8);
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(&sequence.encode());
        key
    }

    /// Stage `value` at the tail of the queue in `batch`.
    pub fn enqueue<V: Serialize>(
        &self,
        batch: &mut WriteBatch,
        value: &V,
    ) -> Result<(Vec<u8>, Trigger), QueueError> {
        let encoded = postcard::to_allocvec(value).map_err(QueueError::Encode)?;
        let key = {
            let mut sequence = self.sequence.lock();
            *sequence += 1;
            self.key(*sequence)
        };
        batch.put(key.clone(), encoded);

        Ok((
            key,
            Trigger {
                notify: Arc::clone(&self.notify),
            },
        ))
    }

    /// Oldest committed entry, if any.
    pub fn peek<V: DeserializeOwned>(&self) -> Result<Option<(Vec<u8>, V)>, QueueError> {
        let mut head = None;
        self.store.scan(&self.prefix, &self.prefix, &mut |key, value| {
            head = Some((key.to_vec(), value.to_vec()));
            ControlFlow::Break(())
        })?;

        match head {
            Some((key, value)) => {
                let value = postcard::from_bytes(&value).map_err(QueueError::Decode)?;
                Ok(Some((key, value)))
            }
            None => Ok(None),
        }
    }

    /// Wait until an entry is available or `deadline` passes.
    ///
    /// On success the returned entry keeps `ordering` locked until it is
    /// dropped; producers are expected to enqueue under the same lock.
    pub async fn next<'a, V: DeserializeOwned>(
        &self,
        ordering: &'a tokio::sync::Mutex<()>,
        deadline: Instant,
    ) -> Result<QueueEntry<'a, V>, QueueError> {
        loop {
            let guard = timeout_at(deadline, ordering.lock())
                .await
                .map_err(|_| QueueError::Timeout)?;

            if let Some((key, value)) = self.peek()? {
                return Ok(QueueEntry {
                    key,
                    value,
                    _ordering: guard,
                });
            }
            drop(guard);

            timeout_at(deadline, self.notify.notified())
                .await
                .map_err(|_| QueueError::Timeout)?;
        }
    }

    /// Stage removal of an entry.
    pub fn delete(&self, batch: &mut WriteBatch, key: &[u8]) {
        batch.delete(key);
    }
}
