//! The record shared by every index.

use bytes::Bytes;

use crate::ChunkAddress;

/// Chunk metadata as seen through the indexes.
///
/// Each index fills in only the fields its key and value carry. Timestamps
/// are Unix nanoseconds; `0` means the timestamp is not set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkItem {
    /// Content address.
    pub address: ChunkAddress,
    /// Chunk payload, present only when read from a data-bearing index.
    pub data: Bytes,
    /// Time of first storage.
    pub store_timestamp: u64,
    /// Time of last access; `0` if never accessed.
    pub access_timestamp: u64,
}

impl ChunkItem {
    /// Item carrying only an address, used as a lookup key.
    pub fn new(address: ChunkAddress) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    /// Set the payload.
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Set the store timestamp.
    pub fn with_store_timestamp(mut self, timestamp: u64) -> Self {
        self.store_timestamp = timestamp;
        self
    }

    /// Set the access timestamp.
    pub fn with_access_timestamp(mut self, timestamp: u64) -> Self {
        self.access_timestamp = timestamp;
        self
    }

    /// Returns true if an access timestamp is set.
    pub fn is_accessed(&self) -> bool {
        self.access_timestamp != 0
    }
}
