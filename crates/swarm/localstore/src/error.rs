//! Local store error types.

use vertex_storage::DatabaseError;

use crate::ChunkAddress;

/// Errors from local store operations.
///
/// Any error means no index or counter change was committed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocalStoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Chunk not found.
    #[error("chunk not found: {0}")]
    NotFound(ChunkAddress),

    /// Mode value does not name a transition.
    #[error("invalid mode: {0}")]
    InvalidMode(u8),

    /// Another transition held the address for longer than the lock timeout.
    #[error("address lock timeout: {0}")]
    AddressLockTimeout(ChunkAddress),

    /// The zero address was passed where a chunk address is required.
    #[error("empty chunk address")]
    EmptyAddress,
}

/// Result type for local store operations.
pub type LocalStoreResult<T> = Result<T, LocalStoreError>;
