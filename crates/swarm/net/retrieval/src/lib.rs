//! Bookkeeping for outstanding retrieval requests.
//!
//! Before a chunk is requested from a peer, the request id and the expected
//! address are recorded with [`PeerRetrievals::add`]. When a delivery
//! arrives, [`PeerRetrievals::check`] tells solicited deliveries apart from
//! unsolicited ones and from deliveries of the wrong chunk.
//!
//! ```ignore
//! let tracker = RetrievalTracker::new();
//! let id = tracker.next_request_id();
//! tracker.peer(peer).add(id, address);
//! // ... delivery arrives
//! tracker.peer(peer).check(id, &delivered)?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::trace;
use vertex_swarm_localstore::ChunkAddress;

/// Locally generated retrieval request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Id carried by synthetic or unsolicited deliveries. Never tracked.
    pub const SYNTHETIC: Self = Self(0);

    /// Returns true for [`RequestId::SYNTHETIC`].
    pub fn is_synthetic(&self) -> bool {
        *self == Self::SYNTHETIC
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors from validating a delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    /// No request with this id is outstanding for the peer.
    #[error("unknown retrieval request: {0}")]
    UnknownRequest(RequestId),

    /// The request exists but was for a different chunk.
    #[error("retrieval request for {expected} answered with {actual}")]
    AddressMismatch {
        /// Address recorded with the request.
        expected: ChunkAddress,
        /// Address of the delivered chunk.
        actual: ChunkAddress,
    },
}

/// Outstanding requests to one peer.
#[derive(Debug, Default)]
pub struct PeerRetrievals {
    retrievals: Mutex<HashMap<RequestId, ChunkAddress>>,
}

impl PeerRetrievals {
    /// Create an empty request table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` asks for `address`.
    pub fn add(&self, id: RequestId, address: ChunkAddress) {
        trace!(%id, %address, "tracking retrieval");
        self.retrievals.lock().insert(id, address);
    }

    /// Validate a delivery of `address` answering request `id`.
    pub fn check(&self, id: RequestId, address: &ChunkAddress) -> Result<(), RetrievalError> {
        if id.is_synthetic() {
            return Ok(());
        }

        match self.retrievals.lock().get(&id) {
            None => Err(RetrievalError::UnknownRequest(id)),
            Some(expected) if expected != address => Err(RetrievalError::AddressMismatch {
                expected: *expected,
                actual: *address,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Stop tracking `id`, returning the address it asked for.
    pub fn remove(&self, id: RequestId) -> Option<ChunkAddress> {
        self.retrievals.lock().remove(&id)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.retrievals.lock().len()
    }

    /// Returns true if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.retrievals.lock().is_empty()
    }
}

/// Request tables for every connected peer.
#[derive(Debug)]
pub struct RetrievalTracker<P> {
    peers: RwLock<HashMap<P, Arc<PeerRetrievals>>>,
    next_id: AtomicU64,
}

impl<P> Default for RetrievalTracker<P> {
    fn default() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<P: Eq + Hash + Copy + fmt::Debug> RetrievalTracker<P> {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a request id. Never returns [`RequestId::SYNTHETIC`].
    pub fn next_request_id(&self) -> RequestId {
        loop {
            let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
            if !id.is_synthetic() {
                return id;
            }
        }
    }

    /// Get or create the request table for `peer`.
    pub fn peer(&self, peer: P) -> Arc<PeerRetrievals> {
        {
            let peers = self.peers.read();
            if let Some(retrievals) = peers.get(&peer) {
                return Arc::clone(retrievals);
            }
        }

        let mut peers = self.peers.write();
        Arc::clone(peers.entry(peer).or_default())
    }

    /// Forget `peer` and its outstanding requests, e.g. on disconnect.
    pub fn remove_peer(&self, peer: &P) -> Option<Arc<PeerRetrievals>> {
        let removed = self.peers.write().remove(peer);
        if let Some(retrievals) = &removed {
            trace!(?peer, outstanding = retrievals.len(), "dropped peer retrievals");
        }
        removed
    }

    /// Number of peers with a request table.
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn address(n: u8) -> ChunkAddress {
        ChunkAddress::new([n; 32])
    }

    #[test]
    fn test_check_outcomes() {
        let retrievals = PeerRetrievals::new();
        retrievals.add(RequestId(7), address(1));

        assert_eq!(retrievals.check(RequestId(7), &address(1)), Ok(()));
        assert_matches!(
            retrievals.check(RequestId(8), &address(1)),
            Err(RetrievalError::UnknownRequest(RequestId(8)))
        );
        assert_matches!(
            retrievals.check(RequestId(7), &address(2)),
            Err(RetrievalError::AddressMismatch { expected, actual })
                if expected == address(1) && actual == address(2)
        );
    }

    #[test]
    fn test_synthetic_bypasses_validation() {
        let retrievals = PeerRetrievals::new();
        assert_eq!(retrievals.check(RequestId::SYNTHETIC, &address(3)), Ok(()));
        assert!(retrievals.is_empty());
    }

    #[test]
    fn test_remove_request() {
        let retrievals = PeerRetrievals::new();
        retrievals.add(RequestId(1), address(1));
        retrievals.add(RequestId(2), address(2));

        assert_eq!(retrievals.remove(RequestId(1)), Some(address(1)));
        assert_eq!(retrievals.remove(RequestId(1)), None);
        assert_eq!(retrievals.len(), 1);
        assert_matches!(
            retrievals.check(RequestId(1), &address(1)),
            Err(RetrievalError::UnknownRequest(_))
        );
    }

    #[test]
    fn test_tracker_shares_peer_tables() {
        let tracker = RetrievalTracker::<u32>::new();
        let id = tracker.next_request_id();
        assert!(!id.is_synthetic());
        assert_ne!(tracker.next_request_id(), id);

        tracker.peer(1).add(id, address(1));
        assert_eq!(tracker.peer(1).check(id, &address(1)), Ok(()));
        // Requests are per peer.
        assert_matches!(
            tracker.peer(2).check(id, &address(1)),
            Err(RetrievalError::UnknownRequest(_))
        );
        assert_eq!(tracker.peer_count(), 2);

        let removed = tracker.remove_peer(&1).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(tracker.peer_count(), 1);
        assert!(tracker.peer(1).is_empty());
    }
}
