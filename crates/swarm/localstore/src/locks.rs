//! Per-address lock registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use parking_lot::lock_api::ArcMutexGuard;
use tracing::warn;

use crate::{ChunkAddress, LocalStoreError, LocalStoreResult};

/// Default time to wait for an address held by another transition.
pub const DEFAULT_ADDRESS_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

type AddressMutex = Arc<Mutex<()>>;

/// Serializes transitions on the same address.
///
/// Mutexes are created on first use and dropped once nobody holds or waits
/// on them, so the registry only grows with the number of addresses in
/// flight.
pub struct AddressLocks {
    locks: Mutex<HashMap<ChunkAddress, AddressMutex>>,
    timeout: Duration,
}

impl AddressLocks {
    /// Create a registry whose `lock` waits at most `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire the lock for `address`.
    pub fn lock(&self, address: ChunkAddress) -> LocalStoreResult<AddressGuard<'_>> {
        let mutex = Arc::clone(self.locks.lock().entry(address).or_default());

        let guard = mutex.try_lock_arc_for(self.timeout);
        drop(mutex);

        match guard {
            Some(guard) => Ok(AddressGuard {
                locks: self,
                address,
                guard: Some(guard),
            }),
            None => {
                self.release(address);
                warn!(%address, timeout = ?self.timeout, "address lock timeout");
                Err(LocalStoreError::AddressLockTimeout(address))
            }
        }
    }

    /// Number of addresses with a live mutex.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no address is locked or waited on.
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    fn release(&self, address: ChunkAddress) {
        let mut locks = self.locks.lock();
        if locks
            .get(&address)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&address);
        }
    }
}

impl Default for AddressLocks {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS_LOCK_TIMEOUT)
    }
}

impl fmt::Debug for AddressLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressLocks")
            .field("len", &self.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Held lock on one address. Released on drop.
pub struct AddressGuard<'a> {
    locks: &'a AddressLocks,
    address: ChunkAddress,
    guard: Option<ArcMutexGuard<parking_lot::RawMutex, ()>>,
}

impl AddressGuard<'_> {
    /// The locked address.
    pub fn address(&self) -> ChunkAddress {
        self.address
    }
}

impl fmt::Debug for AddressGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressGuard")
            .field("address", &self.address)
            .finish()
    }
}

impl Drop for AddressGuard<'_> {
    fn drop(&mut self) {
        // Unlock first so the registry entry is no longer referenced.
        drop(self.guard.take());
        self.locks.release(self.address);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use assert_matches::assert_matches;

    use super::*;

    fn address(n: u8) -> ChunkAddress {
        ChunkAddress::new([n; 32])
    }

    #[test]
    fn test_entries_removed_after_release() {
        let locks = AddressLocks::default();
        {
            let _a = locks.lock(address(1)).unwrap();
            let _b = locks.lock(address(2)).unwrap();
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn test_timeout_when_held() {
        let locks = AddressLocks::new(Duration::from_millis(20));
        let held = locks.lock(address(1)).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                assert_matches!(
                    locks.lock(address(1)),
                    Err(LocalStoreError::AddressLockTimeout(a)) if a == address(1)
                );
                // Other addresses are unaffected.
                assert!(locks.lock(address(2)).is_ok());
            });
        });

        assert_eq!(held.address(), address(1));
        drop(held);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_same_address_is_exclusive() {
        let locks = AddressLocks::default();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let _guard = locks.lock(address(9)).unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
