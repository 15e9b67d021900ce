//! Concurrent transitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;
use vertex_storage::MemoryStore;
use vertex_swarm_localstore::{ChunkAddress, ChunkItem, LocalStore, LocalStoreArgs, ModeSet};

const THREADS: u8 = 16;

/// Store whose clock hands out distinct increasing timestamps and records
/// each one.
fn open(composite: bool) -> (LocalStore<MemoryStore>, Arc<Mutex<Vec<u64>>>) {
    let next = AtomicU64::new(1);
    let issued = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&issued);
    let args = LocalStoreArgs {
        composite_index: composite,
        ..Default::default()
    };
    let store = LocalStore::with_clock(Arc::new(MemoryStore::new()), &args, move || {
        let now = next.fetch_add(1, Ordering::SeqCst);
        log.lock().push(now);
        now
    })
    .unwrap();
    (store, issued)
}

#[test]
fn distinct_addresses_do_not_interfere() {
    for composite in [false, true] {
        let (store, _) = open(composite);

        thread::scope(|s| {
            for n in 1..=THREADS {
                let store = &store;
                s.spawn(move || {
                    let address = ChunkAddress::new([n; 32]);
                    store
                        .put(&ChunkItem::new(address).with_data(vec![n; 8]))
                        .unwrap();
                    for _ in 0..10 {
                        store.set(ModeSet::Access, &address).unwrap();
                    }
                    store.set(ModeSet::Sync, &address).unwrap();
                });
            }
        });

        for n in 1..=THREADS {
            let item = store.get(&ChunkAddress::new([n; 32])).unwrap();
            assert_eq!(&item.data[..], &[n; 8][..]);
            assert!(item.access_timestamp > item.store_timestamp);
        }
        assert_eq!(store.gc_size(), u64::from(THREADS));
        assert_eq!(store.push_index().count().unwrap(), 0);
        assert!(store.check_gc_size().unwrap().is_consistent());
    }
}

#[test]
fn same_address_transitions_serialize() {
    for composite in [false, true] {
        let (store, issued) = open(composite);
        let address = ChunkAddress::new([0xaa; 32]);
        store.put(&ChunkItem::new(address)).unwrap();

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..20 {
                        store.set(ModeSet::Access, &address).unwrap();
                    }
                });
            }
        });

        let item = store.get(&address).unwrap();
        assert!(issued.lock().contains(&item.access_timestamp));
        assert_eq!(store.gc_index().count().unwrap(), 1);
        assert_eq!(store.pull_index().count().unwrap(), 1);
        assert_eq!(store.gc_size(), 1);
    }
}
