//! GC size counter invariant over random operation sequences.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use proptest::prelude::*;
use strum::IntoEnumIterator;
use vertex_storage::MemoryStore;
use vertex_swarm_localstore::{
    ChunkAddress, ChunkItem, LocalStore, LocalStoreArgs, LocalStoreError, ModeSet,
};

#[derive(Debug, Clone)]
enum Op {
    Put(u8),
    Set(ModeSet, u8),
}

fn op() -> impl Strategy<Value = Op> {
    let modes: Vec<ModeSet> = ModeSet::iter().collect();
    prop_oneof![
        (1u8..6).prop_map(Op::Put),
        (proptest::sample::select(modes), 1u8..6).prop_map(|(mode, n)| Op::Set(mode, n)),
    ]
}

fn run(composite: bool, ops: &[Op]) -> Result<(), TestCaseError> {
    // Coarse clock so transitions regularly share a timestamp.
    let ticks = Arc::new(AtomicU64::new(2));
    let clock = Arc::clone(&ticks);
    let args = LocalStoreArgs {
        composite_index: composite,
        ..Default::default()
    };
    let store = LocalStore::with_clock(Arc::new(MemoryStore::new()), &args, move || {
        clock.fetch_add(1, Ordering::SeqCst) / 2
    })
    .unwrap();

    for op in ops {
        match *op {
            Op::Put(n) => store
                .put(&ChunkItem::new(ChunkAddress::new([n; 32])))
                .unwrap(),
            Op::Set(mode, n) => match store.set(mode, &ChunkAddress::new([n; 32])) {
                Ok(()) => {}
                Err(LocalStoreError::NotFound(_)) => prop_assert_eq!(mode, ModeSet::Remove),
                Err(err) => return Err(TestCaseError::fail(err.to_string())),
            },
        }

        let check = store.check_gc_size().unwrap();
        prop_assert_eq!(check.counter, check.indexed, "after {:?}", op);
    }
    Ok(())
}

proptest! {
    #[test]
    fn gc_size_matches_index_split(ops in prop::collection::vec(op(), 1..60)) {
        run(false, &ops)?;
    }

    #[test]
    fn gc_size_matches_index_composite(ops in prop::collection::vec(op(), 1..60)) {
        run(true, &ops)?;
    }
}
