//! Runs a whole test binary on top of a locked segregated allocator.

use std::{collections::BTreeMap, thread};

use mempool::{LockedAllocator, SegregatedAllocator, SegregatedConfig, raw::System};

#[global_allocator]
static ALLOCATOR: LockedAllocator<System> = LockedAllocator::new(
    SegregatedAllocator::with_config(SegregatedConfig::DEFAULT, System),
);

#[test]
fn std_collections_run_on_the_pool() {
    let before = ALLOCATOR.stats();

    let mut map = BTreeMap::new();
    for i in 0..10_000_u32 {
        map.insert(i, i.to_string());
    }
    let total = map.values().map(String::len).sum::<usize>();
    assert_eq!(total, 38_890);

    let mut buf = Vec::new();
    for i in 0..100_000_u32 {
        buf.push(i);
    }
    assert_eq!(buf.iter().copied().map(u64::from).sum::<u64>(), 4_999_950_000);

    let after = ALLOCATOR.stats();
    assert!(after.refills > before.refills);
    assert!(after.fallback_allocations > before.fallback_allocations);
}

#[test]
fn threads_allocate_through_the_pool() {
    let handles = (0..4)
        .map(|t| {
            thread::spawn(move || {
                (0..1000)
                    .map(|i| vec![t; i % 300])
                    .map(|v| v.len())
                    .sum::<usize>()
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), (0..1000).map(|i| i % 300).sum::<usize>());
    }
}
