#![no_main]

use libfuzzer_sys::fuzz_target;
use refcache::{CacheBuilder, CacheError, ReadStrategy};

// Fuzz arbitrary operation sequences on Cache
//
// Drives add, find, delete, contains, clear and synchronize against either
// read strategy, holding on to some handles across removals, and checks the
// internal invariants after every step.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let capacity = (data[0] as usize % 16).max(1);
    let strategy = if data[1] & 1 == 0 {
        ReadStrategy::Locked
    } else {
        ReadStrategy::LockFree
    };
    let cache = CacheBuilder::new(capacity).strategy(strategy).build();
    let mut held = Vec::new();

    let mut idx = 2;
    while idx + 1 < data.len() {
        let op = data[idx] % 6;
        let id = u64::from(data[idx + 1] % 32);

        match op {
            0 => {
                cache.add(id, "fuzz").unwrap();
            }
            1 => {
                if let Some(object) = cache.find(id) {
                    assert_eq!(object.id(), id);
                    if held.len() < 64 {
                        held.push(object);
                    }
                }
            }
            2 => match cache.delete(id) {
                Ok(()) | Err(CacheError::NotFound(_)) => {}
                Err(err) => panic!("unexpected delete error: {}", err),
            },
            3 => {
                let _ = cache.contains(id);
            }
            4 => cache.clear(),
            5 => cache.synchronize(),
            _ => unreachable!(),
        }

        assert!(cache.len() <= cache.capacity());
        cache.check_invariants().unwrap();

        idx += 2;
    }

    for object in &held {
        assert_eq!(object.name().as_str(), "fuzz");
    }
    drop(held);
    cache.clear();
    cache.synchronize();
    let metrics = cache.metrics();
    assert_eq!(metrics.objects_freed, metrics.adds);
});
