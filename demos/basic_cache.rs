//! Example demonstrating add, find and delete under both read strategies.
//!
//! Run with: cargo run --example basic_cache

use refcache::{CacheBuilder, CacheError, ReadStrategy};

fn main() {
    println!("=== Cache Examples ===\n");

    for (n, strategy) in [ReadStrategy::Locked, ReadStrategy::LockFree]
        .into_iter()
        .enumerate()
    {
        println!("{}. {:?} strategy", n + 1, strategy);
        let cache = CacheBuilder::new(3).strategy(strategy).build();

        cache.add(1, "one").unwrap();
        cache.add(2, "two").unwrap();
        cache.add(3, "three").unwrap();

        // Lookups raise popularity; id 2 is never looked up.
        let one = cache.find(1).unwrap();
        cache.find(3);
        println!("   find(1) -> {:?} (popularity {})", one.name().as_str(), one.popularity());

        // Insert id 4, evicts the least popular member (id 2)
        cache.add(4, "four").unwrap();
        println!("   contains 2? {} (evicted as least popular)", cache.contains(2));
        println!("   ids in insertion order: {:?}", cache.ids());

        // The handle outlives the delete
        cache.delete(1).unwrap();
        cache.synchronize();
        println!("   after delete(1): find(1) = {:?}", cache.find(1).map(|o| o.id()));
        println!("   held handle still reads {:?}", one.name().as_str());
        drop(one);

        match cache.delete(42) {
            Err(CacheError::NotFound(id)) => println!("   delete(42) -> id {} is not cached", id),
            other => println!("   delete(42) -> {:?}", other),
        }

        let metrics = cache.metrics();
        println!(
            "   hits {} / misses {} / evictions {} / freed {}",
            metrics.find_hits, metrics.find_misses, metrics.evictions, metrics.objects_freed
        );
        println!();
    }
}
