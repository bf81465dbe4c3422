use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use dapp_core::cache::{CacheManager, CacheManagerExt, ShardedCache};

proptest! {
    /// A value put under a key is read back until it is removed.
    #[test]
    fn prop_put_get_remove(key in ".{0,16}", value in any::<u64>(), shards in 0usize..64) {
        let cache = ShardedCache::with_shards(shards);
        prop_assert!(!cache.contains(&key).unwrap());

        prop_assert!(cache.put_value(&key, value).unwrap().is_none());
        prop_assert!(cache.contains(&key).unwrap());
        prop_assert!(cache.contains(&key).unwrap());
        prop_assert_eq!(*cache.get_as::<u64>(&key).unwrap().unwrap(), value);

        prop_assert!(cache.remove(&key).unwrap().is_some());
        prop_assert!(!cache.contains(&key).unwrap());
        prop_assert!(cache.get(&key).unwrap().is_none());
        prop_assert!(cache.remove(&key).unwrap().is_none());
    }

    /// Sequential writes to one key: the last writer wins.
    #[test]
    fn prop_last_writer_wins(key in "[a-z]{1,8}", values in proptest::collection::vec(any::<i64>(), 1..20)) {
        let cache = ShardedCache::new();
        for v in &values {
            cache.put_value(&key, *v).unwrap();
        }
        prop_assert_eq!(*cache.get_as::<i64>(&key).unwrap().unwrap(), *values.last().unwrap());
        prop_assert_eq!(cache.len(), 1);
    }

    /// Concurrent writes to one key leave exactly one of the written values.
    #[test]
    fn prop_concurrent_same_key_writes(values in proptest::collection::vec(any::<u32>(), 2..8)) {
        let cache = Arc::new(ShardedCache::new());
        let handles: Vec<_> = values
            .iter()
            .map(|v| {
                let cache = Arc::clone(&cache);
                let v = *v;
                thread::spawn(move || {
                    cache.put_value("shared", v).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stored = *cache.get_as::<u32>("shared").unwrap().unwrap();
        prop_assert!(values.contains(&stored));
    }

    /// Reading a value as the wrong type is an error, not a silent miss.
    #[test]
    fn prop_type_mismatch_is_reported(value in any::<u64>()) {
        let cache = ShardedCache::new();
        cache.put_value("k", value).unwrap();
        prop_assert!(cache.get_as::<String>("k").is_err());
        prop_assert!(cache.contains("k").unwrap());
    }
}
