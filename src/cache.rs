//!
//! Shared key-value cache available to every active script.
//!
//! One namespace is shared by all scripts; two scripts writing the same key
//! see each other's values. Values are opaque to the cache.

use std::any::Any;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::DispatcherConfig;
use crate::error::CacheError;

/// An opaquely typed cache value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Default number of shards for [`ShardedCache`].
pub const DEFAULT_SHARDS: usize = 16;

/// Key-value store shared across scripts.
///
/// Implementations must be safe under concurrent use: operations on the same
/// key are linearizable, operations on unrelated keys should not serialize on
/// a single lock. `Err` is reserved for structural backend failures; an absent
/// key is `Ok(None)` / `Ok(false)`.
pub trait CacheManager: Send + Sync {
    /// Stores `value` under `key`, returning the previous value if any.
    fn put(&self, key: &str, value: CacheValue) -> Result<Option<CacheValue>, CacheError>;

    fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;

    /// Removes `key`, returning the removed value if any.
    fn remove(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;

    /// Presence of `key`, independent of what the stored value looks like.
    fn contains(&self, key: &str) -> Result<bool, CacheError>;
}

/// Typed helpers over any [`CacheManager`].
pub trait CacheManagerExt: CacheManager {
    fn put_value<T: Any + Send + Sync>(&self, key: &str, value: T) -> Result<Option<CacheValue>, CacheError> {
        self.put(key, Arc::new(value))
    }

    /// Reads `key` as a `T`. A value of any other type is a `TypeMismatch`.
    fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, CacheError> {
        match self.get(key)? {
            None => Ok(None),
            Some(value) => value
                .downcast::<T>()
                .map(Some)
                .map_err(|_| CacheError::TypeMismatch { key: key.to_string() }),
        }
    }
}

impl<C: CacheManager + ?Sized> CacheManagerExt for C {}

/// In-memory [`CacheManager`] partitioned into independently locked shards.
pub struct ShardedCache {
    shards: Box<[RwLock<HashMap<String, CacheValue>>]>,
    hasher: RandomState,
}

impl ShardedCache {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a cache with `shards` partitions, rounded up to a power of two
    /// (minimum 1).
    pub fn with_shards(shards: usize) -> Self {
        let count = shards.max(1).next_power_of_two();
        let shards = (0..count).map(|_| RwLock::new(HashMap::new())).collect::<Vec<_>>();
        ShardedCache { shards: shards.into_boxed_slice(), hasher: RandomState::new() }
    }

    /// Creates a cache sized by `config.cache_shards`.
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self::with_shards(config.cache_shards)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of entries. Not a snapshot: shards are read one at a time.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    #[inline]
    fn shard(&self, key: &str) -> &RwLock<HashMap<String, CacheValue>> {
        // shard count is a power of two
        let idx = (self.hasher.hash_one(key) as usize) & (self.shards.len() - 1);
        &self.shards[idx]
    }
}

impl Default for ShardedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShardedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedCache")
            .field("shards", &self.shards.len())
            .field("entries", &self.len())
            .finish()
    }
}

impl CacheManager for ShardedCache {
    fn put(&self, key: &str, value: CacheValue) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.shard(key).write().insert(key.to_string(), value))
    }

    fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.shard(key).read().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.shard(key).write().remove(key))
    }

    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.shard(key).read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn shard_count_follows_config() {
        let config = DispatcherConfig::from_lookup(|var| (var == "DAPP_CACHE_SHARDS").then(|| "64".to_string())).unwrap();
        assert_eq!(ShardedCache::from_config(&config).shard_count(), 64);
        assert_eq!(ShardedCache::from_config(&DispatcherConfig::default()).shard_count(), DEFAULT_SHARDS);
    }

    #[test]
    fn put_get_remove_round_trip() {
        let cache = ShardedCache::new();

        assert!(cache.put_value("a", 1i32).unwrap().is_none());
        assert_eq!(*cache.get_as::<i32>("a").unwrap().unwrap(), 1);
        assert!(cache.contains("a").unwrap());

        let removed = cache.remove("a").unwrap().expect("value was present");
        assert_eq!(*removed.downcast::<i32>().unwrap(), 1);
        assert!(cache.get("a").unwrap().is_none());
        assert!(!cache.contains("a").unwrap());
        assert!(cache.remove("a").unwrap().is_none());
    }

    #[test]
    fn put_returns_previous_value() {
        let cache = ShardedCache::new();
        cache.put_value("k", String::from("old")).unwrap();
        let prev = cache.put_value("k", String::from("new")).unwrap().unwrap();
        assert_eq!(prev.downcast_ref::<String>().map(String::as_str), Some("old"));
        assert_eq!(cache.get_as::<String>("k").unwrap().unwrap().as_str(), "new");
    }

    #[test]
    fn presence_is_independent_of_value() {
        let cache = ShardedCache::new();
        cache.put_value("unit", ()).unwrap();
        cache.put_value("none", Option::<u8>::None).unwrap();
        assert!(cache.contains("unit").unwrap());
        assert!(cache.contains("none").unwrap());
        assert_eq!(*cache.get_as::<Option<u8>>("none").unwrap().unwrap(), None);
    }

    #[test]
    fn wrong_type_is_a_type_mismatch() {
        let cache = ShardedCache::new();
        cache.put_value("n", 5u64).unwrap();
        assert_eq!(
            cache.get_as::<String>("n").unwrap_err(),
            CacheError::TypeMismatch { key: "n".into() }
        );
        assert!(cache.get_as::<String>("missing").unwrap().is_none());
    }

    #[test]
    fn shard_count_rounds_to_power_of_two() {
        assert_eq!(ShardedCache::with_shards(0).shard_count(), 1);
        assert_eq!(ShardedCache::with_shards(5).shard_count(), 8);
        assert_eq!(ShardedCache::new().shard_count(), DEFAULT_SHARDS);
    }

    #[test]
    fn usable_as_trait_object() {
        let cache: Arc<dyn CacheManager> = Arc::new(ShardedCache::with_shards(2));
        cache.put_value("x", 3u8).unwrap();
        assert_eq!(*cache.get_as::<u8>("x").unwrap().unwrap(), 3);
    }

    #[test]
    fn disjoint_writers_do_not_interfere() {
        let cache = Arc::new(ShardedCache::with_shards(4));
        let handles: Vec<_> = (0..8)
            .map(|w| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let key = format!("writer-{}", w);
                    for i in 0..500u64 {
                        cache.put_value(&key, i).unwrap();
                        assert_eq!(*cache.get_as::<u64>(&key).unwrap().unwrap(), i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
        for w in 0..8 {
            assert_eq!(*cache.get_as::<u64>(&format!("writer-{}", w)).unwrap().unwrap(), 499);
        }
    }
}
