use crate::cache_entry::{CacheEntry, ErrorTtl, Liveness, TtlPolicy};
use crate::store::{CacheStore, Lookup, StoreError};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::time::Duration;

/// Unbounded in-memory cache store backed by a concurrent map.
///
/// This is the default store used when a `Config` names none. There is no
/// capacity limit: entries leave only through lazy TTL eviction on [`load`]
/// or an explicit [`clear`]. Workloads with unbounded key cardinality should
/// configure an [`LruStore`](crate::LruStore) instead.
///
/// The map itself is a [`DashMap`], so loads and stores for different keys
/// never contend on a single lock.
///
/// [`load`]: CacheStore::load
/// [`clear`]: CacheStore::clear
///
/// # Examples
///
/// ```
/// use memofn::{CacheStore, Lookup, MemoryStore};
///
/// let store: MemoryStore<i32, String> = MemoryStore::new();
/// store.store("answer", &Ok(42)).unwrap();
/// assert_eq!(store.load("answer").unwrap(), Lookup::Fresh(Ok(42)));
/// assert_eq!(store.load("missing").unwrap(), Lookup::Miss);
/// ```
pub struct MemoryStore<V, E> {
    map: DashMap<String, CacheEntry<V, E>>,
    policy: RwLock<TtlPolicy>,
}

impl<V, E> MemoryStore<V, E> {
    /// Creates an empty store with a permanent TTL policy.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            policy: RwLock::new(TtlPolicy::default()),
        }
    }

    /// Creates an empty store with the given policy.
    pub fn with_policy(policy: TtlPolicy) -> Self {
        Self {
            map: DashMap::new(),
            policy: RwLock::new(policy),
        }
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the store currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<V, E> Default for MemoryStore<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> CacheStore<V, E> for MemoryStore<V, E>
where
    V: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    fn store(&self, key: &str, result: &Result<V, E>) -> Result<(), StoreError> {
        if result.is_err() && self.policy.read().error_ttl == ErrorTtl::NoCache {
            // Errors are not persisted under NoCache; the next call recomputes.
            return Ok(());
        }
        self.map
            .insert(key.to_string(), CacheEntry::new(result.clone()));
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Lookup<V, E>, StoreError> {
        let policy = *self.policy.read();
        let liveness = {
            let entry = match self.map.get(key) {
                Some(entry) => entry,
                None => return Ok(Lookup::Miss),
            };
            match entry.liveness(&policy) {
                Liveness::Fresh => return Ok(Lookup::Fresh(entry.result.clone())),
                Liveness::Stale => return Ok(Lookup::Stale(entry.result.clone())),
                Liveness::Expired => Liveness::Expired,
            }
        }; // map shard guard released before the removal below
        debug_assert_eq!(liveness, Liveness::Expired);
        self.map.remove(key);
        Ok(Lookup::Miss)
    }

    fn set_ttl(&self, ttl: Option<Duration>) {
        self.policy.write().ttl = ttl;
    }

    fn set_error_ttl(&self, error_ttl: ErrorTtl) {
        self.policy.write().error_ttl = error_ttl;
    }

    fn set_reuse_ttl(&self, reuse_ttl: Option<Duration>) {
        self.policy.write().reuse_ttl = reuse_ttl;
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.map.clear();
        Ok(())
    }
}
