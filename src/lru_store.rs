use crate::cache_entry::{CacheEntry, ErrorTtl, Liveness, TtlPolicy};
use crate::store::{CacheStore, Lookup, StoreError};
use crate::utils::{move_key_to_back, remove_key};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Capacity used when a [`LruStore`] is created with a capacity of zero.
pub const DEFAULT_LRU_CAPACITY: usize = 100;

struct LruInner<V, E> {
    map: HashMap<String, CacheEntry<V, E>>,
    /// Recency order; least recently used at the front, most recent at the
    /// back. Invariant: `order` and `map` always agree on membership.
    order: VecDeque<String>,
}

/// Bounded in-memory cache store with least-recently-used eviction.
///
/// Inserting into a full store unconditionally evicts the least recently
/// used entry, even if that entry is not yet expired; the capacity is a hard
/// size bound, not a freshness bound. Every `load` that finds a live entry
/// promotes it to most recently used. Stale hits (reuse grace window) do not
/// promote.
///
/// Both the map and the recency queue live under a single `Mutex`, because a
/// lookup mutates recency order; all accesses to one store serialize. That
/// is an accepted trade-off for a correct eviction order under concurrency -
/// different stores (and different keys in the engine's lock table) remain
/// fully independent.
///
/// # Examples
///
/// ```
/// use memofn::{CacheStore, Lookup, LruStore};
///
/// let store: LruStore<i32, String> = LruStore::new(2);
/// store.store("a", &Ok(1)).unwrap();
/// store.store("b", &Ok(2)).unwrap();
/// store.store("c", &Ok(3)).unwrap(); // evicts "a"
/// assert_eq!(store.load("a").unwrap(), Lookup::Miss);
/// assert_eq!(store.load("c").unwrap(), Lookup::Fresh(Ok(3)));
/// ```
pub struct LruStore<V, E> {
    inner: Mutex<LruInner<V, E>>,
    capacity: usize,
    policy: RwLock<TtlPolicy>,
}

impl<V, E> LruStore<V, E> {
    /// Creates a store holding at most `capacity` entries.
    ///
    /// A capacity of zero falls back to [`DEFAULT_LRU_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_LRU_CAPACITY
        } else {
            capacity
        };
        Self {
            inner: Mutex::new(LruInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
            policy: RwLock::new(TtlPolicy::default()),
        }
    }

    /// The configured hard size bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Whether the store currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }
}

impl<V, E> CacheStore<V, E> for LruStore<V, E>
where
    V: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    fn store(&self, key: &str, result: &Result<V, E>) -> Result<(), StoreError> {
        if result.is_err() && self.policy.read().error_ttl == ErrorTtl::NoCache {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        if inner.map.contains_key(key) {
            // Overwrite in place; refresh recency without growing.
            move_key_to_back(&mut inner.order, key);
        } else {
            if inner.map.len() >= self.capacity {
                if let Some(victim) = inner.order.pop_front() {
                    inner.map.remove(&victim);
                }
            }
            inner.order.push_back(key.to_string());
        }
        inner
            .map
            .insert(key.to_string(), CacheEntry::new(result.clone()));
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Lookup<V, E>, StoreError> {
        let policy = *self.policy.read();
        let mut inner = self.inner.lock();
        let (liveness, result) = match inner.map.get(key) {
            Some(entry) => (entry.liveness(&policy), entry.result.clone()),
            None => return Ok(Lookup::Miss),
        };
        match liveness {
            Liveness::Fresh => {
                move_key_to_back(&mut inner.order, key);
                Ok(Lookup::Fresh(result))
            }
            Liveness::Stale => Ok(Lookup::Stale(result)),
            Liveness::Expired => {
                inner.map.remove(key);
                remove_key(&mut inner.order, key);
                Ok(Lookup::Miss)
            }
        }
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
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
        Ok(())
    }
}
