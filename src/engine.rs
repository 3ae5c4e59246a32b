use crate::store::{CacheStore, Lookup, StoreError};
use crate::utils::sleep_random;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Cache-miss re-checks a contending caller performs before falling back to
/// a blocking lock acquisition.
const MAX_CHECK_ATTEMPTS: u32 = 3;

/// Bounds of the randomized backoff between re-checks.
const BACKOFF_MIN: Duration = Duration::from_millis(1);
const BACKOFF_MAX: Duration = Duration::from_millis(5);

/// Error returned by a memoized function.
///
/// The wrapped function's own failures and the cache infrastructure's
/// failures are distinct channels: the former are cacheable results governed
/// by [`ErrorTtl`](crate::ErrorTtl), the latter are never cached and never
/// retried. Both surface to the immediate caller; nothing is swallowed.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<E> {
    /// The wrapped function returned an error (possibly served from cache).
    #[error("{0}")]
    Function(E),

    /// The cache store failed to load or persist an entry.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<E> CacheError<E> {
    /// Unwraps the wrapped function's own error, if that is what this is.
    pub fn into_function(self) -> Option<E> {
        match self {
            CacheError::Function(e) => Some(e),
            CacheError::Store(_) => None,
        }
    }
}

struct Inner<A, V, E> {
    func: Box<dyn Fn(&A) -> Result<V, E> + Send + Sync>,
    store: Arc<dyn CacheStore<V, E>>,
    key_fn: Box<dyn Fn(&A) -> String + Send + Sync>,
    /// Per-key coordination locks, created lazily on first sight of a key and
    /// never pruned. Bounded by the cardinality of distinct keys ever seen -
    /// a documented scaling limit for unbounded key spaces.
    key_locks: DashMap<String, Arc<RwLock<()>>>,
}

/// The n-ary memoization engine.
///
/// Every arity adapter ([`memoize0`](crate::memoize0) and friends) normalizes
/// its arguments into a single tuple type `A` and delegates here, so the
/// single-flight discipline lives in exactly one place:
///
/// 1. Acquire the key's lazily created read/write lock.
/// 2. Under the read lock, consult the store. A fresh hit returns
///    immediately; a stale hit returns immediately and triggers at most one
///    background refresh; a miss proceeds.
/// 3. On a miss, try to take the write lock without blocking. The winner
///    re-checks the store (another caller may have filled it in the window),
///    invokes the function exactly once, persists the result, and returns.
/// 4. A loser re-checks the cache after a short randomized backoff, up to
///    [`MAX_CHECK_ATTEMPTS`] times, then falls back to a blocking write
///    acquisition with one final re-check - bounded optimism with guaranteed
///    forward progress.
///
/// For any key, the wrapped function executes at most once concurrently, and
/// no caller ever observes a partially written entry.
///
/// `CachedFn` is cheap to clone; clones share the store, the lock table, and
/// the wrapped function.
pub struct CachedFn<A, V, E> {
    inner: Arc<Inner<A, V, E>>,
}

impl<A, V, E> Clone for CachedFn<A, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, V, E> CachedFn<A, V, E>
where
    A: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Builds an engine from its three parts: the function, the store, and
    /// the key strategy over the normalized argument tuple.
    ///
    /// The arity wrappers cover the common cases; this is the escape hatch
    /// for unusual arities or fully custom keying.
    pub fn new(
        func: Box<dyn Fn(&A) -> Result<V, E> + Send + Sync>,
        store: Arc<dyn CacheStore<V, E>>,
        key_fn: Box<dyn Fn(&A) -> String + Send + Sync>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                func,
                store,
                key_fn,
                key_locks: DashMap::new(),
            }),
        }
    }

    /// Invokes the memoized function with the normalized argument tuple.
    pub fn call(&self, args: A) -> Result<V, CacheError<E>> {
        let key = (self.inner.key_fn)(&args);
        let lock = self.lock_for(&key);

        let mut attempts = 0;
        loop {
            let looked_up = {
                let _read = lock.read();
                self.inner.store.load(&key)?
            };
            match looked_up {
                Lookup::Fresh(result) => return result.map_err(CacheError::Function),
                Lookup::Stale(result) => {
                    self.spawn_refresh(key, args, Arc::clone(&lock));
                    return result.map_err(CacheError::Function);
                }
                Lookup::Miss => {}
            }

            if let Some(_write) = lock.try_write() {
                // Won the right to compute. Another caller may have filled
                // the entry between the read unlock and here, so check once
                // more before invoking.
                if let Lookup::Fresh(result) = self.inner.store.load(&key)? {
                    return result.map_err(CacheError::Function);
                }
                return self.compute_and_store(&key, &args);
            }

            attempts += 1;
            if attempts < MAX_CHECK_ATTEMPTS {
                sleep_random(BACKOFF_MIN, BACKOFF_MAX);
                continue;
            }

            // Contended past the retry budget: wait for the computing caller
            // to finish, then settle the matter under the exclusive lock.
            let _write = lock.write();
            return match self.inner.store.load(&key)? {
                Lookup::Fresh(result) => result.map_err(CacheError::Function),
                // Miss, or already stale again: we hold the lock, recompute.
                _ => self.compute_and_store(&key, &args),
            };
        }
    }

    /// Clears every cached entry in the underlying store.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.inner.store.clear()
    }

    fn lock_for(&self, key: &str) -> Arc<RwLock<()>> {
        // First writer wins; every later caller reuses the same lock.
        self.inner
            .key_locks
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Runs the wrapped function (caller must hold the key's write lock) and
    /// persists its result.
    fn compute_and_store(&self, key: &str, args: &A) -> Result<V, CacheError<E>> {
        let result = (self.inner.func)(args);
        self.inner.store.store(key, &result)?;
        result.map_err(CacheError::Function)
    }

    /// Refreshes a stale entry off the caller's critical path.
    ///
    /// The spawned worker takes the key's write lock without blocking; if it
    /// is already held, another refresh (or a foreground computation) is in
    /// flight and this one simply gives up. Failures are logged, never
    /// surfaced: no caller is waiting, and the stale entry stays in place to
    /// be retried on the next stale hit.
    fn spawn_refresh(&self, key: String, args: A, lock: Arc<RwLock<()>>) {
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            let _write = match lock.try_write() {
                Some(guard) => guard,
                None => return,
            };
            // Someone else may have refreshed the entry between the stale
            // read and this acquisition; don't recompute a fresh entry.
            if let Ok(Lookup::Fresh(_)) = inner.store.load(&key) {
                return;
            }
            let result = (inner.func)(&args);
            if let Err(err) = inner.store.store(&key, &result) {
                log::warn!("background refresh of key `{key}` failed to store: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_entry::ErrorTtl;
    use crate::memory_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn counting_engine(
        counter: Arc<AtomicUsize>,
        delay: Duration,
    ) -> CachedFn<(u32,), u32, String> {
        let store: Arc<dyn CacheStore<u32, String>> = Arc::new(MemoryStore::new());
        CachedFn::new(
            Box::new(move |args: &(u32,)| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(delay);
                Ok(args.0 * 2)
            }),
            store,
            Box::new(|args: &(u32,)| args.0.to_string()),
        )
    }

    #[test]
    fn second_call_is_served_from_cache() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cached = counting_engine(Arc::clone(&counter), Duration::ZERO);
        assert_eq!(cached.call((21,)).unwrap(), 42);
        assert_eq!(cached.call((21,)).unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_keys_compute_independently() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cached = counting_engine(Arc::clone(&counter), Duration::ZERO);
        assert_eq!(cached.call((1,)).unwrap(), 2);
        assert_eq!(cached.call((2,)).unwrap(), 4);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_callers_trigger_a_single_execution() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cached = counting_engine(Arc::clone(&counter), Duration::from_millis(50));
        let barrier = Arc::new(Barrier::new(10));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cached = cached.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cached.call((7,)).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 14);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_forces_recomputation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cached = counting_engine(Arc::clone(&counter), Duration::ZERO);
        cached.call((3,)).unwrap();
        cached.clear().unwrap();
        cached.call((3,)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn function_errors_surface_through_cache_error() {
        let store: Arc<dyn CacheStore<u32, String>> = Arc::new(MemoryStore::new());
        store.set_error_ttl(ErrorTtl::After(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cached: CachedFn<(u32,), u32, String> = CachedFn::new(
            Box::new(move |_args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            }),
            store,
            Box::new(|args: &(u32,)| args.0.to_string()),
        );

        let err = cached.call((1,)).unwrap_err();
        assert_eq!(err.into_function(), Some("down".to_string()));

        // Second failure is served from cache: still one execution.
        let err = cached.call((1,)).unwrap_err();
        assert_eq!(err.into_function(), Some("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_hit_serves_old_value_and_refreshes_in_background() {
        let store: Arc<MemoryStore<u32, String>> = Arc::new(MemoryStore::new());
        store.set_ttl(Some(Duration::from_millis(80)));
        store.set_reuse_ttl(Some(Duration::from_millis(500)));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cached: CachedFn<(u32,), u32, String> = CachedFn::new(
            Box::new(move |_args| Ok(counter.fetch_add(1, Ordering::SeqCst) as u32)),
            store,
            Box::new(|_args| "k".to_string()),
        );

        // t=0: first execution, caches 0.
        assert_eq!(cached.call((0,)).unwrap(), 0);

        thread::sleep(Duration::from_millis(100));

        // Past TTL, inside the grace window: the old value comes back while
        // the refresh runs off-path.
        assert_eq!(cached.call((0,)).unwrap(), 0);

        // Let the background refresh land, then observe the new value.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(cached.call((0,)).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn at_most_one_background_refresh_per_key() {
        let store: Arc<MemoryStore<u32, String>> = Arc::new(MemoryStore::new());
        store.set_ttl(Some(Duration::from_millis(20)));
        store.set_reuse_ttl(Some(Duration::from_secs(5)));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cached: CachedFn<(u32,), u32, String> = CachedFn::new(
            Box::new(move |_args| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(100));
                Ok(1)
            }),
            store,
            Box::new(|_args| "k".to_string()),
        );

        cached.call((0,)).unwrap();
        thread::sleep(Duration::from_millis(40));

        // A burst of stale hits while the (slow) refresh is in flight must
        // not stack up extra refreshers.
        for _ in 0..5 {
            cached.call((0,)).unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(150));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
