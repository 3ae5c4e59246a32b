use crate::cache_entry::{ErrorTtl, TtlPolicy};
use crate::memory_store::MemoryStore;
use crate::store::{apply_policy, CacheStore};
use std::sync::Arc;
use std::time::Duration;

/// Wrap-time configuration for a memoized function.
///
/// A `Config` is consumed once when the function is wrapped; there is no live
/// reconfiguration beyond the store's own setters. The type parameters tie it
/// to the wrapped function: `A` is the normalized argument tuple, `V`/`E` the
/// success and error types.
///
/// | option | effect |
/// |---|---|
/// | `ttl` | success-result validity window; unset = permanent |
/// | `error_ttl` | error-result window; default [`ErrorTtl::NoCache`] |
/// | `reuse_ttl` | stale-serving grace window; unset = no stale serving |
/// | `store` | pluggable backend; default unbounded [`MemoryStore`] |
/// | `key_fn` | custom key strategy overriding canonicalization |
/// | `compare_pointer_identity` | key pointer arguments by address |
///
/// # Examples
///
/// ```
/// use memofn::{memoize1, Config};
/// use std::convert::Infallible;
/// use std::time::Duration;
///
/// let cached = memoize1(
///     |n: u32| Ok::<_, Infallible>(n * n),
///     Config::new().ttl(Duration::from_secs(60)),
/// );
/// assert_eq!(cached(9).unwrap(), 81);
/// ```
pub struct Config<A, V, E> {
    pub(crate) ttl: Option<Duration>,
    pub(crate) error_ttl: ErrorTtl,
    pub(crate) reuse_ttl: Option<Duration>,
    pub(crate) store: Option<Arc<dyn CacheStore<V, E>>>,
    pub(crate) key_fn: Option<Box<dyn Fn(&A) -> Vec<u8> + Send + Sync>>,
    pub(crate) compare_pointer_identity: bool,
}

impl<A, V, E> Default for Config<A, V, E> {
    fn default() -> Self {
        Self {
            ttl: None,
            error_ttl: ErrorTtl::default(),
            reuse_ttl: None,
            store: None,
            key_fn: None,
            compare_pointer_identity: false,
        }
    }
}

impl<A, V, E> Config<A, V, E> {
    /// A configuration with no expiry, no stale serving, and the default
    /// unbounded in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the success-result validity window.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the error-result policy.
    pub fn error_ttl(mut self, error_ttl: ErrorTtl) -> Self {
        self.error_ttl = error_ttl;
        self
    }

    /// Sets the grace window during which a stale result is served while a
    /// background refresh runs.
    pub fn reuse_ttl(mut self, reuse_ttl: Duration) -> Self {
        self.reuse_ttl = Some(reuse_ttl);
        self
    }

    /// Uses the given store instead of the default unbounded in-memory map.
    ///
    /// The configured TTL windows are pushed into the store at wrap time.
    pub fn store(mut self, store: Arc<dyn CacheStore<V, E>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides key derivation with a custom strategy.
    ///
    /// The returned bytes are stringified (lossily, if not UTF-8) and used as
    /// the cache key verbatim; canonicalization is skipped entirely. The
    /// strategy receives the whole normalized argument tuple; for the `_ctx`
    /// wrappers that includes the leading context element, so a custom
    /// strategy may key on the context where the default never does.
    pub fn key_fn(mut self, key_fn: impl Fn(&A) -> Vec<u8> + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Box::new(key_fn));
        self
    }

    /// Keys pointer-like arguments by address rather than by pointee value.
    pub fn compare_pointer_identity(mut self, enabled: bool) -> Self {
        self.compare_pointer_identity = enabled;
        self
    }

    /// Resolves the store this configuration describes, applying the TTL
    /// windows onto it.
    pub(crate) fn build_store(&mut self) -> Arc<dyn CacheStore<V, E>>
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let store = self
            .store
            .take()
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let policy = TtlPolicy {
            ttl: self.ttl,
            error_ttl: self.error_ttl,
            reuse_ttl: self.reuse_ttl,
        };
        apply_policy(store.as_ref(), &policy);
        store
    }
}
