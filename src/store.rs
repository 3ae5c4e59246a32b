use crate::cache_entry::{ErrorTtl, TtlPolicy};
use std::time::Duration;

/// Infrastructure failure of a cache store.
///
/// The built-in in-memory stores never produce one of these; they exist for
/// backends that can genuinely fail, such as [`RemoteStore`](crate::RemoteStore).
/// The engine propagates them to the caller as
/// [`CacheError::Store`](crate::CacheError::Store) and never retries them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing service reported a failure (I/O, protocol, timeout).
    #[error("backend error: {0}")]
    Backend(String),

    /// A value or wire record could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A record was retrieved but does not carry a usable result.
    #[error("malformed cache entry for key `{key}`")]
    Malformed { key: String },
}

/// Three-way outcome of a store lookup.
///
/// This is the typed form of the `(value, hasEntry, isAlive, error)` tuple:
/// the cached computation result travels inside the variant, and
/// infrastructure failures travel in the surrounding `Result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<V, E> {
    /// No entry recorded for the key (or the entry expired and was evicted).
    Miss,
    /// A fully valid entry; serve it as a hit.
    Fresh(Result<V, E>),
    /// An expired entry still inside the reuse grace window; serve it
    /// immediately and refresh in the background.
    Stale(Result<V, E>),
}

/// Pluggable cache backend consumed by the memoization engine.
///
/// A store owns its entries and their expiration: `load` resolves the
/// three-way [`Lookup`] outcome against the configured [`TtlPolicy`] and
/// lazily evicts entries that are past their grace window. `store` persists a
/// computation result, except that error results are dropped when the policy
/// is [`ErrorTtl::NoCache`].
///
/// Implementations must be safe for concurrent use; the engine calls them
/// under per-key read/write locks but different keys proceed in parallel.
///
/// Built-in implementations:
///
/// * [`MemoryStore`](crate::MemoryStore) - unbounded concurrent map (default)
/// * [`LruStore`](crate::LruStore) - bounded, least-recently-used eviction
/// * [`RemoteStore`](crate::RemoteStore) - adapter over a remote key/value
///   backend
pub trait CacheStore<V, E>: Send + Sync {
    /// Persists a computation result under `key`, timestamped now.
    fn store(&self, key: &str, result: &Result<V, E>) -> Result<(), StoreError>;

    /// Looks up `key`, resolving TTL windows and lazily evicting entries past
    /// their grace window.
    fn load(&self, key: &str) -> Result<Lookup<V, E>, StoreError>;

    /// Sets the success-result validity window. `None` means permanent.
    fn set_ttl(&self, ttl: Option<Duration>);

    /// Sets the error-result validity window.
    fn set_error_ttl(&self, error_ttl: ErrorTtl);

    /// Sets the stale-reuse grace window. `None` disables stale serving.
    fn set_reuse_ttl(&self, reuse_ttl: Option<Duration>);

    /// Drops every entry.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Applies a whole [`TtlPolicy`] onto a store in one shot.
///
/// Used at wrap time to push the `Config` windows into whichever store the
/// configuration selected.
pub(crate) fn apply_policy<V, E>(store: &dyn CacheStore<V, E>, policy: &TtlPolicy) {
    store.set_ttl(policy.ttl);
    store.set_error_ttl(policy.error_ttl);
    store.set_reuse_ttl(policy.reuse_ttl);
}
