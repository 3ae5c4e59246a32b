//! # memofn
//!
//! Function memoization with per-key single-flight concurrency, TTL and
//! error-TTL expiration, stale-while-revalidate serving, and pluggable cache
//! stores.
//!
//! Wrapping a function of arity 0-3 produces a callable with the same shape
//! whose results are cached by argument value:
//!
//! ```
//! use memofn::{memoize1, Config};
//! use std::convert::Infallible;
//! use std::time::Duration;
//!
//! fn fetch_score(user_id: u64) -> Result<u64, Infallible> {
//!     // imagine a database round trip here
//!     Ok(user_id * 2)
//! }
//!
//! let cached = memoize1(fetch_score, Config::new().ttl(Duration::from_secs(60)));
//! assert_eq!(cached(21).unwrap(), 42);
//! assert_eq!(cached(21).unwrap(), 42); // served from cache
//! ```
//!
//! ## Features
//!
//! - **Single-flight**: concurrent callers sharing a key trigger at most one
//!   execution of the underlying function; everyone else gets the result.
//! - **Expiration policy**: independent TTL windows for success and error
//!   results ([`ErrorTtl`]), plus a reuse grace window during which a stale
//!   value is served instantly while a background refresh runs.
//! - **Pluggable stores**: unbounded [`MemoryStore`] (default), bounded
//!   [`LruStore`], or a [`RemoteStore`] over any [`RemoteBackend`].
//! - **Canonical keys**: arguments are keyed by a deterministic canonical
//!   form ([`CanonKey`]) that is stable across map iteration orders and
//!   detects reference cycles; pointer arguments can instead be keyed by
//!   address (`compare_pointer_identity`).
//! - **Context passthrough**: the `*_ctx` wrappers accept a leading context
//!   argument that reaches the function but never the key.
//!
//! ## Module organization
//!
//! - [`cache_entry`](CacheEntry) - timestamped entries and TTL resolution
//! - [`store`](CacheStore) - the store contract and its [`Lookup`] outcome
//! - [`MemoryStore`] / [`LruStore`] / [`RemoteStore`] - the store family
//! - [`canon`](CanonKey) - deterministic value canonicalization
//! - [`CachedFn`] - the n-ary single-flight engine
//! - [`Config`] / `memoize0`..`memoize3` - wrap-time surface
//!
//! ## Error channels
//!
//! A memoized function returns `Result<V, CacheError<E>>`:
//! [`CacheError::Function`] carries the wrapped function's own error (which
//! may itself have been served from cache, per [`ErrorTtl`]), while
//! [`CacheError::Store`] carries cache infrastructure failures, which are
//! never cached and never retried. Functions that cannot fail wrap with
//! `E = std::convert::Infallible`.
//!
//! ## Scope
//!
//! Staleness is bounded only by local TTL policy: there is no cross-process
//! invalidation, and clock skew matters for [`RemoteStore`] freshness.
//! Memory stays bounded only if a bounded store is configured. Abandoning a
//! call does not cancel an in-flight computation; it completes and populates
//! the cache for the next caller.

mod cache_entry;
mod canon;
mod config;
mod engine;
mod lru_store;
mod memory_store;
mod remote_store;
mod store;
mod utils;
mod wrap;

pub use cache_entry::{CacheEntry, ErrorTtl, Liveness, TtlPolicy};
pub use canon::{canonical_key, CanonKey, Canonicalizer, RecordWriter};
pub use config::Config;
pub use engine::{CacheError, CachedFn};
pub use lru_store::{LruStore, DEFAULT_LRU_CAPACITY};
pub use memory_store::MemoryStore;
pub use remote_store::{RemoteBackend, RemoteStore, DEFAULT_MAX_FIELD_LEN};
pub use store::{CacheStore, Lookup, StoreError};
pub use wrap::{
    memoize0, memoize0_ctx, memoize1, memoize1_ctx, memoize2, memoize2_ctx, memoize3,
    memoize3_ctx,
};
