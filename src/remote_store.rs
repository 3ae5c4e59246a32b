use crate::cache_entry::{resolve_liveness, ErrorTtl, Liveness, TtlPolicy};
use crate::store::{CacheStore, Lookup, StoreError};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Hash-map fields longer than this are replaced by their SHA-512 hex digest.
pub const DEFAULT_MAX_FIELD_LEN: usize = 2000;

/// Transport capability for a remote hash-map style key/value service.
///
/// The store keeps one hash map per wrapped function, addressed by
/// `namespace`; each cache entry is one `field` inside it. Implementations
/// translate these calls onto their client library (a Redis `HGET`/`HSET`
/// pair, for instance) and report transport failures as
/// [`StoreError::Backend`].
pub trait RemoteBackend: Send + Sync {
    fn get(&self, namespace: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, namespace: &str, field: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn delete(&self, namespace: &str, field: &str) -> Result<(), StoreError>;
    fn clear(&self, namespace: &str) -> Result<(), StoreError>;
}

/// Serialized form of one remote cache entry.
///
/// Exactly one of `data`/`err` is present, each holding the JSON encoding of
/// the success value or the error. No TTL is stored server-side: freshness is
/// always computed client-side from `created_at_ms` against the configured
/// windows at load time, so clock skew between producer and consumer shifts
/// the effective windows.
#[derive(Serialize, Deserialize)]
struct WireEntry {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    data: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    err: Option<Vec<u8>>,
    created_at_ms: u64,
}

/// Cache store backed by a remote key/value service.
///
/// Satisfies the same three-way [`load`](CacheStore::load) contract as the
/// in-memory stores over any [`RemoteBackend`], so a fleet of processes can
/// share one cache namespace. Values and errors must round-trip through
/// serde. Overlong canonical keys are bounded by hashing (see
/// [`DEFAULT_MAX_FIELD_LEN`]).
///
/// Unlike the in-memory stores, every operation here can fail; failures
/// surface as [`StoreError`] through the store contract and reach the caller
/// as [`CacheError::Store`](crate::CacheError::Store).
pub struct RemoteStore<B, V, E> {
    backend: B,
    namespace: String,
    max_field_len: usize,
    policy: RwLock<TtlPolicy>,
    _marker: PhantomData<fn() -> (V, E)>,
}

impl<B: RemoteBackend, V, E> RemoteStore<B, V, E> {
    /// Creates a store writing into `namespace` on the given backend.
    pub fn new(backend: B, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            max_field_len: DEFAULT_MAX_FIELD_LEN,
            policy: RwLock::new(TtlPolicy::default()),
            _marker: PhantomData,
        }
    }

    /// Adjusts the length bound past which fields are hashed. A bound of
    /// zero hashes every field.
    pub fn set_max_field_len(&mut self, max_field_len: usize) {
        self.max_field_len = max_field_len;
    }

    /// Bounds a canonical key to a backend-friendly field name.
    fn field_for(&self, key: &str) -> String {
        if key.len() <= self.max_field_len {
            return key.to_string();
        }
        hex::encode(Sha512::digest(key.as_bytes()))
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl<B, V, E> CacheStore<V, E> for RemoteStore<B, V, E>
where
    B: RemoteBackend,
    V: Serialize + DeserializeOwned + Send + Sync,
    E: Serialize + DeserializeOwned + Send + Sync,
{
    fn store(&self, key: &str, result: &Result<V, E>) -> Result<(), StoreError> {
        if result.is_err() && self.policy.read().error_ttl == ErrorTtl::NoCache {
            return Ok(());
        }
        let entry = match result {
            Ok(value) => WireEntry {
                data: Some(serde_json::to_vec(value)?),
                err: None,
                created_at_ms: now_unix_ms(),
            },
            Err(err) => WireEntry {
                data: None,
                err: Some(serde_json::to_vec(err)?),
                created_at_ms: now_unix_ms(),
            },
        };
        let field = self.field_for(key);
        self.backend
            .set(&self.namespace, &field, serde_json::to_vec(&entry)?)
    }

    fn load(&self, key: &str) -> Result<Lookup<V, E>, StoreError> {
        let field = self.field_for(key);
        let raw = match self.backend.get(&self.namespace, &field)? {
            Some(raw) => raw,
            None => return Ok(Lookup::Miss),
        };
        let entry: WireEntry = serde_json::from_slice(&raw)?;

        let result: Result<V, E> = match (&entry.data, &entry.err) {
            (Some(data), None) => Ok(serde_json::from_slice(data)?),
            (None, Some(err)) => Err(serde_json::from_slice(err)?),
            _ => {
                return Err(StoreError::Malformed {
                    key: key.to_string(),
                })
            }
        };

        let age = Duration::from_millis(now_unix_ms().saturating_sub(entry.created_at_ms));
        let policy = *self.policy.read();
        match resolve_liveness(age, result.is_err(), &policy) {
            Liveness::Fresh => Ok(Lookup::Fresh(result)),
            Liveness::Stale => Ok(Lookup::Stale(result)),
            Liveness::Expired => {
                self.backend.delete(&self.namespace, &field)?;
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
        self.backend.clear(&self.namespace)
    }
}
