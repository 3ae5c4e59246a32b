use std::time::{Duration, Instant};

/// Expiration policy for error results, independent of the success TTL.
///
/// The wrapped function returns `Result<V, E>`; a cached `Err` can be given
/// its own lifetime:
///
/// * `NoCache` - error results are never written to the store, so every call
///   after a failure re-executes the function. This is the default.
/// * `FollowTtl` - error results live exactly as long as success results.
/// * `After(duration)` - error results expire independently after the given
///   duration, regardless of the success TTL.
///
/// # Examples
///
/// ```
/// use memofn::ErrorTtl;
/// use std::time::Duration;
///
/// let policy = ErrorTtl::After(Duration::from_secs(5));
/// assert_ne!(policy, ErrorTtl::NoCache);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorTtl {
    #[default]
    NoCache,
    FollowTtl,
    After(Duration),
}

/// Expiration windows applied by a cache store when resolving a lookup.
///
/// * `ttl` - validity window for success results; `None` means permanent.
/// * `error_ttl` - validity window for error results, see [`ErrorTtl`].
/// * `reuse_ttl` - grace window after expiry during which a stale result is
///   still served while a refresh runs in the background; `None` disables
///   stale serving.
#[derive(Clone, Copy, Debug, Default)]
pub struct TtlPolicy {
    pub ttl: Option<Duration>,
    pub error_ttl: ErrorTtl,
    pub reuse_ttl: Option<Duration>,
}

/// Outcome of resolving an entry's age against a [`TtlPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// Inside the primary validity window; serve as a cache hit.
    Fresh,
    /// Past the primary window but inside the reuse grace window; serve
    /// immediately and refresh in the background.
    Stale,
    /// Past the grace window too; evict and treat as a miss.
    Expired,
}

/// Resolves liveness from an entry's age, its success/error flavor, and the
/// store's policy.
///
/// This is shared by every store. The in-memory stores derive `age` from a
/// monotonic [`Instant`]; the remote store derives it from the wall-clock
/// `created_at` carried in the wire record, which is why this takes a plain
/// `Duration` rather than an entry.
///
/// Resolution order (see also the table in the crate docs):
///
/// 1. The primary window is `ttl` for success results. For error results it
///    is `error_ttl`: `After(d)` uses `d`, `FollowTtl` falls back to `ttl`,
///    and `NoCache` expires immediately (such entries are normally never
///    written in the first place).
/// 2. An entry past its primary window but younger than
///    `primary + reuse_ttl` is [`Liveness::Stale`].
/// 3. Anything older is [`Liveness::Expired`].
pub(crate) fn resolve_liveness(age: Duration, is_err: bool, policy: &TtlPolicy) -> Liveness {
    let primary = if is_err {
        match policy.error_ttl {
            ErrorTtl::NoCache => Some(Duration::ZERO),
            ErrorTtl::FollowTtl => policy.ttl,
            ErrorTtl::After(d) => Some(d),
        }
    } else {
        policy.ttl
    };

    let primary = match primary {
        // No window: the entry never expires.
        None => return Liveness::Fresh,
        Some(p) => p,
    };

    if age <= primary {
        return Liveness::Fresh;
    }
    match policy.reuse_ttl {
        Some(reuse) if age < primary + reuse => Liveness::Stale,
        _ => Liveness::Expired,
    }
}

/// A cached result plus the instant it was produced.
///
/// Entries are created by a store on `store` and are immutable afterwards;
/// only their position in an eviction order may change. They are destroyed by
/// capacity eviction, by lazy TTL expiry on `load`, or by an explicit
/// `clear`.
#[derive(Clone, Debug)]
pub struct CacheEntry<V, E> {
    pub result: Result<V, E>,
    pub created_at: Instant,
}

impl<V, E> CacheEntry<V, E> {
    /// Wraps a freshly computed result with the current timestamp.
    pub fn new(result: Result<V, E>) -> Self {
        Self {
            result,
            created_at: Instant::now(),
        }
    }

    /// Resolves this entry's liveness against `policy`.
    pub fn liveness(&self, policy: &TtlPolicy) -> Liveness {
        resolve_liveness(self.created_at.elapsed(), self.result.is_err(), policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn policy(ttl_ms: u64) -> TtlPolicy {
        TtlPolicy {
            ttl: Some(Duration::from_millis(ttl_ms)),
            ..TtlPolicy::default()
        }
    }

    #[test]
    fn fresh_entry_is_fresh() {
        let entry: CacheEntry<i32, String> = CacheEntry::new(Ok(42));
        assert_eq!(entry.liveness(&policy(50)), Liveness::Fresh);
    }

    #[test]
    fn no_ttl_never_expires() {
        let entry: CacheEntry<i32, String> = CacheEntry::new(Ok(1));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(entry.liveness(&TtlPolicy::default()), Liveness::Fresh);
    }

    #[test]
    fn entry_expires_past_ttl() {
        let entry: CacheEntry<i32, String> = CacheEntry::new(Ok(1));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(entry.liveness(&policy(10)), Liveness::Expired);
    }

    #[test]
    fn reuse_window_yields_stale() {
        let p = TtlPolicy {
            ttl: Some(Duration::from_millis(10)),
            reuse_ttl: Some(Duration::from_millis(200)),
            ..TtlPolicy::default()
        };
        let entry: CacheEntry<i32, String> = CacheEntry::new(Ok(1));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(entry.liveness(&p), Liveness::Stale);
    }

    #[test]
    fn stale_entry_expires_past_grace_window() {
        let p = TtlPolicy {
            ttl: Some(Duration::from_millis(10)),
            reuse_ttl: Some(Duration::from_millis(10)),
            ..TtlPolicy::default()
        };
        let entry: CacheEntry<i32, String> = CacheEntry::new(Ok(1));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(entry.liveness(&p), Liveness::Expired);
    }

    #[test]
    fn error_expires_immediately_under_no_cache() {
        let entry: CacheEntry<i32, String> = CacheEntry::new(Err("boom".into()));
        let p = TtlPolicy {
            ttl: Some(Duration::from_secs(60)),
            error_ttl: ErrorTtl::NoCache,
            ..TtlPolicy::default()
        };
        // Even a just-written error entry is already past its window.
        thread::sleep(Duration::from_millis(2));
        assert_eq!(entry.liveness(&p), Liveness::Expired);
    }

    #[test]
    fn error_follows_ttl() {
        let entry: CacheEntry<i32, String> = CacheEntry::new(Err("boom".into()));
        let p = TtlPolicy {
            ttl: Some(Duration::from_secs(60)),
            error_ttl: ErrorTtl::FollowTtl,
            ..TtlPolicy::default()
        };
        assert_eq!(entry.liveness(&p), Liveness::Fresh);
    }

    #[test]
    fn error_with_own_window() {
        let entry: CacheEntry<i32, String> = CacheEntry::new(Err("boom".into()));
        let p = TtlPolicy {
            ttl: None,
            error_ttl: ErrorTtl::After(Duration::from_millis(10)),
            ..TtlPolicy::default()
        };
        assert_eq!(entry.liveness(&p), Liveness::Fresh);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(entry.liveness(&p), Liveness::Expired);
    }

    #[test]
    fn resolve_liveness_is_pure_over_age() {
        let p = TtlPolicy {
            ttl: Some(Duration::from_secs(10)),
            reuse_ttl: Some(Duration::from_secs(5)),
            ..TtlPolicy::default()
        };
        assert_eq!(
            resolve_liveness(Duration::from_secs(1), false, &p),
            Liveness::Fresh
        );
        assert_eq!(
            resolve_liveness(Duration::from_secs(12), false, &p),
            Liveness::Stale
        );
        assert_eq!(
            resolve_liveness(Duration::from_secs(16), false, &p),
            Liveness::Expired
        );
    }
}
