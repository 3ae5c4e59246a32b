//! Arity-specific entry points over the n-ary engine.
//!
//! Every wrapper normalizes its call into a tuple, derives the default key
//! from the tuple's keyed elements (a leading context argument, when present,
//! is passed through to the function but never keyed), and delegates the
//! whole single-flight discipline to [`CachedFn`].

use crate::canon::{canonical_key, CanonKey, Canonicalizer};
use crate::config::Config;
use crate::engine::{CacheError, CachedFn};

/// Resolves the key strategy: the configured custom one, stringified, or the
/// adapter's canonicalization default.
fn resolve_key_fn<A, V, E>(
    config: &mut Config<A, V, E>,
    default: impl Fn(&A, bool) -> String + Send + Sync + 'static,
) -> Box<dyn Fn(&A) -> String + Send + Sync>
where
    A: 'static,
{
    let pointer_identity = config.compare_pointer_identity;
    match config.key_fn.take() {
        Some(custom) => {
            Box::new(move |args| String::from_utf8_lossy(&custom(args)).into_owned())
        }
        None => Box::new(move |args| default(args, pointer_identity)),
    }
}

fn join_keys(parts: &[&dyn CanonKey], pointer_identity: bool) -> String {
    let mut out = Canonicalizer::new(pointer_identity);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.write_raw(",");
        }
        part.canonicalize(&mut out);
    }
    out.finish()
}

/// Memoizes a zero-argument function.
///
/// All calls share the single key `()`; concurrent callers trigger at most
/// one execution.
///
/// # Examples
///
/// ```
/// use memofn::{memoize0, Config};
/// use std::convert::Infallible;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&runs);
/// let cached = memoize0(
///     move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Ok::<_, Infallible>(42)
///     },
///     Config::new(),
/// );
/// assert_eq!(cached().unwrap(), 42);
/// assert_eq!(cached().unwrap(), 42);
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// ```
pub fn memoize0<V, E, F>(
    func: F,
    mut config: Config<(), V, E>,
) -> impl Fn() -> Result<V, CacheError<E>> + Clone + Send + Sync + 'static
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn() -> Result<V, E> + Send + Sync + 'static,
{
    let key_fn = resolve_key_fn(&mut config, |_args: &(), _pid| "()".to_string());
    let store = config.build_store();
    let engine = CachedFn::new(Box::new(move |_args: &()| func()), store, key_fn);
    move || engine.call(())
}

/// Memoizes a one-argument function, keyed by the argument's canonical form.
///
/// # Examples
///
/// ```
/// use memofn::{memoize1, Config};
/// use std::convert::Infallible;
///
/// let cached = memoize1(|n: u64| Ok::<_, Infallible>(n + 1), Config::new());
/// assert_eq!(cached(41).unwrap(), 42);
/// ```
pub fn memoize1<K1, V, E, F>(
    func: F,
    mut config: Config<(K1,), V, E>,
) -> impl Fn(K1) -> Result<V, CacheError<E>> + Clone + Send + Sync + 'static
where
    K1: CanonKey + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(K1) -> Result<V, E> + Send + Sync + 'static,
{
    let key_fn = resolve_key_fn(&mut config, |args: &(K1,), pid| canonical_key(&args.0, pid));
    let store = config.build_store();
    let engine = CachedFn::new(
        Box::new(move |args: &(K1,)| func(args.0.clone())),
        store,
        key_fn,
    );
    move |k1| engine.call((k1,))
}

/// Memoizes a two-argument function, keyed by both arguments.
pub fn memoize2<K1, K2, V, E, F>(
    func: F,
    mut config: Config<(K1, K2), V, E>,
) -> impl Fn(K1, K2) -> Result<V, CacheError<E>> + Clone + Send + Sync + 'static
where
    K1: CanonKey + Clone + Send + Sync + 'static,
    K2: CanonKey + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(K1, K2) -> Result<V, E> + Send + Sync + 'static,
{
    let key_fn = resolve_key_fn(&mut config, |args: &(K1, K2), pid| {
        join_keys(&[&args.0, &args.1], pid)
    });
    let store = config.build_store();
    let engine = CachedFn::new(
        Box::new(move |args: &(K1, K2)| func(args.0.clone(), args.1.clone())),
        store,
        key_fn,
    );
    move |k1, k2| engine.call((k1, k2))
}

/// Memoizes a three-argument function, keyed by all three arguments.
pub fn memoize3<K1, K2, K3, V, E, F>(
    func: F,
    mut config: Config<(K1, K2, K3), V, E>,
) -> impl Fn(K1, K2, K3) -> Result<V, CacheError<E>> + Clone + Send + Sync + 'static
where
    K1: CanonKey + Clone + Send + Sync + 'static,
    K2: CanonKey + Clone + Send + Sync + 'static,
    K3: CanonKey + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(K1, K2, K3) -> Result<V, E> + Send + Sync + 'static,
{
    let key_fn = resolve_key_fn(&mut config, |args: &(K1, K2, K3), pid| {
        join_keys(&[&args.0, &args.1, &args.2], pid)
    });
    let store = config.build_store();
    let engine = CachedFn::new(
        Box::new(move |args: &(K1, K2, K3)| {
            func(args.0.clone(), args.1.clone(), args.2.clone())
        }),
        store,
        key_fn,
    );
    move |k1, k2, k3| engine.call((k1, k2, k3))
}

/// Memoizes a function taking only a context argument.
///
/// The context is passed through to the function but excluded from the key,
/// so all calls share one cache slot regardless of the context value.
/// Context exclusion here is positional by construction, never inferred from
/// the argument's type.
pub fn memoize0_ctx<C, V, E, F>(
    func: F,
    mut config: Config<(C,), V, E>,
) -> impl Fn(C) -> Result<V, CacheError<E>> + Clone + Send + Sync + 'static
where
    C: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(C) -> Result<V, E> + Send + Sync + 'static,
{
    let key_fn = resolve_key_fn(&mut config, |_args: &(C,), _pid| "()".to_string());
    let store = config.build_store();
    let engine = CachedFn::new(
        Box::new(move |args: &(C,)| func(args.0.clone())),
        store,
        key_fn,
    );
    move |ctx| engine.call((ctx,))
}

/// Memoizes a context-plus-one-argument function; only the second argument
/// is keyed.
///
/// # Examples
///
/// ```
/// use memofn::{memoize1_ctx, Config};
/// use std::convert::Infallible;
///
/// #[derive(Clone)]
/// struct Ctx {
///     tenant: &'static str,
/// }
///
/// let cached = memoize1_ctx(
///     |ctx: Ctx, id: u64| Ok::<_, Infallible>(format!("{}/{}", ctx.tenant, id)),
///     Config::new(),
/// );
///
/// // Different contexts, same id: one cache slot.
/// let a = cached(Ctx { tenant: "a" }, 7).unwrap();
/// let b = cached(Ctx { tenant: "b" }, 7).unwrap();
/// assert_eq!(a, b);
/// ```
pub fn memoize1_ctx<C, K1, V, E, F>(
    func: F,
    mut config: Config<(C, K1), V, E>,
) -> impl Fn(C, K1) -> Result<V, CacheError<E>> + Clone + Send + Sync + 'static
where
    C: Clone + Send + Sync + 'static,
    K1: CanonKey + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(C, K1) -> Result<V, E> + Send + Sync + 'static,
{
    let key_fn = resolve_key_fn(&mut config, |args: &(C, K1), pid| {
        canonical_key(&args.1, pid)
    });
    let store = config.build_store();
    let engine = CachedFn::new(
        Box::new(move |args: &(C, K1)| func(args.0.clone(), args.1.clone())),
        store,
        key_fn,
    );
    move |ctx, k1| engine.call((ctx, k1))
}

/// Memoizes a context-plus-two-argument function; the context is not keyed.
pub fn memoize2_ctx<C, K1, K2, V, E, F>(
    func: F,
    mut config: Config<(C, K1, K2), V, E>,
) -> impl Fn(C, K1, K2) -> Result<V, CacheError<E>> + Clone + Send + Sync + 'static
where
    C: Clone + Send + Sync + 'static,
    K1: CanonKey + Clone + Send + Sync + 'static,
    K2: CanonKey + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(C, K1, K2) -> Result<V, E> + Send + Sync + 'static,
{
    let key_fn = resolve_key_fn(&mut config, |args: &(C, K1, K2), pid| {
        join_keys(&[&args.1, &args.2], pid)
    });
    let store = config.build_store();
    let engine = CachedFn::new(
        Box::new(move |args: &(C, K1, K2)| {
            func(args.0.clone(), args.1.clone(), args.2.clone())
        }),
        store,
        key_fn,
    );
    move |ctx, k1, k2| engine.call((ctx, k1, k2))
}

/// Memoizes a context-plus-three-argument function; the context is not keyed.
pub fn memoize3_ctx<C, K1, K2, K3, V, E, F>(
    func: F,
    mut config: Config<(C, K1, K2, K3), V, E>,
) -> impl Fn(C, K1, K2, K3) -> Result<V, CacheError<E>> + Clone + Send + Sync + 'static
where
    C: Clone + Send + Sync + 'static,
    K1: CanonKey + Clone + Send + Sync + 'static,
    K2: CanonKey + Clone + Send + Sync + 'static,
    K3: CanonKey + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(C, K1, K2, K3) -> Result<V, E> + Send + Sync + 'static,
{
    let key_fn = resolve_key_fn(&mut config, |args: &(C, K1, K2, K3), pid| {
        join_keys(&[&args.1, &args.2, &args.3], pid)
    });
    let store = config.build_store();
    let engine = CachedFn::new(
        Box::new(move |args: &(C, K1, K2, K3)| {
            func(args.0.clone(), args.1.clone(), args.2.clone(), args.3.clone())
        }),
        store,
        key_fn,
    );
    move |ctx, k1, k2, k3| engine.call((ctx, k1, k2, k3))
}
