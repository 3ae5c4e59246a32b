use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write;
use std::rc::Rc;
use std::sync::Arc;

/// Sentinel emitted for an absent optional/pointer value.
const NULL: &str = "null";
/// Sentinel emitted when recursion meets a pointer already on the path.
const CYCLE: &str = "<cycle>";
/// Sentinel emitted for function values, which carry no usable equality.
const FUNC: &str = "<fn>";

/// Deterministic writer that turns a value into a stable canonical string.
///
/// The canonical form is the cache key used whenever call arguments are not
/// already strings: structurally equal values always produce identical
/// output, and the output is independent of map iteration order. The writer
/// also carries the per-call cycle guard (a stack of pointer addresses on the
/// active recursion path), so self-referential structures terminate with a
/// `<cycle>` sentinel instead of recursing forever.
///
/// Values participate by implementing [`CanonKey`]; most users only ever call
/// [`canonical_key`].
pub struct Canonicalizer {
    buf: String,
    /// Addresses of pointers currently being traversed. A `Vec` beats a set
    /// here: recursion paths are shallow and the scan is cache-friendly.
    seen: Vec<usize>,
    pointer_identity: bool,
}

impl Canonicalizer {
    /// Creates an empty writer.
    ///
    /// With `pointer_identity` set, pointer-like values (`Box`, `Rc`, `Arc`,
    /// references) contribute their address to the key instead of their
    /// pointee's structure.
    pub fn new(pointer_identity: bool) -> Self {
        Self {
            buf: String::new(),
            seen: Vec::new(),
            pointer_identity,
        }
    }

    /// Consumes the writer and returns the canonical string.
    pub fn finish(self) -> String {
        self.buf
    }

    /// Appends raw text to the canonical form.
    ///
    /// Structural impls use this for brackets and separators.
    pub fn write_raw(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    /// Appends a display-formatted literal.
    pub fn write_literal(&mut self, value: impl std::fmt::Display) {
        // Writing to a String cannot fail.
        let _ = write!(self.buf, "{value}");
    }

    /// Whether pointers are keyed by address rather than by pointee.
    pub fn pointer_identity(&self) -> bool {
        self.pointer_identity
    }

    /// Canonicalizes a pointer-like value with cycle protection.
    ///
    /// Under pointer identity the address itself is emitted. Otherwise the
    /// address is pushed onto the path guard and `pointee` is invoked; if the
    /// address is already on the path this is a reference cycle and the
    /// `<cycle>` sentinel is emitted instead.
    pub fn write_pointer(&mut self, addr: usize, pointee: impl FnOnce(&mut Self)) {
        if self.pointer_identity {
            let _ = write!(self.buf, "@{addr:x}");
            return;
        }
        if self.seen.contains(&addr) {
            self.buf.push_str(CYCLE);
            return;
        }
        self.seen.push(addr);
        self.buf.push('&');
        pointee(self);
        self.seen.pop();
    }

    /// Runs `f` and returns only the text it appended.
    ///
    /// Map and set impls canonicalize each element through the same writer
    /// (keeping the cycle guard intact), capture the fragments, sort them,
    /// and then splice them back in deterministic order.
    pub fn capture(&mut self, f: impl FnOnce(&mut Self)) -> String {
        let mark = self.buf.len();
        f(self);
        self.buf.split_off(mark)
    }

    /// Starts a record (struct-like) form: `Name{field:value,…}`.
    ///
    /// Fields must be written in declaration order, private fields included;
    /// the key has to reflect the whole value, not just its public shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use memofn::{CanonKey, Canonicalizer, canonical_key};
    ///
    /// struct User {
    ///     id: u64,
    ///     name: String,
    /// }
    ///
    /// impl CanonKey for User {
    ///     fn canonicalize(&self, out: &mut Canonicalizer) {
    ///         out.record("User")
    ///             .field("id", &self.id)
    ///             .field("name", &self.name)
    ///             .finish();
    ///     }
    /// }
    ///
    /// let user = User { id: 7, name: "ada".into() };
    /// assert_eq!(canonical_key(&user, false), "User{id:7,name:\"ada\"}");
    /// ```
    pub fn record<'a>(&'a mut self, name: &str) -> RecordWriter<'a> {
        self.buf.push_str(name);
        self.buf.push('{');
        RecordWriter {
            out: self,
            first: true,
        }
    }
}

/// In-progress record form started by [`Canonicalizer::record`].
pub struct RecordWriter<'a> {
    out: &'a mut Canonicalizer,
    first: bool,
}

impl RecordWriter<'_> {
    /// Appends one `name:value` field.
    pub fn field(mut self, name: &str, value: &dyn CanonKey) -> Self {
        if !self.first {
            self.out.buf.push(',');
        }
        self.first = false;
        self.out.buf.push_str(name);
        self.out.buf.push(':');
        value.canonicalize(self.out);
        self
    }

    /// Closes the record form.
    pub fn finish(self) {
        self.out.buf.push('}');
    }
}

/// Capability of serving as (part of) a cache key.
///
/// Implementations must be deterministic and side-effect-free: structurally
/// equal values yield identical output, and the output never depends on
/// iteration order, allocation addresses (unless pointer identity is on), or
/// call history. The trait is implemented for primitives, strings, options,
/// smart pointers, sequences, tuples, and the standard map/set types;
/// user-defined key types implement it by hand, typically with
/// [`Canonicalizer::record`].
pub trait CanonKey {
    /// Writes this value's canonical form into `out`.
    fn canonicalize(&self, out: &mut Canonicalizer);
}

/// Canonicalizes a single value into its stable key string.
///
/// # Examples
///
/// ```
/// use memofn::canonical_key;
///
/// assert_eq!(canonical_key(&7u32, false), "7");
/// assert_eq!(canonical_key("hi", false), "\"hi\"");
/// assert_eq!(canonical_key(&vec![1, 2, 3], false), "[1,2,3]");
/// assert_eq!(canonical_key(&None::<u8>, false), "null");
/// ```
pub fn canonical_key<T: CanonKey + ?Sized>(value: &T, pointer_identity: bool) -> String {
    let mut out = Canonicalizer::new(pointer_identity);
    value.canonicalize(&mut out);
    out.finish()
}

macro_rules! impl_canon_literal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CanonKey for $ty {
                fn canonicalize(&self, out: &mut Canonicalizer) {
                    out.write_literal(self);
                }
            }
        )*
    };
}

impl_canon_literal!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, bool);

// Floats use the Debug form: `1.0` stays distinct from the integer `1`, and
// non-finite values render stably (`NaN`, `inf`).
impl CanonKey for f32 {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        let _ = write!(out.buf, "{self:?}");
    }
}

impl CanonKey for f64 {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        let _ = write!(out.buf, "{self:?}");
    }
}

// Strings and chars take their Debug form: quoted and escaped, so `"a,b"`
// cannot collide with the two-element sequence it would otherwise resemble.
impl CanonKey for str {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        let _ = write!(out.buf, "{self:?}");
    }
}

impl CanonKey for String {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        self.as_str().canonicalize(out);
    }
}

impl CanonKey for char {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        let _ = write!(out.buf, "{self:?}");
    }
}

impl CanonKey for () {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        out.write_raw("()");
    }
}

impl<T: CanonKey> CanonKey for Option<T> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        match self {
            None => out.write_raw(NULL),
            Some(value) => value.canonicalize(out),
        }
    }
}

impl<T: CanonKey + ?Sized> CanonKey for &T {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        let addr = *self as *const T as *const () as usize;
        out.write_pointer(addr, |out| (**self).canonicalize(out));
    }
}

impl<T: CanonKey> CanonKey for Box<T> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        let addr = &**self as *const T as usize;
        out.write_pointer(addr, |out| (**self).canonicalize(out));
    }
}

impl<T: CanonKey> CanonKey for Rc<T> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        let addr = Rc::as_ptr(self) as usize;
        out.write_pointer(addr, |out| (**self).canonicalize(out));
    }
}

impl<T: CanonKey> CanonKey for Arc<T> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        let addr = Arc::as_ptr(self) as usize;
        out.write_pointer(addr, |out| (**self).canonicalize(out));
    }
}

// Interior mutability wrappers canonicalize their current contents. RefCell
// is what makes `Rc<RefCell<_>>` cycles reachable at all, so it has to
// participate for the cycle guard to be exercised.
impl<T: CanonKey> CanonKey for RefCell<T> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        self.borrow().canonicalize(out);
    }
}

impl<T: CanonKey + Copy> CanonKey for Cell<T> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        self.get().canonicalize(out);
    }
}

impl<T: CanonKey> CanonKey for [T] {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        out.write_raw("[");
        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                out.write_raw(",");
            }
            item.canonicalize(out);
        }
        out.write_raw("]");
    }
}

impl<T: CanonKey> CanonKey for Vec<T> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        self.as_slice().canonicalize(out);
    }
}

impl<T: CanonKey, const N: usize> CanonKey for [T; N] {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        self[..].canonicalize(out);
    }
}

macro_rules! impl_canon_tuple {
    ($(($($name:ident : $idx:tt),+)),* $(,)?) => {
        $(
            impl<$($name: CanonKey),+> CanonKey for ($($name,)+) {
                fn canonicalize(&self, out: &mut Canonicalizer) {
                    out.write_raw("(");
                    let mut first = true;
                    $(
                        if !first {
                            out.write_raw(",");
                        }
                        first = false;
                        self.$idx.canonicalize(out);
                    )+
                    let _ = first;
                    out.write_raw(")");
                }
            }
        )*
    };
}

impl_canon_tuple!(
    (A: 0),
    (A: 0, B: 1),
    (A: 0, B: 1, C: 2),
    (A: 0, B: 1, C: 2, D: 3),
);

/// Canonicalizes `key:value` pairs, sorted lexicographically to erase the
/// source collection's iteration order.
fn canonicalize_pairs<'a, K, V>(
    pairs: impl Iterator<Item = (&'a K, &'a V)>,
    out: &mut Canonicalizer,
) where
    K: CanonKey + 'a,
    V: CanonKey + 'a,
{
    let mut rendered: Vec<String> = pairs
        .map(|(k, v)| {
            out.capture(|out| {
                k.canonicalize(out);
                out.write_raw(":");
                v.canonicalize(out);
            })
        })
        .collect();
    rendered.sort_unstable();
    out.write_raw("{");
    out.write_raw(&rendered.join(","));
    out.write_raw("}");
}

impl<K: CanonKey, V: CanonKey, S> CanonKey for HashMap<K, V, S> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        canonicalize_pairs(self.iter(), out);
    }
}

impl<K: CanonKey, V: CanonKey> CanonKey for BTreeMap<K, V> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        canonicalize_pairs(self.iter(), out);
    }
}

fn canonicalize_elements<'a, T: CanonKey + 'a>(
    items: impl Iterator<Item = &'a T>,
    out: &mut Canonicalizer,
) {
    let mut rendered: Vec<String> = items
        .map(|item| out.capture(|out| item.canonicalize(out)))
        .collect();
    rendered.sort_unstable();
    out.write_raw("{");
    out.write_raw(&rendered.join(","));
    out.write_raw("}");
}

impl<T: CanonKey, S> CanonKey for HashSet<T, S> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        canonicalize_elements(self.iter(), out);
    }
}

impl<T: CanonKey> CanonKey for BTreeSet<T> {
    fn canonicalize(&self, out: &mut Canonicalizer) {
        canonicalize_elements(self.iter(), out);
    }
}

// Function values carry no meaningful equality; they all collapse onto one
// opaque sentinel.
macro_rules! impl_canon_fn {
    ($($($arg:ident),*;)*) => {
        $(
            impl<$($arg,)* R> CanonKey for fn($($arg),*) -> R {
                fn canonicalize(&self, out: &mut Canonicalizer) {
                    out.write_raw(FUNC);
                }
            }
        )*
    };
}

impl_canon_fn!(
    ;
    A;
    A, B;
    A, B, C;
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_type_distinguished() {
        assert_eq!(canonical_key(&1u8, false), "1");
        assert_eq!(canonical_key(&1.0f64, false), "1.0");
        assert_eq!(canonical_key(&true, false), "true");
        assert_eq!(canonical_key("1", false), "\"1\"");
        // The float literal never collides with the integer literal.
        assert_ne!(canonical_key(&1i64, false), canonical_key(&1.0f64, false));
    }

    #[test]
    fn strings_are_escaped() {
        // A string containing separators cannot impersonate a sequence.
        assert_ne!(
            canonical_key(&vec!["a".to_string(), "b".to_string()], false),
            canonical_key("[\"a\",\"b\"]", false)
        );
    }

    #[test]
    fn option_and_unit() {
        assert_eq!(canonical_key(&None::<i32>, false), "null");
        assert_eq!(canonical_key(&Some(3), false), "3");
        assert_eq!(canonical_key(&(), false), "()");
    }

    #[test]
    fn sequences_preserve_order() {
        assert_eq!(canonical_key(&[3, 1, 2], false), "[3,1,2]");
        assert_ne!(canonical_key(&[1, 2], false), canonical_key(&[2, 1], false));
    }

    #[test]
    fn tuples_nest() {
        assert_eq!(canonical_key(&(1, "a"), false), "(1,\"a\")");
        assert_eq!(canonical_key(&((1, 2), 3), false), "((1,2),3)");
    }

    #[test]
    fn map_output_ignores_insertion_order() {
        let mut a = HashMap::new();
        a.insert("x".to_string(), 1);
        a.insert("y".to_string(), 2);
        a.insert("z".to_string(), 3);

        let mut b = HashMap::new();
        b.insert("z".to_string(), 3);
        b.insert("x".to_string(), 1);
        b.insert("y".to_string(), 2);

        let canon = canonical_key(&a, false);
        assert_eq!(canon, canonical_key(&b, false));
        assert_eq!(canon, "{\"x\":1,\"y\":2,\"z\":3}");
    }

    #[test]
    fn hash_and_btree_maps_agree() {
        let mut hash = HashMap::new();
        hash.insert(2, "b");
        hash.insert(1, "a");
        let mut btree = BTreeMap::new();
        btree.insert(1, "a");
        btree.insert(2, "b");
        assert_eq!(canonical_key(&hash, false), canonical_key(&btree, false));
    }

    #[test]
    fn sets_are_sorted() {
        let mut set = HashSet::new();
        set.insert(30);
        set.insert(4);
        set.insert(100);
        // Lexicographic over the rendered fragments.
        assert_eq!(canonical_key(&set, false), "{100,30,4}");
    }

    #[test]
    fn boxed_value_canonicalizes_structurally() {
        let a = Box::new(41);
        let b = Box::new(41);
        assert_eq!(canonical_key(&a, false), "&41");
        assert_eq!(canonical_key(&a, false), canonical_key(&b, false));
    }

    #[test]
    fn pointer_identity_distinguishes_allocations() {
        let a = Box::new(41);
        let b = Box::new(41);
        assert_ne!(canonical_key(&a, true), canonical_key(&b, true));
        // But the same allocation always keys identically.
        assert_eq!(canonical_key(&a, true), canonical_key(&a, true));
    }

    struct Node {
        id: i32,
        next: Option<Rc<RefCell<Node>>>,
    }

    impl CanonKey for Node {
        fn canonicalize(&self, out: &mut Canonicalizer) {
            out.record("Node")
                .field("id", &self.id)
                .field("next", &self.next)
                .finish();
        }
    }

    #[test]
    fn reference_cycle_terminates_with_sentinel() {
        let first = Rc::new(RefCell::new(Node { id: 1, next: None }));
        let second = Rc::new(RefCell::new(Node {
            id: 2,
            next: Some(Rc::clone(&first)),
        }));
        first.borrow_mut().next = Some(Rc::clone(&second));

        let canon = canonical_key(&first, false);
        assert!(canon.contains("<cycle>"), "got: {canon}");
        // Determinism across repeated calls.
        assert_eq!(canon, canonical_key(&first, false));
    }

    #[test]
    fn shared_but_acyclic_pointers_stay_structural() {
        let shared = Rc::new(5);
        let pair = (Rc::clone(&shared), shared);
        // The same address appears twice on disjoint paths; that is sharing,
        // not a cycle.
        assert_eq!(canonical_key(&pair, false), "(&5,&5)");
    }

    #[test]
    fn record_writer_shapes_struct_keys() {
        let node = Node { id: 9, next: None };
        assert_eq!(canonical_key(&node, false), "Node{id:9,next:null}");
    }

    #[test]
    fn function_values_collapse_to_sentinel() {
        fn one() -> i32 {
            1
        }
        fn two() -> i32 {
            2
        }
        let f: fn() -> i32 = one;
        let g: fn() -> i32 = two;
        assert_eq!(canonical_key(&f, false), canonical_key(&g, false));
        assert_eq!(canonical_key(&f, false), "<fn>");
    }
}
