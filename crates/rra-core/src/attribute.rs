//! Interned attribute names and schemes.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use hashbrown::HashMap;
use spin::Mutex;

/// An interned attribute (column) name.
///
/// Two `Attribute`s built from the same string are guaranteed to share the
/// same backing allocation, so equality and ordering reduce to a pointer
/// comparison in the common case and fall back to `str` comparison only
/// when the fast path misses (never, in practice, since the pool is
/// content-keyed — kept as the correctness fallback).
#[derive(Clone)]
pub struct Attribute(Arc<str>);

struct InternPool {
    table: HashMap<Arc<str>, ()>,
}

static POOL: Mutex<Option<InternPool>> = Mutex::new(None);
static INTERNED_COUNT: AtomicUsize = AtomicUsize::new(0);

impl Attribute {
    /// Interns `name`, returning a handle shared by every other `Attribute`
    /// built from an equal string.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        let mut guard = POOL.lock();
        let pool = guard.get_or_insert_with(|| InternPool { table: HashMap::new() });
        if let Some((existing, _)) = pool.table.get_key_value(name) {
            return Attribute(existing.clone());
        }
        let arc: Arc<str> = Arc::from(name);
        pool.table.insert(arc.clone(), ());
        INTERNED_COUNT.fetch_add(1, AtomicOrdering::Relaxed);
        Attribute(arc)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of distinct attribute names interned so far (diagnostic use).
    pub fn interned_count() -> usize {
        INTERNED_COUNT.load(AtomicOrdering::Relaxed)
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attribute({:?})", self.0.as_ref())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Attribute {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Attribute {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }
}

impl From<&str> for Attribute {
    fn from(s: &str) -> Self {
        Attribute::new(s)
    }
}

impl From<String> for Attribute {
    fn from(s: String) -> Self {
        Attribute::new(s)
    }
}

/// An unordered set of attribute names shared by every row of a relation.
///
/// Stored as a `BTreeSet` (ordered by the interned string) so two schemes
/// built from the same attributes in different orders compare equal and
/// hash identically — required for union/intersection/difference's
/// "schemes must match" invariant (spec.md §4.1) to be order-independent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scheme(BTreeSet<Attribute>);

impl Scheme {
    pub fn new(attrs: impl IntoIterator<Item = Attribute>) -> Self {
        Scheme(attrs.into_iter().collect())
    }

    pub fn empty() -> Self {
        Scheme(BTreeSet::new())
    }

    pub fn contains(&self, attr: &Attribute) -> bool {
        self.0.contains(attr)
    }

    pub fn is_subset_of(&self, other: &Scheme) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<Attribute> {
        self.0.iter().cloned().collect()
    }

    /// Scheme of `self` unioned with `other`. Used by equijoin (spec.md
    /// §4.1: "output combines a and b").
    pub fn union(&self, other: &Scheme) -> Scheme {
        Scheme(self.0.union(&other.0).cloned().collect())
    }

    /// Scheme of the attributes `self` has in common with `other`.
    pub fn intersection(&self, other: &Scheme) -> Scheme {
        Scheme(self.0.intersection(&other.0).cloned().collect())
    }
}

impl FromIterator<Attribute> for Scheme {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Scheme(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Scheme {
    type Item = &'a Attribute;
    type IntoIter = alloc::collections::btree_set::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
