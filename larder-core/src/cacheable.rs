//! Marker trait for values the store can cache.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Marker trait for types that can be cached.
///
/// # Implementation Requirements
///
/// - Values are shared between every live reader of a key, so they must be
///   `Clone + Send + Sync + 'static`
/// - Consecutive identical responses are collapsed, so they must be `PartialEq`
/// - `is_empty_collection()` returns true only for an empty collection value.
///   An empty collection is treated as "never fetched" by the freshness
///   mediator. Non-collection types keep the default `false`.
pub trait Cacheable: Clone + PartialEq + Send + Sync + 'static {
    fn is_empty_collection(&self) -> bool {
        false
    }
}

macro_rules! impl_cacheable_scalar {
    ($($ty:ty),* $(,)?) => {
        $(impl Cacheable for $ty {})*
    };
}

impl_cacheable_scalar!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    &'static str,
);

impl<T: Cacheable> Cacheable for Option<T> {}

impl<T: Clone + PartialEq + Send + Sync + 'static> Cacheable for Vec<T> {
    fn is_empty_collection(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Cacheable for VecDeque<T> {
    fn is_empty_collection(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> Cacheable for HashMap<K, V, S>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    S: Clone + std::hash::BuildHasher + Send + Sync + 'static,
{
    fn is_empty_collection(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Cacheable for BTreeMap<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn is_empty_collection(&self) -> bool {
        self.is_empty()
    }
}

impl<T, S> Cacheable for HashSet<T, S>
where
    T: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    S: Clone + std::hash::BuildHasher + Send + Sync + 'static,
{
    fn is_empty_collection(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Clone + Ord + Send + Sync + 'static> Cacheable for BTreeSet<T> {
    fn is_empty_collection(&self) -> bool {
        self.is_empty()
    }
}
