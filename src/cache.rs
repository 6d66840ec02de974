//! Caching layer for the consensus core
//!
//! Provides the transaction staging areas:
//! - confirming: transactions whose effects are applied inside a tracked block
//! - received: the mempool of loose transactions (LRU bounded)
//! - orphan: transactions waiting on something unknown (LRU bounded)
use crate::transaction::{Transaction, TxHash};
use lru::LruCache;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Generic cache operations over the map backing a [`ThreadSafeCache`].
/// Uses `std::borrow::Borrow` so lookups do not need an owned key.
pub trait CacheInner<K, V> {
    /// Retrieve a value without touching recency (LRU promotion).
    fn get_non_mut<Q>(&self, key: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq;

    fn put(&mut self, key: K, value: V);

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq;
}

impl<K, V> CacheInner<K, V> for LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn get_non_mut<Q>(&self, key: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.peek(key)
    }

    fn put(&mut self, key: K, value: V) {
        self.put(key, value);
    }

    fn clear(&mut self) {
        self.clear();
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.pop(key)
    }
}

// Unbounded map, no eviction
impl<K, V> CacheInner<K, V> for HashMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn get_non_mut<Q>(&self, key: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(key)
    }

    fn put(&mut self, key: K, value: V) {
        self.insert(key, value);
    }

    fn clear(&mut self) {
        self.clear();
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove(key)
    }
}

/// Generic, thread-safe cache wrapper. Every call takes the lock once, so
/// readers always see a consistent map.
pub struct ThreadSafeCache<K, V, T: CacheInner<K, V>> {
    cache: Arc<RwLock<T>>,
    _phantom_k: PhantomData<K>,
    _phantom_v: PhantomData<V>,
}

impl<K, V, T: CacheInner<K, V>> ThreadSafeCache<K, V, T>
where
    K: Hash + Eq + Clone,
    V: Clone,
    T: Default,
{
    pub fn new_default() -> Self {
        Self {
            cache: Arc::new(RwLock::new(T::default())),
            _phantom_k: PhantomData,
            _phantom_v: PhantomData,
        }
    }
}

impl<K, V> ThreadSafeCache<K, V, LruCache<K, V>>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new LRU cache; a capacity of 0 is treated as 1.
    pub fn new_lru(capacity: usize) -> Self {
        let capacity_nz = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity_nz))),
            _phantom_k: PhantomData,
            _phantom_v: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cache.read().cap().get()
    }
}

impl<K, V, T: CacheInner<K, V>> ThreadSafeCache<K, V, T>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.cache.read().get_non_mut(key).cloned()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.cache.read().get_non_mut(key).is_some()
    }

    pub fn put(&self, key: K, value: V) {
        self.cache.write().put(key, value);
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.cache.write().remove(key)
    }

    /// Removes every listed key under a single write lock.
    pub fn remove_many<'a, I>(&self, keys: I) -> usize
    where
        K: 'a,
        I: IntoIterator<Item = &'a K>,
    {
        let mut cache = self.cache.write();
        keys.into_iter()
            .filter(|k| cache.remove(*k).is_some())
            .count()
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl<K, V, T: CacheInner<K, V>> Clone for ThreadSafeCache<K, V, T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            _phantom_k: PhantomData,
            _phantom_v: PhantomData,
        }
    }
}

/// Transactions whose effects are applied, keyed by hash.
pub type ConfirmingTxCache = ThreadSafeCache<TxHash, Transaction, HashMap<TxHash, Transaction>>;

impl ConfirmingTxCache {
    pub fn new() -> Self {
        Self::new_default()
    }
}

impl Default for ConfirmingTxCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded LRU of staged transactions; used for the mempool and orphans.
pub type StagedTxCache = ThreadSafeCache<TxHash, Transaction, LruCache<TxHash, Transaction>>;

impl StagedTxCache {
    pub const DEFAULT_RECEIVED_CAPACITY: usize = 10_000;
    pub const DEFAULT_ORPHAN_CAPACITY: usize = 1_000;

    pub fn new(capacity: usize) -> Self {
        Self::new_lru(capacity)
    }

    pub fn stats(&self) -> (usize, usize) {
        (self.len(), self.capacity())
    }
}

/// The three staging areas, grouped the way the consensus manager uses them.
pub struct TxStagingCaches {
    pub confirming: ConfirmingTxCache,
    pub received: StagedTxCache,
    pub orphan: StagedTxCache,
}

impl TxStagingCaches {
    pub fn new(received_capacity: usize, orphan_capacity: usize) -> Self {
        Self {
            confirming: ConfirmingTxCache::new(),
            received: StagedTxCache::new(received_capacity),
            orphan: StagedTxCache::new(orphan_capacity),
        }
    }

    pub fn new_default() -> Self {
        Self::new(
            StagedTxCache::DEFAULT_RECEIVED_CAPACITY,
            StagedTxCache::DEFAULT_ORPHAN_CAPACITY,
        )
    }

    /// A block carrying these transactions was approved: they are no longer
    /// loose.
    pub fn purge_staged(&self, hashes: &[TxHash]) {
        self.received.remove_many(hashes);
        self.orphan.remove_many(hashes);
    }

    pub fn clear_all(&self) {
        self.confirming.clear();
        self.received.clear();
        self.orphan.clear();
    }
}

impl Clone for TxStagingCaches {
    fn clone(&self) -> Self {
        Self {
            confirming: self.confirming.clone(),
            received: self.received.clone(),
            orphan: self.orphan.clone(),
        }
    }
}
