use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::SmallError;
use crate::utils::HandyRwLock;

/// A reference-counted, lock-protected handle. `Pod` is the shape every
/// shared mutable structure in this crate takes: pages, segments, the
/// differential overlay.
pub type Pod<T> = Arc<RwLock<T>>;

pub type ResultPod<T> = Result<Pod<T>, SmallError>;
pub type SmallResult = Result<(), SmallError>;

/// A `HashMap` wrapped behind a single `RwLock`, with the handful of
/// access patterns the buffer manager and the lock table actually need.
/// Plain `RwLock<HashMap<..>>` would work too, but every caller would
/// repeat the same `get_or_insert`/`alter_value` dance; centralizing it
/// here keeps `PageCache` and `ConcurrentStatus` readable.
pub struct ConcurrentHashMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> ConcurrentHashMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_inner(&self) -> &RwLock<HashMap<K, V>> {
        &self.inner
    }

    pub fn get_inner_wl(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.inner.wl()
    }

    pub fn get_inner_rl(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.inner.rl()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.rl().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.wl().insert(key, value);
    }

    pub fn remove(&self, key: &K) {
        self.inner.wl().remove(key);
    }

    pub fn clear(&self) {
        self.inner.wl().clear();
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.rl().keys().cloned().collect()
    }

    /// Return the value at `key` if present; otherwise build it with
    /// `loader`, insert it, and return it. `loader` may fail, in which
    /// case nothing is inserted.
    pub fn get_or_insert(
        &self,
        key: &K,
        loader: impl FnOnce(&K) -> Result<V, SmallError>,
    ) -> Result<V, SmallError> {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }

        let mut guard = self.inner.wl();
        if let Some(v) = guard.get(key) {
            return Ok(v.clone());
        }
        let v = loader(key)?;
        guard.insert(key.clone(), v.clone());
        Ok(v)
    }

    /// True unless some *other* exclusive holder is registered at `key`.
    /// Used by the lock table: `x_lock_map.exact_or_empty(pid, tx)` asks
    /// "is there no conflicting exclusive holder of `pid`?".
    pub fn exact_or_empty(&self, key: &K, expected: &V) -> bool
    where
        V: PartialEq,
    {
        match self.inner.rl().get(key) {
            None => true,
            Some(v) => v == expected,
        }
    }

    /// Apply `f` to the entry at `key`, inserting `V::default()` first if
    /// absent.
    pub fn alter_value(
        &self,
        key: &K,
        f: impl FnOnce(&mut V) -> SmallResult,
    ) -> SmallResult
    where
        V: Default,
    {
        let mut guard = self.inner.wl();
        let entry = guard.entry(key.clone()).or_insert_with(V::default);
        f(entry)
    }
}

impl<K, V> Default for ConcurrentHashMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
