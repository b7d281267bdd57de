//! Cache: lookup-or-load over the LRU recency list

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::{Condvar, Mutex};

use crate::error::{CapacityError, LoadError};
use crate::lru::LruList;

/// Concurrency-safe LRU cache with a single lookup-or-load entry point
///
/// The structural lock is only held to check the index and to insert a
/// loaded value, never while a loader runs. Concurrent misses on the same
/// key share one load: the first caller runs its loader and the others wait
/// for it, then read the stored value.
///
/// Share it between threads with an `Arc`.
pub struct Cache<K, V> {
    /// Index and recency list
    state: Mutex<LruList<K, V>>,

    /// Loads currently running, by key
    inflight: Mutex<HashMap<K, Arc<InflightLoad>, RandomState>>,

    /// Maximum number of entries
    capacity: usize,
}

/// Completion flag for one running load
struct InflightLoad {
    done: Mutex<bool>,
    cv: Condvar,
}

impl InflightLoad {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cv.wait(&mut done);
        }
    }

    fn finish(&self) {
        *self.done.lock() = true;
        self.cv.notify_all();
    }
}

/// Held by the caller running a key's load; releases waiters on drop,
/// including when the loader panics.
struct LoadSlot<'a, K: Hash + Eq, V> {
    cache: &'a Cache<K, V>,
    key: K,
    load: Arc<InflightLoad>,
}

impl<K: Hash + Eq, V> Drop for LoadSlot<'_, K, V> {
    fn drop(&mut self) {
        // Unregister before waking so a woken waiter can claim a fresh slot.
        self.cache.inflight.lock().remove(&self.key);
        self.load.finish();
    }
}

enum Role<'a, K: Hash + Eq, V> {
    Leader(LoadSlot<'a, K, V>),
    Waiter(Arc<InflightLoad>),
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new cache holding at most `capacity` entries
    ///
    /// # Returns
    /// * `Err(CapacityError)` - `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 {
            return Err(CapacityError);
        }

        Ok(Self {
            state: Mutex::new(LruList::with_capacity(capacity)),
            inflight: Mutex::new(HashMap::with_hasher(RandomState::new())),
            capacity,
        })
    }

    /// Return the cached value for `key`, or load, store and return it
    ///
    /// A hit marks the entry as the most recently used. On a miss `loader` is
    /// called at most once for this call; if another caller is already
    /// loading the same key, this call waits for that load instead.
    ///
    /// # Arguments
    /// * `key` - Key to look up
    /// * `loader` - Computes the value on a miss
    ///
    /// # Returns
    /// * `Err(LoadError)` - `loader` failed; nothing was stored
    pub fn lookup<F, E>(&self, key: K, loader: F) -> Result<V, LoadError<E>>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        loop {
            if let Some(value) = self.cached(&key) {
                return Ok(value);
            }

            match self.claim(&key) {
                Role::Waiter(load) => load.wait(),
                Role::Leader(slot) => {
                    // The previous leader may have stored it between our miss and the claim.
                    if let Some(value) = self.cached(&key) {
                        return Ok(value);
                    }

                    let value = loader(&key).map_err(LoadError::new)?;
                    self.insert(key, value.clone());
                    drop(slot);
                    return Ok(value);
                }
            }
        }
    }

    /// Get the number of cached entries
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check for a key without marking it as used
    pub fn contains_key(&self, key: &K) -> bool {
        self.state.lock().contains(key)
    }

    /// Snapshot of cached keys, least recently used first
    pub fn keys(&self) -> Vec<K> {
        self.state.lock().keys()
    }

    fn cached(&self, key: &K) -> Option<V> {
        self.state.lock().get(key).cloned()
    }

    fn claim(&self, key: &K) -> Role<'_, K, V> {
        let mut inflight = self.inflight.lock();
        if let Some(load) = inflight.get(key) {
            return Role::Waiter(Arc::clone(load));
        }

        let load = Arc::new(InflightLoad::new());
        inflight.insert(key.clone(), Arc::clone(&load));
        Role::Leader(LoadSlot {
            cache: self,
            key: key.clone(),
            load,
        })
    }

    fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();
        state.insert(key, value);
        evict_excess(&mut state, self.capacity);
    }
}

/// Drop oldest entries until `list` fits in `capacity`
fn evict_excess<K, V>(list: &mut LruList<K, V>, capacity: usize) -> usize
where
    K: Hash + Eq + Clone,
{
    let mut evicted = 0;
    while list.len() > capacity {
        if list.pop_oldest().is_none() {
            break;
        }
        evicted += 1;
    }
    evicted
}

impl<K, V> fmt::Debug for Cache<K, V>
where
    K: Hash + Eq + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never hold both locks at once
        let len = self.state.lock().len();
        let inflight = self.inflight.lock().len();

        f.debug_struct("Cache")
            .field("len", &len)
            .field("capacity", &self.capacity)
            .field("inflight", &inflight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn ok<V>(value: V) -> impl FnOnce(&i32) -> Result<V, &'static str> {
        move |_: &i32| Ok(value)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = Cache::<i32, i32>::new(0);
        assert_eq!(result.unwrap_err(), CapacityError);
    }

    #[test]
    fn test_lookup_same_key_is_cached() {
        let cache = Cache::<String, i32>::new(1).unwrap();

        let value = cache
            .lookup("key".to_string(), |got| {
                assert_eq!(got, "key");
                Ok::<_, &str>(5)
            })
            .unwrap();
        assert_eq!(value, 5);

        let value = cache
            .lookup("key".to_string(), |_| -> Result<i32, &'static str> {
                panic!("loader called, but the value should have been cached")
            })
            .unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_lookup_error_is_not_cached() {
        let cache = Cache::<String, i32>::new(1).unwrap();

        let err = cache
            .lookup("key".to_string(), |_| Err::<i32, _>("broken"))
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert_eq!(err.into_inner(), "broken");
        assert!(cache.is_empty());
        assert!(!cache.contains_key(&"key".to_string()));

        let mut called = false;
        let value = cache
            .lookup("key".to_string(), |_| {
                called = true;
                Ok::<_, &str>(7)
            })
            .unwrap();
        assert!(called);
        assert_eq!(value, 7);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = Cache::<i32, &str>::new(2).unwrap();
        let load = |k: &i32| Ok::<_, &str>(match k {
            1 => "k1",
            2 => "k2",
            _ => "k3",
        });

        cache.lookup(1, load).unwrap();
        cache.lookup(2, load).unwrap();
        cache.lookup(1, load).unwrap(); // lru: 2
        cache.lookup(3, load).unwrap(); // evicts 2

        assert_eq!(cache.keys(), vec![1, 3]);

        let mut reloaded = false;
        cache
            .lookup(1, |_| {
                reloaded = true;
                Ok::<_, &str>("k1")
            })
            .unwrap();
        assert!(!reloaded, "key 1 was promoted and should still be cached");

        cache
            .lookup(2, |_| {
                reloaded = true;
                Ok::<_, &str>("k2")
            })
            .unwrap();
        assert!(reloaded, "key 2 should have been evicted");
    }

    #[test]
    fn test_eviction_order() {
        let cache = Cache::<i32, i32>::new(3).unwrap();

        for k in 1..=3 {
            cache.lookup(k, ok(k)).unwrap();
        }
        cache.lookup(1, ok(0)).unwrap();
        cache.lookup(4, ok(4)).unwrap();
        cache.lookup(5, ok(5)).unwrap();

        // 2 and 3 were the two least recently used
        assert_eq!(cache.keys(), vec![1, 4, 5]);
    }

    #[test]
    fn test_capacity_bound() {
        let cache = Cache::<i32, i32>::new(4).unwrap();

        for k in 0..100 {
            cache.lookup(k, ok(k * 2)).unwrap();
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.keys(), vec![96, 97, 98, 99]);
    }

    #[test]
    fn test_failed_load_leaves_index_unchanged() {
        let cache = Cache::<i32, i32>::new(2).unwrap();
        cache.lookup(1, ok(1)).unwrap();
        cache.lookup(2, ok(2)).unwrap();

        let result = cache.lookup(3, |_| Err::<i32, _>("down"));
        assert!(result.is_err());
        assert_eq!(cache.keys(), vec![1, 2]);
    }

    #[test]
    fn test_evict_excess() {
        let mut list = LruList::with_capacity(4);
        for k in 0..6 {
            list.insert(k, ());
        }

        assert_eq!(evict_excess(&mut list, 4), 2);
        assert_eq!(list.keys(), vec![2, 3, 4, 5]);
        assert_eq!(evict_excess(&mut list, 4), 0);
    }

    #[test]
    fn test_concurrent_disjoint_keys() {
        let cache = Arc::new(Cache::<u32, u32>::new(1000).unwrap());

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..50u32 {
                        let key = t * 1000 + i;
                        let value = cache.lookup(key, |k| Ok::<_, &str>(*k + 1)).unwrap();
                        assert_eq!(value, key + 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut keys = cache.keys();
        assert_eq!(keys.len(), 400);
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 400);
    }

    #[test]
    fn test_concurrent_eviction_stays_within_capacity() {
        let cache = Arc::new(Cache::<u32, u32>::new(16).unwrap());

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200u32 {
                        cache.lookup(t * 1000 + i, |k| Ok::<_, &str>(*k)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut keys = cache.keys();
        assert_eq!(keys.len(), 16);
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 16);
        assert!(keys.iter().all(|k| k % 1000 < 200 && k / 1000 < 8));
    }

    #[test]
    fn test_concurrent_misses_share_one_load() {
        let cache = Arc::new(Cache::<&str, i32>::new(4).unwrap());
        let loads = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .lookup("hot", |_| {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok::<_, &str>(42)
                        })
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), 42);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.inflight.lock().len(), 0);
    }

    #[test]
    fn test_waiter_loads_after_leader_fails() {
        let cache = Arc::new(Cache::<&str, i32>::new(4).unwrap());

        let (started_tx, started_rx) = mpsc::channel();

        let leader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.lookup("key", move |_| {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                    Err::<i32, _>("leader failed")
                })
            })
        };

        started_rx.recv().unwrap();
        let mut calls = 0;
        let value = cache
            .lookup("key", |_| {
                calls += 1;
                Ok::<_, &str>(7)
            })
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls, 1);
        assert_eq!(leader.join().unwrap().unwrap_err().into_inner(), "leader failed");
    }

    #[test]
    fn test_panicking_loader_releases_slot() {
        let cache = Cache::<i32, i32>::new(2).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            cache.lookup(1, |_| -> Result<i32, &'static str> { panic!("loader blew up") })
        }));
        assert!(result.is_err());
        assert_eq!(cache.inflight.lock().len(), 0);
        assert!(cache.is_empty());

        assert_eq!(cache.lookup(1, ok(3)).unwrap(), 3);
    }

    #[test]
    fn test_slow_load_does_not_block_other_keys() {
        let cache = Arc::new(Cache::<i32, i32>::new(4).unwrap());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let slow = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache
                    .lookup(1, move |_| {
                        started_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok::<_, &str>(10)
                    })
                    .unwrap()
            })
        };

        started_rx.recv().unwrap();
        // Key 1 is still loading; key 2 must not wait for it
        assert_eq!(cache.lookup(2, ok(20)).unwrap(), 20);
        assert!(!cache.contains_key(&1));

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap(), 10);
        assert_eq!(cache.keys(), vec![2, 1]);
    }

    #[test]
    fn test_debug_output() {
        let cache = Cache::<i32, i32>::new(3).unwrap();
        cache.lookup(1, ok(1)).unwrap();

        let out = format!("{:?}", cache);
        assert!(out.contains("len: 1"));
        assert!(out.contains("capacity: 3"));
    }

    #[test]
    fn test_debug_releases_state_before_inflight() {
        let cache = Arc::new(Cache::<i32, i32>::new(3).unwrap());

        // Block the formatter on the in-flight lock
        let inflight = cache.inflight.lock();
        let formatter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || format!("{:?}", cache))
        };
        thread::sleep(Duration::from_millis(50));

        // The structural lock must still be free while it waits
        let state = cache.state.try_lock_for(Duration::from_secs(1));
        assert!(state.is_some());
        drop(state);

        drop(inflight);
        assert!(formatter.join().unwrap().contains("inflight: 0"));
    }
}
