//! LRU (Least Recently Used) recency list
//!
//! Entries live in an arena and link to their neighbours by slot number, so
//! promotion and removal from the middle of the list are O(1).

use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

/// Node in the recency list
struct Node<K, V> {
    key: K,
    value: V,
    older: Option<usize>,
    younger: Option<usize>,
}

/// Index plus recency ordering, oldest to youngest. Not thread-safe.
pub(crate) struct LruList<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    youngest: Option<usize>,
    oldest: Option<usize>,
    free_list: Vec<usize>,
}

impl<K, V> LruList<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty list sized for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        // One spare slot: an insert lands before the eviction sweep runs.
        let slots = capacity.saturating_add(1);

        Self {
            map: HashMap::with_capacity_and_hasher(slots, RandomState::new()),
            nodes: Vec::with_capacity(slots),
            youngest: None,
            oldest: None,
            free_list: Vec::new(),
        }
    }

    /// Get a value and mark it as the youngest entry
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Check for a key without touching recency
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert at the youngest position; an existing key is overwritten and promoted
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = &mut self.nodes[idx] {
                node.value = value;
            }
            self.promote(idx);
            return;
        }

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            value,
            older: None,
            younger: None,
        });
        self.push_youngest(idx);
        self.map.insert(key, idx);
    }

    /// Remove and return the least recently used entry
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        let idx = self.oldest?;
        self.unlink(idx);

        let node = self.nodes[idx].take()?;
        self.map.remove(&node.key);
        self.free_list.push(idx);
        Some((node.key, node.value))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Keys from oldest to youngest
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.oldest;
        while let Some(idx) = cursor {
            match &self.nodes[idx] {
                Some(node) => {
                    keys.push(node.key.clone());
                    cursor = node.younger;
                }
                None => break,
            }
        }
        keys
    }

    fn promote(&mut self, idx: usize) {
        if self.youngest == Some(idx) {
            return;
        }

        self.unlink(idx);
        self.push_youngest(idx);
    }

    fn push_youngest(&mut self, idx: usize) {
        let previous = self.youngest;

        if let Some(node) = &mut self.nodes[idx] {
            node.older = previous;
            node.younger = None;
        }

        match previous {
            Some(prev_idx) => {
                if let Some(prev) = &mut self.nodes[prev_idx] {
                    prev.younger = Some(idx);
                }
            }
            None => {
                self.oldest = Some(idx);
            }
        }

        self.youngest = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (older, younger) = match &mut self.nodes[idx] {
            Some(node) => (node.older.take(), node.younger.take()),
            None => return,
        };

        match older {
            Some(older_idx) => {
                if let Some(older_node) = &mut self.nodes[older_idx] {
                    older_node.younger = younger;
                }
            }
            None => {
                self.oldest = younger;
            }
        }

        match younger {
            Some(younger_idx) => {
                if let Some(younger_node) = &mut self.nodes[younger_idx] {
                    younger_node.older = older;
                }
            }
            None => {
                self.youngest = older;
            }
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }
}
