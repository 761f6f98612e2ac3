// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounded entry store with O(1) lookup and O(1) recency reordering.
//!
//! Entries live in a slab of nodes linked into a recency list: the head is the most recently
//! accessed entry, the tail the least. A hash map indexes keys into the slab. Freed slots are
//! recycled through a free list so node indices stay stable while an entry is alive.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use larder_tier::CacheEntry;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    entry: CacheEntry<V>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Result of [`EntryStore::insert`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Inserted<K> {
    /// The key was new and fit within the capacity.
    New,
    /// The key already existed and its entry was overwritten.
    Replaced,
    /// The key was new and the given least-recently-accessed key was evicted to make room.
    Evicted(K),
}

#[derive(Debug)]
pub(crate) struct EntryStore<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<K, V> EntryStore<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty store; a capacity of zero is raised to one.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored entries, including expired entries not yet removed.
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns the live entry for `key` and marks it as the most recently accessed.
    ///
    /// An expired entry is removed and reported as absent.
    pub(crate) fn get(&mut self, key: &K, now: Instant) -> Option<&CacheEntry<V>> {
        let idx = *self.index.get(key)?;

        if self.node(idx).entry.is_expired(now) {
            self.remove_at(idx);
            return None;
        }

        self.move_to_front(idx);
        let node = self.node_mut(idx);
        node.entry.touch(now);
        Some(&node.entry)
    }

    /// Checks for a live entry without changing recency.
    pub(crate) fn contains_live(&self, key: &K, now: Instant) -> bool {
        self.index
            .get(key)
            .is_some_and(|&idx| !self.node(idx).entry.is_expired(now))
    }

    /// Inserts or overwrites `key`. Both count as an access.
    ///
    /// When a new key would exceed the capacity the least-recently-accessed entry is evicted
    /// first. Entries that were never read are ordered by insertion, oldest first.
    pub(crate) fn insert(&mut self, key: K, entry: CacheEntry<V>) -> Inserted<K> {
        if let Some(&idx) = self.index.get(&key) {
            self.node_mut(idx).entry = entry;
            self.move_to_front(idx);
            return Inserted::Replaced;
        }

        let evicted = if self.index.len() >= self.capacity {
            self.tail.map(|tail| self.remove_at(tail).0)
        } else {
            None
        };

        let node = Node {
            key: key.clone(),
            entry,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.push_front(idx);

        evicted.map_or(Inserted::New, Inserted::Evicted)
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let idx = *self.index.get(key)?;
        Some(self.remove_at(idx).1)
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Removes every expired entry and returns how many were removed.
    pub(crate) fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<usize> = self
            .index
            .values()
            .copied()
            .filter(|&idx| self.node(idx).entry.is_expired(now))
            .collect();

        for &idx in &expired {
            self.remove_at(idx);
        }
        expired.len()
    }

    /// Keys from most to least recently accessed.
    #[cfg(test)]
    pub(crate) fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    fn remove_at(&mut self, idx: usize) -> (K, CacheEntry<V>) {
        self.unlink(idx);
        let node = self.slots[idx].take().unwrap_or_else(|| unreachable!("linked slot {idx} is vacant"));
        self.index.remove(&node.key);
        self.free.push(idx);
        (node.key, node.entry)
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(head) => self.node_mut(head).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
    }

    fn node(&self, idx: usize) -> &Node<K, V> {
        self.slots[idx].as_ref().unwrap_or_else(|| unreachable!("linked slot {idx} is vacant"))
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.slots[idx].as_mut().unwrap_or_else(|| unreachable!("linked slot {idx} is vacant"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn entry(value: i32, now: Instant) -> CacheEntry<i32> {
        CacheEntry::new(value, now)
    }

    #[test]
    fn evicts_oldest_insert_when_nothing_was_read() {
        let now = Instant::now();
        let mut store = EntryStore::new(3);
        for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
            assert_eq!(store.insert(key, entry(value, now)), Inserted::New);
        }

        assert_eq!(store.insert("d", entry(4, now)), Inserted::Evicted("a"));
        assert_eq!(store.keys_by_recency(), vec!["d", "c", "b"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn read_protects_entry_from_eviction() {
        let now = Instant::now();
        let mut store = EntryStore::new(3);
        store.insert("a", entry(1, now));
        store.insert("b", entry(2, now));
        store.insert("c", entry(3, now));

        assert_eq!(store.get(&"a", now).map(|e| *e.value()), Some(1));

        assert_eq!(store.insert("d", entry(4, now)), Inserted::Evicted("b"));
        assert_eq!(store.keys_by_recency(), vec!["d", "a", "c"]);
    }

    #[test]
    fn overwrite_moves_to_front_without_eviction() {
        let now = Instant::now();
        let mut store = EntryStore::new(2);
        store.insert("a", entry(1, now));
        store.insert("b", entry(2, now));

        assert_eq!(store.insert("a", entry(10, now)), Inserted::Replaced);

        assert_eq!(store.keys_by_recency(), vec!["a", "b"]);
        assert_eq!(store.get(&"a", now).map(|e| *e.value()), Some(10));
    }

    #[test]
    fn contains_live_does_not_touch_recency() {
        let now = Instant::now();
        let mut store = EntryStore::new(2);
        store.insert("a", entry(1, now));
        store.insert("b", entry(2, now));

        assert!(store.contains_live(&"a", now));

        assert_eq!(store.insert("c", entry(3, now)), Inserted::Evicted("a"));
    }

    #[test]
    fn expired_entry_is_removed_on_get() {
        let now = Instant::now();
        let mut store = EntryStore::new(2);
        store.insert("a", CacheEntry::with_ttl(1, now, Duration::from_secs(1)));

        let later = now + Duration::from_secs(1);
        assert!(!store.contains_live(&"a", later));
        assert_eq!(store.len(), 1);

        assert!(store.get(&"a", later).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn purge_expired_keeps_live_entries() {
        let now = Instant::now();
        let mut store = EntryStore::new(4);
        store.insert("a", CacheEntry::with_ttl(1, now, Duration::from_secs(1)));
        store.insert("b", entry(2, now));
        store.insert("c", CacheEntry::with_ttl(3, now, Duration::from_secs(5)));

        assert_eq!(store.purge_expired(now + Duration::from_secs(2)), 1);
        assert_eq!(store.keys_by_recency(), vec!["c", "b"]);
    }

    #[test]
    fn freed_slots_are_reused() {
        let now = Instant::now();
        let mut store = EntryStore::new(2);
        store.insert("a", entry(1, now));
        store.insert("b", entry(2, now));
        store.remove(&"a");
        store.insert("c", entry(3, now));

        assert_eq!(store.slots.len(), 2);
        assert_eq!(store.keys_by_recency(), vec!["c", "b"]);
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let now = Instant::now();
        let mut store = EntryStore::new(0);
        assert_eq!(store.capacity(), 1);

        store.insert("a", entry(1, now));
        assert_eq!(store.insert("b", entry(2, now)), Inserted::Evicted("a"));
    }

    #[test]
    fn clear_resets_everything() {
        let now = Instant::now();
        let mut store = EntryStore::new(2);
        store.insert("a", entry(1, now));
        store.clear();

        assert_eq!(store.len(), 0);
        assert!(store.keys_by_recency().is_empty());
        assert_eq!(store.insert("b", entry(2, now)), Inserted::New);
    }
}
