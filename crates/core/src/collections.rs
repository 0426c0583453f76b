// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reader/writer-locked collections shared across the agent's tasks.
//!
//! Lookups and snapshots take the read lock and may run concurrently;
//! structural mutation takes the write lock. Snapshots clone out so no
//! lock is ever held across an `.await` by callers.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::hash::Hash;

/// Insertion-ordered map guarded by a reader/writer lock.
pub struct RwMap<K, V> {
    inner: RwLock<IndexMap<K, V>>,
}

impl<K: Hash + Eq, V> Default for RwMap<K, V> {
    fn default() -> Self {
        Self { inner: RwLock::new(IndexMap::new()) }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> RwMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, returning the previous value
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Insert only if the key is absent. Returns false when it was present.
    pub fn try_insert(&self, key: K, value: V) -> bool {
        let mut map = self.inner.write();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().shift_remove(key)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Keep only entries matching the predicate, returning the removed ones
    pub fn drain_where(&self, mut remove: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        let mut map = self.inner.write();
        let mut removed = Vec::new();
        map.retain(|k, v| {
            if remove(k, v) {
                removed.push((k.clone(), v.clone()));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Run a compound read under one lock acquisition
    pub fn with_read<R>(&self, f: impl FnOnce(&IndexMap<K, V>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run a compound mutation under one lock acquisition
    pub fn with_write<R>(&self, f: impl FnOnce(&mut IndexMap<K, V>) -> R) -> R {
        f(&mut self.inner.write())
    }
}

/// FIFO queue guarded by a reader/writer lock.
pub struct RwQueue<T> {
    inner: RwLock<VecDeque<T>>,
}

impl<T> Default for RwQueue<T> {
    fn default() -> Self {
        Self { inner: RwLock::new(VecDeque::new()) }
    }
}

impl<T: Clone> RwQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.inner.write().push_back(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.write().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Remove and return everything currently queued, oldest first
    pub fn drain(&self) -> Vec<T> {
        self.inner.write().drain(..).collect()
    }

    /// Replace the contents wholesale
    pub fn replace(&self, items: impl IntoIterator<Item = T>) {
        let mut queue = self.inner.write();
        queue.clear();
        queue.extend(items);
    }
}

/// LIFO stack guarded by a reader/writer lock.
pub struct RwStack<T> {
    inner: RwLock<Vec<T>>,
}

impl<T> Default for RwStack<T> {
    fn default() -> Self {
        Self { inner: RwLock::new(Vec::new()) }
    }
}

impl<T: Clone> RwStack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.inner.write().push(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.write().pop()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Bottom-to-top copy of the stack
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().clone()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Remove everything, returned bottom-to-top
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.inner.write())
    }

    /// Replace the contents; the last item ends up on top
    pub fn replace(&self, items: impl IntoIterator<Item = T>) {
        let mut stack = self.inner.write();
        stack.clear();
        stack.extend(items);
    }

    /// Remove the top-most item matching the predicate
    pub fn remove_where(&self, mut matches: impl FnMut(&T) -> bool) -> Option<T> {
        let mut stack = self.inner.write();
        let index = stack.iter().rposition(|item| matches(item))?;
        Some(stack.remove(index))
    }
}

#[cfg(test)]
#[path = "collections_tests.rs"]
mod tests;
