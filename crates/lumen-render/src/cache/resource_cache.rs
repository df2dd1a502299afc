// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use ahash::AHashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A get-or-create map of shared resources.
///
/// Identical keys always resolve to the same `Arc`. Entries are never
/// evicted; they leave the cache only through [`ResourceCache::drain`] at
/// renderer teardown. The lock is held across creation so that two callers
/// can never create the same entry twice.
#[derive(Debug)]
pub struct ResourceCache<K, V> {
    entries: Mutex<AHashMap<K, Arc<V>>>,
    hits: AtomicUsize,
    creations: AtomicUsize,
}

impl<K, V> Default for ResourceCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
            hits: AtomicUsize::new(0),
            creations: AtomicUsize::new(0),
        }
    }
}

impl<K: Eq + Hash + Clone, V> ResourceCache<K, V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, creating it with `create` on a miss.
    ///
    /// A failed creation leaves the cache unchanged.
    pub fn get_or_try_create<E>(
        &self,
        key: &K,
        create: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(create()?);
        entries.insert(key.clone(), Arc::clone(&value));
        self.creations.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Looks up `key` without creating anything.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Entries created.
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::Relaxed)
    }

    /// Removes and returns every entry.
    pub fn drain(&self) -> Vec<(K, Arc<V>)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect()
    }
}
