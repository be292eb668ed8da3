// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]
use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyExists { key: String, registry: Arc<str> },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists { key, registry } => {
                write!(
                    f,
                    "{registry} registration failed: An item for '{key}' is already registered."
                )
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Generic thread-safe registry keyed by `K` using DashMap.
///
/// Lookups hand out clones of the stored item, so items are typically
/// `Arc`s of callables.
pub struct Registry<K, T> {
    inner: DashMap<K, T>,
    name: Arc<str>,
}

impl<K: Eq + Hash + Clone + fmt::Display, T: Clone> Registry<K, T> {
    /// Create a new, empty registry with a given name.
    pub fn new(registry_name: &str) -> Self {
        Self {
            inner: DashMap::new(),
            name: registry_name.into(),
        }
    }

    /// Register an item under a key. Returns Err if the key already exists.
    pub fn register(&self, key: K, item: T) -> Result<(), RegistryError> {
        use dashmap::mapref::entry::Entry;
        match self.inner.entry(key) {
            Entry::Occupied(e) => Err(RegistryError::AlreadyExists {
                key: e.key().to_string(),
                registry: self.name.clone(),
            }),
            Entry::Vacant(e) => {
                e.insert(item);
                Ok(())
            }
        }
    }

    /// Retrieve an item by key, if it exists.
    pub fn get(&self, key: &K) -> Option<T> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    /// Retrieve an item, computing and caching it on a miss.
    ///
    /// `resolve` runs outside of the shard lock; if two callers race, the
    /// first inserted item wins and both receive it.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &K,
        resolve: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some(item) = self.get(key) {
            return Ok(item);
        }
        let item = resolve()?;
        Ok(self
            .inner
            .entry(key.clone())
            .or_insert(item)
            .value()
            .clone())
    }

    /// Remove an item by key. Returns the removed item if it existed.
    pub fn remove(&self, key: &K) -> Option<T> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    /// List all registered keys.
    pub fn keys(&self) -> Vec<K> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Check if an item with the given key exists.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Get the number of registered items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Clear all items from the registry.
    pub fn clear(&self) {
        self.inner.clear();
    }
}
