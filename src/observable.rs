// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Ready-made host objects that raise change notifications.
//!
//! Wrap them with [`Value::host`] to feed them into an expression.

use crate::error::EvalError;
use crate::notify::{
    CollectionChanged, DictionaryChanged, Event, Handler, NotifyCollectionChanged,
    NotifyDictionaryChanged, NotifyPropertyChanged, PropertyChanged, Subscription,
};
use crate::value::{HostObject, Value};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use parking_lot::RwLock;

/// A named bag of properties. Setting a property to a different value
/// raises [`PropertyChanged`].
pub struct ObservableObject {
    type_name: Arc<str>,
    properties: RwLock<BTreeMap<Arc<str>, Value>>,
    changed: Event<PropertyChanged>,
    disposals: AtomicUsize,
}

impl ObservableObject {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.into(),
            properties: RwLock::new(BTreeMap::new()),
            changed: Event::new(),
            disposals: AtomicUsize::new(0),
        }
    }

    /// Builder-style initialization; does not raise notifications.
    pub fn with(self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.write().insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).cloned()
    }

    /// Returns `false` when the property already held `value`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        {
            let mut properties = self.properties.write();
            if properties.get(name) == Some(&value) {
                return false;
            }
            properties.insert(name.into(), value);
        }
        self.changed.raise(&PropertyChanged::new(name));
        true
    }

    /// Announce that every property may have changed.
    pub fn touch_all(&self) {
        self.changed.raise(&PropertyChanged::new(""));
    }

    pub fn subscriber_count(&self) -> usize {
        self.changed.subscriber_count()
    }

    pub fn dispose_count(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl HostObject for ObservableObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn property(&self, name: &str) -> Result<Value> {
        self.get(name)
            .ok_or_else(|| anyhow!("`{}` has no property `{name}`", self.type_name))
    }

    fn field(&self, name: &str) -> Result<Value> {
        self.property(name)
    }

    fn dispose(&self) -> Result<()> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_property_notifier(&self) -> Option<&dyn NotifyPropertyChanged> {
        Some(self)
    }
}

impl NotifyPropertyChanged for ObservableObject {
    fn subscribe_property_changed(&self, handler: Handler<PropertyChanged>) -> Subscription {
        self.changed.subscribe_handler(handler)
    }
}

fn out_of_range(index: usize, len: usize) -> anyhow::Error {
    EvalError::IndexOutOfRange {
        index: i64::try_from(index).unwrap_or(i64::MAX),
        len,
    }
    .into()
}

/// A list raising [`CollectionChanged`] for every structural change.
#[derive(Default)]
pub struct ObservableList {
    items: RwLock<Vec<Value>>,
    changed: Event<CollectionChanged>,
}

impl ObservableList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(items: Vec<Value>) -> Self {
        Self {
            items: RwLock::new(items),
            changed: Event::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    pub fn push(&self, value: impl Into<Value>) {
        let index = {
            let mut items = self.items.write();
            items.push(value.into());
            items.len() - 1
        };
        self.changed.raise(&CollectionChanged::add(index, 1));
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        {
            let mut items = self.items.write();
            if index > items.len() {
                return Err(out_of_range(index, items.len()));
            }
            items.insert(index, value.into());
        }
        self.changed.raise(&CollectionChanged::add(index, 1));
        Ok(())
    }

    pub fn remove_at(&self, index: usize) -> Result<Value> {
        let removed = {
            let mut items = self.items.write();
            if index >= items.len() {
                return Err(out_of_range(index, items.len()));
            }
            items.remove(index)
        };
        self.changed.raise(&CollectionChanged::remove(index, 1));
        Ok(removed)
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<Value> {
        let old = {
            let mut items = self.items.write();
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
            core::mem::replace(slot, value.into())
        };
        self.changed
            .raise(&CollectionChanged::replace(index, 1, index, 1));
        Ok(old)
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        {
            let mut items = self.items.write();
            let len = items.len();
            if from >= len || to >= len {
                return Err(out_of_range(from.max(to), len));
            }
            let item = items.remove(from);
            items.insert(to, item);
        }
        self.changed.raise(&CollectionChanged::moved(from, to, 1));
        Ok(())
    }

    pub fn clear(&self) {
        self.items.write().clear();
        self.changed.raise(&CollectionChanged::reset());
    }

    pub fn subscriber_count(&self) -> usize {
        self.changed.subscriber_count()
    }
}

impl HostObject for ObservableList {
    fn type_name(&self) -> &str {
        "ObservableList"
    }

    fn property(&self, name: &str) -> Result<Value> {
        match name {
            "Count" => Ok(Value::from(self.len())),
            _ => bail!("`ObservableList` has no property `{name}`"),
        }
    }

    fn index(&self, args: &[Value]) -> Result<Value> {
        let [index] = args else {
            bail!("`ObservableList` indexer takes one argument");
        };
        let i = index.as_i64()?;
        let items = self.items.read();
        usize::try_from(i)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .ok_or_else(|| {
                EvalError::IndexOutOfRange {
                    index: i,
                    len: items.len(),
                }
                .into()
            })
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        match (method, args) {
            ("Contains", [v]) => Ok(Value::from(self.items.read().contains(v))),
            ("IndexOf", [v]) => Ok(match self.items.read().iter().position(|i| i == v) {
                Some(i) => Value::from(i),
                None => Value::from(-1i64),
            }),
            _ => bail!("`ObservableList` has no method `{method}`"),
        }
    }

    fn as_collection_notifier(&self) -> Option<&dyn NotifyCollectionChanged> {
        Some(self)
    }
}

impl NotifyCollectionChanged for ObservableList {
    fn subscribe_collection_changed(&self, handler: Handler<CollectionChanged>) -> Subscription {
        self.changed.subscribe_handler(handler)
    }
}

/// A dictionary raising [`DictionaryChanged`] with the affected keys.
#[derive(Default)]
pub struct ObservableMap {
    entries: RwLock<BTreeMap<Value, Value>>,
    changed: Event<DictionaryChanged>,
}

impl ObservableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Insert or replace; returns the previous value.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let (key, value) = (key.into(), value.into());
        let old = self.entries.write().insert(key.clone(), value.clone());
        let args = match &old {
            Some(old) => DictionaryChanged::Replaced {
                key,
                old: old.clone(),
                new: value,
            },
            None => DictionaryChanged::Added { key, value },
        };
        self.changed.raise(&args);
        old
    }

    pub fn remove(&self, key: &Value) -> Option<Value> {
        let value = self.entries.write().remove(key)?;
        self.changed.raise(&DictionaryChanged::Removed {
            key: key.clone(),
            value: value.clone(),
        });
        Some(value)
    }

    /// Add several new entries, raising a single notification. Keys that are
    /// already present are left untouched and omitted from the notification.
    pub fn extend(&self, items: Vec<(Value, Value)>) {
        let added: Vec<(Value, Value)> = {
            let mut entries = self.entries.write();
            items
                .into_iter()
                .filter(|(k, v)| {
                    if entries.contains_key(k) {
                        return false;
                    }
                    entries.insert(k.clone(), v.clone());
                    true
                })
                .collect()
        };
        if !added.is_empty() {
            self.changed.raise(&DictionaryChanged::AddedRange(added));
        }
    }

    pub fn remove_all(&self, keys: &[Value]) {
        let removed: Vec<(Value, Value)> = {
            let mut entries = self.entries.write();
            keys.iter()
                .filter_map(|k| entries.remove(k).map(|v| (k.clone(), v)))
                .collect()
        };
        if !removed.is_empty() {
            self.changed.raise(&DictionaryChanged::RemovedRange(removed));
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.changed.raise(&DictionaryChanged::Reset);
    }

    pub fn subscriber_count(&self) -> usize {
        self.changed.subscriber_count()
    }
}

impl HostObject for ObservableMap {
    fn type_name(&self) -> &str {
        "ObservableMap"
    }

    fn property(&self, name: &str) -> Result<Value> {
        match name {
            "Count" => Ok(Value::from(self.len())),
            _ => bail!("`ObservableMap` has no property `{name}`"),
        }
    }

    fn index(&self, args: &[Value]) -> Result<Value> {
        let [key] = args else {
            bail!("`ObservableMap` indexer takes one argument");
        };
        self.get(key)
            .ok_or_else(|| EvalError::KeyNotFound(key.clone()).into())
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        match (method, args) {
            ("ContainsKey", [k]) => Ok(Value::from(self.contains_key(k))),
            _ => bail!("`ObservableMap` has no method `{method}`"),
        }
    }

    fn as_dictionary_notifier(&self) -> Option<&dyn NotifyDictionaryChanged> {
        Some(self)
    }
}

impl NotifyDictionaryChanged for ObservableMap {
    fn subscribe_dictionary_changed(&self, handler: Handler<DictionaryChanged>) -> Subscription {
        self.changed.subscribe_handler(handler)
    }
}
