// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Change notifications.
//!
//! Host objects opt into the mutation protocols by implementing one of the
//! `Notify*` traits and returning themselves from the matching
//! [`HostObject`](crate::HostObject) accessor. Nodes use the same [`Event`]
//! type to publish their own changes.

use crate::value::Value;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct Handlers<A> {
    next: u64,
    entries: Vec<(u64, Handler<A>)>,
}

/// A multicast event. Handlers run synchronously on the raising thread,
/// outside of any lock held by the event.
pub struct Event<A> {
    inner: Arc<Mutex<Handlers<A>>>,
}

impl<A> Default for Event<A> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Handlers {
                next: 0,
                entries: vec![],
            })),
        }
    }
}

impl<A: 'static> Event<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = {
            let mut handlers = self.inner.lock();
            let id = handlers.next;
            handlers.next += 1;
            handlers.entries.push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Handlers<A>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().entries.retain(|(h, _)| *h != id);
            }
        })
    }

    pub fn raise(&self, args: &A) {
        let handlers: Vec<Handler<A>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(args);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

/// Keeps a handler registered until dropped.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F: FnOnce() + Send + 'static>(cancel: F) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn empty() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// A property of the sender changed. An empty name means every property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChanged {
    pub name: Arc<str>,
}

impl PropertyChanged {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }

    pub fn affects(&self, member: &str) -> bool {
        self.name.is_empty() || self.name.as_ref() == member
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionAction {
    Add,
    Remove,
    Replace,
    Move,
    Reset,
}

/// An indexed collection changed.
///
/// `old_*` describe the affected range before the change and `new_*` the
/// range after it. Unused ranges have a count of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionChanged {
    pub action: CollectionAction,
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
}

impl CollectionChanged {
    pub fn add(index: usize, count: usize) -> Self {
        Self {
            action: CollectionAction::Add,
            old_start: 0,
            old_count: 0,
            new_start: index,
            new_count: count,
        }
    }

    pub fn remove(index: usize, count: usize) -> Self {
        Self {
            action: CollectionAction::Remove,
            old_start: index,
            old_count: count,
            new_start: 0,
            new_count: 0,
        }
    }

    pub fn replace(old_start: usize, old_count: usize, new_start: usize, new_count: usize) -> Self {
        Self {
            action: CollectionAction::Replace,
            old_start,
            old_count,
            new_start,
            new_count,
        }
    }

    pub fn moved(from: usize, to: usize, count: usize) -> Self {
        Self {
            action: CollectionAction::Move,
            old_start: from,
            old_count: count,
            new_start: to,
            new_count: count,
        }
    }

    pub fn reset() -> Self {
        Self {
            action: CollectionAction::Reset,
            old_start: 0,
            old_count: 0,
            new_start: 0,
            new_count: 0,
        }
    }

    /// Whether the element at `index` may differ after this change.
    pub fn affects(&self, index: usize) -> bool {
        let within = |start: usize, count: usize| index >= start && index - start < count;
        match self.action {
            CollectionAction::Add => self.new_start <= index,
            CollectionAction::Remove => self.old_start <= index,
            // only the moved ranges are considered
            CollectionAction::Move => {
                within(self.old_start, self.old_count) || within(self.new_start, self.new_count)
            }
            CollectionAction::Replace => {
                within(self.old_start, self.old_count)
                    || within(self.new_start, self.new_count)
                    || (self.old_count != self.new_count
                        && index >= self.old_start.min(self.new_start))
            }
            CollectionAction::Reset => true,
        }
    }
}

/// A keyed collection changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictionaryChanged {
    Added { key: Value, value: Value },
    Removed { key: Value, value: Value },
    Replaced { key: Value, old: Value, new: Value },
    AddedRange(Vec<(Value, Value)>),
    RemovedRange(Vec<(Value, Value)>),
    Reset,
}

pub trait NotifyPropertyChanged {
    fn subscribe_property_changed(&self, handler: Handler<PropertyChanged>) -> Subscription;
}

pub trait NotifyCollectionChanged {
    fn subscribe_collection_changed(&self, handler: Handler<CollectionChanged>) -> Subscription;
}

pub trait NotifyDictionaryChanged {
    fn subscribe_dictionary_changed(&self, handler: Handler<DictionaryChanged>) -> Subscription;
}

impl<A: 'static> Event<A> {
    pub(crate) fn subscribe_handler(&self, handler: Handler<A>) -> Subscription {
        self.subscribe(move |args: &A| handler(args))
    }
}
