// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{Fault, Node, NodeKind, Outcome};
use crate::error::EvalError;
use crate::graph::{NodeId, SessionInner};
use crate::notify::{CollectionChanged, DictionaryChanged, PropertyChanged, Subscription};
use crate::value::{HostRef, Value};

use std::sync::{Arc, Weak};

/// Subscriptions on the host object a node currently reads from.
pub(crate) struct Watch {
    target: usize,
    _subscriptions: Vec<Subscription>,
}

fn literal_position(literal: Option<&Value>) -> Option<usize> {
    match literal {
        Some(Value::Number(n)) if n.is_integer() => n.as_usize(),
        _ => None,
    }
}

impl Node {
    /// Point the watch at `object`. Subscriptions are only replaced when the
    /// identity of the observed host changes.
    pub(super) fn watch(&self, g: &Arc<SessionInner>, object: Option<&Value>) {
        let target = object.and_then(Value::host_id);
        if self.state.lock().watch.as_ref().map(|w| w.target) == target {
            return;
        }

        let watch = match object {
            Some(Value::Host(h)) => Some(self.subscribe(Arc::downgrade(g), h)),
            _ => None,
        };
        let old = core::mem::replace(&mut self.state.lock().watch, watch);
        // unsubscribe outside of the state lock
        drop(old);
    }

    fn subscribe(&self, g: Weak<SessionInner>, host: &HostRef) -> Watch {
        let id = self.id;
        let mut subscriptions = vec![];

        match &self.kind {
            NodeKind::Member { member, .. } => {
                if let Some(notifier) = host.as_property_notifier() {
                    let name = member.name.clone();
                    subscriptions.push(notifier.subscribe_property_changed(Arc::new(
                        move |e: &PropertyChanged| {
                            if e.affects(&name) {
                                if let Some(g) = g.upgrade() {
                                    g.notify(id);
                                }
                            }
                        },
                    )));
                }
            }

            NodeKind::Index { literal, .. } => {
                if let Some(notifier) = host.as_collection_notifier() {
                    let position = literal_position(literal.as_ref());
                    let g = g.clone();
                    subscriptions.push(notifier.subscribe_collection_changed(Arc::new(
                        move |e: &CollectionChanged| {
                            if position.map_or(true, |i| e.affects(i)) {
                                if let Some(g) = g.upgrade() {
                                    g.notify(id);
                                }
                            }
                        },
                    )));
                }
                if let Some(notifier) = host.as_dictionary_notifier() {
                    let key = literal.clone();
                    subscriptions.push(notifier.subscribe_dictionary_changed(Arc::new(
                        move |e: &DictionaryChanged| {
                            if let Some(g) = g.upgrade() {
                                on_dictionary_changed(&g, id, key.as_ref(), e);
                            }
                        },
                    )));
                }
            }

            _ => {}
        }

        tracing::trace!(node = %id, host = ?host, count = subscriptions.len(), "watching host");
        Watch {
            target: host.id(),
            _subscriptions: subscriptions,
        }
    }
}

// With a constant key, changes to that key are applied without re-reading
// the dictionary and changes to other keys are ignored.
fn on_dictionary_changed(
    g: &Arc<SessionInner>,
    id: NodeId,
    key: Option<&Value>,
    e: &DictionaryChanged,
) {
    let Some(key) = key else {
        g.notify(id);
        return;
    };
    match e {
        DictionaryChanged::Added { key: k, value }
        | DictionaryChanged::Replaced { key: k, new: value, .. } => {
            if k == key {
                g.assign(id, Outcome::Value(value.clone()));
            }
        }
        DictionaryChanged::Removed { key: k, .. } => {
            if k == key {
                let fault = Fault::new(EvalError::KeyNotFound(key.clone()).into());
                g.assign(id, Outcome::Fault(fault));
            }
        }
        DictionaryChanged::AddedRange(items) | DictionaryChanged::RemovedRange(items) => {
            if items.iter().any(|(k, _)| k == key) {
                g.notify(id);
            }
        }
        DictionaryChanged::Reset => g.notify(id),
    }
}
