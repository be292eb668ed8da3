// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::node::Node;

use core::fmt;
use std::sync::Arc;

/// Handle to a live node. The generation makes a handle to a released node
/// fail lookups even after its slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

struct Entry {
    node: Arc<Node>,
    refs: usize,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    entry: Option<Entry>,
}

#[derive(Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl Arena {
    /// Claim an empty slot. The id stays unresolvable until
    /// [`Arena::insert`] fills it.
    pub fn reserve(&mut self) -> NodeId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        NodeId {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Fill a reserved slot with a node holding one reference.
    pub fn insert(&mut self, id: NodeId, node: Arc<Node>) {
        if let Some(slot) = self.slots.get_mut(id.index) {
            if slot.generation == id.generation && slot.entry.is_none() {
                slot.entry = Some(Entry { node, refs: 1 });
                self.live += 1;
            }
        }
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_mut())
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<Node>> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
            .map(|e| e.node.clone())
    }

    pub fn refs(&self, id: NodeId) -> usize {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
            .map_or(0, |e| e.refs)
    }

    pub fn retain(&mut self, id: NodeId) -> bool {
        match self.entry_mut(id) {
            Some(e) => {
                e.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference, returning the remaining count.
    pub fn release(&mut self, id: NodeId) -> Option<usize> {
        let entry = self.entry_mut(id)?;
        entry.refs = entry.refs.saturating_sub(1);
        Some(entry.refs)
    }

    /// Empty the slot and bump its generation.
    pub fn remove(&mut self, id: NodeId) -> Option<Arc<Node>> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)?;
        let entry = slot.entry.take()?;
        slot.generation += 1;
        self.free.push(id.index);
        self.live -= 1;
        Some(entry.node)
    }

    pub fn len(&self) -> usize {
        self.live
    }
}
