// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{NodeId, SessionInner};
use crate::node::Outcome;

use core::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pending work of the current propagation, ordered by node height so that
/// every operand settles before the nodes reading it.
#[derive(Default)]
pub(crate) struct Wave {
    // `None` re-evaluates; `Some` assigns the given outcome.
    pending: BTreeMap<(usize, NodeId), Option<Outcome>>,
    draining: bool,
}

impl Wave {
    fn push(&mut self, height: usize, id: NodeId, action: Option<Outcome>) {
        match self.pending.get_mut(&(height, id)) {
            // a re-evaluation subsumes a pending assignment
            Some(pending) if action.is_none() => *pending = None,
            Some(_) => {}
            None => {
                self.pending.insert((height, id), action);
            }
        }
    }
}

struct Draining<'a>(&'a RefCell<Wave>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        let mut wave = self.0.borrow_mut();
        wave.draining = false;
        wave.pending.clear();
    }
}

impl SessionInner {
    /// Re-evaluate `id` and everything reacting to it.
    pub(crate) fn notify(self: &Arc<Self>, id: NodeId) {
        self.schedule(id, None);
    }

    /// Replace the outcome of `id` without evaluating it and propagate.
    pub(crate) fn assign(self: &Arc<Self>, id: NodeId, outcome: Outcome) {
        self.schedule(id, Some(outcome));
    }

    fn schedule(self: &Arc<Self>, id: NodeId, action: Option<Outcome>) {
        let Some(node) = self.node(id) else {
            return;
        };
        let guard = self.wave.lock();
        guard.borrow_mut().push(node.height, id, action);

        // Raised from inside a running wave on this thread: merged.
        if guard.borrow().draining {
            return;
        }
        guard.borrow_mut().draining = true;
        let _draining = Draining(&guard);

        tracing::debug!(node = %id, "propagation started");
        let mut processed = 0usize;
        loop {
            let next = guard.borrow_mut().pending.pop_first();
            let Some(((_, id), action)) = next else {
                break;
            };
            self.process(id, action);
            processed += 1;
        }
        tracing::debug!(processed, "propagation finished");
    }

    // Runs without any borrow of the wave held; handlers raised from here
    // may schedule more work.
    fn process(self: &Arc<Self>, id: NodeId, action: Option<Outcome>) {
        let Some(node) = self.node(id) else {
            return;
        };
        tracing::trace!(node = %id, kind = ?node.tag, "re-evaluating");
        let outcome = match action {
            Some(outcome) => outcome,
            None => node.evaluate(self),
        };
        if !node.commit(self, outcome) {
            return;
        }

        for dependent in node.dependents() {
            let Some(d) = self.node(dependent) else {
                continue;
            };
            if d.reacts_to(id, self) {
                self.wave.lock().borrow_mut().push(d.height, dependent, None);
            }
        }
    }
}
