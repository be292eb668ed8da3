// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sessions own the live graph: the node arena, one intern table per node
//! kind and the propagation wave. Nothing is shared between sessions.

mod arena;
mod build;
mod propagate;

pub use arena::NodeId;

use crate::ast::Expr;
use crate::error::{DisposalError, Error};
use crate::expression::ExpressionKey;
use crate::invoker::Invoker;
use crate::node::{Fault, InternKey, Node, Outcome, KIND_COUNT};
use crate::notify::{Event, Subscription};
use crate::operators::OperatorRegistry;
use crate::options::Options;
use crate::value::Value;

use arena::Arena;
use propagate::Wave;

use core::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

pub(crate) struct SessionInner {
    operators: Arc<OperatorRegistry>,
    invoker: Arc<Invoker>,
    options: Arc<Options>,
    arena: RwLock<Arena>,
    tables: [Mutex<BTreeMap<InternKey, NodeId>>; KIND_COUNT],
    wave: ReentrantMutex<RefCell<Wave>>,
    disposal_failed: Event<DisposalError>,
    pub(crate) expressions: Mutex<BTreeMap<ExpressionKey, (NodeId, usize)>>,
}

/// An owned graph of interned nodes.
///
/// Cloning a session is cheap and yields another handle to the same graph.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

#[derive(Default)]
pub struct SessionBuilder {
    operators: Option<Arc<OperatorRegistry>>,
    invoker: Option<Arc<Invoker>>,
    options: Option<Arc<Options>>,
}

impl SessionBuilder {
    pub fn with_operators(mut self, operators: Arc<OperatorRegistry>) -> Self {
        self.operators = Some(operators);
        self
    }

    pub fn with_invoker(mut self, invoker: Arc<Invoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Options used by [`Session::activate`].
    pub fn with_options(mut self, options: Arc<Options>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                operators: self
                    .operators
                    .unwrap_or_else(OperatorRegistry::shared_default),
                invoker: self.invoker.unwrap_or_default(),
                options: self.options.unwrap_or_else(|| Options::new().shared()),
                arena: RwLock::new(Arena::default()),
                tables: core::array::from_fn(|_| Mutex::new(BTreeMap::new())),
                wave: ReentrantMutex::new(RefCell::new(Wave::default())),
                disposal_failed: Event::new(),
                expressions: Mutex::new(BTreeMap::new()),
            }),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        SessionBuilder::default().build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn operators(&self) -> &Arc<OperatorRegistry> {
        &self.inner.operators
    }

    pub fn invoker(&self) -> &Arc<Invoker> {
        &self.inner.invoker
    }

    pub fn options(&self) -> &Arc<Options> {
        &self.inner.options
    }

    /// Intern `expr` and return its canonical node, taking one reference.
    /// The expression must be closed: parameters are a construction error.
    /// `options` are frozen.
    pub fn create(&self, expr: &Expr, options: &Arc<Options>) -> Result<NodeId, Error> {
        self.inner.create(expr, options)
    }

    /// Drop one reference to `id`. Returns `true` when this released the
    /// last reference and the node was torn down.
    pub fn release(&self, id: NodeId) -> Result<bool, Error> {
        self.inner.release(id)
    }

    pub fn outcome(&self, id: NodeId) -> Option<Outcome> {
        self.inner.node(id).map(|n| n.outcome())
    }

    /// Outstanding references; zero once the node is gone.
    pub fn refcount(&self, id: NodeId) -> usize {
        self.inner.arena.read().refs(id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.arena.read().len()
    }

    /// Whether the node currently holds subscriptions on a host object.
    pub fn is_watching(&self, id: NodeId) -> bool {
        self.inner.node(id).is_some_and(|n| n.is_watching())
    }

    /// Observe the outcome of `id`. `None` when the node is not live.
    pub fn subscribe<F>(&self, id: NodeId, handler: F) -> Option<Subscription>
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        self.inner.node(id).map(|n| n.changed.subscribe(handler))
    }

    /// Disposal failures raised while re-evaluating. Failures while
    /// releasing are returned from [`Session::release`] instead.
    pub fn on_disposal_failed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DisposalError) + Send + Sync + 'static,
    {
        self.inner.disposal_failed.subscribe(handler)
    }
}

impl SessionInner {
    pub(crate) fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.arena.read().get(id)
    }

    pub(crate) fn outcome_of(&self, id: NodeId) -> Outcome {
        match self.node(id) {
            Some(node) => node.outcome(),
            None => Outcome::Fault(Fault::new(anyhow!(Error::UnknownNode(id)))),
        }
    }

    pub(crate) fn value_of(&self, id: NodeId) -> Result<Value, Fault> {
        match self.outcome_of(id) {
            Outcome::Value(v) => Ok(v),
            Outcome::Fault(f) => Err(f),
        }
    }

    pub(crate) fn report_disposal_failure(&self, id: NodeId, error: DisposalError) {
        tracing::error!(node = %id, error = %error, cause = %error.source, "disposal failed");
        self.disposal_failed.raise(&error);
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("nodes", &self.node_count())
            .finish()
    }
}
