// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Live nodes.
//!
//! A node owns its current [`Outcome`], the set of nodes depending on it and,
//! for member and index nodes, the subscriptions on the host object it reads
//! from. Nodes never touch each other's state directly; operand outcomes are
//! read through the session.

mod evaluate;
mod watch;

use crate::ast::{BinaryOp, ConstructorDescriptor, MemberDescriptor, MethodDescriptor, UnaryOp};
use crate::disposal::Disposal;
use crate::graph::{NodeId, SessionInner};
use crate::invoker::{Constructor, Getter, Indexer, Method};
use crate::notify::Event;
use crate::operators::{BinaryOperator, UnaryOperator};
use crate::options::Options;
use crate::types::Type;
use crate::value::Value;

use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

pub(crate) use watch::Watch;

/// A captured evaluation error. Faults compare by identity: re-raising the
/// same error instance is not a change, a fresh error is.
#[derive(Clone)]
pub struct Fault(Arc<anyhow::Error>);

impl Fault {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl PartialEq for Fault {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fault({:#})", self.0)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl From<anyhow::Error> for Fault {
    fn from(error: anyhow::Error) -> Self {
        Fault::new(error)
    }
}

/// Result of a node: either a value or a fault, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    Fault(Fault),
}

impl Outcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Fault(_) => None,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Outcome::Value(_) => None,
            Outcome::Fault(f) => Some(f),
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Outcome::Fault(_))
    }

    /// The value, or the default of `ty` when faulted.
    pub fn value_or_default(&self, ty: &Type) -> Value {
        match self {
            Outcome::Value(v) => v.clone(),
            Outcome::Fault(_) => ty.default_value(),
        }
    }
}

impl From<Result<Value, Fault>> for Outcome {
    fn from(r: Result<Value, Fault>) -> Self {
        match r {
            Ok(v) => Outcome::Value(v),
            Err(f) => Outcome::Fault(f),
        }
    }
}

/// Discriminant of [`NodeKind`]; each tag has its own intern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KindTag {
    Constant,
    Binary,
    AndAlso,
    OrElse,
    Coalesce,
    Conditional,
    Member,
    Index,
    Call,
    New,
    Unary,
}

pub(crate) const KIND_COUNT: usize = 11;

impl KindTag {
    pub fn slot(self) -> usize {
        match self {
            KindTag::Constant => 0,
            KindTag::Binary => 1,
            KindTag::AndAlso => 2,
            KindTag::OrElse => 3,
            KindTag::Coalesce => 4,
            KindTag::Conditional => 5,
            KindTag::Member => 6,
            KindTag::Index => 7,
            KindTag::Call => 8,
            KindTag::New => 9,
            KindTag::Unary => 10,
        }
    }
}

/// The non-operand part of an intern key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Literal {
    None,
    Value(Value),
    Binary(BinaryOp),
    Unary(UnaryOp),
    Member(MemberDescriptor),
    Method(MethodDescriptor),
    Constructor(ConstructorDescriptor),
}

/// Structural identity of a node. Operands are canonical, so comparing
/// their ids is enough.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct InternKey {
    pub operands: Vec<NodeId>,
    pub literal: Literal,
    pub ty: Type,
    pub options: usize,
}

pub(crate) enum NodeKind {
    Constant(Value),
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
        operator: BinaryOperator,
        lifted: bool,
    },
    AndAlso {
        left: NodeId,
        right: NodeId,
    },
    OrElse {
        left: NodeId,
        right: NodeId,
    },
    Coalesce {
        left: NodeId,
        right: NodeId,
    },
    Conditional {
        test: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    },
    Member {
        object: Option<NodeId>,
        member: MemberDescriptor,
        getter: Getter,
    },
    Index {
        object: NodeId,
        args: Vec<NodeId>,
        indexer: Indexer,
        // the single constant argument, when there is one
        literal: Option<Value>,
    },
    Call {
        object: Option<NodeId>,
        args: Vec<NodeId>,
        invoke: Method,
    },
    New {
        args: Vec<NodeId>,
        invoke: Constructor,
    },
    Unary {
        operand: NodeId,
        operator: UnaryOperator,
        lifted: bool,
    },
}

struct NodeState {
    outcome: Outcome,
    dependents: BTreeSet<NodeId>,
    watch: Option<Watch>,
}

pub(crate) struct Node {
    pub id: NodeId,
    pub tag: KindTag,
    pub kind: NodeKind,
    pub ty: Type,
    pub height: usize,
    pub key: InternKey,
    pub options: Arc<Options>,
    pub disposal: Disposal,
    state: Mutex<NodeState>,
    pub changed: Event<Outcome>,
}

impl Node {
    pub fn new(
        id: NodeId,
        tag: KindTag,
        kind: NodeKind,
        height: usize,
        key: InternKey,
        options: Arc<Options>,
        disposal: Disposal,
    ) -> Self {
        let ty = key.ty.clone();
        let outcome = match &kind {
            NodeKind::Constant(v) => Outcome::Value(v.clone()),
            _ => Outcome::Value(ty.default_value()),
        };
        Self {
            id,
            tag,
            kind,
            ty,
            height,
            key,
            options,
            disposal,
            state: Mutex::new(NodeState {
                outcome,
                dependents: BTreeSet::new(),
                watch: None,
            }),
            changed: Event::new(),
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.state.lock().outcome.clone()
    }

    /// Operand ids in declaration order, one entry per reference.
    pub fn operands(&self) -> &[NodeId] {
        &self.key.operands
    }

    pub fn distinct_operands(&self) -> BTreeSet<NodeId> {
        self.key.operands.iter().copied().collect()
    }

    pub fn add_dependent(&self, id: NodeId) {
        self.state.lock().dependents.insert(id);
    }

    pub fn remove_dependent(&self, id: NodeId) {
        self.state.lock().dependents.remove(&id);
    }

    pub fn dependents(&self) -> Vec<NodeId> {
        self.state.lock().dependents.iter().copied().collect()
    }

    /// Whether a change of `child` can change this node, given the current
    /// outcomes of the short-circuiting operands.
    pub fn reacts_to(&self, child: NodeId, g: &SessionInner) -> bool {
        let selects = |test: NodeId, wanted: bool| {
            matches!(g.outcome_of(test), Outcome::Value(Value::Bool(b)) if b == wanted)
        };
        match &self.kind {
            NodeKind::AndAlso { left, right } => child == *left || (child == *right && selects(*left, true)),
            NodeKind::OrElse { left, right } => child == *left || (child == *right && selects(*left, false)),
            NodeKind::Coalesce { left, right } => {
                child == *left
                    || (child == *right
                        && matches!(g.outcome_of(*left), Outcome::Value(Value::Null)))
            }
            NodeKind::Conditional {
                test,
                if_true,
                if_false,
            } => {
                child == *test
                    || (child == *if_true && selects(*test, true))
                    || (child == *if_false && selects(*test, false))
            }
            _ => true,
        }
    }

    /// Store `outcome`. Returns `false` when it equals the current one. The
    /// outgoing value is handed to the disposal policy and the change event
    /// is raised after the state lock is dropped.
    pub fn commit(&self, g: &SessionInner, outcome: Outcome) -> bool {
        let old = {
            let mut state = self.state.lock();
            if state.outcome == outcome {
                return false;
            }
            core::mem::replace(&mut state.outcome, outcome.clone())
        };

        if let Outcome::Value(old) = &old {
            if let Err(e) = self
                .disposal
                .release(&self.options, old, outcome.value())
            {
                g.report_disposal_failure(self.id, e);
            }
        }

        self.changed.raise(&outcome);
        true
    }

    /// Drop the host subscriptions and hand back the final outcome.
    pub fn teardown(&self) -> Outcome {
        let (watch, outcome) = {
            let mut state = self.state.lock();
            (state.watch.take(), state.outcome.clone())
        };
        drop(watch);
        outcome
    }

    pub fn is_watching(&self) -> bool {
        self.state.lock().watch.is_some()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.tag)
            .field("type", &self.ty)
            .field("height", &self.height)
            .finish()
    }
}
