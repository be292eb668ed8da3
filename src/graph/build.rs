// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{NodeId, SessionInner};
use crate::ast::{BinaryOp, Expr, ExprRef, UnaryOp};
use crate::disposal::Disposal;
use crate::error::{ConstructionError, DisposalError, Error};
use crate::node::{InternKey, KindTag, Literal, Node, NodeKind, Outcome};
use crate::options::Options;
use crate::types::Type;

use std::sync::Arc;

fn children(expr: &Expr) -> Vec<&ExprRef> {
    match expr {
        Expr::Constant { .. } | Expr::Parameter { .. } => vec![],
        Expr::Binary { left, right, .. } => vec![left, right],
        Expr::Unary { operand, .. } => vec![operand],
        Expr::Conditional {
            test,
            if_true,
            if_false,
            ..
        } => vec![test, if_true, if_false],
        Expr::Member { object, .. } => object.iter().collect(),
        Expr::Index { object, args, .. } => core::iter::once(object).chain(args).collect(),
        Expr::Call { object, args, .. } => object.iter().chain(args).collect(),
        Expr::New { args, .. } => args.iter().collect(),
    }
}

fn tag_of(expr: &Expr) -> KindTag {
    match expr {
        Expr::Constant { .. } | Expr::Parameter { .. } => KindTag::Constant,
        Expr::Binary { op, .. } => match op {
            BinaryOp::AndAlso => KindTag::AndAlso,
            BinaryOp::OrElse => KindTag::OrElse,
            BinaryOp::Coalesce => KindTag::Coalesce,
            _ => KindTag::Binary,
        },
        Expr::Unary { .. } => KindTag::Unary,
        Expr::Conditional { .. } => KindTag::Conditional,
        Expr::Member { .. } => KindTag::Member,
        Expr::Index { .. } => KindTag::Index,
        Expr::Call { .. } => KindTag::Call,
        Expr::New { .. } => KindTag::New,
    }
}

fn literal_of(expr: &Expr) -> Literal {
    match expr {
        Expr::Constant { value, .. } => Literal::Value(value.clone()),
        Expr::Binary { op, .. } => Literal::Binary(*op),
        Expr::Unary { op, .. } => Literal::Unary(op.clone()),
        Expr::Member { member, .. } => Literal::Member(member.clone()),
        Expr::Call { method, .. } => Literal::Method(method.clone()),
        Expr::New { constructor, .. } => Literal::Constructor(constructor.clone()),
        Expr::Parameter { .. } | Expr::Conditional { .. } | Expr::Index { .. } => Literal::None,
    }
}

fn require_bool(op: BinaryOp, e: &Expr) -> Result<(), ConstructionError> {
    match e.ty() {
        Type::Bool | Type::Any => Ok(()),
        found => Err(ConstructionError::NonBooleanOperand {
            op,
            found: found.clone(),
        }),
    }
}

impl SessionInner {
    pub(crate) fn create(
        self: &Arc<Self>,
        expr: &Expr,
        options: &Arc<Options>,
    ) -> Result<NodeId, Error> {
        let _serial = self.wave.lock();
        options.freeze();
        self.build(expr, options)
    }

    // Operands first, then the node itself. On failure every reference taken
    // so far is given back.
    fn build(self: &Arc<Self>, expr: &Expr, options: &Arc<Options>) -> Result<NodeId, Error> {
        if let Expr::Parameter { name, .. } = expr {
            return Err(ConstructionError::UnboundParameter(name.clone()).into());
        }

        let mut operands = vec![];
        for child in children(expr) {
            match self.build(child, options) {
                Ok(id) => operands.push(id),
                Err(e) => {
                    self.release_all(&operands);
                    return Err(e);
                }
            }
        }

        self.intern(expr, options, operands)
    }

    fn release_all(self: &Arc<Self>, ids: &[NodeId]) {
        for id in ids {
            if let Err(e) = self.release(*id) {
                tracing::warn!(node = %id, error = %e, "failed to release operand");
            }
        }
    }

    fn intern(
        self: &Arc<Self>,
        expr: &Expr,
        options: &Arc<Options>,
        operands: Vec<NodeId>,
    ) -> Result<NodeId, Error> {
        let tag = tag_of(expr);
        let key = InternKey {
            operands,
            literal: literal_of(expr),
            ty: expr.ty().clone(),
            options: Arc::as_ptr(options) as usize,
        };

        let mut table = self.tables[tag.slot()].lock();
        if let Some(&id) = table.get(&key) {
            self.arena.write().retain(id);
            drop(table);
            // the existing node already holds its operands
            self.release_all(&key.operands);
            tracing::trace!(node = %id, kind = ?tag, "interned");
            return Ok(id);
        }

        let (kind, disposal) = match self.resolve(expr, &key.operands) {
            Ok(resolved) => resolved,
            Err(e) => {
                drop(table);
                self.release_all(&key.operands);
                return Err(e.into());
            }
        };

        let height = key
            .operands
            .iter()
            .filter_map(|id| self.node(*id))
            .map(|n| n.height + 1)
            .max()
            .unwrap_or(0);

        let id = self.arena.write().reserve();
        let node = Arc::new(Node::new(
            id,
            tag,
            kind,
            height,
            key.clone(),
            options.clone(),
            disposal,
        ));
        self.arena.write().insert(id, node.clone());
        table.insert(key, id);
        drop(table);

        for operand in node.distinct_operands() {
            if let Some(o) = self.node(operand) {
                o.add_dependent(id);
            }
        }
        tracing::debug!(node = %id, kind = ?tag, height, expr = %expr, "node created");

        if !matches!(node.kind, NodeKind::Constant(_)) {
            let outcome = node.evaluate(self);
            node.commit(self, outcome);
        }
        Ok(id)
    }

    fn resolve(
        &self,
        expr: &Expr,
        operands: &[NodeId],
    ) -> Result<(NodeKind, Disposal), ConstructionError> {
        let at = |i: usize| operands[i];
        let kind = match expr {
            Expr::Constant { value, .. } => NodeKind::Constant(value.clone()),

            Expr::Parameter { name, .. } => {
                return Err(ConstructionError::UnboundParameter(name.clone()))
            }

            Expr::Binary {
                op: op @ (BinaryOp::AndAlso | BinaryOp::OrElse),
                left,
                right,
                ..
            } => {
                require_bool(*op, left)?;
                require_bool(*op, right)?;
                let (left, right) = (at(0), at(1));
                match op {
                    BinaryOp::AndAlso => NodeKind::AndAlso { left, right },
                    _ => NodeKind::OrElse { left, right },
                }
            }

            Expr::Binary {
                op: BinaryOp::Coalesce,
                conversion,
                ..
            } => {
                if conversion.is_some() {
                    return Err(ConstructionError::CoalesceConversion);
                }
                NodeKind::Coalesce {
                    left: at(0),
                    right: at(1),
                }
            }

            Expr::Binary {
                op,
                left,
                right,
                ty,
                ..
            } => {
                let lifted = left.ty().is_lifted() || right.ty().is_lifted();
                let operator = self.operators.resolve_binary(
                    *op,
                    ty.underlying(),
                    left.ty().underlying(),
                    right.ty().underlying(),
                )?;
                NodeKind::Binary {
                    op: *op,
                    left: at(0),
                    right: at(1),
                    operator,
                    lifted,
                }
            }

            Expr::Unary { op, operand, ty } => {
                let lifted = operand.ty().is_lifted();
                // conversions name their full target; other operators are
                // looked up on the unlifted type
                let result = match op {
                    UnaryOp::Convert(_) | UnaryOp::ConvertChecked(_) => ty,
                    _ => ty.underlying(),
                };
                let operator = self
                    .operators
                    .resolve_unary(op, result, operand.ty().underlying())?;
                NodeKind::Unary {
                    operand: at(0),
                    operator,
                    lifted,
                }
            }

            Expr::Conditional { .. } => NodeKind::Conditional {
                test: at(0),
                if_true: at(1),
                if_false: at(2),
            },

            Expr::Member { object, member, .. } => {
                if object.is_none() && !member.is_static {
                    return Err(ConstructionError::MissingReceiver(member.name.clone()));
                }
                NodeKind::Member {
                    object: object.as_ref().map(|_| at(0)),
                    member: member.clone(),
                    getter: self.invoker.resolve_member(member)?,
                }
            }

            Expr::Index { object, args, .. } => {
                let arg_types: Vec<Type> = args.iter().map(|a| a.ty().clone()).collect();
                let literal = match args.as_slice() {
                    [arg] => match arg.as_ref() {
                        Expr::Constant { value, .. } => Some(value.clone()),
                        _ => None,
                    },
                    _ => None,
                };
                NodeKind::Index {
                    object: at(0),
                    args: operands[1..].to_vec(),
                    indexer: self.invoker.resolve_indexer(object.ty(), &arg_types)?,
                    literal,
                }
            }

            Expr::Call { object, method, .. } => {
                if object.is_none() && !method.is_static {
                    return Err(ConstructionError::MissingReceiver(method.name.clone()));
                }
                let skip = usize::from(object.is_some());
                NodeKind::Call {
                    object: object.as_ref().map(|_| at(0)),
                    args: operands[skip..].to_vec(),
                    invoke: self.invoker.resolve_method(method)?,
                }
            }

            Expr::New { constructor, .. } => NodeKind::New {
                args: operands.to_vec(),
                invoke: self.invoker.resolve_constructor(constructor)?,
            },
        };

        let disposal = match expr {
            Expr::New { constructor, .. } => Disposal::Constructed(constructor.clone()),
            Expr::Call { method, .. } => Disposal::Returned(method.clone()),
            Expr::Member { member, .. } => Disposal::for_member(member),
            _ => Disposal::Never,
        };
        Ok((kind, disposal))
    }

    /// Drop one reference to `id`; at zero tear the node down and release
    /// its operands. Shared operands are visited once per reference through
    /// an explicit worklist. Disposal failures do not stop the teardown; the
    /// first one is returned once it has completed.
    pub(crate) fn release(self: &Arc<Self>, id: NodeId) -> Result<bool, Error> {
        let _serial = self.wave.lock();
        if self.node(id).is_none() {
            return Err(Error::UnknownNode(id));
        }

        let mut failures: Vec<DisposalError> = vec![];
        let mut removed = false;
        let mut work = vec![id];

        while let Some(current) = work.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            {
                let mut table = self.tables[node.tag.slot()].lock();
                if self.arena.write().release(current) != Some(0) {
                    continue;
                }
                table.remove(&node.key);
                self.arena.write().remove(current);
            }
            removed |= current == id;

            let outcome = node.teardown();
            for operand in node.distinct_operands() {
                if let Some(o) = self.node(operand) {
                    o.remove_dependent(current);
                }
            }
            if let Outcome::Value(value) = &outcome {
                if let Err(e) = node.disposal.release(&node.options, value, None) {
                    tracing::warn!(node = %current, error = %e, cause = %e.source, "disposal failed during release");
                    failures.push(e);
                }
            }
            tracing::debug!(node = %current, kind = ?node.tag, "node released");
            work.extend(node.operands().iter().copied());
        }

        match failures.into_iter().next() {
            Some(e) => Err(e.into()),
            None => Ok(removed),
        }
    }
}
