// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{Node, NodeKind, Outcome};
use crate::ast::{BinaryOp, MemberKind};
use crate::error::EvalError;
use crate::graph::{NodeId, SessionInner};
use crate::node::Fault;
use crate::types::Type;
use crate::value::Value;

use std::sync::Arc;

fn to_bool(v: &Value) -> Result<bool, Fault> {
    match v {
        Value::Bool(b) => Ok(*b),
        v => Err(Fault::new(
            EvalError::TypeMismatch {
                expected: Type::Bool,
                found: v.type_of(),
            }
            .into(),
        )),
    }
}

// Lifted operators never run on null operands.
fn lifted_null(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(l.is_null() && r.is_null()),
        BinaryOp::Ne => Value::Bool(l.is_null() != r.is_null()),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Value::Bool(false),
        _ => Value::Null,
    }
}

fn values(g: &SessionInner, ids: &[NodeId]) -> Result<Vec<Value>, Fault> {
    ids.iter().map(|id| g.value_of(*id)).collect()
}

impl Node {
    /// Compute a fresh outcome from the operands' current outcomes. Errors
    /// raised by operators and host code become faults.
    pub fn evaluate(&self, g: &Arc<SessionInner>) -> Outcome {
        Outcome::from(self.compute(g))
    }

    fn compute(&self, g: &Arc<SessionInner>) -> Result<Value, Fault> {
        match &self.kind {
            NodeKind::Constant(v) => Ok(v.clone()),

            NodeKind::Binary {
                op,
                left,
                right,
                operator,
                lifted,
            } => {
                let l = g.value_of(*left)?;
                let r = g.value_of(*right)?;
                if *lifted && (l.is_null() || r.is_null()) {
                    return Ok(lifted_null(*op, &l, &r));
                }
                (operator.invoke)(&l, &r).map_err(Fault::new)
            }

            NodeKind::AndAlso { left, right } => match to_bool(&g.value_of(*left)?)? {
                false => Ok(Value::Bool(false)),
                true => Ok(Value::Bool(to_bool(&g.value_of(*right)?)?)),
            },

            NodeKind::OrElse { left, right } => match to_bool(&g.value_of(*left)?)? {
                true => Ok(Value::Bool(true)),
                false => Ok(Value::Bool(to_bool(&g.value_of(*right)?)?)),
            },

            NodeKind::Coalesce { left, right } => match g.value_of(*left)? {
                Value::Null => g.value_of(*right),
                v => Ok(v),
            },

            NodeKind::Conditional {
                test,
                if_true,
                if_false,
            } => match to_bool(&g.value_of(*test)?)? {
                true => g.value_of(*if_true),
                false => g.value_of(*if_false),
            },

            NodeKind::Member {
                object,
                member,
                getter,
            } => {
                let object = match object {
                    Some(o) => {
                        let outcome = g.outcome_of(*o);
                        if member.kind == MemberKind::Property {
                            // subscribe before reading so no change slips in between
                            self.watch(g, outcome.value());
                        }
                        Some(g.value_of(*o)?)
                    }
                    None => None,
                };
                getter(object.as_ref()).map_err(Fault::new)
            }

            NodeKind::Index {
                object,
                args,
                indexer,
                ..
            } => {
                self.watch(g, g.outcome_of(*object).value());
                let object = g.value_of(*object)?;
                let args = values(g, args)?;
                indexer(&object, &args).map_err(Fault::new)
            }

            NodeKind::Call {
                object,
                args,
                invoke,
                ..
            } => {
                let object = match object {
                    Some(o) => Some(g.value_of(*o)?),
                    None => None,
                };
                let args = values(g, args)?;
                invoke(object.as_ref(), &args).map_err(Fault::new)
            }

            NodeKind::New { args, invoke } => {
                let args = values(g, args)?;
                invoke(&args).map_err(Fault::new)
            }

            NodeKind::Unary {
                operand,
                operator,
                lifted,
            } => {
                let v = g.value_of(*operand)?;
                match v {
                    Value::Null if *lifted && self.ty.is_nullable() => Ok(Value::Null),
                    Value::Null if *lifted => Err(Fault::new(
                        EvalError::NullReference("Value".into()).into(),
                    )),
                    v => (operator.invoke)(&v).map_err(Fault::new),
                }
            }
        }
    }
}
