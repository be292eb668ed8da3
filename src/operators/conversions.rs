// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::UnaryOp;
use crate::error::EvalError;
use crate::operators::utils::{ensure_bool, ensure_int, ensure_numeric};
use crate::operators::{OperatorRegistry, UnaryKey, UnaryOperator};
use crate::types::Type;
use crate::value::Value;

use std::sync::Arc;

use anyhow::Result;

pub fn register(r: &OperatorRegistry) {
    for t in [Type::Int, Type::Float, Type::Any] {
        r.define_unary(UnaryOp::Neg, t.clone(), t.clone(), neg);
        r.define_unary(UnaryOp::NegChecked, t.clone(), t.clone(), neg_checked);
        r.define_unary(UnaryOp::Plus, t.clone(), t, plus);
    }
    r.define_unary(UnaryOp::Not, Type::Bool, Type::Bool, not);
    r.define_unary(UnaryOp::OnesComplement, Type::Int, Type::Int, ones_complement);

    r.define_unary(UnaryOp::Convert(Type::Float), Type::Int, Type::Float, to_float);
    r.define_unary(UnaryOp::ConvertChecked(Type::Float), Type::Int, Type::Float, to_float);
    r.define_unary(UnaryOp::Convert(Type::Int), Type::Float, Type::Int, to_int);
    r.define_unary(UnaryOp::ConvertChecked(Type::Int), Type::Float, Type::Int, to_int_checked);
}

fn neg(v: &Value) -> Result<Value> {
    Ok(Value::from(ensure_numeric(v)?.neg()))
}

fn neg_checked(v: &Value) -> Result<Value> {
    Ok(Value::from(ensure_numeric(v)?.checked_neg()?))
}

fn plus(v: &Value) -> Result<Value> {
    Ok(Value::from(ensure_numeric(v)?))
}

fn not(v: &Value) -> Result<Value> {
    Ok(Value::from(!ensure_bool(v)?))
}

fn ones_complement(v: &Value) -> Result<Value> {
    Ok(Value::from(!ensure_int(v)?))
}

fn to_float(v: &Value) -> Result<Value> {
    Ok(Value::from(ensure_numeric(v)?.to_float()))
}

fn to_int(v: &Value) -> Result<Value> {
    Ok(Value::from(ensure_numeric(v)?.to_int(false)?))
}

fn to_int_checked(v: &Value) -> Result<Value> {
    Ok(Value::from(ensure_numeric(v)?.to_int(true)?))
}

fn operator(result: Type, f: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static) -> UnaryOperator {
    UnaryOperator {
        result,
        invoke: Arc::new(f),
    }
}

/// Conversions that are not looked up by exact signature: identity, boxing
/// to `any`, checked unboxing from `any` and wrapping into a nullable type.
pub fn resolve(
    r: &OperatorRegistry,
    checked: bool,
    target: &Type,
    operand: &Type,
) -> Option<UnaryOperator> {
    if target == operand || *target == Type::Any {
        return Some(operator(target.clone(), |v| Ok(v.clone())));
    }

    if *operand == Type::Any {
        let expected = target.clone();
        return Some(operator(target.clone(), move |v| {
            if expected.accepts(v) {
                Ok(v.clone())
            } else {
                Err(EvalError::InvalidCast {
                    value: v.clone(),
                    target: expected.clone(),
                }
                .into())
            }
        }));
    }

    if let Type::Nullable(inner) = target {
        let op = match checked {
            true => UnaryOp::ConvertChecked(inner.as_ref().clone()),
            false => UnaryOp::Convert(inner.as_ref().clone()),
        };
        let step = r
            .unary
            .get(&UnaryKey {
                op,
                operand: operand.clone(),
            })
            .or_else(|| resolve(r, checked, inner, operand))?;
        return Some(operator(target.clone(), move |v| match v {
            Value::Null => Ok(Value::Null),
            v => (step.invoke)(v),
        }));
    }

    None
}
