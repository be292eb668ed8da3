// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::BinaryOp;
use crate::number::Number;
use crate::operators::utils::{ensure_numeric, ensure_string};
use crate::operators::OperatorRegistry;
use crate::types::Type;
use crate::value::Value;

use core::cmp::Ordering;

use anyhow::Result;

pub fn register(r: &OperatorRegistry) {
    for t in [Type::Bool, Type::Int, Type::Float, Type::String, Type::Any] {
        r.define_binary(BinaryOp::Eq, t.clone(), t.clone(), Type::Bool, eq);
        r.define_binary(BinaryOp::Ne, t.clone(), t, Type::Bool, ne);
    }
    for t in [Type::Int, Type::Float, Type::String, Type::Any] {
        r.define_binary(BinaryOp::Lt, t.clone(), t.clone(), Type::Bool, lt);
        r.define_binary(BinaryOp::Le, t.clone(), t.clone(), Type::Bool, le);
        r.define_binary(BinaryOp::Gt, t.clone(), t.clone(), Type::Bool, gt);
        r.define_binary(BinaryOp::Ge, t.clone(), t, Type::Bool, ge);
    }
}

fn as_f64(n: Number) -> f64 {
    n.as_f64()
}

// Floats compare by IEEE rules, so NaN is unordered and unequal to itself.
fn ordering(a: &Value, b: &Value) -> Result<Option<Ordering>> {
    match (a, b) {
        (Value::Number(Number::Int(x)), Value::Number(Number::Int(y))) => Ok(Some(x.cmp(y))),
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Some(ensure_string(a)?.cmp(&ensure_string(b)?)))
        }
        _ => {
            let (x, y) = (as_f64(ensure_numeric(a)?), as_f64(ensure_numeric(b)?));
            Ok(x.partial_cmp(&y))
        }
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if !(x.is_integer() && y.is_integer()) => {
            as_f64(*x) == as_f64(*y)
        }
        _ => a == b,
    }
}

fn eq(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(equals(a, b)))
}

fn ne(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(!equals(a, b)))
}

fn lt(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ordering(a, b)? == Some(Ordering::Less)))
}

fn le(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(matches!(
        ordering(a, b)?,
        Some(Ordering::Less | Ordering::Equal)
    )))
}

fn gt(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ordering(a, b)? == Some(Ordering::Greater)))
}

fn ge(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(matches!(
        ordering(a, b)?,
        Some(Ordering::Greater | Ordering::Equal)
    )))
}
