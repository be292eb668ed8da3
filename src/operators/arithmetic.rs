// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::BinaryOp;
use crate::number::Number;
use crate::operators::utils::{ensure_bool, ensure_int, ensure_numeric, ensure_string};
use crate::operators::OperatorRegistry;
use crate::types::Type;
use crate::value::Value;

use anyhow::Result;

pub fn register(r: &OperatorRegistry) {
    for t in [Type::Int, Type::Float] {
        r.define_binary(BinaryOp::Add, t.clone(), t.clone(), t.clone(), add);
        r.define_binary(BinaryOp::AddChecked, t.clone(), t.clone(), t.clone(), add_checked);
        r.define_binary(BinaryOp::Sub, t.clone(), t.clone(), t.clone(), sub);
        r.define_binary(BinaryOp::SubChecked, t.clone(), t.clone(), t.clone(), sub_checked);
        r.define_binary(BinaryOp::Mul, t.clone(), t.clone(), t.clone(), mul);
        r.define_binary(BinaryOp::MulChecked, t.clone(), t.clone(), t.clone(), mul_checked);
        r.define_binary(BinaryOp::Div, t.clone(), t.clone(), t.clone(), div);
        r.define_binary(BinaryOp::Rem, t.clone(), t.clone(), t, rem);
    }
    r.define_binary(BinaryOp::Add, Type::String, Type::String, Type::String, concat);

    r.define_binary(BinaryOp::BitAnd, Type::Int, Type::Int, Type::Int, bit_and);
    r.define_binary(BinaryOp::BitOr, Type::Int, Type::Int, Type::Int, bit_or);
    r.define_binary(BinaryOp::BitXor, Type::Int, Type::Int, Type::Int, bit_xor);
    r.define_binary(BinaryOp::Shl, Type::Int, Type::Int, Type::Int, shl);
    r.define_binary(BinaryOp::Shr, Type::Int, Type::Int, Type::Int, shr);

    // non short-circuiting logical operators
    r.define_binary(BinaryOp::BitAnd, Type::Bool, Type::Bool, Type::Bool, and);
    r.define_binary(BinaryOp::BitOr, Type::Bool, Type::Bool, Type::Bool, or);
    r.define_binary(BinaryOp::BitXor, Type::Bool, Type::Bool, Type::Bool, xor);

    // late bound
    r.define_binary(BinaryOp::Add, Type::Any, Type::Any, Type::Any, add_dynamic);
    r.define_binary(BinaryOp::Sub, Type::Any, Type::Any, Type::Any, sub);
    r.define_binary(BinaryOp::Mul, Type::Any, Type::Any, Type::Any, mul);
    r.define_binary(BinaryOp::Div, Type::Any, Type::Any, Type::Any, div);
    r.define_binary(BinaryOp::Rem, Type::Any, Type::Any, Type::Any, rem);
}

fn numbers(a: &Value, b: &Value) -> Result<(Number, Number)> {
    Ok((ensure_numeric(a)?, ensure_numeric(b)?))
}

fn add(a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = numbers(a, b)?;
    Ok(Value::from(a.add(&b)))
}

fn add_checked(a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = numbers(a, b)?;
    Ok(Value::from(a.checked_add(&b)?))
}

fn sub(a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = numbers(a, b)?;
    Ok(Value::from(a.sub(&b)))
}

fn sub_checked(a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = numbers(a, b)?;
    Ok(Value::from(a.checked_sub(&b)?))
}

fn mul(a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = numbers(a, b)?;
    Ok(Value::from(a.mul(&b)))
}

fn mul_checked(a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = numbers(a, b)?;
    Ok(Value::from(a.checked_mul(&b)?))
}

fn div(a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = numbers(a, b)?;
    Ok(Value::from(a.divide(&b)?))
}

fn rem(a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = numbers(a, b)?;
    Ok(Value::from(a.modulo(&b)?))
}

fn concat(a: &Value, b: &Value) -> Result<Value> {
    // null concatenates as the empty string
    let a = if a.is_null() { "".into() } else { ensure_string(a)? };
    let b = if b.is_null() { "".into() } else { ensure_string(b)? };
    Ok(Value::from(format!("{a}{b}")))
}

fn add_dynamic(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::String(_), _) | (_, Value::String(_)) => concat(a, b),
        _ => add(a, b),
    }
}

fn bit_and(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ensure_int(a)? & ensure_int(b)?))
}

fn bit_or(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ensure_int(a)? | ensure_int(b)?))
}

fn bit_xor(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ensure_int(a)? ^ ensure_int(b)?))
}

// Shift counts use their low six bits.
fn shift_count(v: &Value) -> Result<u32> {
    Ok(u32::try_from(ensure_int(v)? & 63)?)
}

fn shl(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ensure_int(a)?.wrapping_shl(shift_count(b)?)))
}

fn shr(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ensure_int(a)?.wrapping_shr(shift_count(b)?)))
}

fn and(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ensure_bool(a)? & ensure_bool(b)?))
}

fn or(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ensure_bool(a)? | ensure_bool(b)?))
}

fn xor(a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::from(ensure_bool(a)? ^ ensure_bool(b)?))
}
