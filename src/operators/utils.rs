// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::EvalError;
use crate::number::Number;
use crate::types::Type;
use crate::value::Value;

use std::sync::Arc;

use anyhow::Result;

fn mismatch(expected: Type, v: &Value) -> anyhow::Error {
    EvalError::TypeMismatch {
        expected,
        found: v.type_of(),
    }
    .into()
}

pub fn ensure_numeric(v: &Value) -> Result<Number> {
    match v {
        Value::Number(n) => Ok(*n),
        _ => Err(mismatch(Type::Float, v)),
    }
}

pub fn ensure_int(v: &Value) -> Result<i64> {
    match v {
        Value::Number(Number::Int(n)) => Ok(*n),
        _ => Err(mismatch(Type::Int, v)),
    }
}

pub fn ensure_bool(v: &Value) -> Result<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        _ => Err(mismatch(Type::Bool, v)),
    }
}

pub fn ensure_string(v: &Value) -> Result<Arc<str>> {
    match v {
        Value::String(s) => Ok(s.clone()),
        _ => Err(mismatch(Type::String, v)),
    }
}
