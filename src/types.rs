// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::number::Number;
use crate::value::Value;

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Static result type of an expression.
///
/// `Host` names a host object type. `Nullable` wraps a value type so that
/// operators and conversions over it are lifted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Any,
    Bool,
    Int,
    Float,
    String,
    Array,
    Object,
    Host(Arc<str>),
    Nullable(Box<Type>),
}

impl Type {
    pub fn host(name: &str) -> Type {
        Type::Host(name.into())
    }

    pub fn nullable(inner: Type) -> Type {
        match inner {
            Type::Nullable(_) => inner,
            t if t.is_reference() => t,
            t => Type::Nullable(Box::new(t)),
        }
    }

    /// Types whose values may be `null` without a `Nullable` wrapper.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Any | Type::String | Type::Array | Type::Object | Type::Host(_)
        )
    }

    pub fn is_nullable(&self) -> bool {
        self.is_reference() || matches!(self, Type::Nullable(_))
    }

    pub fn is_lifted(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// The type with one level of `Nullable` removed.
    pub fn underlying(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            t => t,
        }
    }

    /// Value held by a node of this type while it is faulted.
    pub fn default_value(&self) -> Value {
        match self {
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Number(Number::Int(0)),
            Type::Float => Value::Number(Number::Float(0.0)),
            _ => Value::Null,
        }
    }

    /// Whether `value` is an acceptable runtime inhabitant of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Any, _) => true,
            (Type::Nullable(inner), v) => v.is_null() || inner.accepts(v),
            (t, Value::Null) => t.is_reference(),
            (Type::Bool, Value::Bool(_)) => true,
            (Type::Int, Value::Number(Number::Int(_))) => true,
            (Type::Float, Value::Number(Number::Float(_))) => true,
            (Type::String, Value::String(_)) => true,
            (Type::Array, Value::Array(_)) => true,
            (Type::Object, Value::Object(_)) => true,
            (Type::Host(name), Value::Host(h)) => name.as_ref() == h.type_name(),
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("any"),
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::String => f.write_str("string"),
            Type::Array => f.write_str("array"),
            Type::Object => f.write_str("object"),
            Type::Host(name) => f.write_str(name),
            Type::Nullable(inner) => write!(f, "{inner}?"),
        }
    }
}
