// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Operator table.
//!
//! Operators are resolved once, when a node is built, from the operation
//! and the static operand types. Nullable lifting is applied by the node on
//! top of the resolved operator, so only non-nullable signatures are
//! registered here.

mod arithmetic;
mod comparison;
mod conversions;
mod utils;

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::ConstructionError;
use crate::registry::{Registry, RegistryError};
use crate::types::Type;
use crate::value::Value;

use core::fmt;
use std::sync::Arc;

use anyhow::Result;
use lazy_static::lazy_static;

pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;
pub type UnaryFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub struct BinaryOperator {
    pub result: Type,
    pub invoke: BinaryFn,
}

#[derive(Clone)]
pub struct UnaryOperator {
    pub result: Type,
    pub invoke: UnaryFn,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryKey {
    pub op: BinaryOp,
    pub left: Type,
    pub right: Type,
}

impl fmt::Display for BinaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.op, self.left, self.right)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnaryKey {
    pub op: UnaryOp,
    pub operand: Type,
}

impl fmt::Display for UnaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.op, self.operand)
    }
}

/// Maps `(operation, operand types)` to an implementation and its result
/// type.
pub struct OperatorRegistry {
    binary: Registry<BinaryKey, BinaryOperator>,
    unary: Registry<UnaryKey, UnaryOperator>,
}

lazy_static! {
    static ref DEFAULT_OPERATORS: Arc<OperatorRegistry> = Arc::new(OperatorRegistry::with_defaults());
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl OperatorRegistry {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            binary: Registry::new("BINARY_OPERATORS"),
            unary: Registry::new("UNARY_OPERATORS"),
        }
    }

    /// A table holding the built-in operators for bool, int, float and
    /// string, plus dynamic operators over `any`.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        arithmetic::register(&registry);
        comparison::register(&registry);
        conversions::register(&registry);
        registry
    }

    /// Process-wide read-only instance of [`OperatorRegistry::with_defaults`].
    pub fn shared_default() -> Arc<Self> {
        DEFAULT_OPERATORS.clone()
    }

    pub fn register_binary<F>(
        &self,
        op: BinaryOp,
        left: Type,
        right: Type,
        result: Type,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.binary.register(
            BinaryKey { op, left, right },
            BinaryOperator {
                result,
                invoke: Arc::new(f),
            },
        )
    }

    pub fn register_unary<F>(
        &self,
        op: UnaryOp,
        operand: Type,
        result: Type,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.unary.register(
            UnaryKey { op, operand },
            UnaryOperator {
                result,
                invoke: Arc::new(f),
            },
        )
    }

    // Entries of the default table never collide; a duplicate is a table bug.
    fn define_binary(
        &self,
        op: BinaryOp,
        left: Type,
        right: Type,
        result: Type,
        f: fn(&Value, &Value) -> Result<Value>,
    ) {
        if let Err(e) = self.register_binary(op, left, right, result, f) {
            tracing::warn!(error = %e, "duplicate built-in operator");
        }
    }

    fn define_unary(&self, op: UnaryOp, operand: Type, result: Type, f: fn(&Value) -> Result<Value>) {
        if let Err(e) = self.register_unary(op, operand, result, f) {
            tracing::warn!(error = %e, "duplicate built-in operator");
        }
    }

    pub fn binary_len(&self) -> usize {
        self.binary.len()
    }

    pub fn unary_len(&self) -> usize {
        self.unary.len()
    }

    /// Resolve `op` for the given (non-nullable) operand types. Exact
    /// signatures win; the dynamic `(any, any)` entry only serves operands
    /// typed `any`.
    pub fn resolve_binary(
        &self,
        op: BinaryOp,
        result: &Type,
        left: &Type,
        right: &Type,
    ) -> Result<BinaryOperator, ConstructionError> {
        let exact = BinaryKey {
            op,
            left: left.clone(),
            right: right.clone(),
        };
        let dynamic = BinaryKey {
            op,
            left: Type::Any,
            right: Type::Any,
        };
        let found = self.binary.get(&exact).or_else(|| {
            if *left == Type::Any || *right == Type::Any {
                self.binary.get(&dynamic)
            } else {
                None
            }
        });

        match found {
            Some(operator) if result_fits(result, &operator.result) => Ok(operator),
            _ => Err(ConstructionError::UnsupportedBinary {
                op,
                result: result.clone(),
                left: left.clone(),
                right: right.clone(),
            }),
        }
    }

    pub fn resolve_unary(
        &self,
        op: &UnaryOp,
        result: &Type,
        operand: &Type,
    ) -> Result<UnaryOperator, ConstructionError> {
        let exact = UnaryKey {
            op: op.clone(),
            operand: operand.clone(),
        };
        let found = self.unary.get(&exact).or_else(|| match op {
            UnaryOp::Convert(target) => conversions::resolve(self, false, target, operand),
            UnaryOp::ConvertChecked(target) => conversions::resolve(self, true, target, operand),
            _ if *operand == Type::Any => self.unary.get(&UnaryKey {
                op: op.clone(),
                operand: Type::Any,
            }),
            _ => None,
        });

        match found {
            Some(operator) if result_fits(result, &operator.result) => Ok(operator),
            _ => Err(ConstructionError::UnsupportedUnary {
                op: op.clone(),
                result: result.clone(),
                operand: operand.clone(),
            }),
        }
    }
}

// A node typed `any` accepts every operator result; a dynamic operator's
// `any` result is checked at run time by whoever consumes it.
fn result_fits(requested: &Type, provided: &Type) -> bool {
    requested == provided || *requested == Type::Any || *provided == Type::Any
}
