// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{BinaryOp, ConstructorDescriptor, MemberDescriptor, MethodDescriptor, UnaryOp};
use crate::graph::NodeId;
use crate::registry::RegistryError;
use crate::types::Type;
use crate::value::Value;

use std::sync::Arc;

use thiserror::Error;

/// Raised while building a node; the node is not created.
#[derive(Debug, Clone, Error)]
pub enum ConstructionError {
    #[error("operator `{op}` is not defined for ({left}, {right}) -> {result}")]
    UnsupportedBinary {
        op: BinaryOp,
        result: Type,
        left: Type,
        right: Type,
    },
    #[error("operator `{op}` is not defined for ({operand}) -> {result}")]
    UnsupportedUnary {
        op: UnaryOp,
        result: Type,
        operand: Type,
    },
    #[error("coalesce with a conversion is not supported")]
    CoalesceConversion,
    #[error("`{op}` requires boolean operands but found {found}")]
    NonBooleanOperand { op: BinaryOp, found: Type },
    #[error("member `{0}` could not be resolved")]
    MemberNotFound(MemberDescriptor),
    #[error("method `{0}` could not be resolved")]
    MethodNotFound(MethodDescriptor),
    #[error("constructor `{0}` could not be resolved")]
    ConstructorNotFound(ConstructorDescriptor),
    #[error("no indexer on `{object}` accepts ({args})")]
    IndexerNotFound { object: Type, args: String },
    #[error("instance member `{0}` requires an object")]
    MissingReceiver(Arc<str>),
    #[error("parameter `{0}` is not bound")]
    UnboundParameter(Arc<str>),
    #[error("expected {expected} argument(s) but {actual} were supplied")]
    ArgumentCount { expected: usize, actual: usize },
}

/// Causes of faults produced by the engine itself. Faults raised by host
/// code carry whatever error the host returned.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("the given key `{0}` was not present in the dictionary")]
    KeyNotFound(Value),
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("cannot access `{0}` on null")]
    NullReference(Arc<str>),
    #[error("arithmetic operation resulted in an overflow")]
    Overflow,
    #[error("attempted to divide by zero")]
    DivideByZero,
    #[error("cannot convert {value} to {target}")]
    InvalidCast { value: Value, target: Type },
    #[error("expected {expected} but found {found}")]
    TypeMismatch { expected: Type, found: Type },
}

/// A configured disposal action failed. The state change that released the
/// value stays committed.
#[derive(Debug, Error)]
#[error("disposing {value} failed")]
pub struct DisposalError {
    pub value: Value,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Clone, Error)]
pub enum OptionsError {
    #[error("options cannot be modified after they have been used")]
    Frozen,
    #[error("invalid options: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error(transparent)]
    Disposal(#[from] DisposalError),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("node {0} is not live")]
    UnknownNode(NodeId),
}

impl From<serde_json::Error> for OptionsError {
    fn from(error: serde_json::Error) -> Self {
        OptionsError::Parse(format!("{}", error))
    }
}

#[cfg(feature = "yaml")]
impl From<serde_yaml::Error> for OptionsError {
    fn from(error: serde_yaml::Error) -> Self {
        OptionsError::Parse(format!("{}", error))
    }
}
