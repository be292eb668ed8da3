// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Live expression graphs.
//!
//! An expression tree bound to input values is turned into a graph of
//! interned nodes. When a host object observed by the graph reports a
//! mutation, only the affected nodes recompute and the change flows to the
//! root. Errors raised while computing a node are captured as a [`Fault`]
//! on that node instead of unwinding through the graph.

mod ast;
mod disposal;
mod error;
mod expression;
mod graph;
mod invoker;
mod node;
mod notify;
mod number;
mod observable;
mod operators;
mod options;
mod registry;
mod types;
mod value;

pub use ast::{
    BinaryOp, ConstructorDescriptor, Expr, ExprRef, Lambda, MemberDescriptor, MemberKind,
    MethodDescriptor, NodeRef, Parameter, Ref, UnaryOp,
};
pub use error::{ConstructionError, DisposalError, Error, EvalError, OptionsError};
pub use expression::{ActiveExpression, FromValue, Update};
pub use graph::{NodeId, Session, SessionBuilder};
pub use invoker::{Constructor, Getter, Indexer, Invoker, Method};
pub use node::{Fault, Outcome};
pub use notify::{
    CollectionAction, CollectionChanged, DictionaryChanged, Event, Handler,
    NotifyCollectionChanged, NotifyDictionaryChanged, NotifyPropertyChanged, PropertyChanged,
    Subscription,
};
pub use number::Number;
pub use observable::{ObservableList, ObservableMap, ObservableObject};
pub use operators::{BinaryFn, BinaryOperator, OperatorRegistry, UnaryFn, UnaryOperator};
pub use options::Options;
pub use registry::{Registry, RegistryError};
pub use types::Type;
pub use value::{HostObject, HostRef, Value};
