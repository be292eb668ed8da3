// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed handles on the root of a live graph.

use crate::ast::{Lambda, Token};
use crate::error::Error;
use crate::graph::{NodeId, Session};
use crate::node::{Fault, Outcome};
use crate::notify::Subscription;
use crate::number::Number;
use crate::options::Options;
use crate::types::Type;
use crate::value::{HostRef, Value};

use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

/// Conversion from a runtime value to the type an expression is read as.
///
/// A value of the wrong runtime type reads as `Self::default()`.
pub trait FromValue: Default + Send + Sync + 'static {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool().ok().copied()
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().ok()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(Number::Float(f)) => Some(*f),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_string().ok().map(|s| s.to_string())
    }
}

impl FromValue for Arc<str> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_string().ok().cloned()
    }
}

impl FromValue for Option<HostRef> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            Value::Host(h) => Some(Some(h.clone())),
            _ => None,
        }
    }
}

impl FromValue for Option<i64> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => v.as_i64().ok().map(Some),
        }
    }
}

impl FromValue for Option<f64> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => f64::from_value(v).map(Some),
        }
    }
}

impl FromValue for Option<bool> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => bool::from_value(v).map(Some),
        }
    }
}

/// Interning key of an activation. Options are compared by identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ExpressionKey {
    shape: Vec<Token>,
    args: Vec<Value>,
    options: usize,
}

/// Payload of [`ActiveExpression::subscribe`].
#[derive(Debug, Clone)]
pub struct Update<T> {
    pub value: T,
    pub fault: Option<Fault>,
}

/// A lambda bound to arguments and kept live in a [`Session`].
///
/// Activations of structurally equal lambdas with equal arguments and the
/// same options instance share one root node. Dropping the handle releases it.
pub struct ActiveExpression<T: FromValue = Value> {
    session: Session,
    key: ExpressionKey,
    text: String,
    root: NodeId,
    ty: Type,
    arguments: Vec<Value>,
    released: bool,
    _marker: PhantomData<fn() -> T>,
}

fn read<T: FromValue>(outcome: &Outcome) -> T {
    match outcome {
        Outcome::Value(v) => T::from_value(v).unwrap_or_default(),
        Outcome::Fault(_) => T::default(),
    }
}

impl Session {
    /// Activate `lambda` over `args` with the session's options.
    pub fn activate<T: FromValue>(
        &self,
        lambda: &Lambda,
        args: Vec<Value>,
    ) -> Result<ActiveExpression<T>, Error> {
        let options = self.options().clone();
        self.activate_with(lambda, args, &options)
    }

    /// Activate `lambda` over `args`. The options are frozen.
    pub fn activate_with<T: FromValue>(
        &self,
        lambda: &Lambda,
        args: Vec<Value>,
        options: &Arc<Options>,
    ) -> Result<ActiveExpression<T>, Error> {
        options.freeze();
        let text = lambda.to_string();
        let key = ExpressionKey {
            shape: lambda.tokens(),
            args: args.clone(),
            options: Arc::as_ptr(options) as usize,
        };

        let existing = self.inner.expressions.lock().get_mut(&key).map(|entry| {
            entry.1 += 1;
            entry.0
        });

        let root = match existing {
            Some(root) => root,
            None => {
                let body = lambda.bind(&args)?;
                let root = self.create(&body, options)?;
                let mut expressions = self.inner.expressions.lock();
                let entry = expressions.entry(key.clone()).or_insert((root, 0));
                entry.1 += 1;
                if entry.1 > 1 {
                    // activated concurrently; interning handed out the same root
                    drop(expressions);
                    self.release(root)?;
                }
                tracing::debug!(node = %root, expr = %text, "expression activated");
                root
            }
        };

        Ok(ActiveExpression {
            session: self.clone(),
            key,
            text,
            root,
            ty: lambda.body.ty().clone(),
            arguments: args,
            released: false,
            _marker: PhantomData,
        })
    }
}

impl<T: FromValue> ActiveExpression<T> {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn outcome(&self) -> Outcome {
        self.session
            .outcome(self.root)
            .unwrap_or_else(|| Outcome::Value(self.ty.default_value()))
    }

    pub fn value(&self) -> T {
        read(&self.outcome())
    }

    pub fn fault(&self) -> Option<Fault> {
        self.outcome().fault().cloned()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Update<T>) + Send + Sync + 'static,
    {
        self.session
            .subscribe(self.root, move |outcome| {
                handler(&Update {
                    value: read(outcome),
                    fault: outcome.fault().cloned(),
                })
            })
            .unwrap_or_else(Subscription::empty)
    }

    /// Release this handle. Returns `true` when it was the last handle on the
    /// root and the root node was torn down.
    pub fn dispose(mut self) -> Result<bool, Error> {
        self.release()
    }

    fn release(&mut self) -> Result<bool, Error> {
        if self.released {
            return Ok(false);
        }
        self.released = true;

        let last = {
            let mut expressions = self.session.inner.expressions.lock();
            match expressions.get_mut(&self.key) {
                Some(entry) if entry.1 > 1 => {
                    entry.1 -= 1;
                    false
                }
                Some(_) => {
                    expressions.remove(&self.key);
                    true
                }
                None => false,
            }
        };
        if !last {
            return Ok(false);
        }
        tracing::debug!(node = %self.root, expr = %self.text, "expression released");
        self.session.release(self.root)
    }
}

impl<T: FromValue> Drop for ActiveExpression<T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(node = %self.root, error = %e, "failed to release expression");
        }
    }
}

impl<T: FromValue> fmt::Debug for ActiveExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveExpression")
            .field("expression", &self.text)
            .field("root", &self.root)
            .field("outcome", &self.outcome())
            .finish()
    }
}
