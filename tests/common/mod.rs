// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use liveexpr::*;
use parking_lot::Mutex;

/// Routes engine traces to the test output; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn pair(a: i64, b: i64) -> Arc<ObservableObject> {
    Arc::new(ObservableObject::new("Pair").with("a", a).with("b", b))
}

pub fn constant_of(p: &Arc<ObservableObject>) -> ExprRef {
    let ty = Type::host(p.type_name());
    Expr::constant(Value::host(p.clone()), ty)
}

pub fn prop(p: &Arc<ObservableObject>, name: &str, ty: Type) -> ExprRef {
    Expr::property(constant_of(p), name, ty)
}

pub fn int_prop(p: &Arc<ObservableObject>, name: &str) -> ExprRef {
    prop(p, name, Type::Int)
}

pub fn value_of(session: &Session, id: NodeId) -> Option<Value> {
    session.outcome(id).and_then(|o| o.value().cloned())
}

pub fn fault_of(session: &Session, id: NodeId) -> Option<Fault> {
    session.outcome(id).and_then(|o| o.fault().cloned())
}

/// Counts change notifications delivered to a subscription.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn calc() -> Type {
    Type::host("Calc")
}

/// Static `Calc` methods:
/// - `Sum(int, int)`: counts its invocations
/// - `Check(int)`: fails on negative input
/// - `Fail()`: always fails
pub struct Calc {
    pub invoker: Arc<Invoker>,
    pub sums: Counter,
}

impl Calc {
    pub fn new() -> Result<Self> {
        let invoker = Invoker::new();
        let sums = Counter::default();

        let counter = sums.clone();
        invoker.register_method(
            MethodDescriptor::static_method(calc(), "Sum", vec![Type::Int, Type::Int]),
            move |_, args| {
                counter.hit();
                Ok(Value::from(args[0].as_i64()? + args[1].as_i64()?))
            },
        )?;
        invoker.register_method(
            MethodDescriptor::static_method(calc(), "Check", vec![Type::Int]),
            |_, args| {
                let v = args[0].as_i64()?;
                if v < 0 {
                    bail!("negative input {v}");
                }
                Ok(Value::from(v))
            },
        )?;
        invoker.register_method(
            MethodDescriptor::static_method(calc(), "Fail", vec![]),
            |_, _| bail!("calculation failed"),
        )?;

        Ok(Self {
            invoker: Arc::new(invoker),
            sums,
        })
    }

    pub fn session(&self) -> Session {
        Session::builder()
            .with_invoker(self.invoker.clone())
            .build()
    }
}

/// A host whose disposal always fails.
pub struct Broken;

impl HostObject for Broken {
    fn type_name(&self) -> &str {
        "Broken"
    }

    fn dispose(&self) -> Result<()> {
        bail!("already closed")
    }
}

pub fn resource() -> Type {
    Type::host("Resource")
}

/// Registers `new Resource(int)` and `new Broken(int)`, recording every
/// instance created.
pub struct Factory {
    pub invoker: Arc<Invoker>,
    pub created: Arc<Mutex<Vec<Arc<ObservableObject>>>>,
}

impl Factory {
    pub fn new() -> Result<Self> {
        let invoker = Invoker::new();
        let created: Arc<Mutex<Vec<Arc<ObservableObject>>>> = Arc::default();

        let log = created.clone();
        invoker.register_constructor(
            ConstructorDescriptor::new(resource(), vec![Type::Int]),
            move |args| {
                let r = Arc::new(ObservableObject::new("Resource").with("id", args[0].clone()));
                log.lock().push(r.clone());
                Ok(Value::host(r))
            },
        )?;
        invoker.register_constructor(
            ConstructorDescriptor::new(Type::host("Broken"), vec![Type::Int]),
            |_| Ok(Value::host(Arc::new(Broken))),
        )?;

        Ok(Self {
            invoker: Arc::new(invoker),
            created,
        })
    }

    pub fn session(&self) -> Session {
        Session::builder()
            .with_invoker(self.invoker.clone())
            .build()
    }

    pub fn instance(&self, i: usize) -> Arc<ObservableObject> {
        self.created.lock()[i].clone()
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }
}
