// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resolution of members, methods, constructors and indexers.
//!
//! Nodes resolve their accessor once, at construction time, through an
//! [`Invoker`]. Accessors for host-object types fall back to the dynamic
//! dispatch methods of [`HostObject`](crate::value::HostObject); plain data
//! types get a small set of built-ins. A resolved accessor is cached under
//! its descriptor, so registrations must happen before the descriptor is
//! first used.

use crate::ast::{ConstructorDescriptor, MemberDescriptor, MemberKind, MethodDescriptor};
use crate::error::{ConstructionError, EvalError};
use crate::registry::{Registry, RegistryError};
use crate::types::Type;
use crate::value::Value;

use core::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};

pub type Getter = Arc<dyn Fn(Option<&Value>) -> Result<Value> + Send + Sync>;
pub type Method = Arc<dyn Fn(Option<&Value>, &[Value]) -> Result<Value> + Send + Sync>;
pub type Constructor = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;
pub type Indexer = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexerKey {
    pub object: Type,
    pub args: Vec<Type>,
}

impl fmt::Display for IndexerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.object)?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{a}")?;
        }
        f.write_str("]")
    }
}

pub struct Invoker {
    members: Registry<MemberDescriptor, Getter>,
    methods: Registry<MethodDescriptor, Method>,
    constructors: Registry<ConstructorDescriptor, Constructor>,
    indexers: Registry<IndexerKey, Indexer>,
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new()
    }
}

fn is_dynamic(t: &Type) -> bool {
    matches!(t.underlying(), Type::Any | Type::Host(_))
}

fn receiver<'a>(object: Option<&'a Value>, name: &str) -> Result<&'a Value> {
    match object {
        Some(Value::Null) | None => Err(EvalError::NullReference(name.into()).into()),
        Some(v) => Ok(v),
    }
}

impl Invoker {
    pub fn new() -> Self {
        Self {
            members: Registry::new("MEMBERS"),
            methods: Registry::new("METHODS"),
            constructors: Registry::new("CONSTRUCTORS"),
            indexers: Registry::new("INDEXERS"),
        }
    }

    /// Register a field or property getter. Static getters receive `None`.
    pub fn register_member<F>(&self, member: MemberDescriptor, getter: F) -> Result<(), RegistryError>
    where
        F: Fn(Option<&Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.members.register(member, Arc::new(getter))
    }

    pub fn register_method<F>(&self, method: MethodDescriptor, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Option<&Value>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.register(method, Arc::new(f))
    }

    pub fn register_constructor<F>(
        &self,
        constructor: ConstructorDescriptor,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.constructors.register(constructor, Arc::new(f))
    }

    pub fn register_indexer<F>(&self, object: Type, args: Vec<Type>, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.indexers.register(IndexerKey { object, args }, Arc::new(f))
    }

    pub fn resolve_member(&self, member: &MemberDescriptor) -> Result<Getter, ConstructionError> {
        self.members.get_or_try_insert_with(member, || {
            if member.is_static {
                return Err(ConstructionError::MemberNotFound(member.clone()));
            }
            let name = member.name.clone();
            let kind = member.kind;
            let getter: Getter = match member.declaring_type.underlying() {
                t if is_dynamic(t) => {
                    Arc::new(move |object| dynamic_member(receiver(object, &name)?, kind, &name))
                }
                Type::Array | Type::String | Type::Object
                    if matches!(member.name.as_ref(), "Length" | "Count") =>
                {
                    Arc::new(move |object| dynamic_member(receiver(object, &name)?, kind, &name))
                }
                _ => return Err(ConstructionError::MemberNotFound(member.clone())),
            };
            Ok(getter)
        })
    }

    pub fn resolve_method(&self, method: &MethodDescriptor) -> Result<Method, ConstructionError> {
        self.methods.get_or_try_insert_with(method, || {
            if method.is_static || !is_dynamic(&method.declaring_type) {
                return Err(ConstructionError::MethodNotFound(method.clone()));
            }
            let name = method.name.clone();
            let f: Method = Arc::new(move |object, args| match receiver(object, &name)? {
                Value::Host(h) => h.call(&name, args),
                v => bail!("{} has no method `{name}`", v.type_of()),
            });
            Ok(f)
        })
    }

    pub fn resolve_constructor(
        &self,
        constructor: &ConstructorDescriptor,
    ) -> Result<Constructor, ConstructionError> {
        self.constructors
            .get(constructor)
            .ok_or_else(|| ConstructionError::ConstructorNotFound(constructor.clone()))
    }

    pub fn resolve_indexer(&self, object: &Type, args: &[Type]) -> Result<Indexer, ConstructionError> {
        let key = IndexerKey {
            object: object.clone(),
            args: args.to_vec(),
        };
        self.indexers.get_or_try_insert_with(&key, || {
            let single_int = matches!(args, [Type::Int] | [Type::Any]);
            let supported = match object.underlying() {
                t if is_dynamic(t) => true,
                Type::Array | Type::String => single_int,
                Type::Object => args.len() == 1,
                _ => false,
            };
            if !supported {
                return Err(ConstructionError::IndexerNotFound {
                    object: object.clone(),
                    args: key.to_string(),
                });
            }
            let f: Indexer = Arc::new(dynamic_index);
            Ok(f)
        })
    }
}

fn dynamic_member(object: &Value, kind: MemberKind, name: &str) -> Result<Value> {
    match (object, name) {
        (Value::Host(h), _) => match kind {
            MemberKind::Property => h.property(name),
            MemberKind::Field => h.field(name),
        },
        (Value::Array(a), "Length" | "Count") => Ok(Value::from(a.len())),
        (Value::Object(o), "Count") => Ok(Value::from(o.len())),
        (Value::String(s), "Length") => Ok(Value::from(s.chars().count())),
        (v, _) => bail!("{} has no member `{name}`", v.type_of()),
    }
}

fn position(index: &Value, len: usize) -> Result<usize> {
    let i = index.as_i64()?;
    usize::try_from(i)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| EvalError::IndexOutOfRange { index: i, len }.into())
}

fn dynamic_index(object: &Value, args: &[Value]) -> Result<Value> {
    match (object, args) {
        (Value::Null, _) => Err(EvalError::NullReference("[]".into()).into()),
        (Value::Host(h), args) => h.index(args),
        (Value::Array(a), [i]) => Ok(a[position(i, a.len())?].clone()),
        (Value::String(s), [i]) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::from(chars[position(i, chars.len())?].to_string()))
        }
        (Value::Object(o), [k]) => match o.get(k) {
            Some(v) => Ok(v.clone()),
            None => Err(EvalError::KeyNotFound(k.clone()).into()),
        },
        (v, args) => bail!(
            "{} cannot be indexed with {} argument(s)",
            v.type_of(),
            args.len()
        ),
    }
}
