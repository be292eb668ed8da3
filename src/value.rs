// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::notify::{NotifyCollectionChanged, NotifyDictionaryChanged, NotifyPropertyChanged};
use crate::number::Number;
use crate::types::Type;

use core::cmp;
use core::fmt;
use std::collections::BTreeMap;
use std::ops;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// An object supplied by the embedding application.
///
/// Host objects have identity: two `Value::Host` are equal only when they
/// point at the same instance. Mutation protocols are opt-in; a host that
/// raises change notifications returns itself from the matching accessor.
pub trait HostObject: Send + Sync + 'static {
    fn type_name(&self) -> &str;

    fn property(&self, name: &str) -> Result<Value> {
        bail!("`{}` has no property `{name}`", self.type_name())
    }

    fn field(&self, name: &str) -> Result<Value> {
        bail!("`{}` has no field `{name}`", self.type_name())
    }

    fn index(&self, args: &[Value]) -> Result<Value> {
        bail!(
            "`{}` has no indexer taking {} argument(s)",
            self.type_name(),
            args.len()
        )
    }

    fn call(&self, method: &str, _args: &[Value]) -> Result<Value> {
        bail!("`{}` has no method `{method}`", self.type_name())
    }

    /// Release resources held by the object. Invoked at most once per value
    /// a node hands out when the disposal policy applies to it.
    fn dispose(&self) -> Result<()> {
        Ok(())
    }

    fn as_property_notifier(&self) -> Option<&dyn NotifyPropertyChanged> {
        None
    }

    fn as_collection_notifier(&self) -> Option<&dyn NotifyCollectionChanged> {
        None
    }

    fn as_dictionary_notifier(&self) -> Option<&dyn NotifyDictionaryChanged> {
        None
    }
}

/// Shared handle to a host object, compared by identity.
#[derive(Clone)]
pub struct HostRef {
    r: Arc<dyn HostObject>,
}

impl HostRef {
    pub fn new<T: HostObject>(object: T) -> Self {
        Self {
            r: Arc::new(object),
        }
    }

    pub fn from_arc<T: HostObject>(object: Arc<T>) -> Self {
        Self { r: object }
    }

    /// Address of the shared instance; stable for the lifetime of the object.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.r) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &HostRef) -> bool {
        self.id() == other.id()
    }
}

impl ops::Deref for HostRef {
    type Target = dyn HostObject;

    fn deref(&self) -> &Self::Target {
        self.r.as_ref()
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}@{:#x}>", self.r.type_name(), self.id())
    }
}

impl cmp::PartialEq for HostRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl cmp::Eq for HostRef {}

impl cmp::Ord for HostRef {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.id().cmp(&other.id())
    }
}

impl cmp::PartialOrd for HostRef {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Host objects sit beside plain data so that observable instances can flow
// through the graph. BTreeMap keeps object keys ordered so values can serve
// as interning keys.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    // Json data types. serde will automatically map json to these variants.
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<BTreeMap<Value, Value>>),

    Host(HostRef),
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::Error;
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s.as_ref()),
            Value::Number(n) => n.serialize(serializer),
            Value::Array(a) => a.serialize(serializer),
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    match k {
                        Value::String(_) => map.serialize_entry(k, v)?,
                        _ => {
                            let key_str = serde_json::to_string(k).map_err(Error::custom)?;
                            map.serialize_entry(&key_str, v)?
                        }
                    }
                }
                map.end()
            }

            // hosts have no data representation
            Value::Host(h) => serializer.serialize_str(&format!("<{}>", h.type_name())),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a value")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(Number::from(v)))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_string<E>(self, s: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_seq<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let mut arr = vec![];
        while let Some(v) = visitor.next_element()? {
            arr.push(v);
        }
        Ok(Value::from(arr))
    }

    fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = visitor.next_entry()? {
            map.insert(key, value);
        }
        Ok(Value::from(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{s}"),
            Err(_e) => Err(fmt::Error),
        }
    }
}

impl Value {
    pub fn from_json_str(json: &str) -> Result<Value> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Value> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn host<T: HostObject>(object: Arc<T>) -> Value {
        Value::Host(HostRef::from_arc(object))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(Arc::new(a))
    }
}

impl From<BTreeMap<Value, Value>> for Value {
    fn from(s: BTreeMap<Value, Value>) -> Self {
        Value::Object(Arc::new(s))
    }
}

impl From<HostRef> for Value {
    fn from(h: HostRef) -> Self {
        Value::Host(h)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The most specific static type describing this value.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Null => Type::Any,
            Value::Bool(_) => Type::Bool,
            Value::Number(Number::Int(_)) => Type::Int,
            Value::Number(Number::Float(_)) => Type::Float,
            Value::String(_) => Type::String,
            Value::Array(_) => Type::Array,
            Value::Object(_) => Type::Object,
            Value::Host(h) => Type::host(h.type_name()),
        }
    }

    pub fn as_bool(&self) -> Result<&bool> {
        match self {
            Value::Bool(b) => Ok(b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_string(&self) -> Result<&Arc<str>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_number(&self) -> Result<&Number> {
        match self {
            Value::Number(n) => Ok(n),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Number(Number::Int(n)) => Ok(*n),
            _ => Err(anyhow!("not an integer")),
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Value>> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(anyhow!("not an array")),
        }
    }

    pub fn as_object(&self) -> Result<&BTreeMap<Value, Value>> {
        match self {
            Value::Object(m) => Ok(m),
            _ => Err(anyhow!("not an object")),
        }
    }

    pub fn as_host(&self) -> Result<&HostRef> {
        match self {
            Value::Host(h) => Ok(h),
            _ => Err(anyhow!("not a host object")),
        }
    }

    /// Identity of the host object behind this value, if any.
    pub(crate) fn host_id(&self) -> Option<usize> {
        match self {
            Value::Host(h) => Some(h.id()),
            _ => None,
        }
    }
}
