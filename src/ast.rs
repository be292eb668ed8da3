// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::ConstructionError;
use crate::types::Type;
use crate::value::Value;

use core::{cmp, fmt, ops::Deref};
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    AddChecked,
    Sub,
    SubChecked,
    Mul,
    MulChecked,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAlso,
    OrElse,
    Coalesce,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add | BinaryOp::AddChecked => "+",
            BinaryOp::Sub | BinaryOp::SubChecked => "-",
            BinaryOp::Mul | BinaryOp::MulChecked => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::Coalesce => "??",
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(
            self,
            BinaryOp::AddChecked | BinaryOp::SubChecked | BinaryOp::MulChecked
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_checked() {
            write!(f, "checked({})", self.symbol())
        } else {
            f.write_str(self.symbol())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    NegChecked,
    Not,
    OnesComplement,
    Plus,
    Convert(Type),
    ConvertChecked(Type),
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => f.write_str("-"),
            UnaryOp::NegChecked => f.write_str("checked(-)"),
            UnaryOp::Not => f.write_str("!"),
            UnaryOp::OnesComplement => f.write_str("~"),
            UnaryOp::Plus => f.write_str("+"),
            UnaryOp::Convert(t) => write!(f, "({t})"),
            UnaryOp::ConvertChecked(t) => write!(f, "checked({t})"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Field,
    #[default]
    Property,
}

/// Identifies a field or property of a declaring type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub declaring_type: Type,
    pub name: Arc<str>,
    #[serde(default)]
    pub kind: MemberKind,
    #[serde(default)]
    pub is_static: bool,
}

impl MemberDescriptor {
    pub fn property(declaring_type: Type, name: &str) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            kind: MemberKind::Property,
            is_static: false,
        }
    }

    pub fn field(declaring_type: Type, name: &str) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            kind: MemberKind::Field,
            is_static: false,
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }
}

impl fmt::Display for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)
    }
}

/// Identifies a method overload by declaring type, name and parameter types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub declaring_type: Type,
    pub name: Arc<str>,
    #[serde(default)]
    pub parameters: Vec<Type>,
    #[serde(default)]
    pub is_static: bool,
}

impl MethodDescriptor {
    pub fn instance_method(declaring_type: Type, name: &str, parameters: Vec<Type>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            parameters,
            is_static: false,
        }
    }

    pub fn static_method(declaring_type: Type, name: &str, parameters: Vec<Type>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            parameters,
            is_static: true,
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({})",
            self.declaring_type,
            self.name,
            join(&self.parameters)
        )
    }
}

/// Identifies a constructor by declaring type and parameter types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstructorDescriptor {
    pub declaring_type: Type,
    #[serde(default)]
    pub parameters: Vec<Type>,
}

impl ConstructorDescriptor {
    pub fn new(declaring_type: Type, parameters: Vec<Type>) -> Self {
        Self {
            declaring_type,
            parameters,
        }
    }
}

impl fmt::Display for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.declaring_type, join(&self.parameters))
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct NodeRef<T> {
    r: Arc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T: fmt::Display> fmt::Display for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.r).eq(&Arc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> cmp::Ord for NodeRef<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        Arc::as_ptr(&self.r).cmp(&Arc::as_ptr(&other.r))
    }
}

impl<T> cmp::PartialOrd for NodeRef<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Arc::new(t) }
    }
}

impl<T: Serialize> Serialize for NodeRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.r.as_ref().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for NodeRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(NodeRef::new(T::deserialize(deserializer)?))
    }
}

pub type Ref<T> = NodeRef<T>;

pub type ExprRef = Ref<Expr>;

/// Expression tree accepted by the graph builder.
///
/// Parameters must be substituted (see [`Lambda::bind`]) before a tree can
/// be turned into live nodes.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Constant {
        value: Value,
        #[serde(rename = "type")]
        ty: Type,
    },

    Parameter {
        name: Arc<str>,
        #[serde(rename = "type")]
        ty: Type,
    },

    Binary {
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
        #[serde(rename = "type")]
        ty: Type,
        // Only meaningful for coalesce, where it is rejected.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversion: Option<Ref<Lambda>>,
    },

    Unary {
        op: UnaryOp,
        operand: ExprRef,
        #[serde(rename = "type")]
        ty: Type,
    },

    Conditional {
        test: ExprRef,
        if_true: ExprRef,
        if_false: ExprRef,
        #[serde(rename = "type")]
        ty: Type,
    },

    Member {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object: Option<ExprRef>,
        member: MemberDescriptor,
        #[serde(rename = "type")]
        ty: Type,
    },

    Index {
        object: ExprRef,
        args: Vec<ExprRef>,
        #[serde(rename = "type")]
        ty: Type,
    },

    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object: Option<ExprRef>,
        method: MethodDescriptor,
        #[serde(default)]
        args: Vec<ExprRef>,
        #[serde(rename = "type")]
        ty: Type,
    },

    New {
        constructor: ConstructorDescriptor,
        #[serde(default)]
        args: Vec<ExprRef>,
        #[serde(rename = "type")]
        ty: Type,
    },
}

impl Expr {
    pub fn ty(&self) -> &Type {
        match self {
            Expr::Constant { ty, .. }
            | Expr::Parameter { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Conditional { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Index { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::New { ty, .. } => ty,
        }
    }

    pub fn constant(value: impl Into<Value>, ty: Type) -> ExprRef {
        Ref::new(Expr::Constant {
            value: value.into(),
            ty,
        })
    }

    /// A constant typed after its own runtime value.
    pub fn literal(value: impl Into<Value>) -> ExprRef {
        let value = value.into();
        let ty = value.type_of();
        Ref::new(Expr::Constant { value, ty })
    }

    pub fn parameter(name: &str, ty: Type) -> ExprRef {
        Ref::new(Expr::Parameter {
            name: name.into(),
            ty,
        })
    }

    /// A binary expression whose result type follows the usual rules:
    /// comparisons and short-circuit operators produce `bool`, coalesce
    /// produces the right operand's type and arithmetic keeps the left
    /// operand's type, lifted when either side is nullable.
    pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
        let ty = match op {
            op if op.is_comparison() => Type::Bool,
            BinaryOp::AndAlso | BinaryOp::OrElse => Type::Bool,
            BinaryOp::Coalesce => right.ty().clone(),
            _ if left.ty().is_lifted() || right.ty().is_lifted() => {
                Type::nullable(left.ty().underlying().clone())
            }
            _ => left.ty().clone(),
        };
        Self::binary_typed(op, left, right, ty)
    }

    pub fn binary_typed(op: BinaryOp, left: ExprRef, right: ExprRef, ty: Type) -> ExprRef {
        Ref::new(Expr::Binary {
            op,
            left,
            right,
            ty,
            conversion: None,
        })
    }

    pub fn and_also(left: ExprRef, right: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::AndAlso, left, right)
    }

    pub fn or_else(left: ExprRef, right: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::OrElse, left, right)
    }

    pub fn coalesce(left: ExprRef, right: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::Coalesce, left, right)
    }

    pub fn unary(op: UnaryOp, operand: ExprRef) -> ExprRef {
        let ty = match &op {
            UnaryOp::Convert(t) | UnaryOp::ConvertChecked(t) => t.clone(),
            _ => operand.ty().clone(),
        };
        Ref::new(Expr::Unary { op, operand, ty })
    }

    pub fn convert(operand: ExprRef, ty: Type) -> ExprRef {
        Self::unary(UnaryOp::Convert(ty), operand)
    }

    pub fn conditional(test: ExprRef, if_true: ExprRef, if_false: ExprRef) -> ExprRef {
        let ty = if_true.ty().clone();
        Ref::new(Expr::Conditional {
            test,
            if_true,
            if_false,
            ty,
        })
    }

    pub fn property(object: ExprRef, name: &str, ty: Type) -> ExprRef {
        let member = MemberDescriptor::property(object.ty().clone(), name);
        Ref::new(Expr::Member {
            object: Some(object),
            member,
            ty,
        })
    }

    pub fn field(object: ExprRef, name: &str, ty: Type) -> ExprRef {
        let member = MemberDescriptor::field(object.ty().clone(), name);
        Ref::new(Expr::Member {
            object: Some(object),
            member,
            ty,
        })
    }

    pub fn static_property(declaring_type: Type, name: &str, ty: Type) -> ExprRef {
        Ref::new(Expr::Member {
            object: None,
            member: MemberDescriptor::property(declaring_type, name).into_static(),
            ty,
        })
    }

    pub fn index(object: ExprRef, args: Vec<ExprRef>, ty: Type) -> ExprRef {
        Ref::new(Expr::Index { object, args, ty })
    }

    pub fn call(object: ExprRef, name: &str, args: Vec<ExprRef>, ty: Type) -> ExprRef {
        let parameters = args.iter().map(|a| a.ty().clone()).collect();
        let method = MethodDescriptor::instance_method(object.ty().clone(), name, parameters);
        Ref::new(Expr::Call {
            object: Some(object),
            method,
            args,
            ty,
        })
    }

    pub fn call_static(declaring_type: Type, name: &str, args: Vec<ExprRef>, ty: Type) -> ExprRef {
        let parameters = args.iter().map(|a| a.ty().clone()).collect();
        let method = MethodDescriptor::static_method(declaring_type, name, parameters);
        Ref::new(Expr::Call {
            object: None,
            method,
            args,
            ty,
        })
    }

    pub fn construct(declaring_type: Type, args: Vec<ExprRef>) -> ExprRef {
        let parameters = args.iter().map(|a| a.ty().clone()).collect();
        let constructor = ConstructorDescriptor::new(declaring_type.clone(), parameters);
        Ref::new(Expr::New {
            constructor,
            args,
            ty: declaring_type,
        })
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[ExprRef]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{a}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value, ty } => write!(f, "{value}:{ty}"),
            Expr::Parameter { name, .. } => f.write_str(name),
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({left} {op} {right})"),
            Expr::Unary { op, operand, .. } => write!(f, "{op}{operand}"),
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => write!(f, "({test} ? {if_true} : {if_false})"),
            Expr::Member {
                object: Some(object),
                member,
                ..
            } => write!(f, "{object}.{}", member.name),
            Expr::Member {
                object: None,
                member,
                ..
            } => write!(f, "{member}"),
            Expr::Index { object, args, .. } => {
                write!(f, "{object}[")?;
                write_args(f, args)?;
                f.write_str("]")
            }
            Expr::Call {
                object, method, args, ..
            } => {
                match object {
                    Some(object) => write!(f, "{object}.{}(", method.name)?,
                    None => write!(f, "{}.{}(", method.declaring_type, method.name)?,
                }
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::New {
                constructor, args, ..
            } => {
                write!(f, "new {}(", constructor.declaring_type)?;
                write_args(f, args)?;
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Arc<str>,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Parameter {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A parameterized expression. Its rendering doubles as the expression
/// identity used when interning activations.
#[derive(Debug, Serialize, Deserialize)]
pub struct Lambda {
    pub parameters: Vec<Parameter>,
    pub body: ExprRef,
}

impl Lambda {
    pub fn new(parameters: Vec<Parameter>, body: ExprRef) -> Self {
        Self { parameters, body }
    }

    /// Close the body over `args`, replacing every parameter reference with
    /// a constant of the parameter's type. Subtrees without parameters are
    /// shared with the original body.
    pub fn bind(&self, args: &[Value]) -> Result<ExprRef, ConstructionError> {
        if args.len() != self.parameters.len() {
            return Err(ConstructionError::ArgumentCount {
                expected: self.parameters.len(),
                actual: args.len(),
            });
        }
        let bindings: BTreeMap<&str, &Value> = self
            .parameters
            .iter()
            .map(|p| p.name.as_ref())
            .zip(args.iter())
            .collect();
        Ok(substitute(&self.body, &bindings).unwrap_or_else(|| self.body.clone()))
    }
}

/// One expression of a flattened lambda. Tokens are emitted in pre-order and
/// carry their child counts, so a token sequence identifies exactly one tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Token {
    Lambda(Vec<Parameter>),
    Constant(Value, Type),
    Parameter(Arc<str>, Type),
    Binary(BinaryOp, Type, bool),
    Unary(UnaryOp, Type),
    Conditional(Type),
    Member(MemberDescriptor, Type, bool),
    Index(Type, usize),
    Call(MethodDescriptor, Type, bool, usize),
    New(ConstructorDescriptor, Type, usize),
}

impl Lambda {
    /// Structural identity of the lambda. Unlike the rendered text it keeps
    /// member kinds, every result type and host constants by identity.
    pub(crate) fn tokens(&self) -> Vec<Token> {
        let mut out = vec![];
        self.flatten(&mut out);
        out
    }

    fn flatten(&self, out: &mut Vec<Token>) {
        out.push(Token::Lambda(self.parameters.clone()));
        self.body.flatten(out);
    }
}

impl Expr {
    fn flatten(&self, out: &mut Vec<Token>) {
        match self {
            Expr::Constant { value, ty } => out.push(Token::Constant(value.clone(), ty.clone())),
            Expr::Parameter { name, ty } => out.push(Token::Parameter(name.clone(), ty.clone())),
            Expr::Binary {
                op,
                left,
                right,
                ty,
                conversion,
            } => {
                out.push(Token::Binary(*op, ty.clone(), conversion.is_some()));
                left.flatten(out);
                right.flatten(out);
                if let Some(conversion) = conversion {
                    conversion.flatten(out);
                }
            }
            Expr::Unary { op, operand, ty } => {
                out.push(Token::Unary(op.clone(), ty.clone()));
                operand.flatten(out);
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ty,
            } => {
                out.push(Token::Conditional(ty.clone()));
                test.flatten(out);
                if_true.flatten(out);
                if_false.flatten(out);
            }
            Expr::Member { object, member, ty } => {
                out.push(Token::Member(member.clone(), ty.clone(), object.is_some()));
                if let Some(object) = object {
                    object.flatten(out);
                }
            }
            Expr::Index { object, args, ty } => {
                out.push(Token::Index(ty.clone(), args.len()));
                object.flatten(out);
                args.iter().for_each(|a| a.flatten(out));
            }
            Expr::Call {
                object,
                method,
                args,
                ty,
            } => {
                out.push(Token::Call(
                    method.clone(),
                    ty.clone(),
                    object.is_some(),
                    args.len(),
                ));
                if let Some(object) = object {
                    object.flatten(out);
                }
                args.iter().for_each(|a| a.flatten(out));
            }
            Expr::New {
                constructor,
                args,
                ty,
            } => {
                out.push(Token::New(constructor.clone(), ty.clone(), args.len()));
                args.iter().for_each(|a| a.flatten(out));
            }
        }
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("|")?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", p.name, p.ty)?;
        }
        write!(f, "| {}", self.body)
    }
}

fn substitute_all(
    items: &[ExprRef],
    bindings: &BTreeMap<&str, &Value>,
) -> Option<Vec<ExprRef>> {
    let replaced: Vec<Option<ExprRef>> = items.iter().map(|e| substitute(e, bindings)).collect();
    if replaced.iter().all(Option::is_none) {
        return None;
    }
    Some(
        replaced
            .into_iter()
            .zip(items.iter())
            .map(|(r, e)| r.unwrap_or_else(|| e.clone()))
            .collect(),
    )
}

fn keep(replaced: Option<ExprRef>, original: &ExprRef) -> ExprRef {
    replaced.unwrap_or_else(|| original.clone())
}

// Returns None when `expr` contains no bound parameter.
fn substitute(expr: &ExprRef, bindings: &BTreeMap<&str, &Value>) -> Option<ExprRef> {
    match expr.as_ref() {
        Expr::Constant { .. } => None,
        Expr::Parameter { name, ty } => bindings.get(name.as_ref()).map(|v| {
            Ref::new(Expr::Constant {
                value: (*v).clone(),
                ty: ty.clone(),
            })
        }),
        Expr::Binary {
            op,
            left,
            right,
            ty,
            conversion,
        } => {
            let (l, r) = (substitute(left, bindings), substitute(right, bindings));
            if l.is_none() && r.is_none() {
                return None;
            }
            Some(Ref::new(Expr::Binary {
                op: *op,
                left: keep(l, left),
                right: keep(r, right),
                ty: ty.clone(),
                conversion: conversion.clone(),
            }))
        }
        Expr::Unary { op, operand, ty } => substitute(operand, bindings).map(|operand| {
            Ref::new(Expr::Unary {
                op: op.clone(),
                operand,
                ty: ty.clone(),
            })
        }),
        Expr::Conditional {
            test,
            if_true,
            if_false,
            ty,
        } => {
            let t = substitute(test, bindings);
            let a = substitute(if_true, bindings);
            let b = substitute(if_false, bindings);
            if t.is_none() && a.is_none() && b.is_none() {
                return None;
            }
            Some(Ref::new(Expr::Conditional {
                test: keep(t, test),
                if_true: keep(a, if_true),
                if_false: keep(b, if_false),
                ty: ty.clone(),
            }))
        }
        Expr::Member { object, member, ty } => {
            let object = object.as_ref()?;
            substitute(object, bindings).map(|object| {
                Ref::new(Expr::Member {
                    object: Some(object),
                    member: member.clone(),
                    ty: ty.clone(),
                })
            })
        }
        Expr::Index { object, args, ty } => {
            let o = substitute(object, bindings);
            let a = substitute_all(args, bindings);
            if o.is_none() && a.is_none() {
                return None;
            }
            Some(Ref::new(Expr::Index {
                object: keep(o, object),
                args: a.unwrap_or_else(|| args.clone()),
                ty: ty.clone(),
            }))
        }
        Expr::Call {
            object,
            method,
            args,
            ty,
        } => {
            let o = object.as_ref().and_then(|o| substitute(o, bindings));
            let a = substitute_all(args, bindings);
            if o.is_none() && a.is_none() {
                return None;
            }
            Some(Ref::new(Expr::Call {
                object: o.or_else(|| object.clone()),
                method: method.clone(),
                args: a.unwrap_or_else(|| args.clone()),
                ty: ty.clone(),
            }))
        }
        Expr::New {
            constructor,
            args,
            ty,
        } => substitute_all(args, bindings).map(|args| {
            Ref::new(Expr::New {
                constructor: constructor.clone(),
                args,
                ty: ty.clone(),
            })
        }),
    }
}
