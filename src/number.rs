// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(clippy::float_cmp, clippy::as_conversions)]

use core::cmp::Ordering;
use core::fmt::{Debug, Display, Formatter};
use core::str::FromStr;

use anyhow::Result;
use num_traits::ToPrimitive;
use serde::ser::Serializer;
use serde::Serialize;

use crate::error::EvalError;

/// Numeric payload of [`crate::Value::Number`].
///
/// Integer arithmetic is 64-bit two's complement. The unchecked operations
/// wrap; the `checked_*` family reports [`EvalError::Overflow`].
#[derive(Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn to_f64_lossy(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Number::Int(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(v) => Some(*v),
            Number::Float(f) if f.fract() == 0.0 => f.to_i64(),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|v| v.to_usize())
    }

    pub fn as_f64(&self) -> f64 {
        self.to_f64_lossy()
    }

    fn float_op(self, rhs: Self, f: fn(f64, f64) -> f64) -> Number {
        Number::Float(f(self.to_f64_lossy(), rhs.to_f64_lossy()))
    }

    pub fn add(&self, rhs: &Self) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a.wrapping_add(*b)),
            _ => self.float_op(*rhs, |a, b| a + b),
        }
    }

    pub fn checked_add(&self, rhs: &Self) -> Result<Number> {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => {
                Ok(Number::Int(a.checked_add(*b).ok_or(EvalError::Overflow)?))
            }
            _ => Ok(self.add(rhs)),
        }
    }

    pub fn sub(&self, rhs: &Self) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a.wrapping_sub(*b)),
            _ => self.float_op(*rhs, |a, b| a - b),
        }
    }

    pub fn checked_sub(&self, rhs: &Self) -> Result<Number> {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => {
                Ok(Number::Int(a.checked_sub(*b).ok_or(EvalError::Overflow)?))
            }
            _ => Ok(self.sub(rhs)),
        }
    }

    pub fn mul(&self, rhs: &Self) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a.wrapping_mul(*b)),
            _ => self.float_op(*rhs, |a, b| a * b),
        }
    }

    pub fn checked_mul(&self, rhs: &Self) -> Result<Number> {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => {
                Ok(Number::Int(a.checked_mul(*b).ok_or(EvalError::Overflow)?))
            }
            _ => Ok(self.mul(rhs)),
        }
    }

    /// Integer division truncates toward zero and fails on a zero divisor.
    /// Float division follows IEEE-754.
    pub fn divide(&self, rhs: &Self) -> Result<Number> {
        match (self, rhs) {
            (Number::Int(_), Number::Int(0)) => Err(EvalError::DivideByZero.into()),
            (Number::Int(a), Number::Int(b)) => Ok(Number::Int(a.wrapping_div(*b))),
            _ => Ok(self.float_op(*rhs, |a, b| a / b)),
        }
    }

    pub fn modulo(&self, rhs: &Self) -> Result<Number> {
        match (self, rhs) {
            (Number::Int(_), Number::Int(0)) => Err(EvalError::DivideByZero.into()),
            (Number::Int(a), Number::Int(b)) => Ok(Number::Int(a.wrapping_rem(*b))),
            _ => Ok(self.float_op(*rhs, |a, b| a % b)),
        }
    }

    pub fn neg(&self) -> Number {
        match self {
            Number::Int(v) => Number::Int(v.wrapping_neg()),
            Number::Float(v) => Number::Float(-v),
        }
    }

    pub fn checked_neg(&self) -> Result<Number> {
        match self {
            Number::Int(v) => Ok(Number::Int(v.checked_neg().ok_or(EvalError::Overflow)?)),
            Number::Float(v) => Ok(Number::Float(-v)),
        }
    }

    /// Conversion to an integer, truncating the fraction.
    /// Out-of-range floats saturate unless `checked` is set.
    pub fn to_int(&self, checked: bool) -> Result<Number> {
        match self {
            Number::Int(_) => Ok(*self),
            Number::Float(f) if checked => match f.trunc().to_i64() {
                Some(v) => Ok(Number::Int(v)),
                None => Err(EvalError::Overflow.into()),
            },
            Number::Float(f) => Ok(Number::Int(*f as i64)),
        }
    }

    pub fn to_float(&self) -> Number {
        Number::Float(self.to_f64_lossy())
    }

    fn format_decimal(&self) -> String {
        match self {
            Number::Int(v) => v.to_string(),
            Number::Float(f) if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 => {
                format!("{f:.1}")
            }
            Number::Float(f) => f.to_string(),
        }
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::Int(v) => serializer.serialize_i64(*v),
            Number::Float(v) => serializer.serialize_f64(*v),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Int(i64::from(value))
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        match value.to_i64() {
            Some(v) => Number::Int(v),
            None => Number::Float(value as f64),
        }
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        match value.to_i64() {
            Some(v) => Number::Int(v),
            None => Number::Float(value as f64),
        }
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseNumberError;

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().replace('_', "");
        if trimmed.is_empty() {
            return Err(ParseNumberError);
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Ok(Number::Int(v));
        }
        trimmed
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| ParseNumberError)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(b),
            _ => self.to_f64_lossy().total_cmp(&other.to_f64_lossy()),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
