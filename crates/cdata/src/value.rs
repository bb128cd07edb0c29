// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Values exchanged between the managed language and native memory.

use crate::data::CData;
use crate::error::CallbackError;
use crate::types::{ArgType, TypeRef};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque reference to a managed object kept alive by a memory block.
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

type CallableFn = dyn Fn(&[Value]) -> Result<Value, CallbackError> + Send + Sync;

/// A managed callable (callback target, `_restype_` converter, `_check_retval_` hook).
#[derive(Clone)]
pub struct Callable(Arc<CallableFn>);

impl Callable {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CallbackError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke with positional arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, CallbackError> {
        (self.0)(args)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({:p})", Arc::as_ptr(&self.0))
    }
}

/// A dynamic managed value.
///
/// Integers are carried as `i128` so that both the full `u64` and `i64`
/// ranges are representable before the target kind's range check.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    /// Raw native address.
    Address(usize),
    /// A ctypes instance.
    Data(CData),
    /// A ctypes type.
    Type(TypeRef),
    /// A host type that can only convert call arguments.
    Param(ArgType),
    Callable(Callable),
    /// Sequence (`_fields_` entries, `_argtypes_`, array initializers).
    List(Vec<Value>),
    /// Any other managed object.
    Object(ObjectRef),
}

impl Value {
    /// Short kind name used in error reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "str",
            Value::Address(_) => "address",
            Value::Data(_) => "ctypes instance",
            Value::Type(_) => "ctypes type",
            Value::Param(_) => "param type",
            Value::Callable(_) => "callable",
            Value::List(_) => "sequence",
            Value::Object(_) => "object",
        }
    }

    /// Host truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Bytes(b) => !b.is_empty(),
            Value::Text(s) => !s.is_empty(),
            Value::Address(a) => *a != 0,
            Value::List(items) => !items.is_empty(),
            Value::Data(_)
            | Value::Type(_)
            | Value::Param(_)
            | Value::Callable(_)
            | Value::Object(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i128::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&CData> {
        match self {
            Value::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Bytes(b) => write!(f, "Bytes({:?})", b),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Address(a) => write!(f, "Address({:#x})", a),
            Value::Data(d) => write!(f, "Data({:?})", d),
            Value::Type(t) => write!(f, "Type({})", t.name()),
            Value::Param(p) => write!(f, "Param({})", p.type_name()),
            Value::Callable(c) => write!(f, "{:?}", c),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Object(_) => f.write_str("Object(..)"),
        }
    }
}

// Equality is value equality for scalars and identity for reference kinds.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Address(a), Value::Address(b)) => a == b,
            (Value::Data(a), Value::Data(b)) => a.same_memory(b),
            (Value::Type(a), Value::Type(b)) => Arc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(i128::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, u8, i16, u16, i32, u32, i64, u64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<CData> for Value {
    fn from(v: CData) -> Self {
        Value::Data(v)
    }
}

impl From<TypeRef> for Value {
    fn from(v: TypeRef) -> Self {
        Value::Type(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(!Value::Bytes(Vec::new()).is_truthy());
        assert!(Value::Text("x".into()).is_truthy());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(7u8), Value::Int(7));
        assert_eq!(Value::from(u64::MAX).as_int(), Some(i128::from(u64::MAX)));
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::Text("a".into()).as_f64(), None);
    }

    #[test]
    fn test_callable_identity() {
        let c = Callable::new(|args| Ok(args.first().cloned().unwrap_or(Value::None)));
        let d = c.clone();
        assert!(c.ptr_eq(&d));
        assert_eq!(c.call(&[Value::Int(5)]).expect("call"), Value::Int(5));
    }
}
