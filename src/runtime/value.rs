//! Argument and return values crossing the interception boundary.

use std::fmt;

use crate::runtime::ParamKind;

/// A managed value as seen by interception handlers.
///
/// Handlers receive the arguments of an intercepted call as a mutable slice of `Value`s and
/// produce `Value`s when they replace a method body. Reference types other than strings are
/// opaque to the host and are carried as [`Value::Object`] handles.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value (void return)
    Void,
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 64-bit float
    F64(f64),
    /// Managed string
    String(String),
    /// Opaque object handle
    Object(u64),
}

impl Value {
    /// Returns the parameter kind this value inhabits, `None` for null.
    #[must_use]
    pub fn kind(&self) -> Option<ParamKind> {
        match self {
            Value::Void => Some(ParamKind::Void),
            Value::Null => None,
            Value::Bool(_) => Some(ParamKind::Bool),
            Value::I32(_) => Some(ParamKind::I32),
            Value::I64(_) => Some(ParamKind::I64),
            Value::F64(_) => Some(ParamKind::F64),
            Value::String(_) => Some(ParamKind::String),
            Value::Object(_) => Some(ParamKind::Object),
        }
    }

    /// Checks whether this value can be passed for a parameter of `kind`.
    ///
    /// Null is accepted wherever a reference is expected.
    #[must_use]
    pub fn fits(&self, kind: ParamKind) -> bool {
        match self.kind() {
            Some(own) => own == kind,
            None => matches!(kind, ParamKind::String | ParamKind::Object),
        }
    }

    /// Returns the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload widened to 64 bits, if this is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}L"),
            Value::F64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Object(h) => write!(f, "object@{h:#x}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
