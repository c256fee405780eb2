//! Managed value representation
//!
//! A `Value` is a single managed slot: one of the eight primitive kinds or
//! an object reference. Widths are exact — a byte slot holds an `i8` and
//! never silently widens to `i32`. Character values are UTF-16 code units,
//! matching the string representation of the runtime.

use crate::object::Obj;
use std::fmt;
use std::sync::Arc;

/// A managed value: primitive scalar or object reference.
#[derive(Clone)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// 8-bit signed integer.
    Byte(i8),
    /// UTF-16 code unit.
    Char(u16),
    /// 16-bit signed integer.
    Short(i16),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit IEEE 754 float.
    Float(f32),
    /// 64-bit IEEE 754 float.
    Double(f64),
    /// Object reference (`None` is the null reference).
    Object(Option<Obj>),
}

/// Discriminant of a [`Value`], used for slot kind checks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ValueKind {
    /// Boolean slot.
    Bool,
    /// Byte slot.
    Byte,
    /// Char (UTF-16 code unit) slot.
    Char,
    /// Short slot.
    Short,
    /// Int slot.
    Int,
    /// Long slot.
    Long,
    /// Float slot.
    Float,
    /// Double slot.
    Double,
    /// Object reference slot.
    Object,
}

impl ValueKind {
    /// Stable lower-case name, used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Byte => "byte",
            ValueKind::Char => "char",
            ValueKind::Short => "short",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Object => "object",
        }
    }
}

impl Value {
    /// Null object reference.
    pub const fn null() -> Self {
        Value::Object(None)
    }

    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Byte(_) => ValueKind::Byte,
            Value::Char(_) => ValueKind::Char,
            Value::Short(_) => ValueKind::Short,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Extract a bool, if this is a bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an i8, if this is a byte value.
    pub fn as_byte(&self) -> Option<i8> {
        match self {
            Value::Byte(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a UTF-16 code unit, if this is a char value.
    pub fn as_char(&self) -> Option<u16> {
        match self {
            Value::Char(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract an i16, if this is a short value.
    pub fn as_short(&self) -> Option<i16> {
        match self {
            Value::Short(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract an i32, if this is an int value.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract an i64, if this is a long value.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract an f32, if this is a float value.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract an f64, if this is a double value.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract the object reference, if this is an object value.
    pub fn as_object(&self) -> Option<Option<&Obj>> {
        match self {
            Value::Object(o) => Some(o.as_ref()),
            _ => None,
        }
    }

    /// True if this is the null reference.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Object(None))
    }
}

impl PartialEq for Value {
    /// Primitive values compare by value; object references by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Object(None), Value::Object(None)) => true,
            (Value::Object(Some(a)), Value::Object(Some(b))) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Byte(v) => write!(f, "Byte({v})"),
            Value::Char(v) => write!(f, "Char({v:#06x})"),
            Value::Short(v) => write!(f, "Short({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Long(v) => write!(f, "Long({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Double(v) => write!(f, "Double({v})"),
            Value::Object(None) => write!(f, "Object(null)"),
            Value::Object(Some(o)) => write!(f, "Object({:p})", Arc::as_ptr(o)),
        }
    }
}

/// Default value for a slot declared with the given type signature text.
///
/// Numeric slots default to zero, booleans to false, references to null.
/// Only the leading character is inspected; full signature parsing belongs
/// to the binding layer.
pub fn default_for_sig(sig: &str) -> Value {
    match sig.as_bytes().first() {
        Some(b'Z') => Value::Bool(false),
        Some(b'B') => Value::Byte(0),
        Some(b'C') => Value::Char(0),
        Some(b'S') => Value::Short(0),
        Some(b'I') => Value::Int(0),
        Some(b'J') => Value::Long(0),
        Some(b'F') => Value::Float(0.0),
        Some(b'D') => Value::Double(0.0),
        _ => Value::null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_discrimination() {
        assert_eq!(Value::Bool(true).kind(), ValueKind::Bool);
        assert_eq!(Value::Byte(-1).kind(), ValueKind::Byte);
        assert_eq!(Value::Int(7).kind(), ValueKind::Int);
        assert_eq!(Value::null().kind(), ValueKind::Object);
    }

    #[test]
    fn test_width_is_exact() {
        // A byte never answers as an int.
        let v = Value::Byte(5);
        assert_eq!(v.as_byte(), Some(5));
        assert_eq!(v.as_int(), None);

        let v = Value::Short(300);
        assert_eq!(v.as_short(), Some(300));
        assert_eq!(v.as_long(), None);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_for_sig("Z"), Value::Bool(false));
        assert_eq!(default_for_sig("J"), Value::Long(0));
        assert_eq!(default_for_sig("Lrt/String;"), Value::null());
        assert_eq!(default_for_sig("[I"), Value::null());
    }

    #[test]
    fn test_null_equality() {
        assert_eq!(Value::null(), Value::null());
        assert_ne!(Value::null(), Value::Int(0));
    }
}
