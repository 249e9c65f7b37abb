//! Tagged value representation.

use crate::gc::GcRef;
use vela_common_core::TypeId;

/// Index into a context's native function table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

/// A fixed-size value slot.
///
/// Scalars and singletons are stored inline. Everything else lives on the
/// heap and is referred to by a `GcRef`; copying a `Value` never copies the
/// object it refers to.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Value {
    /// "No value". Distinct from `None` and never a valid operand.
    #[default]
    Nil,
    None,
    NotImplemented,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Type(TypeId),
    NativeFunc(NativeId),
    Object(GcRef),
}

impl Value {
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    #[inline]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Value::NotImplemented)
    }

    #[inline]
    pub fn as_object(&self) -> Option<GcRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    /// Int or bool widened to i64.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            Value::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    /// Int, bool or float widened to f64.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            _ => self.as_int().map(|i| i as f64),
        }
    }

    /// Type of every inline value; `None` for heap objects.
    pub fn inline_type(&self) -> Option<TypeId> {
        let t = match self {
            Value::Nil => TypeId::NIL,
            Value::None => TypeId::NONE_TYPE,
            Value::NotImplemented => TypeId::NOT_IMPLEMENTED_TYPE,
            Value::Ellipsis => TypeId::ELLIPSIS,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::Float(_) => TypeId::FLOAT,
            Value::Type(_) => TypeId::TYPE,
            Value::NativeFunc(_) => TypeId::NATIVEFUNC,
            Value::Object(_) => return None,
        };
        Some(t)
    }
}

/// Identity comparison (`is`). Floats compare by bit pattern.
pub fn is_identical(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil)
        | (Value::None, Value::None)
        | (Value::NotImplemented, Value::NotImplemented)
        | (Value::Ellipsis, Value::Ellipsis) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Type(x), Value::Type(y)) => x == y,
        (Value::NativeFunc(x), Value::NativeFunc(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert!(is_identical(Value::Int(3), Value::Int(3)));
        assert!(!is_identical(Value::Int(1), Value::Bool(true)));
        assert!(is_identical(Value::Float(f64::NAN), Value::Float(f64::NAN)));
        assert!(!is_identical(Value::None, Value::Nil));
    }

    #[test]
    fn test_widening() {
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::Int(2).as_number(), Some(2.0));
        assert_eq!(Value::None.as_number(), None);
        assert_eq!(Value::Nil.inline_type(), Some(TypeId::NIL));
    }
}
