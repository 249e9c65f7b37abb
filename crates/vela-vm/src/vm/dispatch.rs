//! Magic-method dispatch: operators, comparisons and the object protocols.
//!
//! Operands passed in must already be rooted by the caller (stack, register
//! or container); dispatch pushes them onto the stack again while calling.

use vela_common_core::{Magic, TypeId};
use vela_runtime::{hash_str, ObjectData, Value};

use crate::error::{PyResult, Raised};
use crate::vm::Vm;

/// Hash of `None`, fixed so it is stable across runs.
const NONE_HASH: i64 = 0x2f3a_1d47;

impl Vm {
    // =========================================================================
    // Binary operators
    // =========================================================================

    /// `lhs op rhs`: the forward method on the left type, then the reflected
    /// method on the right type. `NotImplemented` from either means
    /// "declined".
    pub fn binary_op(&mut self, lhs: Value, rhs: Value, op: Magic, rop: Option<Magic>) -> PyResult<Value> {
        if let Some(f) = self.types.find_magic(self.type_of(lhs), op) {
            let r = self.call_bound(f, lhs, &[rhs])?;
            if !r.is_not_implemented() {
                return Ok(r);
            }
        }
        if let Some(rop) = rop {
            if let Some(f) = self.types.find_magic(self.type_of(rhs), rop) {
                let r = self.call_bound(f, rhs, &[lhs])?;
                if !r.is_not_implemented() {
                    return Ok(r);
                }
            }
        }
        let msg = format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.operator().unwrap_or(op.as_str()),
            self.type_name_of(lhs),
            self.type_name_of(rhs)
        );
        Err(self.type_error(msg))
    }

    pub fn binary_add(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Add, Some(Magic::Radd))
    }

    pub fn binary_sub(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Sub, Some(Magic::Rsub))
    }

    pub fn binary_mul(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Mul, Some(Magic::Rmul))
    }

    pub fn binary_truediv(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Truediv, Some(Magic::Rtruediv))
    }

    pub fn binary_floordiv(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Floordiv, Some(Magic::Rfloordiv))
    }

    pub fn binary_mod(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Mod, Some(Magic::Rmod))
    }

    pub fn binary_pow(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Pow, Some(Magic::Rpow))
    }

    pub fn binary_lshift(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Lshift, None)
    }

    pub fn binary_rshift(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Rshift, None)
    }

    pub fn binary_and(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::And, None)
    }

    pub fn binary_or(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Or, None)
    }

    pub fn binary_xor(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Xor, None)
    }

    pub fn binary_matmul(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.binary_op(a, b, Magic::Matmul, None)
    }

    // =========================================================================
    // Comparisons
    // =========================================================================

    /// Rich comparison with the reflected pairing `<`/`>`, `<=`/`>=`,
    /// `==`/`==`, `!=`/`!=`. Equality falls back to identity when both
    /// sides decline.
    pub fn compare(&mut self, a: Value, b: Value, op: Magic) -> PyResult<Value> {
        let rop = match op {
            Magic::Lt => Magic::Gt,
            Magic::Gt => Magic::Lt,
            Magic::Le => Magic::Ge,
            Magic::Ge => Magic::Le,
            Magic::Eq => Magic::Eq,
            Magic::Ne => Magic::Ne,
            other => panic!("{other:?} is not a comparison"),
        };
        if let Some(f) = self.types.find_magic(self.type_of(a), op) {
            let r = self.call_bound(f, a, &[b])?;
            if !r.is_not_implemented() {
                return Ok(r);
            }
        }
        if let Some(f) = self.types.find_magic(self.type_of(b), rop) {
            let r = self.call_bound(f, b, &[a])?;
            if !r.is_not_implemented() {
                return Ok(r);
            }
        }
        match op {
            Magic::Eq => Ok(Value::Bool(self.is_identical(a, b))),
            Magic::Ne => Ok(Value::Bool(!self.is_identical(a, b))),
            _ => {
                let msg = format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.operator().unwrap_or(op.as_str()),
                    self.type_name_of(a),
                    self.type_name_of(b)
                );
                Err(self.type_error(msg))
            }
        }
    }

    pub fn eq(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.compare(a, b, Magic::Eq)
    }

    pub fn ne(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.compare(a, b, Magic::Ne)
    }

    pub fn lt(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.compare(a, b, Magic::Lt)
    }

    pub fn le(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.compare(a, b, Magic::Le)
    }

    pub fn gt(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.compare(a, b, Magic::Gt)
    }

    pub fn ge(&mut self, a: Value, b: Value) -> PyResult<Value> {
        self.compare(a, b, Magic::Ge)
    }

    /// `a == b` as a bool.
    pub fn equal(&mut self, a: Value, b: Value) -> PyResult<bool> {
        if self.is_identical(a, b) {
            return Ok(true);
        }
        let r = self.eq(a, b)?;
        self.truthy(r)
    }

    /// `a < b` as a bool.
    pub fn less(&mut self, a: Value, b: Value) -> PyResult<bool> {
        let r = self.lt(a, b)?;
        self.truthy(r)
    }

    // =========================================================================
    // Unary operators
    // =========================================================================

    pub fn unary_op(&mut self, v: Value, op: Magic) -> PyResult<Value> {
        if let Some(f) = self.types.find_magic(self.type_of(v), op) {
            return self.call_bound(f, v, &[]);
        }
        let msg = match op {
            Magic::Neg => format!("bad operand type for unary -: '{}'", self.type_name_of(v)),
            Magic::Invert => format!("bad operand type for unary ~: '{}'", self.type_name_of(v)),
            other => format!("bad operand type for {}(): '{}'", other.as_str().trim_matches('_'), self.type_name_of(v)),
        };
        Err(self.type_error(msg))
    }

    // =========================================================================
    // Protocols
    // =========================================================================

    /// Truth value: `__bool__`, then `__len__`, else true.
    pub fn truthy(&mut self, v: Value) -> PyResult<bool> {
        match v {
            Value::Nil => panic!("truth value of nil"),
            Value::None => return Ok(false),
            Value::Bool(b) => return Ok(b),
            Value::Int(i) => return Ok(i != 0),
            Value::Float(f) => return Ok(f != 0.0),
            Value::Object(_) => {}
            _ => return Ok(true),
        }
        match self.payload_of(v) {
            Some(ObjectData::Str(s)) => return Ok(!s.is_empty()),
            Some(ObjectData::List(l)) => return Ok(!l.items.is_empty()),
            Some(ObjectData::Dict(d)) => return Ok(!d.is_empty()),
            _ => {}
        }
        let ty = self.type_of(v);
        if let Some(f) = self.types.find_magic(ty, Magic::Bool) {
            return match self.call_bound(f, v, &[])? {
                Value::Bool(b) => Ok(b),
                other => {
                    let msg = format!("__bool__ should return bool, returned {}", self.type_name_of(other));
                    Err(self.type_error(msg))
                }
            };
        }
        if self.types.find_magic(ty, Magic::Len).is_some() {
            return Ok(self.len(v)? != 0);
        }
        Ok(true)
    }

    pub fn hash(&mut self, v: Value) -> PyResult<i64> {
        match v {
            Value::None => return Ok(NONE_HASH),
            Value::Bool(b) => return Ok(b as i64),
            Value::Int(i) => return Ok(i),
            Value::Float(f) => return Ok(hash_float(f)),
            Value::Type(t) => return Ok(t.0 as i64),
            Value::NativeFunc(id) => return Ok(id.0 as i64),
            Value::Object(_) => {
                if let Some(ObjectData::Str(s)) = self.payload_of(v) {
                    return Ok(hash_str(s));
                }
            }
            _ => {}
        }
        match self.types.find_magic(self.type_of(v), Magic::Hash) {
            Some(Value::None) | None => {
                let msg = format!("unhashable type: '{}'", self.type_name_of(v));
                Err(self.type_error(msg))
            }
            Some(f) => match self.call_bound(f, v, &[])? {
                Value::Int(h) => Ok(h),
                _ => Err(self.type_error("__hash__ method should return an integer")),
            },
        }
    }

    pub fn iter(&mut self, v: Value) -> PyResult<Value> {
        match self.types.find_magic(self.type_of(v), Magic::Iter) {
            Some(f) => self.call_bound(f, v, &[]),
            None => {
                let msg = format!("'{}' object is not iterable", self.type_name_of(v));
                Err(self.type_error(msg))
            }
        }
    }

    /// Advances `it`. `Ok(true)` leaves the next item in the return slot;
    /// `Ok(false)` means exhausted.
    pub fn next(&mut self, it: Value) -> PyResult<bool> {
        let Some(f) = self.types.find_magic(self.type_of(it), Magic::Next) else {
            let msg = format!("'{}' object is not an iterator", self.type_name_of(it));
            return Err(self.type_error(msg));
        };
        let saved = (self.curr_exc, self.exc_handled);
        match self.call_bound(f, it, &[]) {
            Ok(_) => Ok(true),
            Err(raised) => {
                if !self.match_exc(TypeId::STOP_ITERATION) {
                    return Err(raised);
                }
                (self.curr_exc, self.exc_handled) = saved;
                self.retval = Value::Nil;
                Ok(false)
            }
        }
    }

    pub fn len(&mut self, v: Value) -> PyResult<usize> {
        match self.payload_of(v) {
            Some(ObjectData::Str(s)) => return Ok(s.chars().count()),
            Some(ObjectData::List(l)) => return Ok(l.items.len()),
            Some(ObjectData::Dict(d)) => return Ok(d.len()),
            _ => {}
        }
        let Some(f) = self.types.find_magic(self.type_of(v), Magic::Len) else {
            let msg = format!("object of type '{}' has no len()", self.type_name_of(v));
            return Err(self.type_error(msg));
        };
        match self.call_bound(f, v, &[])? {
            Value::Int(n) if n >= 0 => Ok(n as usize),
            Value::Int(_) => Err(self.value_error("__len__() should return >= 0")),
            _ => Err(self.type_error("__len__() should return an integer")),
        }
    }

    /// `str(v)` as a str object.
    pub fn str(&mut self, v: Value) -> PyResult<Value> {
        if self.is_type(v, TypeId::STR) {
            return Ok(v);
        }
        self.stringify(v, Magic::Str)
    }

    /// `repr(v)` as a str object.
    pub fn repr(&mut self, v: Value) -> PyResult<Value> {
        self.stringify(v, Magic::Repr)
    }

    fn stringify(&mut self, v: Value, m: Magic) -> PyResult<Value> {
        let f = self
            .types
            .find_magic(self.type_of(v), m)
            .or_else(|| self.types.find_magic(self.type_of(v), Magic::Repr))
            .expect("object defines __repr__");
        let r = self.call_bound(f, v, &[])?;
        if !self.is_instance(r, TypeId::STR) {
            let msg = format!("{}() returned non-string (type {})", m.as_str(), self.type_name_of(r));
            return Err(self.type_error(msg));
        }
        Ok(r)
    }

    pub fn str_string(&mut self, v: Value) -> PyResult<String> {
        let s = self.str(v)?;
        Ok(self.to_str(s).to_owned())
    }

    pub fn repr_string(&mut self, v: Value) -> PyResult<String> {
        let s = self.repr(v)?;
        Ok(self.to_str(s).to_owned())
    }

    /// `item in container`: `__contains__`, else a linear scan of the
    /// container's iterator.
    pub fn contains(&mut self, container: Value, item: Value) -> PyResult<bool> {
        if let Some(f) = self.types.find_magic(self.type_of(container), Magic::Contains) {
            let r = self.call_bound(f, container, &[item])?;
            return self.truthy(r);
        }
        let it = self.iter(container)?;
        self.push(it);
        let res = self.scan_for(it, item);
        self.pop();
        res
    }

    fn scan_for(&mut self, it: Value, item: Value) -> PyResult<bool> {
        while self.next(it)? {
            let v = self.retval;
            if self.equal(v, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn callable(&self, v: Value) -> bool {
        match v {
            Value::NativeFunc(_) | Value::Type(_) => true,
            Value::Object(r) => {
                let ty = self.object(r).ty;
                ty == TypeId::FUNCTION
                    || ty == TypeId::BOUNDMETHOD
                    || self.types.find_magic(ty, Magic::Call).is_some()
            }
            _ => false,
        }
    }

    pub fn getitem(&mut self, obj: Value, key: Value) -> PyResult<Value> {
        match self.types.find_magic(self.type_of(obj), Magic::Getitem) {
            Some(f) => self.call_bound(f, obj, &[key]),
            None => Err(self.protocol_error(obj, "is not subscriptable")),
        }
    }

    pub fn setitem(&mut self, obj: Value, key: Value, val: Value) -> PyResult {
        match self.types.find_magic(self.type_of(obj), Magic::Setitem) {
            Some(f) => self.call_bound(f, obj, &[key, val]).map(drop),
            None => Err(self.protocol_error(obj, "does not support item assignment")),
        }
    }

    pub fn delitem(&mut self, obj: Value, key: Value) -> PyResult {
        match self.types.find_magic(self.type_of(obj), Magic::Delitem) {
            Some(f) => self.call_bound(f, obj, &[key]).map(drop),
            None => Err(self.protocol_error(obj, "does not support item deletion")),
        }
    }

    /// Context-manager entry; the result of `__enter__` is returned.
    pub fn enter(&mut self, v: Value) -> PyResult<Value> {
        match self.types.find_magic(self.type_of(v), Magic::Enter) {
            Some(f) => self.call_bound(f, v, &[]),
            None => Err(self.protocol_error(v, "does not support the context manager protocol")),
        }
    }

    pub fn exit(&mut self, v: Value) -> PyResult {
        match self.types.find_magic(self.type_of(v), Magic::Exit) {
            Some(f) => self.call_bound(f, v, &[]).map(drop),
            None => Err(self.protocol_error(v, "does not support the context manager protocol")),
        }
    }

    fn protocol_error(&mut self, v: Value, what: &str) -> Raised {
        let msg = format!("'{}' object {what}", self.type_name_of(v));
        self.type_error(msg)
    }
}

/// Integral floats hash like the equal int.
pub(crate) fn hash_float(f: f64) -> i64 {
    if f.fract() == 0.0 && f.abs() < 9.2e18 {
        f as i64
    } else {
        f.to_bits() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StackRef;

    #[test]
    fn test_int_arithmetic_and_reflection() {
        let mut vm = Vm::new();
        assert_eq!(vm.binary_add(Value::Int(2), Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(vm.binary_add(Value::Int(2), Value::Float(0.5)).unwrap(), Value::Float(2.5));
        assert_eq!(vm.binary_mul(Value::Float(1.5), Value::Int(2)).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_unsupported_operands() {
        let mut vm = Vm::new();
        let r = vm.reg(0);
        vm.new_str(r, "a");
        let s = vm.get(r);
        assert!(vm.binary_sub(s, Value::Int(1)).is_err());
        assert_eq!(
            vm.format_exc().as_deref(),
            Some("TypeError: unsupported operand type(s) for -: 'str' and 'int'")
        );
    }

    #[test]
    fn test_reflected_operand() {
        fn radd(vm: &mut Vm, argc: usize, _argv: StackRef) -> PyResult {
            vm.check_argc(argc, 2)?;
            vm.set_retval(Value::Int(42));
            Ok(())
        }
        let mut vm = Vm::new();
        let t = vm.new_type("Acc", TypeId::OBJECT, None, None);
        vm.bind_magic(t, Magic::Radd, radd);
        let r = vm.reg(0);
        vm.tp_call(t, &[]).unwrap();
        vm.set(r, vm.retval());
        let obj = vm.get(r);
        assert_eq!(vm.binary_add(Value::Int(1), obj).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_equality_falls_back_to_identity() {
        let mut vm = Vm::new();
        let t = vm.new_type("Plain", TypeId::OBJECT, None, None);
        let r0 = vm.reg(0);
        let r1 = vm.reg(1);
        let a = vm.tp_call(t, &[]).unwrap();
        vm.set(r0, a);
        let b = vm.tp_call(t, &[]).unwrap();
        vm.set(r1, b);
        assert!(vm.equal(a, a).unwrap());
        assert!(!vm.equal(a, b).unwrap());
        assert!(vm.less(a, b).is_err());
        assert!(vm.match_exc(TypeId::TYPE_ERROR));
    }

    #[test]
    fn test_hash_consistency() {
        let mut vm = Vm::new();
        assert_eq!(vm.hash(Value::Int(7)).unwrap(), 7);
        assert_eq!(vm.hash(Value::Float(7.0)).unwrap(), 7);
        assert_eq!(vm.hash(Value::Bool(true)).unwrap(), 1);
        let r = vm.reg(0);
        vm.new_list(r);
        let l = vm.get(r);
        assert!(vm.hash(l).is_err());
        assert_eq!(vm.format_exc().as_deref(), Some("TypeError: unhashable type: 'list'"));
    }

    #[test]
    fn test_truthiness() {
        let mut vm = Vm::new();
        assert!(!vm.truthy(Value::None).unwrap());
        assert!(!vm.truthy(Value::Int(0)).unwrap());
        assert!(vm.truthy(Value::Float(0.1)).unwrap());
        let r = vm.reg(0);
        vm.new_str(r, "");
        assert!(!vm.truthy(vm.get(r)).unwrap());
    }
}
