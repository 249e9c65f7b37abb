//! `int`, `float` and `bool`.
//!
//! The arithmetic natives are shared by `int` and `float`: mixed operands
//! widen to float, and a non-numeric operand yields `NotImplemented` so the
//! other side gets its turn.

use vela_common_core::{Magic, TypeId};
use vela_runtime::{StackRef, Value};

use super::{check_argc_range, format_float, return_str};
use crate::error::PyResult;
use crate::vm::{hash_float, Vm};

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(v: Value) -> Option<Num> {
        match v {
            Value::Float(f) => Some(Num::Float(f)),
            _ => v.as_int().map(Num::Int),
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
}

pub(super) fn install(vm: &mut Vm) {
    for t in [TypeId::INT, TypeId::FLOAT] {
        vm.bind_magic(t, Magic::Add, num_add);
        vm.bind_magic(t, Magic::Radd, num_radd);
        vm.bind_magic(t, Magic::Sub, num_sub);
        vm.bind_magic(t, Magic::Rsub, num_rsub);
        vm.bind_magic(t, Magic::Mul, num_mul);
        vm.bind_magic(t, Magic::Rmul, num_rmul);
        vm.bind_magic(t, Magic::Truediv, num_truediv);
        vm.bind_magic(t, Magic::Rtruediv, num_rtruediv);
        vm.bind_magic(t, Magic::Floordiv, num_floordiv);
        vm.bind_magic(t, Magic::Rfloordiv, num_rfloordiv);
        vm.bind_magic(t, Magic::Mod, num_mod);
        vm.bind_magic(t, Magic::Rmod, num_rmod);
        vm.bind_magic(t, Magic::Pow, num_pow);
        vm.bind_magic(t, Magic::Rpow, num_rpow);
        vm.bind_magic(t, Magic::Lt, num_lt);
        vm.bind_magic(t, Magic::Le, num_le);
        vm.bind_magic(t, Magic::Gt, num_gt);
        vm.bind_magic(t, Magic::Ge, num_ge);
        vm.bind_magic(t, Magic::Eq, num_eq);
        vm.bind_magic(t, Magic::Ne, num_ne);
        vm.bind_magic(t, Magic::Neg, num_neg);
        vm.bind_magic(t, Magic::Abs, num_abs);
        vm.bind_magic(t, Magic::Bool, num_bool);
        vm.bind_magic(t, Magic::Hash, num_hash);
        vm.bind_magic(t, Magic::Round, num_round);
        vm.bind_magic(t, Magic::Divmod, num_divmod);
    }
    vm.bind_magic(TypeId::INT, Magic::New, int_new);
    vm.bind_magic(TypeId::INT, Magic::Repr, int_repr);
    vm.bind_magic(TypeId::INT, Magic::Invert, int_invert);
    vm.bind_magic(TypeId::INT, Magic::Lshift, int_lshift);
    vm.bind_magic(TypeId::INT, Magic::Rshift, int_rshift);
    vm.bind_magic(TypeId::INT, Magic::And, int_and);
    vm.bind_magic(TypeId::INT, Magic::Or, int_or);
    vm.bind_magic(TypeId::INT, Magic::Xor, int_xor);

    vm.bind_magic(TypeId::FLOAT, Magic::New, float_new);
    vm.bind_magic(TypeId::FLOAT, Magic::Repr, float_repr);

    vm.bind_magic(TypeId::BOOL, Magic::New, bool_new);
    vm.bind_magic(TypeId::BOOL, Magic::Repr, bool_repr);
}

// =========================================================================
// Arithmetic
// =========================================================================

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

fn arith(vm: &mut Vm, op: Arith, a: Num, b: Num) -> PyResult<Value> {
    let divides = matches!(op, Arith::TrueDiv | Arith::FloorDiv | Arith::Mod);
    if divides && b.to_f64() == 0.0 {
        return Err(vm.zero_division_error("division by zero"));
    }
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        let v = match op {
            Arith::Add => Value::Int(x.wrapping_add(y)),
            Arith::Sub => Value::Int(x.wrapping_sub(y)),
            Arith::Mul => Value::Int(x.wrapping_mul(y)),
            Arith::TrueDiv => Value::Float(x as f64 / y as f64),
            Arith::FloorDiv => Value::Int(floor_div(x, y)),
            Arith::Mod => Value::Int(floor_mod(x, y)),
            Arith::Pow if y >= 0 => match u32::try_from(y).ok().and_then(|e| x.checked_pow(e)) {
                Some(p) => Value::Int(p),
                None => Value::Float((x as f64).powf(y as f64)),
            },
            Arith::Pow => Value::Float((x as f64).powf(y as f64)),
        };
        return Ok(v);
    }
    let (x, y) = (a.to_f64(), b.to_f64());
    Ok(Value::Float(match op {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::TrueDiv => x / y,
        Arith::FloorDiv => (x / y).floor(),
        Arith::Mod => float_mod(x, y),
        Arith::Pow => x.powf(y),
    }))
}

fn binary(vm: &mut Vm, argc: usize, argv: StackRef, op: Arith, reflected: bool) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (mut a, mut b) = (vm.arg(argv, 0), vm.arg(argv, 1));
    if reflected {
        core::mem::swap(&mut a, &mut b);
    }
    let r = match (Num::of(a), Num::of(b)) {
        (Some(x), Some(y)) => arith(vm, op, x, y)?,
        _ => Value::NotImplemented,
    };
    vm.set_retval(r);
    Ok(())
}

fn num_add(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Add, false)
}

fn num_radd(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Add, true)
}

fn num_sub(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Sub, false)
}

fn num_rsub(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Sub, true)
}

fn num_mul(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Mul, false)
}

fn num_rmul(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Mul, true)
}

fn num_truediv(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::TrueDiv, false)
}

fn num_rtruediv(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::TrueDiv, true)
}

fn num_floordiv(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::FloorDiv, false)
}

fn num_rfloordiv(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::FloorDiv, true)
}

fn num_mod(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Mod, false)
}

fn num_rmod(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Mod, true)
}

fn num_pow(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Pow, false)
}

fn num_rpow(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    binary(vm, argc, argv, Arith::Pow, true)
}

/// `divmod(a, b)` as a `(floordiv, mod)` tuple.
fn num_divmod(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (Some(a), Some(b)) = (Num::of(vm.arg(argv, 0)), Num::of(vm.arg(argv, 1))) else {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    };
    let q = arith(vm, Arith::FloorDiv, a, b)?;
    let r = arith(vm, Arith::Mod, a, b)?;
    let t = vm.alloc_tuple(&[q, r]);
    vm.set_retval(t);
    Ok(())
}

fn int_bits(vm: &mut Vm, argc: usize, argv: StackRef, m: Magic) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (Some(a), Some(b)) = (vm.arg(argv, 0).as_int(), vm.arg(argv, 1).as_int()) else {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    };
    let v = match m {
        Magic::And => a & b,
        Magic::Or => a | b,
        Magic::Xor => a ^ b,
        Magic::Lshift | Magic::Rshift if b < 0 => return Err(vm.value_error("negative shift count")),
        Magic::Lshift => a.checked_shl(b.min(63) as u32).unwrap_or(0),
        Magic::Rshift => a >> b.min(63),
        other => unreachable!("{other:?} is not a bitwise operator"),
    };
    vm.set_retval(Value::Int(v));
    Ok(())
}

fn int_lshift(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    int_bits(vm, argc, argv, Magic::Lshift)
}

fn int_rshift(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    int_bits(vm, argc, argv, Magic::Rshift)
}

fn int_and(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    int_bits(vm, argc, argv, Magic::And)
}

fn int_or(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    int_bits(vm, argc, argv, Magic::Or)
}

fn int_xor(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    int_bits(vm, argc, argv, Magic::Xor)
}

// =========================================================================
// Comparison
// =========================================================================

fn compare(vm: &mut Vm, argc: usize, argv: StackRef, m: Magic) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (a, b) = match (Num::of(vm.arg(argv, 0)), Num::of(vm.arg(argv, 1))) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            vm.set_retval(Value::NotImplemented);
            return Ok(());
        }
    };
    let ord = match (a, b) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
        _ => a.to_f64().partial_cmp(&b.to_f64()),
    };
    let r = match m {
        Magic::Lt => ord.is_some_and(|o| o.is_lt()),
        Magic::Le => ord.is_some_and(|o| o.is_le()),
        Magic::Gt => ord.is_some_and(|o| o.is_gt()),
        Magic::Ge => ord.is_some_and(|o| o.is_ge()),
        Magic::Eq => ord.is_some_and(|o| o.is_eq()),
        Magic::Ne => !ord.is_some_and(|o| o.is_eq()),
        other => unreachable!("{other:?} is not a comparison"),
    };
    vm.set_retval(Value::Bool(r));
    Ok(())
}

fn num_lt(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    compare(vm, argc, argv, Magic::Lt)
}

fn num_le(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    compare(vm, argc, argv, Magic::Le)
}

fn num_gt(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    compare(vm, argc, argv, Magic::Gt)
}

fn num_ge(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    compare(vm, argc, argv, Magic::Ge)
}

fn num_eq(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    compare(vm, argc, argv, Magic::Eq)
}

fn num_ne(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    compare(vm, argc, argv, Magic::Ne)
}

// =========================================================================
// Unary and conversions
// =========================================================================

fn num_neg(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let r = match Num::of(vm.arg(argv, 0)) {
        Some(Num::Int(i)) => Value::Int(i.wrapping_neg()),
        Some(Num::Float(f)) => Value::Float(-f),
        None => Value::NotImplemented,
    };
    vm.set_retval(r);
    Ok(())
}

fn num_abs(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let r = match Num::of(vm.arg(argv, 0)) {
        Some(Num::Int(i)) => Value::Int(i.wrapping_abs()),
        Some(Num::Float(f)) => Value::Float(f.abs()),
        None => Value::NotImplemented,
    };
    vm.set_retval(r);
    Ok(())
}

fn int_invert(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let i = vm.cast_int(vm.arg(argv, 0))?;
    vm.set_retval(Value::Int(!i));
    Ok(())
}

fn num_bool(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let f = vm.cast_float(vm.arg(argv, 0))?;
    vm.set_retval(Value::Bool(f != 0.0));
    Ok(())
}

fn num_hash(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let h = match Num::of(vm.arg(argv, 0)) {
        Some(Num::Int(i)) => i,
        Some(Num::Float(f)) => hash_float(f),
        None => return Err(vm.type_error("expected a number")),
    };
    vm.set_retval(Value::Int(h));
    Ok(())
}

/// `round(x, ndigits=None)`: ints are returned unchanged; floats round half
/// to even.
fn num_round(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "round", argc, 1, 2)?;
    let ndigits = match argc {
        2 if !vm.arg(argv, 1).is_none() => Some(vm.cast_int(vm.arg(argv, 1))?),
        _ => None,
    };
    let r = match (Num::of(vm.arg(argv, 0)), ndigits) {
        (Some(Num::Int(i)), _) => Value::Int(i),
        (Some(Num::Float(f)), None) => Value::Int(f.round_ties_even() as i64),
        (Some(Num::Float(f)), Some(n)) => {
            let scale = 10f64.powi(n.clamp(-308, 308) as i32);
            Value::Float((f * scale).round_ties_even() / scale)
        }
        (None, _) => Value::NotImplemented,
    };
    vm.set_retval(r);
    Ok(())
}

fn int_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let i = vm.to_int(vm.arg(argv, 0));
    return_str(vm, i.to_string())
}

fn float_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let f = vm.to_float(vm.arg(argv, 0));
    return_str(vm, format_float(f))
}

fn bool_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let s = if vm.to_bool(vm.arg(argv, 0)) { "True" } else { "False" };
    return_str(vm, s.to_owned())
}

/// `int(x=0)`: truncates floats and parses decimal strings.
fn int_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "int", argc, 1, 2)?;
    if argc == 1 {
        vm.set_retval(Value::Int(0));
        return Ok(());
    }
    let x = vm.arg(argv, 1);
    let i = match x {
        Value::Int(i) => i,
        Value::Bool(b) => b as i64,
        Value::Float(f) if f.is_finite() => f.trunc() as i64,
        Value::Float(f) => {
            let msg = format!("cannot convert float {} to integer", format_float(f));
            return Err(vm.value_error(msg));
        }
        _ if vm.is_instance(x, TypeId::STR) => {
            let text = vm.to_str(x).trim().replace('_', "");
            match text.parse::<i64>() {
                Ok(i) => i,
                Err(_) => {
                    let msg = format!("invalid literal for int() with base 10: {}", vm.display_value(x, true));
                    return Err(vm.value_error(msg));
                }
            }
        }
        _ => {
            let msg = format!(
                "int() argument must be a string or a number, not '{}'",
                vm.type_name_of(x)
            );
            return Err(vm.type_error(msg));
        }
    };
    vm.set_retval(Value::Int(i));
    Ok(())
}

/// `float(x=0.0)`.
fn float_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "float", argc, 1, 2)?;
    if argc == 1 {
        vm.set_retval(Value::Float(0.0));
        return Ok(());
    }
    let x = vm.arg(argv, 1);
    let f = match x.as_number() {
        Some(f) => f,
        None if vm.is_instance(x, TypeId::STR) => match vm.to_str(x).trim().parse::<f64>() {
            Ok(f) => f,
            Err(_) => {
                let msg = format!("could not convert string to float: {}", vm.display_value(x, true));
                return Err(vm.value_error(msg));
            }
        },
        None => {
            let msg = format!("float() argument must be a string or a number, not '{}'", vm.type_name_of(x));
            return Err(vm.type_error(msg));
        }
    };
    vm.set_retval(Value::Float(f));
    Ok(())
}

/// `bool(x=False)`.
fn bool_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "bool", argc, 1, 2)?;
    let b = if argc == 1 { false } else { vm.truthy(vm.arg(argv, 1))? };
    vm.set_retval(Value::Bool(b));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_floor_semantics() {
        let mut vm = Vm::new();
        assert_eq!(vm.binary_floordiv(Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(vm.binary_mod(Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(vm.binary_mod(Value::Float(-1.0), Value::Float(3.0)).unwrap(), Value::Float(2.0));
        assert_eq!(vm.binary_truediv(Value::Int(1), Value::Int(4)).unwrap(), Value::Float(0.25));
    }

    #[test]
    fn test_division_by_zero() {
        let mut vm = Vm::new();
        assert!(vm.binary_floordiv(Value::Int(1), Value::Int(0)).is_err());
        assert_eq!(vm.format_exc().as_deref(), Some("ZeroDivisionError: division by zero"));
    }

    #[test]
    fn test_pow_and_bits() {
        let mut vm = Vm::new();
        assert_eq!(vm.binary_pow(Value::Int(2), Value::Int(10)).unwrap(), Value::Int(1024));
        assert_eq!(vm.binary_pow(Value::Int(2), Value::Int(-1)).unwrap(), Value::Float(0.5));
        assert_eq!(vm.binary_lshift(Value::Int(1), Value::Int(4)).unwrap(), Value::Int(16));
        assert_eq!(vm.binary_xor(Value::Int(6), Value::Int(3)).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_mixed_comparison() {
        let mut vm = Vm::new();
        assert!(vm.less(Value::Int(1), Value::Float(1.5)).unwrap());
        assert!(vm.equal(Value::Int(2), Value::Float(2.0)).unwrap());
        assert!(vm.equal(Value::Bool(true), Value::Int(1)).unwrap());
        assert!(!vm.equal(Value::Float(f64::NAN), Value::Float(f64::NAN)).unwrap());
    }

    #[test]
    fn test_constructors() {
        let mut vm = Vm::new();
        let r = vm.reg(0);
        vm.new_str(r, " 42 ");
        let s = vm.get(r);
        assert_eq!(vm.tp_call(TypeId::INT, &[s]).unwrap(), Value::Int(42));
        assert_eq!(vm.tp_call(TypeId::INT, &[Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(vm.tp_call(TypeId::FLOAT, &[s]).unwrap(), Value::Float(42.0));
        assert_eq!(vm.tp_call(TypeId::BOOL, &[Value::Int(3)]).unwrap(), Value::Bool(true));
        vm.new_str(r, "x1");
        let bad = vm.get(r);
        assert!(vm.tp_call(TypeId::INT, &[bad]).is_err());
        assert_eq!(
            vm.format_exc().as_deref(),
            Some("ValueError: invalid literal for int() with base 10: 'x1'")
        );
    }

    #[test]
    fn test_reprs() {
        let mut vm = Vm::new();
        assert_eq!(vm.repr_string(Value::Int(-3)).unwrap(), "-3");
        assert_eq!(vm.repr_string(Value::Float(2.0)).unwrap(), "2.0");
        assert_eq!(vm.repr_string(Value::Bool(false)).unwrap(), "False");
        assert_eq!(vm.str_string(Value::Bool(true)).unwrap(), "True");
    }
}
