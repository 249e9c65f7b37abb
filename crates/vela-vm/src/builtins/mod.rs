//! Builtin types, magic methods and the `builtins` module.
//!
//! Everything here is installed into a fresh context before it is handed to
//! the host. Natives follow the argc convention: for magic methods `argv[0]`
//! is the receiver.

mod dict;
mod exception;
mod functions;
mod number;
mod object;
mod sequence;
mod string;

use vela_common_core::{TypeId, BUILTIN_TYPES};
use vela_runtime::{StackRef, Value};

use crate::error::PyResult;
use crate::vm::Vm;

/// Creates `builtins`, `sys` and `__main__` and installs every builtin
/// method. Runs with collection paused.
pub(crate) fn install(vm: &mut Vm) {
    let builtins = Value::Object(vm.new_module("builtins"));
    for b in BUILTIN_TYPES.iter().skip(1) {
        let name = vm.intern(b.name);
        vm.setdict(builtins, name, Value::Type(b.id));
    }

    object::install(vm);
    number::install(vm);
    string::install(vm);
    sequence::install(vm);
    dict::install(vm);
    exception::install(vm);
    functions::install(vm, builtins);

    let sys = Value::Object(vm.new_module("sys"));
    let argv = vm.intern("argv");
    let empty = vm.alloc_list(Vec::new());
    vm.setdict(sys, argv, empty);

    vm.new_module("__main__");
}

/// Python-style float text: integral values keep a trailing `.0`.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if f.fract() == 0.0 && f.abs() < 1e16 {
        return format!("{f:.1}");
    }
    format!("{f}")
}

/// Quoted and escaped form of a string, preferring single quotes.
pub(crate) fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Checks `lo <= argc <= hi` with a message naming the callee.
fn check_argc_range(vm: &mut Vm, name: &str, argc: usize, lo: usize, hi: usize) -> PyResult {
    if (lo..=hi).contains(&argc) {
        return Ok(());
    }
    let msg = if lo == hi {
        format!("{name}() takes exactly {lo} argument(s) ({argc} given)")
    } else {
        format!("{name}() takes from {lo} to {hi} arguments ({argc} given)")
    };
    Err(vm.type_error(msg))
}

/// Appends every item of `iterable` to `list`. Both must be rooted.
fn extend_list(vm: &mut Vm, list: Value, iterable: Value) -> PyResult {
    if vm.is_type(iterable, TypeId::LIST) || vm.is_type(iterable, TypeId::TUPLE) {
        let items = match vm.is_type(iterable, TypeId::LIST) {
            true => vm.list_data(iterable).to_vec(),
            false => vm.tuple_data(iterable).to_vec(),
        };
        for v in items {
            vm.list_append(list, v);
        }
        return Ok(());
    }
    let it = vm.iter(iterable)?;
    vm.push(it);
    let res = drain_into(vm, it, list);
    vm.pop();
    res
}

fn drain_into(vm: &mut Vm, it: Value, list: Value) -> PyResult {
    while vm.next(it)? {
        let v = vm.retval();
        vm.list_append(list, v);
    }
    Ok(())
}

/// Leaves a fresh str in the return slot.
fn return_str(vm: &mut Vm, s: String) -> PyResult {
    let v = vm.alloc_string(s);
    vm.set_retval(v);
    Ok(())
}

fn arg_str(vm: &mut Vm, argv: StackRef, i: usize) -> PyResult<String> {
    let v = vm.arg(argv, i);
    if !vm.is_instance(v, TypeId::STR) {
        let msg = format!("expected 'str' for argument {i}, got '{}'", vm.type_name_of(v));
        return Err(vm.type_error(msg));
    }
    Ok(vm.to_str(v).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
        assert_eq!(format_float(2.25), "2.25");
    }

    #[test]
    fn test_repr_str_quoting() {
        assert_eq!(repr_str("abc"), "'abc'");
        assert_eq!(repr_str("it's"), "\"it's\"");
        assert_eq!(repr_str("a\nb\\"), "'a\\nb\\\\'");
        assert_eq!(repr_str("\u{1}"), "'\\x01'");
    }

    #[test]
    fn test_builtin_type_names_resolve() {
        let vm = Vm::new();
        let int = vm.names.get("int").unwrap();
        assert_eq!(vm.get_builtin(int), Some(Value::Type(TypeId::INT)));
        assert!(vm.get_module("sys").is_some());
        assert!(vm.get_module("__main__").is_some());
    }
}
