//! `list`, `tuple`, `range`, `slice` and the array iterator.
//!
//! `array_iterator` walks lists, tuples and dicts; over a dict it yields
//! keys, or `(key, value)` tuples in pairs mode.

use vela_common_core::{Magic, TypeId};
use vela_runtime::{IterMode, Object, ObjectData, StackRef, Value};

use super::string::iter_self;
use super::{check_argc_range, extend_list, return_str};
use crate::error::PyResult;
use crate::vm::Vm;

pub(super) fn install(vm: &mut Vm) {
    let l = TypeId::LIST;
    vm.bind_magic(l, Magic::New, list_new);
    vm.bind_magic(l, Magic::Len, seq_len);
    vm.bind_magic(l, Magic::Getitem, seq_getitem);
    vm.bind_magic(l, Magic::Setitem, list_setitem);
    vm.bind_magic(l, Magic::Delitem, list_delitem);
    vm.bind_magic(l, Magic::Contains, seq_contains);
    vm.bind_magic(l, Magic::Iter, seq_iter);
    vm.bind_magic(l, Magic::Eq, seq_eq);
    vm.bind_magic(l, Magic::Add, seq_add);
    vm.bind_magic(l, Magic::Mul, seq_mul);
    vm.bind_magic(l, Magic::Rmul, seq_mul);
    vm.bind_magic(l, Magic::Repr, seq_repr);
    vm.types.get_mut(l).magic[Magic::Hash.index()] = Value::None;
    vm.bind_method(l, "append", list_append);
    vm.bind_method(l, "extend", list_extend);
    vm.bind_method(l, "insert", list_insert);
    vm.bind_method(l, "pop", list_pop);
    vm.bind_method(l, "clear", list_clear);
    vm.bind_method(l, "reverse", list_reverse);
    vm.bind_method(l, "index", seq_index);
    vm.bind_method(l, "copy", list_copy);

    let t = TypeId::TUPLE;
    vm.bind_magic(t, Magic::New, tuple_new);
    vm.bind_magic(t, Magic::Len, seq_len);
    vm.bind_magic(t, Magic::Getitem, seq_getitem);
    vm.bind_magic(t, Magic::Contains, seq_contains);
    vm.bind_magic(t, Magic::Iter, seq_iter);
    vm.bind_magic(t, Magic::Eq, seq_eq);
    vm.bind_magic(t, Magic::Add, seq_add);
    vm.bind_magic(t, Magic::Mul, seq_mul);
    vm.bind_magic(t, Magic::Rmul, seq_mul);
    vm.bind_magic(t, Magic::Hash, tuple_hash);
    vm.bind_magic(t, Magic::Repr, seq_repr);
    vm.bind_method(t, "index", seq_index);

    vm.bind_magic(TypeId::ARRAY_ITERATOR, Magic::Iter, iter_self);
    vm.bind_magic(TypeId::ARRAY_ITERATOR, Magic::Next, array_iterator_next);

    let r = TypeId::RANGE;
    vm.bind_magic(r, Magic::New, range_new);
    vm.bind_magic(r, Magic::Len, range_len);
    vm.bind_magic(r, Magic::Iter, range_iter);
    vm.bind_magic(r, Magic::Repr, range_repr);
    vm.bind_magic(TypeId::RANGE_ITERATOR, Magic::Iter, iter_self);
    vm.bind_magic(TypeId::RANGE_ITERATOR, Magic::Next, range_iterator_next);

    vm.bind_magic(TypeId::SLICE, Magic::New, slice_new);
    vm.bind_magic(TypeId::SLICE, Magic::Repr, slice_repr);
}

/// Elements of a list or tuple.
fn items_of(vm: &Vm, v: Value) -> Vec<Value> {
    if vm.is_type(v, TypeId::LIST) {
        vm.list_data(v).to_vec()
    } else {
        vm.tuple_data(v).to_vec()
    }
}

/// Builds a list or tuple of type `ty` into the return slot.
fn new_seq(vm: &mut Vm, ty: TypeId, items: Vec<Value>) {
    let v = if ty == TypeId::LIST { vm.alloc_list(items) } else { vm.alloc_tuple(&items) };
    vm.set_retval(v);
}

// =========================================================================
// Slices
// =========================================================================

/// Positions selected by a slice over a sequence of length `len`.
pub(super) struct SliceIndices {
    next: i64,
    step: i64,
    remaining: usize,
}

impl Iterator for SliceIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let i = self.next;
        self.next = self.next.wrapping_add(self.step);
        self.remaining -= 1;
        Some(i as usize)
    }
}

fn slice_bound(vm: &mut Vm, v: Value) -> PyResult<Option<i64>> {
    match v {
        Value::None | Value::Nil => Ok(None),
        _ => match v.as_int() {
            Some(i) => Ok(Some(i)),
            None => Err(vm.type_error("slice indices must be integers or None")),
        },
    }
}

/// Clamps a slice against `len` the way sequence slicing does.
pub(super) fn slice_indices(vm: &mut Vm, slice: Value, len: usize) -> PyResult<SliceIndices> {
    let bounds = [vm.getslot(slice, 0), vm.getslot(slice, 1), vm.getslot(slice, 2)];
    let start = slice_bound(vm, bounds[0])?;
    let stop = slice_bound(vm, bounds[1])?;
    let step = slice_bound(vm, bounds[2])?.unwrap_or(1);
    if step == 0 {
        return Err(vm.value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |i: i64, lo: i64, hi: i64| {
        let i = if i < 0 { i + len } else { i };
        i.clamp(lo, hi)
    };
    let (start, stop) = if step > 0 {
        (start.map_or(0, |i| clamp(i, 0, len)), stop.map_or(len, |i| clamp(i, 0, len)))
    } else {
        (start.map_or(len - 1, |i| clamp(i, -1, len - 1)), stop.map_or(-1, |i| clamp(i, -1, len - 1)))
    };
    let remaining = range_len_of(start, stop, step) as usize;
    Ok(SliceIndices { next: start, step, remaining })
}

/// `slice(stop)` or `slice(start, stop, step=None)`.
fn slice_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "slice", argc, 2, 4)?;
    let slots = match argc {
        2 => [Value::None, vm.arg(argv, 1), Value::None],
        3 => [vm.arg(argv, 1), vm.arg(argv, 2), Value::None],
        _ => [vm.arg(argv, 1), vm.arg(argv, 2), vm.arg(argv, 3)],
    };
    let v = vm.alloc_with_slots(TypeId::SLICE, &slots);
    vm.set_retval(v);
    Ok(())
}

fn slice_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let s = vm.arg(argv, 0);
    let mut parts = Vec::with_capacity(3);
    for i in 0..3 {
        let v = vm.getslot(s, i);
        let v = if v.is_nil() { Value::None } else { v };
        parts.push(vm.repr_string(v)?);
    }
    return_str(vm, format!("slice({})", parts.join(", ")))
}

// =========================================================================
// Shared list/tuple magic
// =========================================================================

fn seq_len(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let n = items_of(vm, vm.arg(argv, 0)).len();
    vm.set_retval(Value::Int(n as i64));
    Ok(())
}

fn seq_getitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (seq, key) = (vm.arg(argv, 0), vm.arg(argv, 1));
    let items = items_of(vm, seq);
    if vm.is_type(key, TypeId::SLICE) {
        let picked = slice_indices(vm, key, items.len())?.map(|i| items[i]).collect();
        let ty = vm.type_of(seq);
        new_seq(vm, ty, picked);
        return Ok(());
    }
    let what = if vm.is_type(seq, TypeId::LIST) { "list" } else { "tuple" };
    let i = vm.cast_int(key)?;
    let i = vm.normalize_index(i, items.len(), what)?;
    vm.set_retval(items[i]);
    Ok(())
}

fn seq_contains(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let needle = vm.arg(argv, 1);
    for v in items_of(vm, vm.arg(argv, 0)) {
        if vm.equal(v, needle)? {
            vm.set_retval(Value::Bool(true));
            return Ok(());
        }
    }
    vm.set_retval(Value::Bool(false));
    Ok(())
}

fn seq_iter(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let it = vm.alloc_iter(TypeId::ARRAY_ITERATOR, vm.arg(argv, 0), IterMode::Items);
    vm.set_retval(it);
    Ok(())
}

/// Elementwise equality against a sequence of the same type.
fn seq_eq(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (a, b) = (vm.arg(argv, 0), vm.arg(argv, 1));
    if vm.type_of(a) != vm.type_of(b) {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    }
    let (xs, ys) = (items_of(vm, a), items_of(vm, b));
    let mut same = xs.len() == ys.len();
    for (x, y) in xs.into_iter().zip(ys) {
        if !same {
            break;
        }
        same = vm.equal(x, y)?;
    }
    vm.set_retval(Value::Bool(same));
    Ok(())
}

fn seq_add(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (a, b) = (vm.arg(argv, 0), vm.arg(argv, 1));
    if vm.type_of(a) != vm.type_of(b) {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    }
    let mut items = items_of(vm, a);
    items.extend(items_of(vm, b));
    let ty = vm.type_of(a);
    new_seq(vm, ty, items);
    Ok(())
}

fn seq_mul(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let seq = vm.arg(argv, 0);
    let Some(n) = vm.arg(argv, 1).as_int() else {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    };
    let items = items_of(vm, seq).repeat(n.max(0) as usize);
    let ty = vm.type_of(seq);
    new_seq(vm, ty, items);
    Ok(())
}

fn seq_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let seq = vm.arg(argv, 0);
    let items = items_of(vm, seq);
    let mut parts = Vec::with_capacity(items.len());
    for v in items.iter().copied() {
        parts.push(if vm.is_identical(v, seq) { "[...]".to_owned() } else { vm.repr_string(v)? });
    }
    let s = if vm.is_type(seq, TypeId::LIST) {
        format!("[{}]", parts.join(", "))
    } else if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    };
    return_str(vm, s)
}

fn seq_index(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let needle = vm.arg(argv, 1);
    for (i, v) in items_of(vm, vm.arg(argv, 0)).into_iter().enumerate() {
        if vm.equal(v, needle)? {
            vm.set_retval(Value::Int(i as i64));
            return Ok(());
        }
    }
    let msg = format!("{} is not in list", vm.repr_string(needle)?);
    Err(vm.value_error(msg))
}

// =========================================================================
// list
// =========================================================================

/// `list(iterable=())`.
fn list_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "list", argc, 1, 2)?;
    let src = vm.arg(argv, argc - 1);
    let tmp = vm.push_tmp();
    let list = vm.alloc_list(Vec::new());
    vm.set(tmp, list);
    let res = if argc == 2 { extend_list(vm, list, src) } else { Ok(()) };
    vm.pop();
    res?;
    vm.set_retval(list);
    Ok(())
}

fn list_setitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 3)?;
    let (list, key, val) = (vm.arg(argv, 0), vm.arg(argv, 1), vm.arg(argv, 2));
    let i = vm.cast_int(key)?;
    let i = vm.normalize_index(i, vm.list_len(list), "list assignment")?;
    vm.list_setitem(list, i, val);
    Ok(())
}

fn list_delitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (list, key) = (vm.arg(argv, 0), vm.arg(argv, 1));
    let i = vm.cast_int(key)?;
    let i = vm.normalize_index(i, vm.list_len(list), "list assignment")?;
    vm.list_delitem(list, i);
    Ok(())
}

fn list_append(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (list, v) = (vm.arg(argv, 0), vm.arg(argv, 1));
    vm.list_append(list, v);
    Ok(())
}

fn list_extend(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (list, src) = (vm.arg(argv, 0), vm.arg(argv, 1));
    extend_list(vm, list, src)
}

fn list_insert(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 3)?;
    let list = vm.arg(argv, 0);
    let len = vm.list_len(list) as i64;
    let i = vm.cast_int(vm.arg(argv, 1))?;
    let i = if i < 0 { (i + len).max(0) } else { i.min(len) };
    vm.list_insert(list, i as usize, vm.arg(argv, 2));
    Ok(())
}

/// `pop(i=-1)`.
fn list_pop(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "pop", argc, 1, 2)?;
    let list = vm.arg(argv, 0);
    if vm.list_len(list) == 0 {
        return Err(vm.index_error("pop from empty list"));
    }
    let i = if argc == 2 { vm.cast_int(vm.arg(argv, 1))? } else { -1 };
    let i = vm.normalize_index(i, vm.list_len(list), "pop")?;
    let v = vm.list_getitem(list, i);
    // the list slot keeps `v` alive until it is in the return slot
    vm.set_retval(v);
    vm.list_delitem(list, i);
    Ok(())
}

fn list_clear(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    vm.list_clear(vm.arg(argv, 0));
    Ok(())
}

fn list_reverse(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let list = vm.arg(argv, 0);
    let n = vm.list_len(list);
    for i in 0..n / 2 {
        vm.list_swap(list, i, n - 1 - i);
    }
    Ok(())
}

fn list_copy(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let items = vm.list_data(vm.arg(argv, 0)).to_vec();
    new_seq(vm, TypeId::LIST, items);
    Ok(())
}

// =========================================================================
// tuple
// =========================================================================

/// `tuple(iterable=())`.
fn tuple_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "tuple", argc, 1, 2)?;
    if argc == 2 && vm.is_type(vm.arg(argv, 1), TypeId::TUPLE) {
        vm.set_retval(vm.arg(argv, 1));
        return Ok(());
    }
    let src = vm.arg(argv, argc - 1);
    let tmp = vm.push_tmp();
    let list = vm.alloc_list(Vec::new());
    vm.set(tmp, list);
    let res = if argc == 2 { extend_list(vm, list, src) } else { Ok(()) };
    if res.is_ok() {
        let items = vm.list_data(list).to_vec();
        let t = vm.alloc_tuple(&items);
        vm.set_retval(t);
    }
    vm.pop();
    res
}

fn tuple_hash(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let mut h: i64 = 0x345678;
    for v in vm.tuple_data(vm.arg(argv, 0)).to_vec() {
        h = (h ^ vm.hash(v)?).wrapping_mul(1_000_003);
    }
    vm.set_retval(Value::Int(h));
    Ok(())
}

// =========================================================================
// array_iterator
// =========================================================================

fn array_iterator_next(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let r = vm.arg(argv, 0).as_object().expect("iterator is a heap object");
    let (target, index, mode) = match &vm.object(r).data {
        ObjectData::Iter(it) => (it.target, it.index, it.mode),
        _ => panic!("expected array_iterator"),
    };
    let (item, next_index) = match vm.payload_of(target) {
        Some(ObjectData::Dict(d)) => match d.next_live(index) {
            Some((i, e)) => (Some((e.key, e.val)), i + 1),
            None => (None, index),
        },
        _ => {
            let items = items_of(vm, target);
            (items.get(index).map(|&v| (v, Value::Nil)), index + 1)
        }
    };
    let Some((key, val)) = item else {
        return Err(vm.stop_iteration());
    };
    if let ObjectData::Iter(it) = &mut vm.object_mut(r).data {
        it.index = next_index;
    }
    let out = match mode {
        IterMode::Pairs => vm.alloc_tuple(&[key, val]),
        IterMode::Items => key,
    };
    vm.set_retval(out);
    Ok(())
}

// =========================================================================
// range
// =========================================================================

/// Element count, widened so extreme bounds cannot overflow. Saturates at
/// `i64::MAX`.
fn range_len_of(start: i64, stop: i64, step: i64) -> i64 {
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let n = if step > 0 && stop > start {
        (stop - start - 1) / step + 1
    } else if step < 0 && start > stop {
        (start - stop - 1) / -step + 1
    } else {
        0
    };
    n.min(i64::MAX as i128) as i64
}

fn range_fields(vm: &Vm, v: Value) -> (i64, i64, i64) {
    match vm.payload_of(v) {
        Some(ObjectData::Range { start, stop, step }) => (*start, *stop, *step),
        _ => panic!("expected range"),
    }
}

/// `range(stop)` or `range(start, stop, step=1)`.
fn range_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "range", argc, 2, 4)?;
    let mut args = [0i64; 3];
    for (i, slot) in args.iter_mut().enumerate().take(argc - 1) {
        *slot = vm.cast_int(vm.arg(argv, i + 1))?;
    }
    let (start, stop, step) = match argc {
        2 => (0, args[0], 1),
        3 => (args[0], args[1], 1),
        _ => (args[0], args[1], args[2]),
    };
    if step == 0 {
        return Err(vm.value_error("range() arg 3 must not be zero"));
    }
    let r = vm.alloc(Object::new(TypeId::RANGE, ObjectData::Range { start, stop, step }));
    vm.set_retval(Value::Object(r));
    Ok(())
}

fn range_len(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let (start, stop, step) = range_fields(vm, vm.arg(argv, 0));
    vm.set_retval(Value::Int(range_len_of(start, stop, step)));
    Ok(())
}

fn range_iter(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let (current, stop, step) = range_fields(vm, vm.arg(argv, 0));
    let r = vm.alloc(Object::new(TypeId::RANGE_ITERATOR, ObjectData::RangeIter { current, stop, step }));
    vm.set_retval(Value::Object(r));
    Ok(())
}

fn range_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let (start, stop, step) = range_fields(vm, vm.arg(argv, 0));
    let s = if step == 1 { format!("range({start}, {stop})") } else { format!("range({start}, {stop}, {step})") };
    return_str(vm, s)
}

fn range_iterator_next(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let r = vm.arg(argv, 0).as_object().expect("iterator is a heap object");
    let next = match &mut vm.object_mut(r).data {
        ObjectData::RangeIter { current, stop, step } => {
            let live = if *step > 0 { *current < *stop } else { *current > *stop };
            live.then(|| {
                let v = *current;
                // stepping past i64 ends the range
                *current = current.checked_add(*step).unwrap_or(*stop);
                v
            })
        }
        _ => panic!("expected range_iterator"),
    };
    match next {
        Some(i) => {
            vm.set_retval(Value::Int(i));
            Ok(())
        }
        None => Err(vm.stop_iteration()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect_ints(vm: &mut Vm, iterable: Value) -> Vec<i64> {
        let it = vm.iter(iterable).unwrap();
        vm.push(it);
        let mut out = Vec::new();
        while vm.next(it).unwrap() {
            out.push(vm.to_int(vm.retval()));
        }
        vm.pop();
        out
    }

    #[test]
    fn test_range_iteration() {
        let mut vm = Vm::new();
        let r = vm.tp_call(TypeId::RANGE, &[Value::Int(5), Value::Int(-1), Value::Int(-2)]).unwrap();
        let r0 = vm.reg(0);
        vm.set(r0, r);
        assert_eq!(collect_ints(&mut vm, r), vec![5, 3, 1]);
        assert_eq!(vm.len(r).unwrap(), 3);
        assert_eq!(vm.repr_string(r).unwrap(), "range(5, -1, -2)");
    }

    #[test]
    fn test_range_near_i64_limits() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        let r = vm.tp_call(TypeId::RANGE, &[Value::Int(i64::MAX - 3), Value::Int(i64::MAX), Value::Int(2)]).unwrap();
        vm.set(r0, r);
        assert_eq!(collect_ints(&mut vm, r), vec![i64::MAX - 3, i64::MAX - 1]);

        let r = vm.tp_call(TypeId::RANGE, &[Value::Int(i64::MIN + 1), Value::Int(i64::MIN), Value::Int(-1)]).unwrap();
        vm.set(r0, r);
        assert_eq!(collect_ints(&mut vm, r), vec![i64::MIN + 1]);

        let r = vm.tp_call(TypeId::RANGE, &[Value::Int(i64::MIN), Value::Int(i64::MAX)]).unwrap();
        vm.set(r0, r);
        assert_eq!(vm.len(r).unwrap(), i64::MAX as usize);
        assert_eq!(range_len_of(0, 10, i64::MIN), 0);
        assert_eq!(range_len_of(10, 0, i64::MIN), 1);

        let last = SliceIndices { next: 5, step: i64::MAX, remaining: 1 };
        assert_eq!(last.collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_list_from_range_and_slicing() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        let r = vm.tp_call(TypeId::RANGE, &[Value::Int(6)]).unwrap();
        vm.set(r0, r);
        let l = vm.tp_call(TypeId::LIST, &[r]).unwrap();
        vm.set(r0, l);
        assert_eq!(vm.repr_string(l).unwrap(), "[0, 1, 2, 3, 4, 5]");

        let s = vm.tp_call(TypeId::SLICE, &[Value::None, Value::None, Value::Int(-2)]).unwrap();
        let r1 = vm.reg(1);
        vm.set(r1, s);
        let picked = vm.getitem(l, s).unwrap();
        assert_eq!(vm.repr_string(picked).unwrap(), "[5, 3, 1]");

        let s = vm.tp_call(TypeId::SLICE, &[Value::Int(1), Value::Int(-1)]).unwrap();
        vm.set(r1, s);
        let picked = vm.getitem(l, s).unwrap();
        assert_eq!(vm.repr_string(picked).unwrap(), "[1, 2, 3, 4]");
    }

    #[test]
    fn test_list_methods() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        vm.new_list(r0);
        let l = vm.get(r0);
        let append = vm.intern("append");
        let pop = vm.intern("pop");
        for i in 0..3 {
            vm.call_method(l, append, &[Value::Int(i)]).unwrap();
        }
        assert_eq!(vm.call_method(l, pop, &[]).unwrap(), Value::Int(2));
        assert_eq!(vm.call_method(l, pop, &[Value::Int(0)]).unwrap(), Value::Int(0));
        assert_eq!(vm.list_data(l), &[Value::Int(1)]);
        assert!(vm.getitem(l, Value::Int(5)).is_err());
        assert_eq!(vm.format_exc().as_deref(), Some("IndexError: list index out of range"));
    }

    #[test]
    fn test_tuple_repr_hash_and_equality() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        let r1 = vm.reg(1);
        vm.new_tuple(r0, 1);
        let a = vm.get(r0);
        vm.tuple_setitem(a, 0, Value::Int(1));
        assert_eq!(vm.repr_string(a).unwrap(), "(1,)");
        vm.new_tuple(r1, 1);
        let b = vm.get(r1);
        vm.tuple_setitem(b, 0, Value::Float(1.0));
        assert!(vm.equal(a, b).unwrap());
        assert_eq!(vm.hash(a).unwrap(), vm.hash(b).unwrap());
    }

    #[test]
    fn test_concat_and_contains() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        let r1 = vm.reg(1);
        vm.new_list(r0);
        let a = vm.get(r0);
        vm.list_append(a, Value::Int(1));
        let twice = vm.binary_mul(a, Value::Int(2)).unwrap();
        vm.set(r1, twice);
        let joined = vm.binary_add(a, twice).unwrap();
        assert_eq!(vm.list_len(joined), 3);
        assert!(vm.contains(twice, Value::Float(1.0)).unwrap());
        assert!(!vm.contains(twice, Value::Int(2)).unwrap());
    }
}
