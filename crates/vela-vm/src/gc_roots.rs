//! GC root scanning for the VM.

use vela_runtime::{Gc, Object, ObjectData, Value};

use crate::types::TypeRegistry;
use crate::vm::Vm;

#[inline]
fn mark_value(gc: &mut Gc, v: &Value) {
    if let Value::Object(r) = v {
        gc.mark_gray(*r);
    }
}

/// Runs the type's destructor (nearest along the base chain) on a user
/// payload. Called exactly once per swept object.
pub(crate) fn finalize_object(types: &TypeRegistry, obj: Object) {
    let ty = obj.ty;
    if let ObjectData::User(mut data) = obj.data {
        if let Some(dtor) = types.find_dtor(ty) {
            dtor(data.as_mut());
        }
    }
}

impl Vm {
    pub(crate) fn scan_roots(&mut self) {
        let gc = &mut self.heap;
        for v in &self.stack {
            mark_value(gc, v);
        }
        for v in &self.registers {
            mark_value(gc, v);
        }
        mark_value(gc, &self.retval);
        mark_value(gc, &self.curr_exc);
        for r in self.modules.values() {
            gc.mark_gray(*r);
        }
        for r in self.name_strs.values() {
            gc.mark_gray(*r);
        }
        scan_types(gc, &self.types);
        for frame in &self.frames {
            gc.mark_gray(frame.module);
            if let Some(v) = &frame.globals {
                mark_value(gc, v);
            }
            if let Some(v) = &frame.locals {
                mark_value(gc, v);
            }
        }
    }

    pub(crate) fn collect_garbage(&mut self) -> usize {
        self.scan_roots();
        let types = &self.types;
        self.heap.collect(|obj| finalize_object(types, obj))
    }
}

fn scan_types(gc: &mut Gc, types: &TypeRegistry) {
    for rec in types.iter() {
        for v in rec.magic.iter() {
            mark_value(gc, v);
        }
        for v in rec.attrs.values() {
            mark_value(gc, v);
        }
        if let Some(m) = rec.module {
            gc.mark_gray(m);
        }
    }
}
