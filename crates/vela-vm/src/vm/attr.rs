//! Attribute access, attribute dicts and fixed slots.

use vela_common_core::{Magic, Name, TypeId};
use vela_runtime::{ItemKind, ItemRef, ObjectRef, Value};

use crate::error::PyResult;
use crate::vm::Vm;

impl Vm {
    // =========================================================================
    // getattr / setattr / delattr
    // =========================================================================

    /// Looks up `name` on `obj`: data descriptors (properties) on the class,
    /// the instance dict, class attributes bound to the instance, then
    /// `__getattr__`.
    pub fn getattr(&mut self, obj: Value, name: Name) -> PyResult<Value> {
        if let Some(v) = self.lookup_attr(obj, name)? {
            return Ok(v);
        }
        if let Some(f) = self.types.find_magic(self.type_of(obj), Magic::Getattr) {
            let key = self.name_str(name);
            return self.call_bound(f, obj, &[key]);
        }
        Err(self.attribute_error(obj, name))
    }

    /// Like `getattr` but a missing attribute is `Ok(None)`.
    pub fn try_getattr(&mut self, obj: Value, name: Name) -> PyResult<Option<Value>> {
        self.lookup_attr(obj, name)
    }

    pub fn hasattr(&mut self, obj: Value, name: Name) -> PyResult<bool> {
        Ok(self.lookup_attr(obj, name)?.is_some())
    }

    fn lookup_attr(&mut self, obj: Value, name: Name) -> PyResult<Option<Value>> {
        if name == Name::from(Magic::Class) {
            return Ok(Some(Value::Type(self.type_of(obj))));
        }
        if let Value::Type(cls) = obj {
            if name == Name::from(Magic::Name) {
                let n = self.tp_name(cls);
                return Ok(Some(self.name_str(n)));
            }
            if let Some(attr) = self.types.find_attr(cls, name) {
                return Ok(Some(self.unwrap_class_attr(attr, cls)));
            }
        }
        let ty = self.type_of(obj);
        let cls_attr = self.types.find_attr(ty, name);
        if let Some(attr) = cls_attr {
            if self.is_type(attr, TypeId::PROPERTY) {
                let getter = self.getslot(attr, 0);
                return self.call(getter, &[obj]).map(Some);
            }
        }
        if let Some(v) = self.getdict(obj, name) {
            return Ok(Some(v));
        }
        Ok(cls_attr.map(|attr| self.bind_attr(attr, obj, ty)))
    }

    /// Binds a class attribute fetched through an instance.
    fn bind_attr(&mut self, attr: Value, obj: Value, ty: TypeId) -> Value {
        match attr {
            Value::NativeFunc(_) => self.alloc_with_slots(TypeId::BOUNDMETHOD, &[obj, attr]),
            Value::Object(r) => match self.object(r).ty {
                TypeId::FUNCTION => self.alloc_with_slots(TypeId::BOUNDMETHOD, &[obj, attr]),
                TypeId::STATICMETHOD => self.object(r).slots[0],
                TypeId::CLASSMETHOD => {
                    let f = self.object(r).slots[0];
                    self.alloc_with_slots(TypeId::BOUNDMETHOD, &[Value::Type(ty), f])
                }
                _ => attr,
            },
            _ => attr,
        }
    }

    /// A class attribute fetched through the type object itself.
    fn unwrap_class_attr(&mut self, attr: Value, cls: TypeId) -> Value {
        let Value::Object(r) = attr else {
            return attr;
        };
        match self.object(r).ty {
            TypeId::STATICMETHOD => self.object(r).slots[0],
            TypeId::CLASSMETHOD => {
                let f = self.object(r).slots[0];
                self.alloc_with_slots(TypeId::BOUNDMETHOD, &[Value::Type(cls), f])
            }
            _ => attr,
        }
    }

    pub fn setattr(&mut self, obj: Value, name: Name, val: Value) -> PyResult {
        if let Value::Type(cls) = obj {
            self.types.set_attr(cls, name, val);
            return Ok(());
        }
        let ty = self.type_of(obj);
        if let Some(attr) = self.types.find_attr(ty, name) {
            if self.is_type(attr, TypeId::PROPERTY) {
                let setter = self.getslot(attr, 1);
                if setter.is_none() {
                    return Err(self.exception(TypeId::ATTRIBUTE_ERROR, "can't set attribute"));
                }
                return self.call(setter, &[obj, val]).map(drop);
            }
        }
        if self.has_dict(obj) {
            self.setdict(obj, name, val);
            return Ok(());
        }
        Err(self.attribute_error(obj, name))
    }

    pub fn delattr(&mut self, obj: Value, name: Name) -> PyResult {
        let removed = match obj {
            Value::Type(cls) => {
                let rec = self.types.get_mut(cls);
                match name.as_magic() {
                    Some(m) => !core::mem::take(&mut rec.magic[m.index()]).is_nil(),
                    None => rec.attrs.remove(name).is_some(),
                }
            }
            _ => self.deldict(obj, name),
        };
        if removed {
            Ok(())
        } else {
            Err(self.attribute_error(obj, name))
        }
    }

    // =========================================================================
    // Attribute dicts
    // =========================================================================

    fn has_dict(&self, obj: Value) -> bool {
        obj.as_object().map_or(false, |r| self.object(r).dict.is_some())
    }

    /// Reads `name` from the instance dict of `obj`.
    pub fn getdict(&self, obj: Value, name: Name) -> Option<Value> {
        let r = obj.as_object()?;
        self.object(r).dict.as_ref()?.get(name)
    }

    /// Writes `name` into the instance dict. Panics if `obj` has none.
    pub fn setdict(&mut self, obj: Value, name: Name, val: Value) {
        let r = obj.as_object().expect("object has no attribute dict");
        self.object_mut(r)
            .dict
            .as_mut()
            .expect("object has no attribute dict")
            .set(name, val);
        self.heap.resize(r);
    }

    pub fn deldict(&mut self, obj: Value, name: Name) -> bool {
        let Some(r) = obj.as_object() else {
            return false;
        };
        match self.object_mut(r).dict.as_mut() {
            Some(d) => d.remove(name).is_some(),
            None => false,
        }
    }

    /// Ensures `name` exists in the instance dict (nil if new) and returns a
    /// reference to its value slot.
    pub fn emplacedict(&mut self, obj: Value, name: Name) -> ItemRef {
        let owner = obj.as_object().expect("object has no attribute dict");
        let dict = self
            .object_mut(owner)
            .dict
            .as_mut()
            .expect("object has no attribute dict");
        let index = dict.emplace(name);
        let item = ItemRef { owner, kind: ItemKind::AttrValue, index, epoch: dict.epoch() };
        self.heap.resize(owner);
        item
    }

    /// Visits every `(name, value)` in insertion order. Adding or removing
    /// names during the walk raises `RuntimeError`.
    pub fn applydict(&mut self, obj: Value, mut f: impl FnMut(&mut Vm, Name, Value) -> PyResult) -> PyResult {
        let owner = obj.as_object().expect("object has no attribute dict");
        let epoch = self.attr_dict_epoch(owner);
        let mut i = 0;
        loop {
            let entry = self.object(owner).dict.as_ref().and_then(|d| d.get_index(i));
            let Some((name, val)) = entry else {
                return Ok(());
            };
            f(self, name, val)?;
            if self.attr_dict_epoch(owner) != epoch {
                return Err(self.runtime_error("dictionary changed size during iteration"));
            }
            i += 1;
        }
    }

    fn attr_dict_epoch(&self, owner: vela_runtime::GcRef) -> u32 {
        self.object(owner).dict.as_ref().map_or(0, |d| d.epoch())
    }

    // =========================================================================
    // Fixed slots
    // =========================================================================

    pub fn getslot(&self, obj: Value, i: usize) -> Value {
        self.get(self.slot_ref(obj, i))
    }

    pub fn setslot(&mut self, obj: Value, i: usize, val: Value) {
        let r: ObjectRef = self.slot_ref(obj, i);
        self.set(r, val);
    }
}
