//! Binding native functions onto types and modules.

use std::rc::Rc;

use vela_common_core::{Magic, Name, TypeId};
use vela_runtime::{Code, FuncBody, FuncDecl, Function, GcRef, Object, ObjectData, OutRef, Param, Value};

use crate::native::NativeFn;
use crate::signature::{parse_signature, Literal, Signature};
use crate::vm::Vm;

impl Vm {
    fn literal_value(&mut self, lit: &Literal) -> Value {
        match lit {
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => self.alloc_str(s),
            Literal::None => Value::None,
            Literal::Bool(b) => Value::Bool(*b),
        }
    }

    fn make_decl(&mut self, sig: &Signature, doc: Option<&str>, body: FuncBody) -> FuncDecl {
        let params = sig
            .params
            .iter()
            .map(|p| Param {
                name: self.intern(&p.name),
                default: p.default.as_ref().map(|lit| self.literal_value(lit)),
                kw_only: p.kw_only,
            })
            .collect();
        FuncDecl {
            name: self.intern(&sig.name),
            params,
            star_args: sig.star_args.as_deref().map(|n| self.intern(n)),
            star_kwargs: sig.star_kwargs.as_deref().map(|n| self.intern(n)),
            doc: doc.map(str::to_owned),
            body,
        }
    }

    fn alloc_function(&mut self, out: OutRef, sig: &str, body: FuncBody, doc: Option<&str>, slots: usize, module: Option<GcRef>) -> Name {
        let sig = match parse_signature(sig) {
            Ok(s) => s,
            Err(e) => panic!("invalid signature `{sig}`: {e}"),
        };
        let r = self.with_gc_paused(|vm| {
            let decl = vm.make_decl(&sig, doc, body);
            let func = Function { decl: Rc::new(decl), module };
            vm.alloc(Object::with_slots(TypeId::FUNCTION, slots, ObjectData::Function(func)))
        });
        self.set(out, Value::Object(r));
        self.object(r).as_function().expect("function payload").decl.name
    }

    /// New `function` with a declared signature and a native body. The body
    /// receives the bound locals as its argument window. `slots` extra value
    /// slots are reserved on the function object for host use.
    pub fn new_function(&mut self, out: impl Into<OutRef>, sig: &str, f: NativeFn, doc: Option<&str>, slots: usize) -> Name {
        let id = self.natives.register(f);
        self.alloc_function(out.into(), sig, FuncBody::Native(id), doc, slots, None)
    }

    /// New `function` whose body is executor code, with `module` as globals.
    pub fn new_code_function(&mut self, out: impl Into<OutRef>, sig: &str, code: Code, module: Option<GcRef>) -> Name {
        self.alloc_function(out.into(), sig, FuncBody::Code(code), None, 0, module)
    }

    fn bind_value(&mut self, obj: Value, name: Name, v: Value) {
        match obj {
            Value::Type(t) => self.types.set_attr(t, name, v),
            _ => self.setdict(obj, name, v),
        }
    }

    /// Binds a declaration-based native function on a type or module.
    /// Panics on a malformed signature.
    pub fn bind(&mut self, obj: Value, sig: &str, f: NativeFn) -> Name {
        let tmp = self.push_tmp();
        let name = self.new_function(tmp, sig, f, None, 0);
        let func = self.pop();
        self.bind_value(obj, name, func);
        name
    }

    /// Binds an argc-based native function on a type or module.
    pub fn bind_func(&mut self, obj: Value, name: &str, f: NativeFn) {
        let n = self.intern(name);
        let id = self.natives.register(f);
        self.bind_value(obj, n, Value::NativeFunc(id));
    }

    pub fn bind_method(&mut self, ty: TypeId, name: &str, f: NativeFn) {
        self.bind_func(Value::Type(ty), name, f);
    }

    pub fn bind_static_method(&mut self, ty: TypeId, name: &str, f: NativeFn) {
        let n = self.intern(name);
        let id = self.natives.register(f);
        let wrapper = self.alloc_with_slots(TypeId::STATICMETHOD, &[Value::NativeFunc(id)]);
        self.types.set_attr(ty, n, wrapper);
    }

    pub fn bind_class_method(&mut self, ty: TypeId, name: &str, f: NativeFn) {
        let n = self.intern(name);
        let id = self.natives.register(f);
        let wrapper = self.alloc_with_slots(TypeId::CLASSMETHOD, &[Value::NativeFunc(id)]);
        self.types.set_attr(ty, n, wrapper);
    }

    /// Binds a property. Without a setter, assignment raises
    /// `AttributeError`.
    pub fn bind_property(&mut self, ty: TypeId, name: &str, getter: NativeFn, setter: Option<NativeFn>) {
        let n = self.intern(name);
        let get = Value::NativeFunc(self.natives.register(getter));
        let set = match setter {
            Some(s) => Value::NativeFunc(self.natives.register(s)),
            None => Value::None,
        };
        let prop = self.alloc_with_slots(TypeId::PROPERTY, &[get, set]);
        self.types.set_attr(ty, n, prop);
    }

    /// Installs `f` as magic method `m` of `ty`.
    pub fn bind_magic(&mut self, ty: TypeId, m: Magic, f: NativeFn) {
        let id = self.natives.register(f);
        self.types.get_mut(ty).magic[m.index()] = Value::NativeFunc(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PyResult;
    use vela_runtime::StackRef;

    fn greet(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
        assert_eq!(argc, 2);
        let name = vm.to_str(vm.arg(argv, 0)).to_owned();
        let punct = vm.to_str(vm.arg(argv, 1)).to_owned();
        let r = vm.retval_ref();
        vm.new_fstr(r, format_args!("hello {name}{punct}"));
        Ok(())
    }

    #[test]
    fn test_bind_with_defaults_and_keywords() {
        let mut vm = Vm::new();
        let m = vm.main_module();
        vm.bind(Value::Object(m), "greet(name, punct='!')", greet);
        let greet_name = vm.intern("greet");
        let f = vm.getdict(Value::Object(m), greet_name).unwrap();

        let r0 = vm.reg(0);
        vm.new_str(r0, "bob");
        let out = vm.call(f, &[vm.get(r0)]).unwrap();
        assert_eq!(vm.to_str(out), "hello bob!");

        vm.push(f);
        vm.push_nil();
        vm.push(vm.get(r0));
        let punct = vm.intern("punct");
        vm.push_name(punct);
        let tmp = vm.push_tmp();
        vm.new_str(tmp, "?");
        vm.vectorcall(1, 1).unwrap();
        assert_eq!(vm.to_str(vm.retval()), "hello bob?");
        assert_eq!(vm.sp(), 0);
    }

    #[test]
    fn test_argument_count_errors() {
        let mut vm = Vm::new();
        let m = vm.main_module();
        vm.bind(Value::Object(m), "greet(name, punct='!')", greet);
        let f = vm.getdict(Value::Object(m), vm.names.get("greet").unwrap()).unwrap();
        assert!(vm.call(f, &[]).is_err());
        assert_eq!(
            vm.format_exc().as_deref(),
            Some("TypeError: greet() missing required argument 'name'")
        );
        vm.clear_exc(None);
        let args = [Value::Int(1), Value::Int(2), Value::Int(3)];
        assert!(vm.call(f, &args).is_err());
        assert_eq!(
            vm.format_exc().as_deref(),
            Some("TypeError: greet() takes 2 positional arguments but 3 were given")
        );
    }

    #[test]
    #[should_panic(expected = "invalid signature")]
    fn test_bad_signature_panics() {
        let mut vm = Vm::new();
        let m = vm.main_module();
        vm.bind(Value::Object(m), "broken(", greet);
    }
}
