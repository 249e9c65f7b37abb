//! Module registry and import.

use vela_common_core::{Magic, Name, TypeId};
use vela_runtime::{GcRef, ModuleInfo, Object, ObjectData, Value};

use crate::error::PyResult;
use crate::vm::{CompileMode, Vm};

/// Longest accepted module path, in bytes.
pub const MAX_MODULE_PATH: usize = 63;

impl Vm {
    /// Creates and registers an empty module.
    ///
    /// Panics if `path` is already registered or longer than
    /// `MAX_MODULE_PATH`.
    pub fn new_module(&mut self, path: &str) -> GcRef {
        assert!(!self.modules.contains_key(path), "module '{path}' already exists");
        assert!(path.len() <= MAX_MODULE_PATH, "module path '{path}' is too long");
        let (package, name) = path.rsplit_once('.').unwrap_or(("", path));
        let r = self.with_gc_paused(|vm| {
            let info = ModuleInfo { path: path.to_owned() };
            let r = vm.alloc(Object::with_dict(TypeId::MODULE, ObjectData::Module(info)));
            let m = Value::Object(r);
            let v = vm.alloc_str(name);
            vm.setdict(m, Name::from(Magic::Name), v);
            let v = vm.alloc_str(package);
            vm.setdict(m, Name::from(Magic::Package), v);
            let v = vm.alloc_str(path);
            vm.setdict(m, Name::from(Magic::Path), v);
            vm.modules.insert(path.to_owned(), r);
            r
        });
        log::debug!("module '{path}' created");
        r
    }

    #[inline]
    pub fn get_module(&self, path: &str) -> Option<GcRef> {
        self.modules.get(path).copied()
    }

    pub fn main_module(&self) -> GcRef {
        self.get_module("__main__").expect("__main__ module is installed")
    }

    pub fn builtins_module(&self) -> GcRef {
        self.get_module("builtins").expect("builtins module is installed")
    }

    /// Module path of a registered module.
    pub fn module_path(&self, m: GcRef) -> &str {
        match &self.object(m).data {
            ObjectData::Module(info) => &info.path,
            _ => panic!("expected module"),
        }
    }

    /// Resolves a leading-dot path against the current module's package.
    fn resolve_import(&mut self, path: &str) -> PyResult<String> {
        let dots = path.bytes().take_while(|&b| b == b'.').count();
        if dots == 0 {
            return Ok(path.to_owned());
        }
        let module = Value::Object(self.inspect_current_module());
        let package = match self.getdict(module, Name::from(Magic::Package)) {
            Some(v) if self.is_type(v, TypeId::STR) => self.to_str(v).to_owned(),
            _ => String::new(),
        };
        if package.is_empty() {
            return Err(self.import_error("attempted relative import with no known parent package"));
        }
        let mut base = package.as_str();
        for _ in 1..dots {
            match base.rsplit_once('.') {
                Some((parent, _)) => base = parent,
                None => return Err(self.import_error("attempted relative import beyond top-level package")),
            }
        }
        let rest = &path[dots..];
        Ok(if rest.is_empty() { base.to_owned() } else { format!("{base}.{rest}") })
    }

    /// Imports `path`, loading `a/b.py` or `a/b/__init__.py` through the
    /// import callback. `Ok(None)` when no source was found.
    pub fn import(&mut self, path: &str) -> PyResult<Option<GcRef>> {
        let path = self.resolve_import(path)?;
        if let Some(m) = self.get_module(&path) {
            return Ok(Some(m));
        }
        let stem = path.replace('.', "/");
        let (filename, source, is_package) = match (self.callbacks.import_file)(&format!("{stem}.py")) {
            Some(src) => (format!("{stem}.py"), src, false),
            None => match (self.callbacks.import_file)(&format!("{stem}/__init__.py")) {
                Some(src) => (format!("{stem}/__init__.py"), src, true),
                None => return Ok(None),
            },
        };
        if path.len() > MAX_MODULE_PATH {
            return Err(self.import_error(format!("module path '{path}' is too long")));
        }
        let m = self.new_module(&path);
        if is_package {
            let pkg = self.alloc_str(&path);
            self.setdict(Value::Object(m), Name::from(Magic::Package), pkg);
        }
        log::debug!("importing '{path}' from {filename}");
        if let Err(raised) = self.exec(&source, &filename, CompileMode::Exec, Some(m)) {
            self.modules.shift_remove(&path);
            return Err(raised);
        }
        Ok(Some(m))
    }

    /// Re-runs a module's source in its existing namespace. `Ok(false)` when
    /// the source can no longer be found.
    pub fn reload(&mut self, m: GcRef) -> PyResult<bool> {
        let path = self.module_path(m).to_owned();
        let stem = path.replace('.', "/");
        let candidates = [format!("{stem}.py"), format!("{stem}/__init__.py")];
        for filename in candidates {
            if let Some(source) = (self.callbacks.import_file)(&filename) {
                self.exec(&source, &filename, CompileMode::Exec, Some(m))?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Sets `sys.argv`.
    pub fn set_argv(&mut self, args: &[&str]) {
        let sys = Value::Object(self.get_module("sys").expect("sys module is installed"));
        let argv = self.intern("argv");
        self.with_gc_paused(|vm| {
            let items = args.iter().map(|a| vm.alloc_str(a)).collect();
            let list = vm.alloc_list(items);
            vm.setdict(sys, argv, list);
        });
    }

    /// Global `name` of the current module.
    pub fn get_global(&self, name: Name) -> Option<Value> {
        self.getdict(Value::Object(self.inspect_current_module()), name)
    }

    pub fn set_global(&mut self, name: Name, val: Value) {
        let m = Value::Object(self.inspect_current_module());
        self.setdict(m, name, val);
    }

    pub fn get_builtin(&self, name: Name) -> Option<Value> {
        self.getdict(Value::Object(self.builtins_module()), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_attributes() {
        let mut vm = Vm::new();
        let m = vm.new_module("pkg.sub");
        let name = vm.getdict(Value::Object(m), Name::from(Magic::Name)).unwrap();
        let package = vm.getdict(Value::Object(m), Name::from(Magic::Package)).unwrap();
        assert_eq!(vm.to_str(name), "sub");
        assert_eq!(vm.to_str(package), "pkg");
        assert_eq!(vm.get_module("pkg.sub"), Some(m));
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_duplicate_module_panics() {
        let mut vm = Vm::new();
        vm.new_module("twice");
        vm.new_module("twice");
    }

    #[test]
    fn test_import_missing_source() {
        let mut vm = Vm::new();
        vm.callbacks_mut().import_file = Box::new(|_: &str| None);
        assert_eq!(vm.import("nowhere").unwrap(), None);
    }

    #[test]
    fn test_relative_import_without_package() {
        let mut vm = Vm::new();
        assert!(vm.import(".sibling").is_err());
        assert!(vm.match_exc(TypeId::IMPORT_ERROR));
    }

    #[test]
    fn test_set_argv() {
        let mut vm = Vm::new();
        vm.set_argv(&["prog", "-v"]);
        let sys = Value::Object(vm.get_module("sys").unwrap());
        let argv = vm.intern("argv");
        let list = vm.getdict(sys, argv).unwrap();
        assert_eq!(vm.list_len(list), 2);
        assert_eq!(vm.to_str(vm.list_getitem(list, 1)), "-v");
    }
}
