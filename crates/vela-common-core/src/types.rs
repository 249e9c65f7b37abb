//! Predefined type ids.
//!
//! Builtin types are densely numbered from zero; user types are appended by
//! the type registry after `TypeId::BUILTIN_COUNT`.

use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u16);

impl TypeId {
    pub const NIL: TypeId = TypeId(0);
    pub const OBJECT: TypeId = TypeId(1);
    pub const TYPE: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const FLOAT: TypeId = TypeId(4);
    pub const BOOL: TypeId = TypeId(5);
    pub const STR: TypeId = TypeId(6);
    pub const STR_ITERATOR: TypeId = TypeId(7);
    pub const LIST: TypeId = TypeId(8);
    pub const TUPLE: TypeId = TypeId(9);
    pub const ARRAY_ITERATOR: TypeId = TypeId(10);
    pub const SLICE: TypeId = TypeId(11);
    pub const RANGE: TypeId = TypeId(12);
    pub const RANGE_ITERATOR: TypeId = TypeId(13);
    pub const MODULE: TypeId = TypeId(14);
    pub const FUNCTION: TypeId = TypeId(15);
    pub const NATIVEFUNC: TypeId = TypeId(16);
    pub const BOUNDMETHOD: TypeId = TypeId(17);
    pub const SUPER: TypeId = TypeId(18);
    pub const BASE_EXCEPTION: TypeId = TypeId(19);
    pub const EXCEPTION: TypeId = TypeId(20);
    pub const BYTES: TypeId = TypeId(21);
    pub const NAMEDICT: TypeId = TypeId(22);
    pub const LOCALS: TypeId = TypeId(23);
    pub const CODE: TypeId = TypeId(24);
    pub const DICT: TypeId = TypeId(25);
    pub const DICT_ITEMS: TypeId = TypeId(26);
    pub const PROPERTY: TypeId = TypeId(27);
    pub const STAR_WRAPPER: TypeId = TypeId(28);
    pub const STATICMETHOD: TypeId = TypeId(29);
    pub const CLASSMETHOD: TypeId = TypeId(30);
    pub const NONE_TYPE: TypeId = TypeId(31);
    pub const NOT_IMPLEMENTED_TYPE: TypeId = TypeId(32);
    pub const ELLIPSIS: TypeId = TypeId(33);
    pub const GENERATOR: TypeId = TypeId(34);
    pub const SYSTEM_EXIT: TypeId = TypeId(35);
    pub const KEYBOARD_INTERRUPT: TypeId = TypeId(36);
    pub const STOP_ITERATION: TypeId = TypeId(37);
    pub const SYNTAX_ERROR: TypeId = TypeId(38);
    pub const RECURSION_ERROR: TypeId = TypeId(39);
    pub const OS_ERROR: TypeId = TypeId(40);
    pub const NOT_IMPLEMENTED_ERROR: TypeId = TypeId(41);
    pub const TYPE_ERROR: TypeId = TypeId(42);
    pub const INDEX_ERROR: TypeId = TypeId(43);
    pub const VALUE_ERROR: TypeId = TypeId(44);
    pub const RUNTIME_ERROR: TypeId = TypeId(45);
    pub const ZERO_DIVISION_ERROR: TypeId = TypeId(46);
    pub const NAME_ERROR: TypeId = TypeId(47);
    pub const UNBOUND_LOCAL_ERROR: TypeId = TypeId(48);
    pub const ATTRIBUTE_ERROR: TypeId = TypeId(49);
    pub const IMPORT_ERROR: TypeId = TypeId(50);
    pub const ASSERTION_ERROR: TypeId = TypeId(51);
    pub const KEY_ERROR: TypeId = TypeId(52);

    pub const BUILTIN_COUNT: usize = 53;

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_builtin(self) -> bool {
        (self.0 as usize) < Self::BUILTIN_COUNT
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match BUILTIN_TYPES.get(self.index()) {
            Some(b) => write!(f, "TypeId({})", b.name),
            None => write!(f, "TypeId({})", self.0),
        }
    }
}

/// Static description of a predefined type.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinType {
    pub id: TypeId,
    pub name: &'static str,
    /// `TypeId::NIL` for the two roots (`nil` and `object`).
    pub base: TypeId,
    /// Sealed types cannot be used as a base.
    pub sealed: bool,
}

const fn builtin(id: TypeId, name: &'static str, base: TypeId, sealed: bool) -> BuiltinType {
    BuiltinType { id, name, base, sealed }
}

/// Every predefined type, indexed by `TypeId`.
pub const BUILTIN_TYPES: [BuiltinType; TypeId::BUILTIN_COUNT] = [
    builtin(TypeId::NIL, "nil", TypeId::NIL, true),
    builtin(TypeId::OBJECT, "object", TypeId::NIL, false),
    builtin(TypeId::TYPE, "type", TypeId::OBJECT, true),
    builtin(TypeId::INT, "int", TypeId::OBJECT, true),
    builtin(TypeId::FLOAT, "float", TypeId::OBJECT, true),
    builtin(TypeId::BOOL, "bool", TypeId::INT, true),
    builtin(TypeId::STR, "str", TypeId::OBJECT, true),
    builtin(TypeId::STR_ITERATOR, "str_iterator", TypeId::OBJECT, true),
    builtin(TypeId::LIST, "list", TypeId::OBJECT, true),
    builtin(TypeId::TUPLE, "tuple", TypeId::OBJECT, true),
    builtin(TypeId::ARRAY_ITERATOR, "array_iterator", TypeId::OBJECT, true),
    builtin(TypeId::SLICE, "slice", TypeId::OBJECT, true),
    builtin(TypeId::RANGE, "range", TypeId::OBJECT, true),
    builtin(TypeId::RANGE_ITERATOR, "range_iterator", TypeId::OBJECT, true),
    builtin(TypeId::MODULE, "module", TypeId::OBJECT, true),
    builtin(TypeId::FUNCTION, "function", TypeId::OBJECT, true),
    builtin(TypeId::NATIVEFUNC, "nativefunc", TypeId::OBJECT, true),
    builtin(TypeId::BOUNDMETHOD, "boundmethod", TypeId::OBJECT, true),
    builtin(TypeId::SUPER, "super", TypeId::OBJECT, true),
    builtin(TypeId::BASE_EXCEPTION, "BaseException", TypeId::OBJECT, false),
    builtin(TypeId::EXCEPTION, "Exception", TypeId::BASE_EXCEPTION, false),
    builtin(TypeId::BYTES, "bytes", TypeId::OBJECT, true),
    builtin(TypeId::NAMEDICT, "namedict", TypeId::OBJECT, true),
    builtin(TypeId::LOCALS, "locals", TypeId::OBJECT, true),
    builtin(TypeId::CODE, "code", TypeId::OBJECT, true),
    builtin(TypeId::DICT, "dict", TypeId::OBJECT, true),
    builtin(TypeId::DICT_ITEMS, "dict_items", TypeId::OBJECT, true),
    builtin(TypeId::PROPERTY, "property", TypeId::OBJECT, true),
    builtin(TypeId::STAR_WRAPPER, "star_wrapper", TypeId::OBJECT, true),
    builtin(TypeId::STATICMETHOD, "staticmethod", TypeId::OBJECT, true),
    builtin(TypeId::CLASSMETHOD, "classmethod", TypeId::OBJECT, true),
    builtin(TypeId::NONE_TYPE, "NoneType", TypeId::OBJECT, true),
    builtin(TypeId::NOT_IMPLEMENTED_TYPE, "NotImplementedType", TypeId::OBJECT, true),
    builtin(TypeId::ELLIPSIS, "ellipsis", TypeId::OBJECT, true),
    builtin(TypeId::GENERATOR, "generator", TypeId::OBJECT, true),
    builtin(TypeId::SYSTEM_EXIT, "SystemExit", TypeId::BASE_EXCEPTION, false),
    builtin(TypeId::KEYBOARD_INTERRUPT, "KeyboardInterrupt", TypeId::BASE_EXCEPTION, false),
    builtin(TypeId::STOP_ITERATION, "StopIteration", TypeId::EXCEPTION, false),
    builtin(TypeId::SYNTAX_ERROR, "SyntaxError", TypeId::EXCEPTION, false),
    builtin(TypeId::RECURSION_ERROR, "RecursionError", TypeId::EXCEPTION, false),
    builtin(TypeId::OS_ERROR, "OSError", TypeId::EXCEPTION, false),
    builtin(TypeId::NOT_IMPLEMENTED_ERROR, "NotImplementedError", TypeId::EXCEPTION, false),
    builtin(TypeId::TYPE_ERROR, "TypeError", TypeId::EXCEPTION, false),
    builtin(TypeId::INDEX_ERROR, "IndexError", TypeId::EXCEPTION, false),
    builtin(TypeId::VALUE_ERROR, "ValueError", TypeId::EXCEPTION, false),
    builtin(TypeId::RUNTIME_ERROR, "RuntimeError", TypeId::EXCEPTION, false),
    builtin(TypeId::ZERO_DIVISION_ERROR, "ZeroDivisionError", TypeId::EXCEPTION, false),
    builtin(TypeId::NAME_ERROR, "NameError", TypeId::EXCEPTION, false),
    builtin(TypeId::UNBOUND_LOCAL_ERROR, "UnboundLocalError", TypeId::NAME_ERROR, false),
    builtin(TypeId::ATTRIBUTE_ERROR, "AttributeError", TypeId::EXCEPTION, false),
    builtin(TypeId::IMPORT_ERROR, "ImportError", TypeId::EXCEPTION, false),
    builtin(TypeId::ASSERTION_ERROR, "AssertionError", TypeId::EXCEPTION, false),
    builtin(TypeId::KEY_ERROR, "KeyError", TypeId::EXCEPTION, false),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_id() {
        for (i, b) in BUILTIN_TYPES.iter().enumerate() {
            assert_eq!(b.id.index(), i, "{}", b.name);
            assert!(b.base.index() < i || b.base == TypeId::NIL, "{} base must precede it", b.name);
        }
    }

    #[test]
    fn test_exception_types_chain_to_base_exception() {
        let mut t = TypeId::UNBOUND_LOCAL_ERROR;
        let mut steps = 0;
        while t != TypeId::BASE_EXCEPTION {
            t = BUILTIN_TYPES[t.index()].base;
            steps += 1;
            assert!(steps < 8);
        }
        assert_eq!(steps, 3);
    }
}
