//! Magic (protocol/operator) names.
//!
//! Every context pre-interns these names in declaration order, so the raw
//! value of a `Magic` is also the raw value of its `Name`. Checking whether a
//! name is magic is a range test.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Magic {
    // comparison
    Lt = 1,
    Le,
    Gt,
    Ge,
    // unary
    Neg,
    Abs,
    Round,
    Divmod,
    // arithmetic with reflected forms
    Add,
    Radd,
    Sub,
    Rsub,
    Mul,
    Rmul,
    Truediv,
    Rtruediv,
    Floordiv,
    Rfloordiv,
    Mod,
    Rmod,
    Pow,
    Rpow,
    Matmul,
    Lshift,
    Rshift,
    And,
    Or,
    Xor,
    // protocols
    Repr,
    Str,
    Hash,
    Len,
    Iter,
    Next,
    Contains,
    Bool,
    Invert,
    Eq,
    Ne,
    Getitem,
    Setitem,
    Delitem,
    New,
    Init,
    Call,
    Enter,
    Exit,
    // module and class attributes
    Name,
    All,
    Package,
    Path,
    Class,
    Getattr,
    Reduce,
    Missing,
}

impl Magic {
    /// Number of magic names; valid raw values are `1..=COUNT`.
    pub const COUNT: usize = Magic::Missing as usize;

    pub const ALL: [Magic; Magic::COUNT] = [
        Magic::Lt,
        Magic::Le,
        Magic::Gt,
        Magic::Ge,
        Magic::Neg,
        Magic::Abs,
        Magic::Round,
        Magic::Divmod,
        Magic::Add,
        Magic::Radd,
        Magic::Sub,
        Magic::Rsub,
        Magic::Mul,
        Magic::Rmul,
        Magic::Truediv,
        Magic::Rtruediv,
        Magic::Floordiv,
        Magic::Rfloordiv,
        Magic::Mod,
        Magic::Rmod,
        Magic::Pow,
        Magic::Rpow,
        Magic::Matmul,
        Magic::Lshift,
        Magic::Rshift,
        Magic::And,
        Magic::Or,
        Magic::Xor,
        Magic::Repr,
        Magic::Str,
        Magic::Hash,
        Magic::Len,
        Magic::Iter,
        Magic::Next,
        Magic::Contains,
        Magic::Bool,
        Magic::Invert,
        Magic::Eq,
        Magic::Ne,
        Magic::Getitem,
        Magic::Setitem,
        Magic::Delitem,
        Magic::New,
        Magic::Init,
        Magic::Call,
        Magic::Enter,
        Magic::Exit,
        Magic::Name,
        Magic::All,
        Magic::Package,
        Magic::Path,
        Magic::Class,
        Magic::Getattr,
        Magic::Reduce,
        Magic::Missing,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Magic::Lt => "__lt__",
            Magic::Le => "__le__",
            Magic::Gt => "__gt__",
            Magic::Ge => "__ge__",
            Magic::Neg => "__neg__",
            Magic::Abs => "__abs__",
            Magic::Round => "__round__",
            Magic::Divmod => "__divmod__",
            Magic::Add => "__add__",
            Magic::Radd => "__radd__",
            Magic::Sub => "__sub__",
            Magic::Rsub => "__rsub__",
            Magic::Mul => "__mul__",
            Magic::Rmul => "__rmul__",
            Magic::Truediv => "__truediv__",
            Magic::Rtruediv => "__rtruediv__",
            Magic::Floordiv => "__floordiv__",
            Magic::Rfloordiv => "__rfloordiv__",
            Magic::Mod => "__mod__",
            Magic::Rmod => "__rmod__",
            Magic::Pow => "__pow__",
            Magic::Rpow => "__rpow__",
            Magic::Matmul => "__matmul__",
            Magic::Lshift => "__lshift__",
            Magic::Rshift => "__rshift__",
            Magic::And => "__and__",
            Magic::Or => "__or__",
            Magic::Xor => "__xor__",
            Magic::Repr => "__repr__",
            Magic::Str => "__str__",
            Magic::Hash => "__hash__",
            Magic::Len => "__len__",
            Magic::Iter => "__iter__",
            Magic::Next => "__next__",
            Magic::Contains => "__contains__",
            Magic::Bool => "__bool__",
            Magic::Invert => "__invert__",
            Magic::Eq => "__eq__",
            Magic::Ne => "__ne__",
            Magic::Getitem => "__getitem__",
            Magic::Setitem => "__setitem__",
            Magic::Delitem => "__delitem__",
            Magic::New => "__new__",
            Magic::Init => "__init__",
            Magic::Call => "__call__",
            Magic::Enter => "__enter__",
            Magic::Exit => "__exit__",
            Magic::Name => "__name__",
            Magic::All => "__all__",
            Magic::Package => "__package__",
            Magic::Path => "__path__",
            Magic::Class => "__class__",
            Magic::Getattr => "__getattr__",
            Magic::Reduce => "__reduce__",
            Magic::Missing => "__missing__",
        }
    }

    /// Operator symbol used in "unsupported operand" messages.
    pub fn operator(self) -> Option<&'static str> {
        let op = match self {
            Magic::Lt => "<",
            Magic::Le => "<=",
            Magic::Gt => ">",
            Magic::Ge => ">=",
            Magic::Eq => "==",
            Magic::Ne => "!=",
            Magic::Add | Magic::Radd => "+",
            Magic::Sub | Magic::Rsub => "-",
            Magic::Mul | Magic::Rmul => "*",
            Magic::Truediv | Magic::Rtruediv => "/",
            Magic::Floordiv | Magic::Rfloordiv => "//",
            Magic::Mod | Magic::Rmod => "%",
            Magic::Pow | Magic::Rpow => "**",
            Magic::Matmul => "@",
            Magic::Lshift => "<<",
            Magic::Rshift => ">>",
            Magic::And => "&",
            Magic::Or => "|",
            Magic::Xor => "^",
            _ => return None,
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_dense_and_ordered() {
        for (i, m) in Magic::ALL.iter().enumerate() {
            assert_eq!(m.index(), i + 1);
            assert_eq!(Magic::try_from(m.index() as u16).ok(), Some(*m));
        }
        assert!(Magic::try_from(0u16).is_err());
        assert!(Magic::try_from(Magic::COUNT as u16 + 1).is_err());
    }

    #[test]
    fn test_names_are_dunder() {
        for m in Magic::ALL {
            let s = m.as_str();
            assert!(s.starts_with("__") && s.ends_with("__"), "{s}");
        }
        assert_eq!(Magic::Missing.as_str(), "__missing__");
    }
}
