//! Value kinds and literal constants.

use std::fmt;

/// The kind of a value held in a stack slot, local slot, field, or array
/// element.
///
/// Sub-word integer kinds (`Boolean`, `Byte`, `Char`, `Short`) only exist in
/// memory; on the operand stack and in locals they widen to `Int`. See
/// [`Kind::stack_kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
    /// Raw machine word (unsafe code only).
    Word,
    Void,
}

impl Kind {
    /// The kind this value has once loaded onto the operand stack.
    #[inline]
    pub fn stack_kind(self) -> Kind {
        match self {
            Kind::Boolean | Kind::Byte | Kind::Char | Kind::Short => Kind::Int,
            other => other,
        }
    }

    /// Whether values of this kind occupy two consecutive slots.
    #[inline]
    pub fn is_two_slot(self) -> bool {
        matches!(self, Kind::Long | Kind::Double)
    }

    /// Number of stack or local slots a value of this kind occupies.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            Kind::Void => 0,
            Kind::Long | Kind::Double => 2,
            _ => 1,
        }
    }

    /// Whether the kind is `Reference` or `Word`.
    ///
    /// Reference loads and stores accept both in unsafe code.
    #[inline]
    pub fn is_reference_or_word(self) -> bool {
        matches!(self, Kind::Reference | Kind::Word)
    }

    /// Single-character mnemonic used by the IR printer.
    pub fn mnemonic(self) -> char {
        match self {
            Kind::Boolean => 'z',
            Kind::Byte => 'b',
            Kind::Char => 'c',
            Kind::Short => 's',
            Kind::Int => 'i',
            Kind::Long => 'l',
            Kind::Float => 'f',
            Kind::Double => 'd',
            Kind::Reference => 'a',
            Kind::Word => 'w',
            Kind::Void => 'v',
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Boolean => "boolean",
            Kind::Byte => "byte",
            Kind::Char => "char",
            Kind::Short => "short",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Float => "float",
            Kind::Double => "double",
            Kind::Reference => "reference",
            Kind::Word => "word",
            Kind::Void => "void",
        };
        f.write_str(name)
    }
}

/// A literal constant pushed by a constant instruction or folded from a
/// static field.
///
/// Floating-point values are stored as raw bits so literals stay `Eq` and
/// `Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    Null,
    Word(u64),
    String(Box<str>),
}

impl Literal {
    /// Build a float literal from its value.
    pub fn float(value: f32) -> Self {
        Literal::Float(value.to_bits())
    }

    /// Build a double literal from its value.
    pub fn double(value: f64) -> Self {
        Literal::Double(value.to_bits())
    }

    /// The stack kind of this literal.
    pub fn kind(&self) -> Kind {
        match self {
            Literal::Int(_) => Kind::Int,
            Literal::Long(_) => Kind::Long,
            Literal::Float(_) => Kind::Float,
            Literal::Double(_) => Kind::Double,
            Literal::Null | Literal::String(_) => Kind::Reference,
            Literal::Word(_) => Kind::Word,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Long(v) => write!(f, "{v}L"),
            Literal::Float(bits) => write!(f, "{}F", f32::from_bits(*bits)),
            Literal::Double(bits) => write!(f, "{}D", f64::from_bits(*bits)),
            Literal::Null => f.write_str("null"),
            Literal::Word(v) => write!(f, "{v:#x}W"),
            Literal::String(s) => write!(f, "{s:?}"),
        }
    }
}
