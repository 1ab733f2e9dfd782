//! Term graph node types.
//!
//! Every node lives in a [`TermArena`](crate::TermArena) and is addressed by
//! a `u32` handle. Blocks may call each other cyclically; handles keep those
//! back-references out of the ownership graph.

use std::fmt;

use cps_bytecode::{Descriptor, Kind, Literal, MethodId, SymbolRef, TypeTag};

use crate::{Builtin, Operator, Snippet, SwitchOp};

// ── Handles ─────────────────────────────────────────────────────────

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create a handle from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize` (for indexing into `Vec`s).
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// Variable handle. Allocated sequentially per method.
    VarId,
    "v"
);
define_handle!(
    /// Closure handle.
    ClosureId,
    "k"
);
define_handle!(
    /// Call handle.
    CallId,
    "c"
);
define_handle!(
    /// Block handle; one per translated source block.
    BlockId,
    "B"
);
define_handle!(
    /// Frame descriptor handle.
    FrameId,
    "f"
);

// ── Variables ───────────────────────────────────────────────────────

/// Where a variable came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarRole {
    /// Local slot `index`.
    Local(u16),
    /// Operand stack slot `index`.
    Stack(u16),
    /// Short-lived value introduced by stack shuffles or lowering.
    Temporary,
    /// The method's normal continuation, or a rebinding of one.
    NormalContinuation,
    /// The method's exception continuation, or a rebinding of one.
    ExceptionContinuation,
}

/// A single-kind IR variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Variable {
    pub kind: Kind,
    pub role: VarRole,
}

// ── Values ──────────────────────────────────────────────────────────

/// A constant operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    Literal(Literal),
    /// Unresolved symbolic reference, the operand of a resolve step.
    Guard(SymbolRef),
    /// A descriptor resolved at translation time.
    Descriptor(Box<Descriptor>),
    /// Type identity, compared against a receiver hub.
    Type(TypeTag),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Literal(lit) => write!(f, "{lit}"),
            Constant::Guard(symbol) => write!(f, "guard{symbol}"),
            Constant::Descriptor(descriptor) => write!(f, "desc{}", descriptor.symbol),
            Constant::Type(tag) => write!(f, "{tag}"),
        }
    }
}

/// An operand or procedure of a [`Call`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Var(VarId),
    Const(Constant),
    Closure(ClosureId),
    /// Reference to a shared block entry point.
    Block(BlockId),
    Switch(SwitchOp),
    /// High-level operation; only present before lowering.
    Operator(Operator),
    Builtin(Builtin),
    /// Runtime primitive introduced by lowering.
    Snippet(Snippet),
    /// Direct call target.
    Method(MethodId),
    /// Value that no path defines.
    Undefined,
}

impl Value {
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Short name of the value's category, for diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            Value::Var(_) => "variable",
            Value::Const(_) => "constant",
            Value::Closure(_) => "closure",
            Value::Block(_) => "block",
            Value::Switch(_) => "switch",
            Value::Operator(_) => "operator",
            Value::Builtin(_) => "builtin",
            Value::Snippet(_) => "snippet",
            Value::Method(_) => "method",
            Value::Undefined => "undefined",
        }
    }
}

impl From<VarId> for Value {
    fn from(var: VarId) -> Self {
        Value::Var(var)
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        Value::Const(Constant::Literal(lit))
    }
}

// ── Nodes ───────────────────────────────────────────────────────────

/// Application of a procedure to arguments.
///
/// Calls that can produce a result or raise carry their normal and
/// exception continuations as the last two arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub procedure: Value,
    pub args: Vec<Value>,
    /// Deoptimization and stack-walking metadata.
    pub frame: Option<FrameId>,
    /// Call-out to native code.
    pub native: bool,
}

impl Call {
    /// A call whose procedure is still to be filled in.
    pub fn unfilled() -> Self {
        Call {
            procedure: Value::Undefined,
            args: Vec::new(),
            frame: None,
            native: false,
        }
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        !self.procedure.is_undefined()
    }

    /// Procedure followed by arguments.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &Value> {
        std::iter::once(&self.procedure).chain(self.args.iter())
    }
}

/// Parameter list plus body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Closure {
    pub params: Vec<VarId>,
    pub body: CallId,
    /// Used in a "what happens next" argument position.
    pub continuation: bool,
}

/// Shared entry point of a translated source block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub closure: ClosureId,
    /// Bytecode offset of the first instruction.
    pub offset: u32,
    /// Number of calls referencing this block.
    pub calls: u32,
}

/// Snapshot of the source-level frame at a call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub method: MethodId,
    pub offset: u32,
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
    /// Lexically enclosing frame of an inlined call.
    pub parent: Option<FrameId>,
}

impl FrameDescriptor {
    /// Local values followed by stack values.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &Value> {
        self.locals.iter().chain(self.stack.iter())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.locals.iter_mut().chain(self.stack.iter_mut())
    }
}
