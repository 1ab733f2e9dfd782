//! Decoded instructions.
//!
//! The container parser is not part of this workspace; it hands us an
//! already-decoded instruction stream where every branch target is an
//! absolute bytecode offset and every constant-pool reference is a
//! [`SymbolRef`].

use smallvec::SmallVec;

use crate::{Kind, Literal, SymbolRef};

/// Branch target list; most instructions have zero or one target.
pub type Targets = SmallVec<[u32; 2]>;

/// Arithmetic, logic, and shift operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    /// Shifts take an `Int` shift distance regardless of operand kind.
    #[inline]
    pub fn is_shift(self) -> bool {
        matches!(self, ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr)
    }

    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
            ArithOp::Shl => "shl",
            ArithOp::Shr => "shr",
            ArithOp::Ushr => "ushr",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
        }
    }
}

/// Three-way comparisons producing an `Int` (-1, 0, 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Long,
    /// NaN compares as -1.
    FloatL,
    /// NaN compares as 1.
    FloatG,
    DoubleL,
    DoubleG,
}

impl CompareOp {
    /// Kind of both operands.
    pub fn operand_kind(self) -> Kind {
        match self {
            CompareOp::Long => Kind::Long,
            CompareOp::FloatL | CompareOp::FloatG => Kind::Float,
            CompareOp::DoubleL | CompareOp::DoubleG => Kind::Double,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompareOp::Long => "lcmp",
            CompareOp::FloatL => "fcmpl",
            CompareOp::FloatG => "fcmpg",
            CompareOp::DoubleL => "dcmpl",
            CompareOp::DoubleG => "dcmpg",
        }
    }
}

/// Branch condition of a two-way conditional branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Condition {
    pub fn name(self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Lt => "lt",
            Condition::Ge => "ge",
            Condition::Gt => "gt",
            Condition::Le => "le",
        }
    }
}

/// Dispatch flavour of an invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvokeMode {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeMode {
    /// Whether the first argument is a receiver object.
    #[inline]
    pub fn has_receiver(self) -> bool {
        !matches!(self, InvokeMode::Static)
    }
}

/// A single decoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Push a literal constant.
    Const(Literal),
    /// Push local `index`. A `Reference` load also accepts a `Word` slot.
    Load { kind: Kind, index: u16 },
    /// Pop into local `index`. A `Reference` store also accepts a `Word`.
    Store { kind: Kind, index: u16 },
    /// Add a constant to an `Int` local in place.
    Iinc { index: u16, delta: i32 },

    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,

    Arith { op: ArithOp, kind: Kind },
    Neg(Kind),
    Convert { from: Kind, to: Kind },
    Compare(CompareOp),

    /// Compare the top `Int` against zero.
    IfZero { cond: Condition, target: u32 },
    /// Compare the two top values (`Int`, or `Reference` for `Eq`/`Ne`).
    IfCompare { kind: Kind, cond: Condition, target: u32 },
    /// Branch if the top reference is (or is not) null.
    IfNull { is_null: bool, target: u32 },
    Goto { target: u32 },
    /// Dense switch over `low..low + targets.len()`.
    TableSwitch { low: i32, targets: Vec<u32>, default: u32 },
    /// Sparse switch over explicit match values.
    LookupSwitch { pairs: Vec<(i32, u32)>, default: u32 },
    /// Return a value of the given kind (`Void` for no value).
    Return(Kind),

    GetField(SymbolRef),
    PutField(SymbolRef),
    GetStatic(SymbolRef),
    PutStatic(SymbolRef),
    Invoke { mode: InvokeMode, method: SymbolRef },

    New(SymbolRef),
    /// Primitive array of the given element kind.
    NewArray(Kind),
    /// Reference array with the given element class.
    ANewArray(SymbolRef),
    MultiANewArray { class: SymbolRef, dimensions: u8 },
    ArrayLength,
    ArrayLoad(Kind),
    ArrayStore(Kind),

    Athrow,
    CheckCast(SymbolRef),
    InstanceOf(SymbolRef),
    MonitorEnter,
    MonitorExit,
    /// Push the class mirror of a class literal.
    LdcClass(SymbolRef),
    /// Call out to a native function described by `method`.
    CallNative { method: SymbolRef },

    /// Subroutines are rejected; the upstream verifier inlines them.
    Jsr { target: u32 },
    Ret { index: u16 },
}

impl Instruction {
    /// Explicit branch targets of this instruction, in source order.
    ///
    /// For switches the default target comes last.
    pub fn targets(&self) -> Targets {
        let mut out = Targets::new();
        match self {
            Instruction::IfZero { target, .. }
            | Instruction::IfCompare { target, .. }
            | Instruction::IfNull { target, .. }
            | Instruction::Goto { target }
            | Instruction::Jsr { target } => out.push(*target),
            Instruction::TableSwitch {
                targets, default, ..
            } => {
                out.extend(targets.iter().copied());
                out.push(*default);
            }
            Instruction::LookupSwitch { pairs, default } => {
                out.extend(pairs.iter().map(|&(_, target)| target));
                out.push(*default);
            }
            _ => {}
        }
        out
    }

    /// Whether control can continue to the next instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Instruction::Goto { .. }
                | Instruction::TableSwitch { .. }
                | Instruction::LookupSwitch { .. }
                | Instruction::Return(_)
                | Instruction::Athrow
                | Instruction::Jsr { .. }
                | Instruction::Ret { .. }
        )
    }

    /// Whether this instruction ends a basic block.
    pub fn ends_block(&self) -> bool {
        !self.falls_through() || !self.targets().is_empty()
    }
}

/// An instruction together with its bytecode offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionAt {
    pub offset: u32,
    pub insn: Instruction,
}
