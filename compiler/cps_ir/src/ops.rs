//! Procedures that are not closures or blocks.
//!
//! The sets are closed: the lowerer matches exhaustively over [`Operator`],
//! and adding a variant forces every pass to handle it.

use std::fmt;

use cps_bytecode::{ArithOp, CompareOp, Condition, InvokeMode, Kind, SymbolRef};

// ── High-level operators ────────────────────────────────────────────

/// A source-level operation that still needs resolution, initialization,
/// and safety checks spelled out.
///
/// Argument layout is the operand list followed by the normal and exception
/// continuations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `[object, cc, ce]`
    GetField { field: SymbolRef, kind: Kind },
    /// `[object, value, cc, ce]`
    PutField { field: SymbolRef, kind: Kind },
    /// `[cc, ce]`
    GetStatic { field: SymbolRef, kind: Kind },
    /// `[value, cc, ce]`
    PutStatic { field: SymbolRef, kind: Kind },
    /// `[receiver?, args.., cc, ce]`
    Invoke { mode: InvokeMode, method: SymbolRef },
    /// `[cc, ce]`
    New { class: SymbolRef },
    /// `[length, cc, ce]`
    NewArray { element: Kind },
    /// `[length, cc, ce]`
    NewReferenceArray { class: SymbolRef },
    /// `[dim.., cc, ce]`
    NewMultiArray { class: SymbolRef, dimensions: u8 },
    /// `[array, cc, ce]`
    ArrayLength,
    /// `[array, index, cc, ce]`
    ArrayLoad { kind: Kind },
    /// `[array, index, value, cc, ce]`
    ArrayStore { kind: Kind },
    /// `[object, cc, ce]`
    CheckCast { class: SymbolRef },
    /// `[object, cc, ce]`
    InstanceOf { class: SymbolRef },
    /// `[object, cc, ce]`
    MonitorEnter,
    /// `[object, cc, ce]`
    MonitorExit,
    /// `[cc, ce]`
    Mirror { class: SymbolRef },
    /// `[throwable, undefined, ce]`
    Throw,
    /// `[cc, undefined]`
    Safepoint,
    /// `[args.., cc, ce]`
    CallNative {
        method: SymbolRef,
        result: Kind,
        /// Caller runs in interrupt context.
        restricted: bool,
    },
}

impl Operator {
    /// Whether the operator needs an exception continuation.
    pub fn can_raise(self) -> bool {
        !matches!(self, Operator::Safepoint)
    }

    pub fn name(self) -> &'static str {
        match self {
            Operator::GetField { .. } => "getfield",
            Operator::PutField { .. } => "putfield",
            Operator::GetStatic { .. } => "getstatic",
            Operator::PutStatic { .. } => "putstatic",
            Operator::Invoke { mode, .. } => match mode {
                InvokeMode::Virtual => "invokevirtual",
                InvokeMode::Special => "invokespecial",
                InvokeMode::Static => "invokestatic",
                InvokeMode::Interface => "invokeinterface",
            },
            Operator::New { .. } => "new",
            Operator::NewArray { .. } => "newarray",
            Operator::NewReferenceArray { .. } => "anewarray",
            Operator::NewMultiArray { .. } => "multianewarray",
            Operator::ArrayLength => "arraylength",
            Operator::ArrayLoad { .. } => "arrayload",
            Operator::ArrayStore { .. } => "arraystore",
            Operator::CheckCast { .. } => "checkcast",
            Operator::InstanceOf { .. } => "instanceof",
            Operator::MonitorEnter => "monitorenter",
            Operator::MonitorExit => "monitorexit",
            Operator::Mirror { .. } => "mirror",
            Operator::Throw => "throw",
            Operator::Safepoint => "safepoint",
            Operator::CallNative { .. } => "callnative",
        }
    }
}

// ── Builtins ────────────────────────────────────────────────────────

/// Instruction-native primitive that survives lowering unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Arith { op: ArithOp, kind: Kind },
    Neg(Kind),
    Convert { from: Kind, to: Kind },
    Compare(CompareOp),
}

impl Builtin {
    /// Integer division and remainder raise on a zero divisor.
    pub fn can_raise(self) -> bool {
        matches!(
            self,
            Builtin::Arith {
                op: ArithOp::Div | ArithOp::Rem,
                kind: Kind::Int | Kind::Long,
            }
        )
    }

    pub fn result_kind(self) -> Kind {
        match self {
            Builtin::Arith { kind, .. } | Builtin::Neg(kind) => kind,
            Builtin::Convert { to, .. } => to.stack_kind(),
            Builtin::Compare(_) => Kind::Int,
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Builtin::Arith { op, kind } => write!(f, "{}.{}", op.name(), kind.mnemonic()),
            Builtin::Neg(kind) => write!(f, "neg.{}", kind.mnemonic()),
            Builtin::Convert { from, to } => {
                write!(f, "{}2{}", from.mnemonic(), to.mnemonic())
            }
            Builtin::Compare(op) => f.write_str(op.name()),
        }
    }
}

// ── Snippets ────────────────────────────────────────────────────────

/// What a resolve step looks up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolutionKind {
    Class,
    InstanceField,
    StaticField,
    StaticMethod,
    SpecialMethod,
    VirtualMethod,
    InterfaceMethod,
    NativeMethod,
}

/// Runtime primitive introduced by lowering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Snippet {
    /// `[guard, cc(descriptor), ce]`
    Resolve(ResolutionKind),
    /// `[descriptor, cc, ce]`; initializes the holder of a member.
    MakeHolderInitialized,
    /// `[descriptor, cc, ce]`; initializes a class about to be instantiated.
    MakeClassInitialized,
    /// `[reference, cc, ce]`
    CheckNull,
    /// `[array, index, cc, ce]`
    CheckArrayIndex,
    /// `[array, value, cc, ce]`
    CheckReferenceArrayStore,
    /// `[length, cc, ce]`
    CheckArrayDimension,
    /// `[object, descriptor, cc(value), ce]`
    FieldRead(Kind),
    /// `[object, descriptor, value, cc, ce]`
    FieldWrite(Kind),
    /// `[descriptor, cc(statics), ce]`
    StaticTuple,
    /// `[array, index, cc(value), ce]`
    ArrayRead(Kind),
    /// `[array, index, value, cc, ce]`
    ArrayWrite(Kind),
    /// `[array, cc(length), ce]`
    ReadArrayLength,
    /// `[descriptor, cc(object), ce]`
    CreateTupleOrHybrid,
    /// `[length, cc(array), ce]`
    CreatePrimitiveArray(Kind),
    /// `[descriptor, length, cc(array), ce]`
    CreateReferenceArray,
    /// `[descriptor, dim.., cc(array), ce]`
    CreateMultiReferenceArray,
    /// `[descriptor, object, cc(object), ce]`
    CheckCast,
    /// `[descriptor, object, cc(int), ce]`
    InstanceOf,
    MonitorEnter,
    MonitorExit,
    /// `[descriptor, cc(mirror), ce]`
    ClassMirror,
    /// `[object, cc(hub), ce]`
    ReadHub,
    /// `[receiver, descriptor, cc(entry), ce]`
    SelectVirtualMethod,
    /// `[receiver, descriptor, cc(entry), ce]`
    SelectInterfaceMethod,
    /// `[throwable, undefined, ce]`
    RaiseThrowable,
    /// `[cc, undefined]`
    Safepoint,
    /// `[descriptor, cc(entry), ce]`
    LinkNativeMethod,
    /// `[cc(context), ce]`
    NativeCallPrologue,
    /// `[context, cc, ce]`
    NativeCallEpilogue,
}

impl Snippet {
    pub fn name(self) -> &'static str {
        match self {
            Snippet::Resolve(_) => "resolve",
            Snippet::MakeHolderInitialized => "make-holder-initialized",
            Snippet::MakeClassInitialized => "make-class-initialized",
            Snippet::CheckNull => "check-null",
            Snippet::CheckArrayIndex => "check-array-index",
            Snippet::CheckReferenceArrayStore => "check-reference-array-store",
            Snippet::CheckArrayDimension => "check-array-dimension",
            Snippet::FieldRead(_) => "field-read",
            Snippet::FieldWrite(_) => "field-write",
            Snippet::StaticTuple => "static-tuple",
            Snippet::ArrayRead(_) => "array-read",
            Snippet::ArrayWrite(_) => "array-write",
            Snippet::ReadArrayLength => "read-array-length",
            Snippet::CreateTupleOrHybrid => "create-tuple-or-hybrid",
            Snippet::CreatePrimitiveArray(_) => "create-primitive-array",
            Snippet::CreateReferenceArray => "create-reference-array",
            Snippet::CreateMultiReferenceArray => "create-multi-reference-array",
            Snippet::CheckCast => "checkcast",
            Snippet::InstanceOf => "instanceof",
            Snippet::MonitorEnter => "monitor-enter",
            Snippet::MonitorExit => "monitor-exit",
            Snippet::ClassMirror => "class-mirror",
            Snippet::ReadHub => "read-hub",
            Snippet::SelectVirtualMethod => "select-virtual-method",
            Snippet::SelectInterfaceMethod => "select-interface-method",
            Snippet::RaiseThrowable => "raise-throwable",
            Snippet::Safepoint => "safepoint",
            Snippet::LinkNativeMethod => "link-native-method",
            Snippet::NativeCallPrologue => "native-call-prologue",
            Snippet::NativeCallEpilogue => "native-call-epilogue",
        }
    }
}

// ── Switches ────────────────────────────────────────────────────────

/// Primitive branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwitchOp {
    /// `[a, b, taken, not_taken]`
    Compare { kind: Kind, cond: Condition },
    /// `[key, match1..matchN, target1..targetN, default]`
    Multi { cases: u32 },
}

impl fmt::Display for SwitchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchOp::Compare { kind, cond } => {
                write!(f, "switch.{}.{}", cond.name(), kind.mnemonic())
            }
            SwitchOp::Multi { cases } => write!(f, "switch.multi{cases}"),
        }
    }
}
