//! Bytecode method model for the CPS front end.
//!
//! This crate is the boundary between the container parser and the
//! compiler. It defines what the front end consumes:
//!
//! - **[`Method`]** — a decoded body: instruction stream with offsets,
//!   exception table, declared `(max_locals, max_stack)` capacity
//! - **[`Instruction`]** — one decoded instruction, branch targets as
//!   absolute offsets
//! - **[`SymbolTable`]** — symbolic lookup, resolution, and initialization
//!   queries
//! - **[`ReceiverProfile`]** — optional per-call-site receiver type profile
//!
//! [`SymbolPool`] is an in-memory [`SymbolTable`] for tests and closed-world
//! embedders.

mod insn;
mod kind;
mod method;
mod symbols;

pub use insn::{ArithOp, CompareOp, Condition, Instruction, InstructionAt, InvokeMode, Targets};
pub use kind::{Kind, Literal};
pub use method::{ExceptionHandler, Method, MethodBuilder, MethodFlags};
pub use symbols::{
    Descriptor, LinkageError, MethodId, NoProfile, ReceiverProfile, Resolved, SymbolKind,
    SymbolPool, SymbolRef, SymbolTable, Symbolic, TypeTag,
};
