//! CPS-IR — continuation-passing term graph for method compilation.
//!
//! Every operation names where control resumes. A method body becomes a
//! root [`Closure`] taking `(params.., cc, ce)`; source basic blocks become
//! shared [`Block`] entry points that call each other.
//!
//! # Architecture
//!
//! - **[`TermArena`]** — owns all nodes of one method, addressed by `u32`
//!   handles ([`VarId`], [`ClosureId`], [`CallId`], [`BlockId`],
//!   [`FrameId`]); also the cursor builder used during translation
//! - **[`Call`]** — procedure plus arguments, optional [`FrameDescriptor`]
//! - **[`Closure`]** — parameters plus a body call; a *continuation* when it
//!   sits in a "what happens next" argument slot
//! - **[`Operator`] / [`Builtin`] / [`Snippet`] / [`SwitchOp`]** — closed
//!   sets of non-closure procedures
//!
//! # Phases
//!
//! **HCIR** (after translation) allows variables, closures, blocks,
//! switches, high-level operators, and builtins as procedures. **LCIR**
//! (after lowering) replaces operators with snippets and direct method
//! targets. [`verify`] checks both forms plus the closedness and
//! unique-binding invariants.

mod arena;
mod ops;
pub mod print;
pub mod scope;
mod term;
pub mod verify;

pub use arena::{Reachable, TermArena};
pub use ops::{Builtin, Operator, ResolutionKind, Snippet, SwitchOp};
pub use term::{
    Block, BlockId, Call, CallId, Closure, ClosureId, Constant, FrameDescriptor, FrameId, Value,
    VarId, VarRole, Variable,
};
pub use verify::{Phase, VerifyError};
