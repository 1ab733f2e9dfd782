//! Structural verifiers.
//!
//! Each verifier walks everything reachable from a root closure and reports
//! the first violation found. A failure always means a translator defect:
//! the input bytecode has already been checked by then.

use std::collections::VecDeque;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::scope::{ScopeChain, ScopeId};
use crate::{CallId, ClosureId, SwitchOp, TermArena, Value, VarId};

/// Which phase of the term graph a procedure check applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Before lowering: high-level operators allowed, snippets not.
    High,
    /// After lowering: primitives only.
    Low,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::High => f.write_str("HCIR"),
            Phase::Low => f.write_str("LCIR"),
        }
    }
}

/// A violated structural invariant.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("call {call} was never filled")]
    UnfilledCall { call: CallId },
    #[error("call {call}: a {found} is not a valid {phase} procedure")]
    InvalidProcedure {
        call: CallId,
        phase: Phase,
        found: &'static str,
    },
    #[error("call {call}: continuation {closure} at argument {position} of {len}")]
    MisplacedContinuation {
        call: CallId,
        closure: ClosureId,
        position: usize,
        len: usize,
    },
    #[error("call {call}: continuation {closure} used as a procedure")]
    ContinuationAsProcedure { call: CallId, closure: ClosureId },
    #[error("continuation {closure} binds {params} values")]
    ContinuationArity { closure: ClosureId, params: usize },
    #[error("call {call} references {var} outside any binding")]
    Unbound { call: CallId, var: VarId },
    #[error("{var} is bound by both {first} and {second}")]
    Rebound {
        var: VarId,
        first: ClosureId,
        second: ClosureId,
    },
}

fn allowed(phase: Phase, procedure: &Value) -> bool {
    match procedure {
        Value::Var(_)
        | Value::Closure(_)
        | Value::Block(_)
        | Value::Switch(_)
        | Value::Builtin(_) => true,
        Value::Operator(_) => phase == Phase::High,
        Value::Snippet(_) | Value::Method(_) => phase == Phase::Low,
        Value::Const(_) | Value::Undefined => false,
    }
}

/// Check the high-level form: procedure kinds and continuation placement.
pub fn verify_hcir(arena: &TermArena, root: ClosureId) -> Result<(), VerifyError> {
    verify_phase(arena, root, Phase::High)
}

/// Check the lowered form: no high-level operator remains.
pub fn verify_lcir(arena: &TermArena, root: ClosureId) -> Result<(), VerifyError> {
    verify_phase(arena, root, Phase::Low)
}

fn verify_phase(arena: &TermArena, root: ClosureId, phase: Phase) -> Result<(), VerifyError> {
    let reachable = arena.reachable(root);

    for &closure in &reachable.closures {
        let node = arena.closure(closure);
        if node.continuation && node.params.len() > 1 {
            return Err(VerifyError::ContinuationArity {
                closure,
                params: node.params.len(),
            });
        }
    }

    for &call_id in &reachable.calls {
        let call = arena.call(call_id);
        if !call.is_filled() {
            return Err(VerifyError::UnfilledCall { call: call_id });
        }
        if !allowed(phase, &call.procedure) {
            return Err(VerifyError::InvalidProcedure {
                call: call_id,
                phase,
                found: call.procedure.category(),
            });
        }
        if let Value::Closure(closure) = call.procedure {
            if arena.closure(closure).continuation {
                return Err(VerifyError::ContinuationAsProcedure {
                    call: call_id,
                    closure,
                });
            }
        }
        check_continuation_positions(arena, call_id)?;
    }
    Ok(())
}

/// Continuations only as the last one or two arguments.
///
/// The case targets of an n-way switch are exempt.
fn check_continuation_positions(arena: &TermArena, call_id: CallId) -> Result<(), VerifyError> {
    let call = arena.call(call_id);
    if matches!(call.procedure, Value::Switch(SwitchOp::Multi { .. })) {
        return Ok(());
    }
    let len = call.args.len();
    for (position, arg) in call.args.iter().enumerate() {
        let Value::Closure(closure) = *arg else {
            continue;
        };
        if arena.closure(closure).continuation && position + 2 < len {
            return Err(VerifyError::MisplacedContinuation {
                call: call_id,
                closure,
                position,
                len,
            });
        }
    }
    Ok(())
}

/// Check that every variable reference is bound on its binding path.
///
/// The root and each block are checked as separate closed scopes: blocks
/// see only their own parameters and what they bind internally. A closure
/// referenced from several calls is checked in the scope of its shallowest
/// use, so traversal is breadth-first.
pub fn verify_closed(arena: &TermArena, root: ClosureId) -> Result<(), VerifyError> {
    let reachable = arena.reachable(root);
    let entries = std::iter::once(root).chain(
        reachable
            .blocks
            .iter()
            .map(|&block| arena.block(block).closure),
    );

    let mut chain = ScopeChain::new();
    let mut seen = FxHashSet::default();
    for entry in entries {
        let scope = chain.push(None, &arena.closure(entry).params);
        let mut queue: VecDeque<(CallId, ScopeId)> = VecDeque::new();
        queue.push_back((arena.closure(entry).body, scope));

        while let Some((call_id, scope)) = queue.pop_front() {
            let call = arena.call(call_id);
            let frame_values = call
                .frame
                .into_iter()
                .flat_map(move |frame| arena.frame(frame).values());
            for value in call.values().chain(frame_values) {
                match *value {
                    Value::Var(var) if !chain.binds(Some(scope), var) => {
                        return Err(VerifyError::Unbound { call: call_id, var });
                    }
                    Value::Closure(closure) if seen.insert(closure) => {
                        let inner = arena.closure(closure);
                        let inner_scope = chain.push(Some(scope), &inner.params);
                        queue.push_back((inner.body, inner_scope));
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Check that no variable is bound by more than one closure node.
pub fn verify_unique_bindings(arena: &TermArena, root: ClosureId) -> Result<(), VerifyError> {
    let mut binders: FxHashMap<VarId, ClosureId> = FxHashMap::default();
    for closure in arena.reachable(root).closures {
        for &var in &arena.closure(closure).params {
            if let Some(&first) = binders.get(&var) {
                return Err(VerifyError::Rebound {
                    var,
                    first,
                    second: closure,
                });
            }
            binders.insert(var, closure);
        }
    }
    Ok(())
}
