//! Shared test utilities for the translation passes.
//!
//! Builders for small methods and symbol pools, plus queries over the
//! resulting term graphs. Only compiled in test builds.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use cps_bytecode::{Instruction, Kind, Method, MethodBuilder, MethodId, SymbolPool, TypeTag};
use cps_ir::{BlockId, Call, CallId, ClosureId, Snippet, TermArena, Value, VarId};
use rustc_hash::FxHashMap;

use crate::config::TranslateConfig;
use crate::translate::translate_blocks;

/// Type tag of the holder class used by [`pool`] symbols.
pub(crate) const HOLDER: TypeTag = TypeTag::new(1);

/// A static method `m0` with room for four locals and four stack slots.
pub(crate) fn method(code: Vec<Instruction>) -> MethodBuilder {
    Method::builder(MethodId::new(0), "test")
        .max_locals(4)
        .max_stack(4)
        .code(code)
}

/// A static `(int, int) -> int` method.
pub(crate) fn binary_method(code: Vec<Instruction>) -> Method {
    method(code)
        .params(vec![Kind::Int, Kind::Int])
        .result(Kind::Int)
        .build()
}

/// An empty pool.
pub(crate) fn pool() -> SymbolPool {
    SymbolPool::new()
}

/// Translate to HCIR with every optional rewrite off.
pub(crate) fn hcir(method: &Method, symbols: &SymbolPool) -> (TermArena, ClosureId) {
    translate_blocks(method, symbols, &TranslateConfig::plain()).unwrap()
}

/// Every call reachable from `root`, in traversal order.
pub(crate) fn calls(arena: &TermArena, root: ClosureId) -> Vec<&Call> {
    arena
        .reachable(root)
        .calls
        .into_iter()
        .map(|call| arena.call(call))
        .collect()
}

/// Reachable calls whose procedure satisfies `pred`.
pub(crate) fn calls_where(
    arena: &TermArena,
    root: ClosureId,
    pred: impl Fn(&Value) -> bool,
) -> Vec<CallId> {
    arena
        .reachable(root)
        .calls
        .into_iter()
        .filter(|&call| pred(&arena.call(call).procedure))
        .collect()
}

/// The single reachable call whose procedure is `procedure`.
pub(crate) fn only_call(arena: &TermArena, root: ClosureId, procedure: &Value) -> CallId {
    let found = calls_where(arena, root, |p| p == procedure);
    assert_eq!(found.len(), 1, "expected one call to {procedure:?}");
    found[0]
}

/// Snippets called along the graph, in traversal order.
///
/// A chain is a sequence of nested continuations, so for straight-line
/// code this is the chain order.
pub(crate) fn snippets(arena: &TermArena, root: ClosureId) -> Vec<Snippet> {
    calls(arena, root)
        .into_iter()
        .filter_map(|call| match call.procedure {
            Value::Snippet(snippet) => Some(snippet),
            _ => None,
        })
        .collect()
}

/// The reachable block starting at bytecode `offset`.
pub(crate) fn block_at(arena: &TermArena, root: ClosureId, offset: u32) -> BlockId {
    arena
        .reachable(root)
        .blocks
        .into_iter()
        .find(|&block| arena.block(block).offset == offset)
        .unwrap_or_else(|| panic!("no block at offset {offset}"))
}

/// Parameter count of the closure behind `block`.
pub(crate) fn block_arity(arena: &TermArena, block: BlockId) -> usize {
    arena.closure(arena.block(block).closure).params.len()
}

pub(crate) fn closure_of(value: &Value) -> ClosureId {
    match value {
        Value::Closure(closure) => *closure,
        other => panic!("expected a closure, found {other:?}"),
    }
}

pub(crate) fn var_of(value: &Value) -> VarId {
    match value {
        Value::Var(var) => *var,
        other => panic!("expected a variable, found {other:?}"),
    }
}

/// Arguments of `target`, with plain copies followed back to their source.
///
/// Walks calls in traversal order, which is execution order only within
/// straight-line code.
pub(crate) fn resolved_args(arena: &TermArena, root: ClosureId, target: CallId) -> Vec<Value> {
    fn resolve(copies: &FxHashMap<VarId, Value>, value: &Value) -> Value {
        match value {
            Value::Var(var) => copies.get(var).cloned().unwrap_or_else(|| value.clone()),
            other => other.clone(),
        }
    }

    let mut copies: FxHashMap<VarId, Value> = FxHashMap::default();
    for call_id in arena.reachable(root).calls {
        let call = arena.call(call_id);
        if call_id == target {
            return call.args.iter().map(|arg| resolve(&copies, arg)).collect();
        }
        match (&call.procedure, call.args.as_slice()) {
            (Value::Closure(closure), [value]) if !arena.closure(*closure).continuation => {
                let resolved = resolve(&copies, value);
                for &param in &arena.closure(*closure).params {
                    copies.insert(param, resolved.clone());
                }
            }
            _ => {
                for arg in &call.args {
                    if let Value::Closure(closure) = arg {
                        for param in &arena.closure(*closure).params {
                            copies.remove(param);
                        }
                    }
                }
            }
        }
    }
    panic!("{target} is not reachable");
}
