//! Flat text rendering of a term graph.
//!
//! Each reachable closure is printed on its own line as
//! `k3(v1 v2) = procedure arg..`, so deeply nested bodies never recurse.
//! Blocks are listed with the closure they wrap:
//!
//! ```text
//! k0(v0 v1 v2) = B0
//! B0 @0 calls=1 -> k1
//! k1() = add.i v0 1 k2 _ [f0]
//! k2^(v3) = v1 v3
//! ```
//!
//! `^` marks continuations, `_` is the undefined value.

use std::fmt::{self, Write};

use crate::{ClosureId, TermArena, Value};

struct ValueDisplay<'a>(&'a Value);

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Var(var) => write!(f, "{var}"),
            Value::Const(constant) => write!(f, "{constant}"),
            Value::Closure(closure) => write!(f, "{closure}"),
            Value::Block(block) => write!(f, "{block}"),
            Value::Switch(op) => write!(f, "{op}"),
            Value::Operator(op) => write!(f, "op:{}", op.name()),
            Value::Builtin(builtin) => write!(f, "{builtin}"),
            Value::Snippet(snippet) => write!(f, "{}", snippet.name()),
            Value::Method(method) => write!(f, "{method}"),
            Value::Undefined => f.write_str("_"),
        }
    }
}

/// Render everything reachable from `root`.
pub fn print(arena: &TermArena, root: ClosureId) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_graph(&mut out, arena, root);
    out
}

fn write_graph(out: &mut String, arena: &TermArena, root: ClosureId) -> fmt::Result {
    let reachable = arena.reachable(root);
    for &block in &reachable.blocks {
        let node = arena.block(block);
        writeln!(
            out,
            "{block} @{} calls={} -> {}",
            node.offset, node.calls, node.closure
        )?;
    }
    for &closure in &reachable.closures {
        let node = arena.closure(closure);
        let marker = if node.continuation { "^" } else { "" };
        write!(out, "{closure}{marker}(")?;
        for (i, param) in node.params.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            write!(out, "{param}")?;
        }
        let call = arena.call(node.body);
        write!(out, ") = {}", ValueDisplay(&call.procedure))?;
        for arg in &call.args {
            write!(out, " {}", ValueDisplay(arg))?;
        }
        if let Some(frame) = call.frame {
            write!(out, " [{frame}")?;
            if let Some(parent) = arena.frame(frame).parent {
                write!(out, " < {parent}")?;
            }
            out.push(']');
        }
        if call.native {
            out.push_str(" native");
        }
        out.push('\n');
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cps_bytecode::{Kind, Literal};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::VarRole;

    #[test]
    fn prints_assignment_chain() {
        let mut arena = TermArena::new();
        let cc = arena.fresh_var(Kind::Word, VarRole::NormalContinuation);
        let body = arena.new_call();
        let root = arena.new_closure(vec![cc], body);
        let x = arena.fresh_var(Kind::Int, VarRole::Stack(0));
        let next = arena.assign(body, x, Literal::Int(5).into());
        arena.fill(next, Value::Var(cc), vec![Value::Var(x)]);

        assert_eq!(print(&arena, root), "k0(v0) = k1 5\nk1(v1) = v0 v1\n");
    }

    #[test]
    fn prints_blocks_and_continuations() {
        let mut arena = TermArena::new();
        let body = arena.new_call();
        let root = arena.new_closure(Vec::new(), body);
        let block = arena.new_block(7);
        let jump = arena.block_continuation(block);
        arena.fill(body, Value::Var(crate::VarId::new(9)), vec![jump]);
        let block_body = arena.closure(arena.block(block).closure).body;
        arena.fill(block_body, Value::Var(crate::VarId::new(9)), Vec::new());

        let text = print(&arena, root);
        assert!(text.contains("B0 @7 calls=1 -> k1"));
        assert!(text.contains("k2^() = B0"));
    }
}
