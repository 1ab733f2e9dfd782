//! Per-method node storage and the cursor builder.
//!
//! The arena owns every node of one method's term graph. Nodes are never
//! freed; passes rewrite them in place through `*_mut` accessors.
//!
//! # Cursor building
//!
//! Translation grows a term from an unfilled [`Call`] (the cursor). Each
//! emission fills the cursor and returns the handle of the next unfilled
//! call, so an emitter never mutates shared "current position" state:
//!
//! ```text
//! let next = arena.assign(cursor, var, value);
//! // cursor is now ((λ(var). next) value)
//! ```

use cps_bytecode::Kind;
use rustc_hash::FxHashSet;

use crate::term::{
    Block, BlockId, Call, CallId, Closure, ClosureId, FrameDescriptor, FrameId, Value, VarId,
    VarRole, Variable,
};

/// Storage for one method's term graph.
#[derive(Clone, Debug, Default)]
pub struct TermArena {
    vars: Vec<Variable>,
    closures: Vec<Closure>,
    calls: Vec<Call>,
    blocks: Vec<Block>,
    frames: Vec<FrameDescriptor>,
}

fn next_id(len: usize, what: &str) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("{what} count exceeds u32::MAX"))
}

impl TermArena {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Variables ───────────────────────────────────────────────────

    /// Allocate a fresh variable.
    pub fn fresh_var(&mut self, kind: Kind, role: VarRole) -> VarId {
        let id = VarId::new(next_id(self.vars.len(), "variable"));
        self.vars.push(Variable {
            kind: kind.stack_kind(),
            role,
        });
        id
    }

    /// Allocate a fresh variable with the same kind and role as `var`.
    pub fn copy_var(&mut self, var: VarId) -> VarId {
        let Variable { kind, role } = self.vars[var.index()];
        self.fresh_var(kind, role)
    }

    #[inline]
    pub fn var(&self, id: VarId) -> Variable {
        self.vars[id.index()]
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    // ── Calls and closures ──────────────────────────────────────────

    /// Allocate an unfilled call.
    pub fn new_call(&mut self) -> CallId {
        let id = CallId::new(next_id(self.calls.len(), "call"));
        self.calls.push(Call::unfilled());
        id
    }

    #[inline]
    pub fn call(&self, id: CallId) -> &Call {
        &self.calls[id.index()]
    }

    #[inline]
    pub fn call_mut(&mut self, id: CallId) -> &mut Call {
        &mut self.calls[id.index()]
    }

    pub fn new_closure(&mut self, params: Vec<VarId>, body: CallId) -> ClosureId {
        let id = ClosureId::new(next_id(self.closures.len(), "closure"));
        self.closures.push(Closure {
            params,
            body,
            continuation: false,
        });
        id
    }

    /// Allocate a continuation with an unfilled body.
    ///
    /// Returns the continuation and its body call.
    pub fn new_continuation(&mut self, params: Vec<VarId>) -> (ClosureId, CallId) {
        debug_assert!(params.len() <= 1, "continuations bind at most one value");
        let body = self.new_call();
        let id = self.new_closure(params, body);
        self.closures[id.index()].continuation = true;
        (id, body)
    }

    #[inline]
    pub fn closure(&self, id: ClosureId) -> &Closure {
        &self.closures[id.index()]
    }

    #[inline]
    pub fn closure_mut(&mut self, id: ClosureId) -> &mut Closure {
        &mut self.closures[id.index()]
    }

    // ── Blocks and frames ───────────────────────────────────────────

    /// Allocate a block whose closure has no parameters and an unfilled
    /// body.
    pub fn new_block(&mut self, offset: u32) -> BlockId {
        let body = self.new_call();
        let closure = self.new_closure(Vec::new(), body);
        let id = BlockId::new(next_id(self.blocks.len(), "block"));
        self.blocks.push(Block {
            closure,
            offset,
            calls: 0,
        });
        id
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn new_frame(&mut self, frame: FrameDescriptor) -> FrameId {
        let id = FrameId::new(next_id(self.frames.len(), "frame"));
        self.frames.push(frame);
        id
    }

    #[inline]
    pub fn frame(&self, id: FrameId) -> &FrameDescriptor {
        &self.frames[id.index()]
    }

    #[inline]
    pub fn frame_mut(&mut self, id: FrameId) -> &mut FrameDescriptor {
        &mut self.frames[id.index()]
    }

    // ── Cursor builder ──────────────────────────────────────────────

    /// Fill the unfilled call `at`.
    pub fn fill(&mut self, at: CallId, procedure: Value, args: Vec<Value>) {
        let call = &mut self.calls[at.index()];
        debug_assert!(!call.is_filled(), "call {at} filled twice");
        call.procedure = procedure;
        call.args = args;
    }

    /// Bind `var` to `value` at `at`; returns the new cursor.
    pub fn assign(&mut self, at: CallId, var: VarId, value: Value) -> CallId {
        let next = self.new_call();
        let closure = self.new_closure(vec![var], next);
        self.fill(at, Value::Closure(closure), vec![value]);
        next
    }

    /// Fill `at` with a jump to `block`.
    pub fn jump(&mut self, at: CallId, block: BlockId) {
        self.blocks[block.index()].calls += 1;
        self.fill(at, Value::Block(block), Vec::new());
    }

    /// A parameterless continuation that jumps to `block`.
    pub fn block_continuation(&mut self, block: BlockId) -> Value {
        let (closure, body) = self.new_continuation(Vec::new());
        self.jump(body, block);
        Value::Closure(closure)
    }

    // ── Traversal ───────────────────────────────────────────────────

    /// Every closure, block, and call reachable from `root`.
    ///
    /// Traverses with an explicit stack; shared closures are visited once.
    pub fn reachable(&self, root: ClosureId) -> Reachable {
        let mut out = Reachable::default();
        let mut seen_closures = FxHashSet::default();
        let mut seen_blocks = FxHashSet::default();
        let mut stack = vec![root];

        while let Some(closure) = stack.pop() {
            if !seen_closures.insert(closure) {
                continue;
            }
            out.closures.push(closure);
            let body = self.closure(closure).body;
            out.calls.push(body);

            for value in self.call(body).values().rev() {
                match value {
                    Value::Closure(inner) => stack.push(*inner),
                    Value::Block(block) => {
                        if seen_blocks.insert(*block) {
                            out.blocks.push(*block);
                            stack.push(self.block(*block).closure);
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

/// Result of [`TermArena::reachable`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reachable {
    pub closures: Vec<ClosureId>,
    pub blocks: Vec<BlockId>,
    pub calls: Vec<CallId>,
}
