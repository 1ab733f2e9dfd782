//! Block translation: bytecode to high-level CPS-IR.
//!
//! Each source block is interpreted once over an abstract [`Frame`] and
//! [`Stack`], starting from the snapshot taken when the block was first
//! referenced. Every instruction either extends the term at the cursor and
//! moves the cursor into the new continuation, or terminates the block.
//!
//! The result is a root closure `(params.., cc, ce)` whose body jumps to the
//! entry block. Block bodies still refer to variables bound in other blocks;
//! [`closure`](crate::closure) makes them self-contained afterwards.

mod block;

use cps_bytecode::{Kind, Method, SymbolTable};
use cps_ir::{BlockId, ClosureId, TermArena, VarId, VarRole};

use crate::config::TranslateConfig;
use crate::error::{Malformed, Result, TranslateError};
use crate::layout::{Layout, SourceBlock};
use crate::slots::{Frame, Stack, VariableFactory};

use block::{BlockTranslation, Flow};

/// Translate `method` into a high-level term graph.
///
/// Returns the arena and the root closure.
pub fn translate_blocks(
    method: &Method,
    symbols: &dyn SymbolTable,
    config: &TranslateConfig,
) -> Result<(TermArena, ClosureId)> {
    let layout = Layout::compute(method)?;
    let (mut translation, root) = MethodTranslation::start(method, symbols, config, layout)?;

    let mut translated = 0usize;
    while let Some(index) = translation.worklist.pop() {
        translation.translate_block(index)?;
        translated += 1;
    }

    tracing::debug!(
        method = %method.id,
        blocks = translated,
        vars = translation.arena.num_vars(),
        "translated blocks"
    );
    Ok((translation.arena, root))
}

/// Per-source-block translation state.
#[derive(Default)]
struct BlockState {
    block: Option<BlockId>,
    /// Frame and stack at the first reference to the block.
    entry: Option<(Frame, Stack)>,
}

/// State shared by all block translations of one method.
pub(crate) struct MethodTranslation<'a> {
    method: &'a Method,
    symbols: &'a dyn SymbolTable,
    config: &'a TranslateConfig,
    layout: Layout,
    arena: TermArena,
    factory: VariableFactory,
    states: Vec<BlockState>,
    worklist: Vec<usize>,
    cc: VarId,
    ce: VarId,
}

impl<'a> MethodTranslation<'a> {
    /// Build the root closure and queue the entry block.
    fn start(
        method: &'a Method,
        symbols: &'a dyn SymbolTable,
        config: &'a TranslateConfig,
        layout: Layout,
    ) -> Result<(Self, ClosureId)> {
        let at_entry = |kind| TranslateError::malformed(method.id, 0, kind);
        let mut arena = TermArena::new();
        let mut factory = VariableFactory::new();
        let mut frame = Frame::new(method.max_locals);

        let mut params = Vec::with_capacity(method.params.len() + 2);
        let mut index: u16 = 0;
        for &kind in &method.params {
            let var = factory.local(&mut arena, kind, index);
            frame.store(index, var, kind).map_err(at_entry)?;
            params.push(var);
            let width: u16 = if kind.is_two_slot() { 2 } else { 1 };
            index = index.saturating_add(width);
        }
        let cc = arena.fresh_var(Kind::Word, VarRole::NormalContinuation);
        let ce = arena.fresh_var(Kind::Word, VarRole::ExceptionContinuation);
        params.extend([cc, ce]);

        let body = arena.new_call();
        let root = arena.new_closure(params, body);

        let states = std::iter::repeat_with(BlockState::default)
            .take(layout.blocks.len())
            .collect();
        let mut translation = MethodTranslation {
            method,
            symbols,
            config,
            layout,
            arena,
            factory,
            states,
            worklist: Vec::new(),
            cc,
            ce,
        };
        let entry = translation
            .block_for(0, &frame, &Stack::new(method.max_stack))
            .map_err(at_entry)?;
        translation.arena.jump(body, entry);
        Ok((translation, root))
    }

    /// The block for source block `index`, queueing it on first reference
    /// with the given entry state.
    fn block_for(
        &mut self,
        index: usize,
        frame: &Frame,
        stack: &Stack,
    ) -> Result<BlockId, Malformed> {
        let state = &mut self.states[index];
        if let Some(block) = state.block {
            if let Some((_, entry_stack)) = &state.entry {
                if entry_stack.depth() != stack.depth() {
                    return Err(Malformed::InconsistentStack {
                        expected: entry_stack.depth(),
                        found: stack.depth(),
                    });
                }
            }
            return Ok(block);
        }

        let start = self.layout.blocks[index].start;
        let block = self.arena.new_block(self.method.code[start].offset);
        state.block = Some(block);
        state.entry = Some((frame.clone(), stack.clone()));
        self.worklist.push(index);
        Ok(block)
    }

    fn translate_block(&mut self, index: usize) -> Result<()> {
        let method = self.method;
        let state = &self.states[index];
        let (Some(block), Some((frame, stack))) = (state.block, state.entry.clone()) else {
            return Err(TranslateError::Internal {
                method: method.id,
                message: format!("block {index} queued without an entry state"),
            });
        };
        let SourceBlock { start, end } = self.layout.blocks[index];
        let safepoint = self.layout.safepoint[index];
        let cursor = self.arena.closure(self.arena.block(block).closure).body;

        tracing::trace!(
            method = %method.id,
            %block,
            offset = method.code[start].offset,
            "translating block"
        );

        let mut translation = BlockTranslation::new(self, frame, stack, cursor, start);
        if safepoint {
            let offset = method.code[start].offset;
            translation
                .safepoint()
                .map_err(|kind| TranslateError::malformed(method.id, offset, kind))?;
        }
        for i in start..end {
            let insn = &method.code[i];
            translation.at(i);
            let flow = translation
                .instruction(&insn.insn)
                .map_err(|kind| TranslateError::malformed(method.id, insn.offset, kind))?;
            if flow == Flow::Done {
                return Ok(());
            }
        }

        // No terminator: fall through to the next block.
        let last = method.code[end - 1].offset;
        let Some(next) = method.code.get(end) else {
            return Err(TranslateError::malformed(method.id, last, Malformed::FallsOffEnd));
        };
        translation
            .fall_through(next.offset)
            .map_err(|kind| TranslateError::malformed(method.id, last, kind))
    }
}

#[cfg(test)]
mod tests;
