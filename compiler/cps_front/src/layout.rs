//! Basic block boundaries of a method body.
//!
//! A block starts at offset 0, at every branch or switch target, after
//! every instruction that ends a block, and at every exception handler
//! boundary. Splitting at handler boundaries keeps the covering handler
//! constant within a block.

use cps_bytecode::Method;
use rustc_hash::FxHashMap;

use crate::error::{Malformed, Result, TranslateError};

/// Instruction index range `start..end` of one source block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceBlock {
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug)]
pub struct Layout {
    pub blocks: Vec<SourceBlock>,
    /// Index into the exception table of the handler covering each
    /// instruction.
    pub handler_of: Vec<Option<usize>>,
    /// Blocks targeted by a backward branch.
    pub safepoint: Vec<bool>,
    block_at: FxHashMap<u32, usize>,
}

impl Layout {
    pub fn compute(method: &Method) -> Result<Layout> {
        let code = &method.code;
        let Some(last) = code.last() else {
            return Err(TranslateError::malformed(method.id, 0, Malformed::EmptyCode));
        };
        let invalid = |at: u32, target: u32| {
            TranslateError::malformed(method.id, at, Malformed::InvalidTarget { target })
        };

        let mut leader = vec![false; code.len()];
        leader[0] = true;
        let mut backward = Vec::new();

        for (i, insn) in code.iter().enumerate() {
            for target in insn.insn.targets() {
                let j = method
                    .index_of(target)
                    .ok_or_else(|| invalid(insn.offset, target))?;
                leader[j] = true;
                if target <= insn.offset {
                    backward.push(j);
                }
            }
            if insn.insn.ends_block() && i + 1 < code.len() {
                leader[i + 1] = true;
            }
        }

        for handler in &method.handlers {
            if handler.catch_type.is_some() {
                return Err(TranslateError::malformed(
                    method.id,
                    handler.handler,
                    Malformed::Unsupported("typed exception handler"),
                ));
            }
            for offset in [handler.start, handler.handler] {
                let j = method
                    .index_of(offset)
                    .ok_or_else(|| invalid(offset, offset))?;
                leader[j] = true;
            }
            if handler.end <= handler.start {
                return Err(invalid(handler.start, handler.end));
            }
            match method.index_of(handler.end) {
                Some(j) => leader[j] = true,
                // The range may extend to the end of the code.
                None if handler.end > last.offset => {}
                None => return Err(invalid(handler.start, handler.end)),
            }
        }

        let mut handler_of = Vec::with_capacity(code.len());
        for insn in code {
            let mut covering = method
                .handlers
                .iter()
                .enumerate()
                .filter(|(_, handler)| handler.covers(insn.offset))
                .map(|(index, _)| index);
            let first = covering.next();
            if covering.next().is_some() {
                return Err(TranslateError::malformed(
                    method.id,
                    insn.offset,
                    Malformed::OverlappingHandlers,
                ));
            }
            handler_of.push(first);
        }

        let mut blocks: Vec<SourceBlock> = Vec::new();
        let mut block_at = FxHashMap::default();
        let mut index_to_block = vec![0; code.len()];
        for (i, &is_leader) in leader.iter().enumerate() {
            if is_leader {
                if let Some(previous) = blocks.last_mut() {
                    previous.end = i;
                }
                block_at.insert(code[i].offset, blocks.len());
                blocks.push(SourceBlock {
                    start: i,
                    end: code.len(),
                });
            }
            index_to_block[i] = blocks.len() - 1;
        }

        let mut safepoint = vec![false; blocks.len()];
        for j in backward {
            safepoint[index_to_block[j]] = true;
        }

        tracing::trace!(
            method = %method.id,
            blocks = blocks.len(),
            "computed block layout"
        );

        Ok(Layout {
            blocks,
            handler_of,
            safepoint,
            block_at,
        })
    }

    /// The block starting at `offset`.
    pub fn block_at(&self, offset: u32) -> Option<usize> {
        self.block_at.get(&offset).copied()
    }
}
