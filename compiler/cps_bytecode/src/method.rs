//! Method bodies as handed over by the container parser.

use bitflags::bitflags;

use crate::{Instruction, InstructionAt, Kind, MethodId, SymbolRef};

bitflags! {
    /// Method attributes that change how a body is translated.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct MethodFlags: u8 {
        /// No receiver in local 0.
        const STATIC = 1 << 0;
        /// Body is a stub around a native call-out.
        const NATIVE = 1 << 1;
        /// Method is itself a C-callable function.
        const C_FUNCTION = 1 << 2;
        /// C function that runs in interrupt context; native calls made from
        /// it skip the call-out prologue and epilogue.
        const INTERRUPT_HANDLER = 1 << 3;
        /// Unsafe code: `Word` and `Reference` mix freely, kind checks are
        /// relaxed.
        const UNSAFE = 1 << 4;
    }
}

impl MethodFlags {
    /// Whether native calls from this method run in a restricted context.
    pub fn is_restricted_native_context(self) -> bool {
        self.contains(MethodFlags::C_FUNCTION | MethodFlags::INTERRUPT_HANDLER)
    }
}

/// One entry of the exception table.
///
/// Covers instructions with `start <= offset < end`; control transfers to
/// `handler` with only the raised value on the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExceptionHandler {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    /// Caught class; `None` catches everything. Only catch-all handlers
    /// are translated.
    pub catch_type: Option<SymbolRef>,
}

impl ExceptionHandler {
    #[inline]
    pub fn covers(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// A decoded method body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    pub id: MethodId,
    pub name: Box<str>,
    /// Parameter kinds in declaration order, receiver first for instance
    /// methods.
    pub params: Vec<Kind>,
    pub result: Kind,
    pub max_locals: u16,
    pub max_stack: u16,
    pub code: Vec<InstructionAt>,
    pub handlers: Vec<ExceptionHandler>,
    pub flags: MethodFlags,
}

impl Method {
    /// Start building a method; offsets are assigned one per instruction.
    pub fn builder(id: MethodId, name: &str) -> MethodBuilder {
        MethodBuilder {
            method: Method {
                id,
                name: name.into(),
                params: Vec::new(),
                result: Kind::Void,
                max_locals: 0,
                max_stack: 0,
                code: Vec::new(),
                handlers: Vec::new(),
                flags: MethodFlags::STATIC,
            },
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Index of the instruction at `offset`.
    pub fn index_of(&self, offset: u32) -> Option<usize> {
        self.code
            .binary_search_by_key(&offset, |insn| insn.offset)
            .ok()
    }
}

/// Incremental construction of a [`Method`].
#[derive(Clone, Debug)]
pub struct MethodBuilder {
    method: Method,
}

impl MethodBuilder {
    #[must_use]
    pub fn params(mut self, params: Vec<Kind>) -> Self {
        self.method.params = params;
        self
    }

    #[must_use]
    pub fn result(mut self, result: Kind) -> Self {
        self.method.result = result;
        self
    }

    #[must_use]
    pub fn max_locals(mut self, max_locals: u16) -> Self {
        self.method.max_locals = max_locals;
        self
    }

    #[must_use]
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.method.max_stack = max_stack;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: MethodFlags) -> Self {
        self.method.flags = flags;
        self
    }

    /// Instructions at offsets `0, 1, 2, ...`.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "method bodies are bounded far below u32::MAX instructions"
    )]
    pub fn code(mut self, code: Vec<Instruction>) -> Self {
        self.method.code = code
            .into_iter()
            .enumerate()
            .map(|(offset, insn)| InstructionAt {
                offset: offset as u32,
                insn,
            })
            .collect();
        self
    }

    #[must_use]
    pub fn handler(mut self, start: u32, end: u32, handler: u32) -> Self {
        self.method.handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type: None,
        });
        self
    }

    pub fn build(self) -> Method {
        self.method
    }
}
