//! Translation of the instructions of one block.

use cps_bytecode::{
    ArithOp, Condition, Instruction, Kind, Literal, MethodFlags, SymbolKind, SymbolRef,
};
use cps_ir::{Builtin, CallId, FrameDescriptor, FrameId, Operator, SwitchOp, Value, VarId};
use rustc_hash::FxHashMap;

use super::MethodTranslation;
use crate::error::Malformed;
use crate::slots::{Frame, Stack, VariableFactory};

/// Whether translation continues with the next instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Flow {
    Next,
    Done,
}

type Step = Result<Flow, Malformed>;

pub(super) struct BlockTranslation<'t, 'a> {
    m: &'t mut MethodTranslation<'a>,
    frame: Frame,
    stack: Stack,
    /// The unfilled call the next emission fills.
    cursor: CallId,
    /// Index of the current instruction.
    index: usize,
    /// Exception continuations built in this block, by handler.
    handlers: FxHashMap<usize, Value>,
}

impl<'t, 'a> BlockTranslation<'t, 'a> {
    pub(super) fn new(
        m: &'t mut MethodTranslation<'a>,
        frame: Frame,
        stack: Stack,
        cursor: CallId,
        index: usize,
    ) -> Self {
        BlockTranslation {
            m,
            frame,
            stack,
            cursor,
            index,
            handlers: FxHashMap::default(),
        }
    }

    pub(super) fn at(&mut self, index: usize) {
        self.index = index;
    }

    fn offset(&self) -> u32 {
        self.m.method.code[self.index].offset
    }

    fn relaxed(&self) -> bool {
        self.m.method.flags.contains(MethodFlags::UNSAFE)
    }

    // ── Slots ───────────────────────────────────────────────────────

    fn push(&mut self, kind: Kind) -> Result<VarId, Malformed> {
        let index = self.stack.next_index(kind)?;
        let var = self.m.factory.stack(&mut self.m.arena, kind, index);
        self.stack.push(var, kind)?;
        Ok(var)
    }

    fn pop(&mut self, kind: Kind) -> Result<VarId, Malformed> {
        let relaxed = self.relaxed();
        self.stack.pop(kind, relaxed)
    }

    fn pop_value(&mut self, kind: Kind) -> Result<Value, Malformed> {
        self.pop(kind).map(Value::Var)
    }

    /// Pop a `Reference` or, in any code, a `Word`.
    fn pop_reference_or_word(&mut self) -> Result<(VarId, Kind), Malformed> {
        self.stack.peek(Kind::Reference, true)?;
        self.stack.pop_any()
    }

    // ── Emission ────────────────────────────────────────────────────

    fn assign(&mut self, var: VarId, value: Value) {
        self.cursor = self.m.arena.assign(self.cursor, var, value);
    }

    fn frame_descriptor(&mut self) -> FrameId {
        let descriptor = FrameDescriptor {
            method: self.m.method.id,
            offset: self.offset(),
            locals: self.frame.values(),
            stack: self.stack.values(),
            parent: None,
        };
        self.m.arena.new_frame(descriptor)
    }

    /// Where control goes if the current instruction raises.
    fn exception_continuation(&mut self) -> Result<Value, Malformed> {
        let Some(handler) = self.m.layout.handler_of[self.index] else {
            return Ok(Value::Var(self.m.ce));
        };
        if let Some(continuation) = self.handlers.get(&handler) {
            return Ok(continuation.clone());
        }

        let offset = self.m.method.handlers[handler].handler;
        let target = self
            .m
            .layout
            .block_at(offset)
            .ok_or(Malformed::InvalidTarget { target: offset })?;
        let throwable = self.m.factory.stack(&mut self.m.arena, Kind::Reference, 0);
        let mut entry = Stack::new(self.m.method.max_stack);
        entry.push(throwable, Kind::Reference)?;
        let block = self.m.block_for(target, &self.frame, &entry)?;

        let (continuation, body) = self.m.arena.new_continuation(vec![throwable]);
        self.m.arena.jump(body, block);
        let continuation = Value::Closure(continuation);
        self.handlers.insert(handler, continuation.clone());
        Ok(continuation)
    }

    /// Emit `procedure(operands.., cc, ce)` and continue in `cc`, which binds
    /// the pushed result unless `result` is `Void`.
    ///
    /// Operands must already be popped.
    fn emit(
        &mut self,
        procedure: Value,
        mut operands: Vec<Value>,
        result: Kind,
        raises: bool,
        with_frame: bool,
    ) -> Result<(), Malformed> {
        let frame = with_frame.then(|| self.frame_descriptor());
        let ce = if raises {
            self.exception_continuation()?
        } else {
            Value::Undefined
        };
        let params = if result == Kind::Void {
            Vec::new()
        } else {
            vec![self.push(result)?]
        };
        let (cc, next) = self.m.arena.new_continuation(params);
        operands.extend([Value::Closure(cc), ce]);
        self.m.arena.fill(self.cursor, procedure, operands);
        self.m.arena.call_mut(self.cursor).frame = frame;
        self.cursor = next;
        Ok(())
    }

    fn builtin(&mut self, builtin: Builtin, operands: Vec<Value>) -> Step {
        let raises = builtin.can_raise();
        self.emit(
            Value::Builtin(builtin),
            operands,
            builtin.result_kind(),
            raises,
            raises,
        )?;
        Ok(Flow::Next)
    }

    fn operator(&mut self, operator: Operator, operands: Vec<Value>, result: Kind) -> Step {
        self.emit(
            Value::Operator(operator),
            operands,
            result,
            operator.can_raise(),
            true,
        )?;
        Ok(Flow::Next)
    }

    /// Stop at a safepoint before the first instruction of a loop header.
    pub(super) fn safepoint(&mut self) -> Result<(), Malformed> {
        self.operator(Operator::Safepoint, Vec::new(), Kind::Void)
            .map(|_| ())
    }

    // ── Control flow ────────────────────────────────────────────────

    fn target(&mut self, offset: u32) -> Result<cps_ir::BlockId, Malformed> {
        let index = self
            .m
            .layout
            .block_at(offset)
            .ok_or(Malformed::InvalidTarget { target: offset })?;
        self.m.block_for(index, &self.frame, &self.stack)
    }

    /// A continuation that jumps to the block at `offset`.
    fn branch_to(&mut self, offset: u32) -> Result<Value, Malformed> {
        let block = self.target(offset)?;
        Ok(self.m.arena.block_continuation(block))
    }

    pub(super) fn fall_through(&mut self, offset: u32) -> Result<(), Malformed> {
        let block = self.target(offset)?;
        self.m.arena.jump(self.cursor, block);
        Ok(())
    }

    fn next_offset(&self) -> Result<u32, Malformed> {
        self.m
            .method
            .code
            .get(self.index + 1)
            .map(|insn| insn.offset)
            .ok_or(Malformed::FallsOffEnd)
    }

    /// Two-way branch: `switch(a, b, taken, not_taken)`.
    fn branch(&mut self, kind: Kind, cond: Condition, a: Value, b: Value, target: u32) -> Step {
        let taken = self.branch_to(target)?;
        let next = self.next_offset()?;
        let not_taken = self.branch_to(next)?;
        self.m.arena.fill(
            self.cursor,
            Value::Switch(SwitchOp::Compare { kind, cond }),
            vec![a, b, taken, not_taken],
        );
        Ok(Flow::Done)
    }

    /// N-way branch: `switch(key, matches.., targets.., default)`.
    fn multi_branch(&mut self, cases: &[(i32, u32)], default: u32) -> Step {
        let key = self.pop_value(Kind::Int)?;
        let mut args = Vec::with_capacity(cases.len() * 2 + 2);
        args.push(key);
        args.extend(cases.iter().map(|&(value, _)| Value::from(Literal::Int(value))));
        for &(_, target) in cases {
            args.push(self.branch_to(target)?);
        }
        args.push(self.branch_to(default)?);
        let cases = u32::try_from(cases.len()).map_err(|_| Malformed::Unsupported("switch size"))?;
        self.m
            .arena
            .fill(self.cursor, Value::Switch(SwitchOp::Multi { cases }), args);
        Ok(Flow::Done)
    }

    // ── Stack shuffles ──────────────────────────────────────────────

    /// Push `values[order[0]], values[order[1]], ..` onto the stack.
    ///
    /// Values that change position are first copied into temporaries, so a
    /// rebinding never clobbers a value still to be read.
    fn rearrange(&mut self, values: &[(VarId, Kind)], order: &[usize]) -> Result<(), Malformed> {
        let mut depth = self.stack.depth();
        let mut targets = Vec::with_capacity(order.len());
        for &j in order {
            let kind = values[j].1;
            let index = u16::try_from(depth).map_err(|_| Malformed::StackOverflow {
                max: self.m.method.max_stack,
            })?;
            targets.push(self.m.factory.stack(&mut self.m.arena, kind, index));
            depth += kind.width();
        }

        let mut sources: Vec<Value> = values.iter().map(|&(var, _)| Value::Var(var)).collect();
        for (j, &(var, kind)) in values.iter().enumerate() {
            let moved = order
                .iter()
                .zip(&targets)
                .any(|(&k, &target)| k == j && target != var);
            if moved {
                let temp = VariableFactory::temporary(&mut self.m.arena, kind);
                self.assign(temp, Value::Var(var));
                sources[j] = Value::Var(temp);
            }
        }

        for (&j, &target) in order.iter().zip(&targets) {
            let (var, kind) = values[j];
            if target != var {
                self.assign(target, sources[j].clone());
            }
            self.stack.push(target, kind)?;
        }
        Ok(())
    }

    /// Duplicate the top `top` slots, inserting the copy below the next
    /// `below` slots.
    fn dup(&mut self, top: usize, below: usize) -> Step {
        let upper = self.stack.take(top)?;
        let lower = self.stack.take(below)?;
        let mut values = lower;
        let first_upper = values.len();
        values.extend(upper);

        let upper_range = first_upper..values.len();
        let order: Vec<usize> = upper_range
            .clone()
            .chain(0..first_upper)
            .chain(upper_range)
            .collect();
        self.rearrange(&values, &order)?;
        Ok(Flow::Next)
    }

    fn swap(&mut self) -> Step {
        let values = self.stack.take(2)?;
        if values.len() != 2 {
            return Err(Malformed::SplitValue);
        }
        self.rearrange(&values, &[1, 0])?;
        Ok(Flow::Next)
    }

    // ── Symbols ─────────────────────────────────────────────────────

    fn symbol_kind(&self, symbol: SymbolRef) -> Result<SymbolKind, Malformed> {
        self.m
            .symbols
            .symbolic(symbol)
            .map(|symbolic| symbolic.kind)
            .ok_or(Malformed::UnknownSymbol { symbol })
    }

    fn field_kind(&self, symbol: SymbolRef, is_static: bool) -> Result<Kind, Malformed> {
        match self.symbol_kind(symbol)? {
            SymbolKind::Field {
                kind,
                is_static: field_static,
            } if field_static == is_static => Ok(kind),
            _ => Err(Malformed::WrongSymbolKind {
                symbol,
                expected: if is_static {
                    "static field"
                } else {
                    "instance field"
                },
            }),
        }
    }

    fn class(&self, symbol: SymbolRef) -> Result<(), Malformed> {
        match self.symbol_kind(symbol)? {
            SymbolKind::Class => Ok(()),
            _ => Err(Malformed::WrongSymbolKind {
                symbol,
                expected: "class",
            }),
        }
    }

    /// Pop the arguments of a call to `symbol`, receiver first if any.
    fn call_arguments(
        &mut self,
        symbol: SymbolRef,
        receiver: bool,
    ) -> Result<(Vec<Value>, Kind), Malformed> {
        let SymbolKind::Method {
            params,
            result,
            is_static,
        } = self.symbol_kind(symbol)?
        else {
            return Err(Malformed::WrongSymbolKind {
                symbol,
                expected: "method",
            });
        };
        if is_static == receiver {
            return Err(Malformed::WrongSymbolKind {
                symbol,
                expected: if receiver {
                    "instance method"
                } else {
                    "static method"
                },
            });
        }

        let mut args = Vec::with_capacity(params.len() + 1);
        for &kind in params.iter().rev() {
            args.push(self.pop_value(kind)?);
        }
        if receiver {
            args.push(self.pop_value(Kind::Reference)?);
        }
        args.reverse();
        Ok((args, result))
    }

    /// Constant value of a static field that can be read at translation time.
    ///
    /// Only symbols that are already resolved qualify, so asking never
    /// triggers loading. A linkage failure just means "don't fold".
    fn folded_constant(&self, symbol: SymbolRef, kind: Kind) -> Option<Literal> {
        if !self.m.config.fold_static_constants || !self.m.symbols.is_resolved(symbol) {
            return None;
        }
        let descriptor = match self.m.symbols.resolve(symbol) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                tracing::trace!(%symbol, %error, "static field not folded");
                return None;
            }
        };
        if self.m.symbols.requires_initialization(&descriptor) {
            return None;
        }
        descriptor
            .constant()
            .filter(|constant| constant.kind() == kind.stack_kind())
            .cloned()
    }

    // ── Instructions ────────────────────────────────────────────────

    pub(super) fn instruction(&mut self, insn: &Instruction) -> Step {
        match insn {
            Instruction::Const(literal) => {
                let var = self.push(literal.kind())?;
                self.assign(var, Value::from(literal.clone()));
                Ok(Flow::Next)
            }
            Instruction::Load { kind, index } => {
                let (local, kind) = if *kind == Kind::Reference {
                    self.frame.load_reference_or_word(*index)?
                } else {
                    (self.frame.load(*kind, *index, self.relaxed())?, *kind)
                };
                let var = self.push(kind)?;
                self.assign(var, Value::Var(local));
                Ok(Flow::Next)
            }
            Instruction::Store { kind, index } => {
                let (value, kind) = if *kind == Kind::Reference {
                    self.pop_reference_or_word()?
                } else {
                    (self.pop(*kind)?, *kind)
                };
                let local = self.m.factory.local(&mut self.m.arena, kind, *index);
                self.frame.store(*index, local, kind)?;
                self.assign(local, Value::Var(value));
                self.handlers.clear();
                Ok(Flow::Next)
            }
            Instruction::Iinc { index, delta } => {
                let local = self.frame.load(Kind::Int, *index, false)?;
                let add = Builtin::Arith {
                    op: ArithOp::Add,
                    kind: Kind::Int,
                };
                let (cc, next) = self.m.arena.new_continuation(vec![local]);
                self.m.arena.fill(
                    self.cursor,
                    Value::Builtin(add),
                    vec![
                        Value::Var(local),
                        Literal::Int(*delta).into(),
                        Value::Closure(cc),
                        Value::Undefined,
                    ],
                );
                self.cursor = next;
                self.handlers.clear();
                Ok(Flow::Next)
            }

            Instruction::Pop => {
                self.stack.take(1)?;
                Ok(Flow::Next)
            }
            Instruction::Pop2 => {
                self.stack.take(2)?;
                Ok(Flow::Next)
            }
            Instruction::Dup => self.dup(1, 0),
            Instruction::DupX1 => self.dup(1, 1),
            Instruction::DupX2 => self.dup(1, 2),
            Instruction::Dup2 => self.dup(2, 0),
            Instruction::Dup2X1 => self.dup(2, 1),
            Instruction::Dup2X2 => self.dup(2, 2),
            Instruction::Swap => self.swap(),

            Instruction::Arith { op, kind } => {
                let rhs_kind = if op.is_shift() { Kind::Int } else { *kind };
                let rhs = self.pop_value(rhs_kind)?;
                let lhs = self.pop_value(*kind)?;
                self.builtin(Builtin::Arith { op: *op, kind: *kind }, vec![lhs, rhs])
            }
            Instruction::Neg(kind) => {
                let value = self.pop_value(*kind)?;
                self.builtin(Builtin::Neg(*kind), vec![value])
            }
            Instruction::Convert { from, to } => {
                let value = self.pop_value(*from)?;
                self.builtin(Builtin::Convert { from: *from, to: *to }, vec![value])
            }
            Instruction::Compare(op) => {
                let rhs = self.pop_value(op.operand_kind())?;
                let lhs = self.pop_value(op.operand_kind())?;
                self.builtin(Builtin::Compare(*op), vec![lhs, rhs])
            }

            Instruction::IfZero { cond, target } => {
                let value = self.pop_value(Kind::Int)?;
                self.branch(Kind::Int, *cond, value, Literal::Int(0).into(), *target)
            }
            Instruction::IfCompare { kind, cond, target } => {
                let rhs = self.pop_value(*kind)?;
                let lhs = self.pop_value(*kind)?;
                self.branch(kind.stack_kind(), *cond, lhs, rhs, *target)
            }
            Instruction::IfNull { is_null, target } => {
                let value = self.pop_value(Kind::Reference)?;
                let cond = if *is_null { Condition::Eq } else { Condition::Ne };
                self.branch(Kind::Reference, cond, value, Literal::Null.into(), *target)
            }
            Instruction::Goto { target } => {
                let block = self.target(*target)?;
                self.m.arena.jump(self.cursor, block);
                Ok(Flow::Done)
            }
            Instruction::TableSwitch {
                low,
                targets,
                default,
            } => {
                let mut cases = Vec::with_capacity(targets.len());
                for (i, &target) in targets.iter().enumerate() {
                    let value = i32::try_from(i)
                        .ok()
                        .and_then(|i| low.checked_add(i))
                        .ok_or(Malformed::Unsupported("table switch range overflows int"))?;
                    cases.push((value, target));
                }
                self.multi_branch(&cases, *default)
            }
            Instruction::LookupSwitch { pairs, default } => self.multi_branch(pairs, *default),
            Instruction::Return(kind) => {
                let args = if *kind == Kind::Void {
                    Vec::new()
                } else {
                    vec![self.pop_value(*kind)?]
                };
                self.m.arena.fill(self.cursor, Value::Var(self.m.cc), args);
                Ok(Flow::Done)
            }

            Instruction::GetField(field) => {
                let kind = self.field_kind(*field, false)?;
                let object = self.pop_value(Kind::Reference)?;
                self.operator(
                    Operator::GetField {
                        field: *field,
                        kind,
                    },
                    vec![object],
                    kind.stack_kind(),
                )
            }
            Instruction::PutField(field) => {
                let kind = self.field_kind(*field, false)?;
                let value = self.pop_value(kind)?;
                let object = self.pop_value(Kind::Reference)?;
                self.operator(
                    Operator::PutField {
                        field: *field,
                        kind,
                    },
                    vec![object, value],
                    Kind::Void,
                )
            }
            Instruction::GetStatic(field) => {
                let kind = self.field_kind(*field, true)?;
                if let Some(constant) = self.folded_constant(*field, kind) {
                    let var = self.push(kind)?;
                    self.assign(var, constant.into());
                    return Ok(Flow::Next);
                }
                self.operator(
                    Operator::GetStatic {
                        field: *field,
                        kind,
                    },
                    Vec::new(),
                    kind.stack_kind(),
                )
            }
            Instruction::PutStatic(field) => {
                let kind = self.field_kind(*field, true)?;
                let value = self.pop_value(kind)?;
                self.operator(
                    Operator::PutStatic {
                        field: *field,
                        kind,
                    },
                    vec![value],
                    Kind::Void,
                )
            }
            Instruction::Invoke { mode, method } => {
                let (args, result) = self.call_arguments(*method, mode.has_receiver())?;
                self.operator(
                    Operator::Invoke {
                        mode: *mode,
                        method: *method,
                    },
                    args,
                    result.stack_kind(),
                )
            }

            Instruction::New(class) => {
                self.class(*class)?;
                self.operator(Operator::New { class: *class }, Vec::new(), Kind::Reference)
            }
            Instruction::NewArray(element) => {
                let length = self.pop_value(Kind::Int)?;
                self.operator(
                    Operator::NewArray { element: *element },
                    vec![length],
                    Kind::Reference,
                )
            }
            Instruction::ANewArray(class) => {
                self.class(*class)?;
                let length = self.pop_value(Kind::Int)?;
                self.operator(
                    Operator::NewReferenceArray { class: *class },
                    vec![length],
                    Kind::Reference,
                )
            }
            Instruction::MultiANewArray { class, dimensions } => {
                self.class(*class)?;
                let mut lengths = Vec::with_capacity(usize::from(*dimensions));
                for _ in 0..*dimensions {
                    lengths.push(self.pop_value(Kind::Int)?);
                }
                lengths.reverse();
                self.operator(
                    Operator::NewMultiArray {
                        class: *class,
                        dimensions: *dimensions,
                    },
                    lengths,
                    Kind::Reference,
                )
            }
            Instruction::ArrayLength => {
                let array = self.pop_value(Kind::Reference)?;
                self.operator(Operator::ArrayLength, vec![array], Kind::Int)
            }
            Instruction::ArrayLoad(kind) => {
                let index = self.pop_value(Kind::Int)?;
                let array = self.pop_value(Kind::Reference)?;
                self.operator(
                    Operator::ArrayLoad { kind: *kind },
                    vec![array, index],
                    kind.stack_kind(),
                )
            }
            Instruction::ArrayStore(kind) => {
                let value = self.pop_value(*kind)?;
                let index = self.pop_value(Kind::Int)?;
                let array = self.pop_value(Kind::Reference)?;
                self.operator(
                    Operator::ArrayStore { kind: *kind },
                    vec![array, index, value],
                    Kind::Void,
                )
            }

            Instruction::Athrow => {
                let throwable = self.pop_value(Kind::Reference)?;
                let frame = self.frame_descriptor();
                let ce = self.exception_continuation()?;
                self.m.arena.fill(
                    self.cursor,
                    Value::Operator(Operator::Throw),
                    vec![throwable, Value::Undefined, ce],
                );
                self.m.arena.call_mut(self.cursor).frame = Some(frame);
                Ok(Flow::Done)
            }
            Instruction::CheckCast(class) => {
                self.class(*class)?;
                let object = self.pop_value(Kind::Reference)?;
                self.operator(
                    Operator::CheckCast { class: *class },
                    vec![object],
                    Kind::Reference,
                )
            }
            Instruction::InstanceOf(class) => {
                self.class(*class)?;
                let object = self.pop_value(Kind::Reference)?;
                self.operator(
                    Operator::InstanceOf { class: *class },
                    vec![object],
                    Kind::Int,
                )
            }
            Instruction::MonitorEnter => {
                let object = self.pop_value(Kind::Reference)?;
                self.operator(Operator::MonitorEnter, vec![object], Kind::Void)
            }
            Instruction::MonitorExit => {
                let object = self.pop_value(Kind::Reference)?;
                self.operator(Operator::MonitorExit, vec![object], Kind::Void)
            }
            Instruction::LdcClass(class) => {
                self.class(*class)?;
                self.operator(Operator::Mirror { class: *class }, Vec::new(), Kind::Reference)
            }
            Instruction::CallNative { method } => {
                let (args, result) = self.call_arguments(*method, false)?;
                let restricted = self.m.method.flags.is_restricted_native_context();
                self.operator(
                    Operator::CallNative {
                        method: *method,
                        result,
                        restricted,
                    },
                    args,
                    result.stack_kind(),
                )
            }

            Instruction::Jsr { .. } => Err(Malformed::Unsupported("jsr")),
            Instruction::Ret { .. } => Err(Malformed::Unsupported("ret")),
        }
    }
}
