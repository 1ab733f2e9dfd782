//! Operator lowering: high-level CPS-IR to primitive snippets.
//!
//! Every call whose procedure is an [`Operator`] is rewritten in place into
//! a chain of snippet calls. All steps of one chain share a single exception
//! continuation variable and carry the operator's frame descriptor. The
//! canonical order is:
//!
//! 1. resolve the symbol, unless it is resolved already
//! 2. initialize the holder, unless it is known to be initialized
//! 3. null check, then bounds check, then array store check
//! 4. the primitive itself, continuing in the operator's original `cc`
//!
//! Virtual calls with a dominant profiled receiver get a type guard that
//! calls the selected target directly. Native calls are bracketed by a
//! call-out prologue and epilogue unless made from interrupt context.

use cps_bytecode::{
    Descriptor, InvokeMode, Kind, MethodId, ReceiverProfile, SymbolRef, SymbolTable, TypeTag,
};
use cps_ir::{
    Call, CallId, ClosureId, Constant, FrameId, Operator, ResolutionKind, Snippet, SwitchOp,
    TermArena, Value, VarId, VarRole,
};

use crate::config::TranslateConfig;
use crate::error::{Result, TranslateError};

/// Lower every operator reachable from `root`.
///
/// Returns the number of operators lowered.
pub fn lower(
    arena: &mut TermArena,
    root: ClosureId,
    symbols: &dyn SymbolTable,
    profile: &dyn ReceiverProfile,
    config: &TranslateConfig,
    method: MethodId,
) -> Result<usize> {
    let calls: Vec<CallId> = arena
        .reachable(root)
        .calls
        .into_iter()
        .filter(|&call| matches!(arena.call(call).procedure, Value::Operator(_)))
        .collect();

    let mut lowerer = Lowerer {
        arena,
        symbols,
        profile,
        config,
        method,
        devirtualized: 0,
    };
    for &call in &calls {
        lowerer.lower_call(call)?;
    }

    tracing::debug!(
        method = %method,
        lowered = calls.len(),
        devirtualized = lowerer.devirtualized,
        "lowered operators"
    );
    Ok(calls.len())
}

/// How a symbol's descriptor is obtained.
enum Resolution {
    /// Resolved at translation time.
    Static(Descriptor),
    /// Bound by a resolve step at runtime.
    Dynamic(VarId),
}

impl Resolution {
    fn value(&self) -> Value {
        match self {
            Resolution::Static(descriptor) => {
                Value::Const(Constant::Descriptor(Box::new(descriptor.clone())))
            }
            Resolution::Dynamic(var) => Value::Var(*var),
        }
    }

    /// What a direct call through this resolution calls.
    fn call_target(&self) -> Value {
        match self {
            Resolution::Static(descriptor) => descriptor
                .method()
                .map_or_else(|| self.value(), Value::Method),
            Resolution::Dynamic(var) => Value::Var(*var),
        }
    }
}

/// The unfilled tail of a chain under construction.
struct Chain {
    at: CallId,
    ce: Value,
    frame: Option<FrameId>,
}

struct Lowerer<'a> {
    arena: &'a mut TermArena,
    symbols: &'a dyn SymbolTable,
    profile: &'a dyn ReceiverProfile,
    config: &'a TranslateConfig,
    method: MethodId,
    devirtualized: usize,
}

impl Lowerer<'_> {
    fn internal(&self, message: impl Into<String>) -> TranslateError {
        TranslateError::Internal {
            method: self.method,
            message: message.into(),
        }
    }

    fn operands<const N: usize>(
        &self,
        operator: Operator,
        operands: Vec<Value>,
    ) -> Result<[Value; N]> {
        <[Value; N]>::try_from(operands).map_err(|operands| {
            self.internal(format!(
                "{} expects {N} operands, found {}",
                operator.name(),
                operands.len()
            ))
        })
    }

    fn lower_call(&mut self, call: CallId) -> Result<()> {
        let Call {
            procedure,
            mut args,
            frame,
            ..
        } = std::mem::replace(self.arena.call_mut(call), Call::unfilled());
        let Value::Operator(operator) = procedure else {
            return Err(self.internal(format!("{call} is not an operator call")));
        };
        let (Some(ce), Some(cc)) = (args.pop(), args.pop()) else {
            return Err(self.internal(format!("{call} lacks continuations")));
        };

        if let Operator::Invoke {
            mode: mode @ (InvokeMode::Virtual | InvokeMode::Interface),
            method,
        } = operator
        {
            if let Some((descriptor, receiver, target)) = self.devirtualization(method, frame) {
                return self.devirtualize(
                    call, mode, descriptor, receiver, target, args, cc, ce, frame,
                );
            }
        }

        let mut chain = self.open(call, ce, frame);
        self.lower_operator(&mut chain, operator, args, cc)
    }

    // ── Chain building ──────────────────────────────────────────────

    /// Start a chain at `at` under the exception continuation `ce`.
    ///
    /// A continuation closure is bound once to a fresh variable so every
    /// step can refer to it.
    fn open(&mut self, at: CallId, ce: Value, frame: Option<FrameId>) -> Chain {
        match ce {
            Value::Var(_) | Value::Undefined => Chain { at, ce, frame },
            ce => {
                let var = self
                    .arena
                    .fresh_var(Kind::Word, VarRole::ExceptionContinuation);
                let body = self.arena.new_call();
                let wrapper = self.arena.new_closure(vec![var], body);
                self.arena.fill(at, Value::Closure(wrapper), vec![ce]);
                Chain {
                    at: body,
                    ce: Value::Var(var),
                    frame,
                }
            }
        }
    }

    /// Emit `snippet(operands.., cc, ce)`; `cc` binds a fresh variable of
    /// kind `result` if given.
    fn step(
        &mut self,
        chain: &mut Chain,
        snippet: Snippet,
        mut operands: Vec<Value>,
        result: Option<Kind>,
    ) -> Option<VarId> {
        let var = result.map(|kind| self.arena.fresh_var(kind, VarRole::Temporary));
        let (cc, next) = self.arena.new_continuation(var.into_iter().collect());
        operands.extend([Value::Closure(cc), chain.ce.clone()]);
        self.arena.fill(chain.at, Value::Snippet(snippet), operands);
        self.arena.call_mut(chain.at).frame = chain.frame;
        chain.at = next;
        var
    }

    /// Like [`Self::step`] for snippets that always produce a value.
    fn value_step(
        &mut self,
        chain: &mut Chain,
        snippet: Snippet,
        operands: Vec<Value>,
        result: Kind,
    ) -> Result<VarId> {
        self.step(chain, snippet, operands, Some(result))
            .ok_or_else(|| self.internal("result step bound no variable"))
    }

    /// Close the chain with `procedure(operands.., cc, ce)`.
    fn finish(&mut self, chain: Chain, procedure: Value, mut operands: Vec<Value>, cc: Value) {
        operands.extend([cc, chain.ce]);
        self.arena.fill(chain.at, procedure, operands);
        self.arena.call_mut(chain.at).frame = chain.frame;
    }

    fn finish_snippet(&mut self, chain: Chain, snippet: Snippet, operands: Vec<Value>, cc: Value) {
        self.finish(chain, Value::Snippet(snippet), operands, cc);
    }

    // ── Resolution and initialization ───────────────────────────────

    /// The descriptor of `symbol`, if resolving it now has no side effect.
    fn static_descriptor(&self, symbol: SymbolRef) -> Option<Descriptor> {
        if !self.symbols.is_resolved(symbol) {
            return None;
        }
        match self.symbols.resolve(symbol) {
            Ok(descriptor) => Some(descriptor),
            Err(error) => {
                tracing::trace!(%symbol, %error, "resolution deferred to runtime");
                None
            }
        }
    }

    fn resolve(
        &mut self,
        chain: &mut Chain,
        symbol: SymbolRef,
        kind: ResolutionKind,
    ) -> Result<Resolution> {
        if let Some(descriptor) = self.static_descriptor(symbol) {
            return Ok(Resolution::Static(descriptor));
        }
        let guard = Value::Const(Constant::Guard(symbol));
        let var = self.value_step(chain, Snippet::Resolve(kind), vec![guard], Kind::Reference)?;
        Ok(Resolution::Dynamic(var))
    }

    /// Emit `snippet(descriptor)` unless the holder is known initialized.
    fn initialize(&mut self, chain: &mut Chain, resolution: &Resolution, snippet: Snippet) {
        if let Resolution::Static(descriptor) = resolution {
            if !self.symbols.requires_initialization(descriptor) {
                return;
            }
        }
        self.step(chain, snippet, vec![resolution.value()], None);
    }

    fn null_check(&mut self, chain: &mut Chain, reference: &Value) {
        self.step(chain, Snippet::CheckNull, vec![reference.clone()], None);
    }

    // ── Operator families ───────────────────────────────────────────

    fn lower_operator(
        &mut self,
        chain: &mut Chain,
        operator: Operator,
        operands: Vec<Value>,
        cc: Value,
    ) -> Result<()> {
        let chain_end = |chain: &mut Chain| Chain {
            at: chain.at,
            ce: chain.ce.clone(),
            frame: chain.frame,
        };

        match operator {
            Operator::GetField { field, kind } => {
                let [object] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, field, ResolutionKind::InstanceField)?;
                self.null_check(chain, &object);
                let operands = vec![object, descriptor.value()];
                self.finish_snippet(chain_end(chain), Snippet::FieldRead(kind), operands, cc);
            }
            Operator::PutField { field, kind } => {
                let [object, value] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, field, ResolutionKind::InstanceField)?;
                self.null_check(chain, &object);
                let operands = vec![object, descriptor.value(), value];
                self.finish_snippet(chain_end(chain), Snippet::FieldWrite(kind), operands, cc);
            }
            Operator::GetStatic { field, kind } => {
                let [] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, field, ResolutionKind::StaticField)?;
                self.initialize(chain, &descriptor, Snippet::MakeHolderInitialized);
                let statics = self.value_step(
                    chain,
                    Snippet::StaticTuple,
                    vec![descriptor.value()],
                    Kind::Reference,
                )?;
                let operands = vec![Value::Var(statics), descriptor.value()];
                self.finish_snippet(chain_end(chain), Snippet::FieldRead(kind), operands, cc);
            }
            Operator::PutStatic { field, kind } => {
                let [value] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, field, ResolutionKind::StaticField)?;
                self.initialize(chain, &descriptor, Snippet::MakeHolderInitialized);
                let statics = self.value_step(
                    chain,
                    Snippet::StaticTuple,
                    vec![descriptor.value()],
                    Kind::Reference,
                )?;
                let operands = vec![Value::Var(statics), descriptor.value(), value];
                self.finish_snippet(chain_end(chain), Snippet::FieldWrite(kind), operands, cc);
            }
            Operator::Invoke { mode, method } => match mode {
                InvokeMode::Static => {
                    let descriptor = self.resolve(chain, method, ResolutionKind::StaticMethod)?;
                    self.initialize(chain, &descriptor, Snippet::MakeHolderInitialized);
                    self.finish(chain_end(chain), descriptor.call_target(), operands, cc);
                }
                InvokeMode::Special => {
                    let receiver = operands
                        .first()
                        .cloned()
                        .ok_or_else(|| self.internal("special call without receiver"))?;
                    let descriptor = self.resolve(chain, method, ResolutionKind::SpecialMethod)?;
                    self.null_check(chain, &receiver);
                    self.finish(chain_end(chain), descriptor.call_target(), operands, cc);
                }
                InvokeMode::Virtual | InvokeMode::Interface => {
                    let kind = if mode == InvokeMode::Virtual {
                        ResolutionKind::VirtualMethod
                    } else {
                        ResolutionKind::InterfaceMethod
                    };
                    let descriptor = self.resolve(chain, method, kind)?;
                    let receiver = operands
                        .first()
                        .cloned()
                        .ok_or_else(|| self.internal("virtual call without receiver"))?;
                    self.null_check(chain, &receiver);
                    self.dispatch(
                        chain_end(chain),
                        mode,
                        &descriptor.value(),
                        receiver,
                        operands,
                        cc,
                    )?;
                }
            },

            Operator::New { class } => {
                let [] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, class, ResolutionKind::Class)?;
                self.initialize(chain, &descriptor, Snippet::MakeClassInitialized);
                let operands = vec![descriptor.value()];
                self.finish_snippet(chain_end(chain), Snippet::CreateTupleOrHybrid, operands, cc);
            }
            Operator::NewArray { element } => {
                let [length] = self.operands(operator, operands)?;
                self.step(chain, Snippet::CheckArrayDimension, vec![length.clone()], None);
                let snippet = Snippet::CreatePrimitiveArray(element);
                self.finish_snippet(chain_end(chain), snippet, vec![length], cc);
            }
            Operator::NewReferenceArray { class } => {
                let [length] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, class, ResolutionKind::Class)?;
                self.step(chain, Snippet::CheckArrayDimension, vec![length.clone()], None);
                let operands = vec![descriptor.value(), length];
                self.finish_snippet(chain_end(chain), Snippet::CreateReferenceArray, operands, cc);
            }
            Operator::NewMultiArray { class, dimensions } => {
                if operands.len() != usize::from(dimensions) {
                    return Err(self.internal(format!(
                        "multianewarray expects {dimensions} lengths, found {}",
                        operands.len()
                    )));
                }
                let descriptor = self.resolve(chain, class, ResolutionKind::Class)?;
                for length in &operands {
                    self.step(chain, Snippet::CheckArrayDimension, vec![length.clone()], None);
                }
                let mut all = Vec::with_capacity(operands.len() + 1);
                all.push(descriptor.value());
                all.extend(operands);
                self.finish_snippet(chain_end(chain), Snippet::CreateMultiReferenceArray, all, cc);
            }
            Operator::ArrayLength => {
                let [array] = self.operands(operator, operands)?;
                self.null_check(chain, &array);
                self.finish_snippet(chain_end(chain), Snippet::ReadArrayLength, vec![array], cc);
            }
            Operator::ArrayLoad { kind } => {
                let [array, index] = self.operands(operator, operands)?;
                self.null_check(chain, &array);
                let bounds = vec![array.clone(), index.clone()];
                self.step(chain, Snippet::CheckArrayIndex, bounds, None);
                let snippet = Snippet::ArrayRead(kind);
                self.finish_snippet(chain_end(chain), snippet, vec![array, index], cc);
            }
            Operator::ArrayStore { kind } => {
                let [array, index, value] = self.operands(operator, operands)?;
                self.null_check(chain, &array);
                let bounds = vec![array.clone(), index.clone()];
                self.step(chain, Snippet::CheckArrayIndex, bounds, None);
                if kind == Kind::Reference {
                    let store = vec![array.clone(), value.clone()];
                    self.step(chain, Snippet::CheckReferenceArrayStore, store, None);
                }
                let snippet = Snippet::ArrayWrite(kind);
                self.finish_snippet(chain_end(chain), snippet, vec![array, index, value], cc);
            }

            Operator::CheckCast { class } => {
                let [object] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, class, ResolutionKind::Class)?;
                let operands = vec![descriptor.value(), object];
                self.finish_snippet(chain_end(chain), Snippet::CheckCast, operands, cc);
            }
            Operator::InstanceOf { class } => {
                let [object] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, class, ResolutionKind::Class)?;
                let operands = vec![descriptor.value(), object];
                self.finish_snippet(chain_end(chain), Snippet::InstanceOf, operands, cc);
            }
            Operator::MonitorEnter | Operator::MonitorExit => {
                let [object] = self.operands(operator, operands)?;
                self.null_check(chain, &object);
                let snippet = if operator == Operator::MonitorEnter {
                    Snippet::MonitorEnter
                } else {
                    Snippet::MonitorExit
                };
                self.finish_snippet(chain_end(chain), snippet, vec![object], cc);
            }
            Operator::Mirror { class } => {
                let [] = self.operands(operator, operands)?;
                let descriptor = self.resolve(chain, class, ResolutionKind::Class)?;
                let operands = vec![descriptor.value()];
                self.finish_snippet(chain_end(chain), Snippet::ClassMirror, operands, cc);
            }
            Operator::Throw => {
                let [throwable] = self.operands(operator, operands)?;
                self.null_check(chain, &throwable);
                let snippet = Snippet::RaiseThrowable;
                self.finish_snippet(chain_end(chain), snippet, vec![throwable], cc);
            }
            Operator::Safepoint => {
                let [] = self.operands(operator, operands)?;
                self.finish_snippet(chain_end(chain), Snippet::Safepoint, Vec::new(), cc);
            }
            Operator::CallNative {
                method,
                restricted,
                ..
            } => {
                let descriptor = self.resolve(chain, method, ResolutionKind::NativeMethod)?;
                let entry = self.value_step(
                    chain,
                    Snippet::LinkNativeMethod,
                    vec![descriptor.value()],
                    Kind::Word,
                )?;
                if !restricted {
                    let context = self.value_step(
                        chain,
                        Snippet::NativeCallPrologue,
                        Vec::new(),
                        Kind::Word,
                    )?;
                    self.epilogue(&cc, context, chain)?;
                }
                let end = chain_end(chain);
                let at = end.at;
                self.finish(end, Value::Var(entry), operands, cc);
                self.arena.call_mut(at).native = true;
            }
        }
        Ok(())
    }

    /// Select the entry for `receiver` and call it.
    fn dispatch(
        &mut self,
        mut chain: Chain,
        mode: InvokeMode,
        descriptor: &Value,
        receiver: Value,
        operands: Vec<Value>,
        cc: Value,
    ) -> Result<()> {
        let select = if mode == InvokeMode::Interface {
            Snippet::SelectInterfaceMethod
        } else {
            Snippet::SelectVirtualMethod
        };
        let entry = self.value_step(
            &mut chain,
            select,
            vec![receiver, descriptor.clone()],
            Kind::Word,
        )?;
        self.finish(chain, Value::Var(entry), operands, cc);
        Ok(())
    }

    /// Run the call-out epilogue before the native call's continuation.
    fn epilogue(&mut self, cc: &Value, context: VarId, chain: &Chain) -> Result<()> {
        let Value::Closure(continuation) = *cc else {
            return Err(self.internal("native call continuation is not a closure"));
        };
        let resume = self.arena.closure(continuation).body;
        let after = self.arena.new_closure(Vec::new(), resume);
        self.arena.closure_mut(after).continuation = true;

        let epilogue = self.arena.new_call();
        self.arena.fill(
            epilogue,
            Value::Snippet(Snippet::NativeCallEpilogue),
            vec![Value::Var(context), Value::Closure(after), chain.ce.clone()],
        );
        self.arena.call_mut(epilogue).frame = chain.frame;
        self.arena.closure_mut(continuation).body = epilogue;
        Ok(())
    }

    // ── Devirtualization ────────────────────────────────────────────

    /// Descriptor, profiled receiver type, and selected target of a
    /// virtual call that can be guarded.
    fn devirtualization(
        &self,
        symbol: SymbolRef,
        frame: Option<FrameId>,
    ) -> Option<(Descriptor, TypeTag, MethodId)> {
        if !self.config.devirtualize {
            return None;
        }
        let offset = self.arena.frame(frame?).offset;
        let receiver = self.profile.most_frequent_receiver_type(offset)?;
        let descriptor = self.static_descriptor(symbol)?;
        let target = self.symbols.select_virtual(&descriptor, receiver)?;
        Some((descriptor, receiver, target))
    }

    /// `(λ(cc', ce'). guarded dispatch)(cc, ce)`, where the guard compares
    /// the receiver's hub against `receiver` and calls `target` directly on
    /// a match.
    #[expect(
        clippy::too_many_arguments,
        reason = "one call site; the parts come straight from the operator call"
    )]
    fn devirtualize(
        &mut self,
        call: CallId,
        mode: InvokeMode,
        descriptor: Descriptor,
        receiver_type: TypeTag,
        target: MethodId,
        operands: Vec<Value>,
        cc: Value,
        ce: Value,
        frame: Option<FrameId>,
    ) -> Result<()> {
        let receiver = operands
            .first()
            .cloned()
            .ok_or_else(|| self.internal("virtual call without receiver"))?;

        let cc_var = self
            .arena
            .fresh_var(Kind::Word, VarRole::NormalContinuation);
        let ce_var = self
            .arena
            .fresh_var(Kind::Word, VarRole::ExceptionContinuation);
        let body = self.arena.new_call();
        let wrapper = self.arena.new_closure(vec![cc_var, ce_var], body);
        self.arena.fill(call, Value::Closure(wrapper), vec![cc, ce]);

        let mut chain = Chain {
            at: body,
            ce: Value::Var(ce_var),
            frame,
        };
        self.null_check(&mut chain, &receiver);
        let hub = self.value_step(
            &mut chain,
            Snippet::ReadHub,
            vec![receiver.clone()],
            Kind::Reference,
        )?;

        let (direct, direct_body) = self.arena.new_continuation(Vec::new());
        let (generic, generic_body) = self.arena.new_continuation(Vec::new());
        self.arena.fill(
            chain.at,
            Value::Switch(SwitchOp::Compare {
                kind: Kind::Reference,
                cond: cps_bytecode::Condition::Eq,
            }),
            vec![
                Value::Var(hub),
                Value::Const(Constant::Type(receiver_type)),
                Value::Closure(direct),
                Value::Closure(generic),
            ],
        );

        let direct_chain = Chain {
            at: direct_body,
            ce: Value::Var(ce_var),
            frame,
        };
        self.finish(
            direct_chain,
            Value::Method(target),
            operands.clone(),
            Value::Var(cc_var),
        );

        let generic_chain = Chain {
            at: generic_body,
            ce: Value::Var(ce_var),
            frame,
        };
        let descriptor = Value::Const(Constant::Descriptor(Box::new(descriptor)));
        self.dispatch(
            generic_chain,
            mode,
            &descriptor,
            receiver,
            operands,
            Value::Var(cc_var),
        )?;

        self.devirtualized += 1;
        tracing::trace!(%call, %receiver_type, %target, "devirtualized call");
        Ok(())
    }
}
