//! Property-based tests for the translation pipeline.
//!
//! Generates structured methods over int, long and reference locals
//! (assignments, increments, forward branches, counting loops, optionally a
//! catch-all handler) and checks:
//! 1. Every stage passes the structural verifiers.
//! 2. Closure conversion is bounded and idempotent.
//! 3. Lowering leaves no high-level operators behind.
//!
//! Locals other than the parameters start out unset and are only read
//! where every path has stored them, so conditionally stored locals reach
//! join points as undefined values.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::doc_markdown,
    clippy::uninlined_format_args,
    clippy::redundant_closure_for_method_calls,
    reason = "Proptest macros generate code with these patterns"
)]

use cps_bytecode::{ArithOp, Condition, Instruction, Kind, Literal, Method, MethodId, SymbolPool};
use cps_front::translate::translate_blocks;
use cps_front::{convert, ConversionStats, TranslateConfig, Translator};
use cps_ir::print::print;
use cps_ir::verify::verify_closed;
use cps_ir::Value;
use proptest::prelude::*;

/// Int locals `0..INTS`; 0 and 1 are parameters.
const INTS: u16 = 4;
/// Long local, two slots.
const WIDE: u16 = 4;
/// Reference local.
const OBJECT: u16 = 6;
const LOCALS: u16 = 7;

// -- Program model --

#[derive(Clone, Debug)]
enum Expr {
    Const(i32),
    Local(u16),
    Binary(ArithOp, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug)]
enum Stmt {
    Assign(u16, Expr),
    Increment(u16, i32),
    /// Store the widened value in the long local.
    Widen(Expr),
    /// Double the long local.
    Accumulate,
    /// Store the narrowed long local in an int local.
    Narrow(u16),
    /// Store null in the reference local.
    Clear,
    /// Skip `body` when the local satisfies the condition against zero.
    Skip(u16, Condition, Vec<Stmt>),
    /// Skip `body` when the reference local is null.
    SkipIfNull(Vec<Stmt>),
    /// Run `body` until the local reaches zero, decrementing it each time.
    CountDown(u16, Vec<Stmt>),
}

#[derive(Clone, Debug)]
struct Program {
    body: Vec<Stmt>,
    result: u16,
    guarded: bool,
}

// -- Strategies --

fn local() -> impl Strategy<Value = u16> {
    0..INTS
}

fn arith_op() -> impl Strategy<Value = ArithOp> {
    prop_oneof![
        Just(ArithOp::Add),
        Just(ArithOp::Sub),
        Just(ArithOp::Mul),
        Just(ArithOp::Div),
        Just(ArithOp::Rem),
        Just(ArithOp::Xor),
    ]
}

fn condition() -> impl Strategy<Value = Condition> {
    prop_oneof![
        Just(Condition::Eq),
        Just(Condition::Ne),
        Just(Condition::Lt),
        Just(Condition::Ge),
    ]
}

fn expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![any::<i32>().prop_map(Expr::Const), local().prop_map(Expr::Local)];
    leaf.prop_recursive(3, 8, 2, |inner| {
        (arith_op(), inner.clone(), inner)
            .prop_map(|(op, lhs, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    })
}

fn stmt() -> impl Strategy<Value = Stmt> {
    let simple = prop_oneof![
        3 => (local(), expr()).prop_map(|(index, value)| Stmt::Assign(index, value)),
        2 => (local(), -4..4i32).prop_map(|(index, delta)| Stmt::Increment(index, delta)),
        1 => expr().prop_map(Stmt::Widen),
        1 => Just(Stmt::Accumulate),
        1 => local().prop_map(Stmt::Narrow),
        1 => Just(Stmt::Clear),
    ];
    simple.prop_recursive(2, 12, 3, |inner| {
        prop_oneof![
            (local(), condition(), prop::collection::vec(inner.clone(), 0..3))
                .prop_map(|(index, cond, body)| Stmt::Skip(index, cond, body)),
            prop::collection::vec(inner.clone(), 0..3).prop_map(Stmt::SkipIfNull),
            (local(), prop::collection::vec(inner, 0..3))
                .prop_map(|(index, body)| Stmt::CountDown(index, body)),
        ]
    })
}

fn program() -> impl Strategy<Value = Program> {
    (prop::collection::vec(stmt(), 0..6), local(), any::<bool>()).prop_map(
        |(body, result, guarded)| Program {
            body,
            result,
            guarded,
        },
    )
}

// -- Emission --

/// One instruction per offset, so offsets are indices into `code`.
///
/// Tracks which locals every path has stored so far; reads of anything
/// else are replaced by constants, and statements that need an unset local
/// store it first.
struct Emitter {
    code: Vec<Instruction>,
    stored: [bool; LOCALS as usize],
}

impl Emitter {
    fn new() -> Self {
        let mut stored = [false; LOCALS as usize];
        stored[0] = true;
        stored[1] = true;
        Emitter {
            code: Vec::new(),
            stored,
        }
    }

    fn here(&self) -> u32 {
        u32::try_from(self.code.len()).unwrap()
    }

    fn push(&mut self, insn: Instruction) -> usize {
        self.code.push(insn);
        self.code.len() - 1
    }

    fn patch(&mut self, at: usize, to: u32) {
        match &mut self.code[at] {
            Instruction::IfZero { target, .. }
            | Instruction::IfNull { target, .. }
            | Instruction::Goto { target } => *target = to,
            other => panic!("cannot patch {other:?}"),
        }
    }

    fn is_stored(&self, index: u16) -> bool {
        self.stored[usize::from(index)]
    }

    fn store(&mut self, kind: Kind, index: u16) {
        self.push(Instruction::Store { kind, index });
        self.stored[usize::from(index)] = true;
    }

    /// Push an int local, or zero if some path leaves it unset.
    fn int_local(&mut self, index: u16) {
        if self.is_stored(index) {
            self.push(load(Kind::Int, index));
        } else {
            self.push(Instruction::Const(Literal::Int(0)));
        }
    }

    fn ensure_object(&mut self) {
        if !self.is_stored(OBJECT) {
            self.push(Instruction::Const(Literal::Null));
            self.store(Kind::Reference, OBJECT);
        }
    }

    /// Emit `body` on a path that may be skipped; its stores do not count
    /// afterwards.
    fn conditional(&mut self, body: &[Stmt]) {
        let before = self.stored;
        body.iter().for_each(|stmt| self.stmt(stmt));
        self.stored = before;
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Const(value) => {
                self.push(Instruction::Const(Literal::Int(*value)));
            }
            Expr::Local(index) => self.int_local(*index),
            Expr::Binary(op, lhs, rhs) => {
                self.expr(lhs);
                self.expr(rhs);
                self.push(Instruction::Arith {
                    op: *op,
                    kind: Kind::Int,
                });
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign(index, value) => {
                self.expr(value);
                self.store(Kind::Int, *index);
            }
            Stmt::Increment(index, delta) => {
                if self.is_stored(*index) {
                    self.push(Instruction::Iinc {
                        index: *index,
                        delta: *delta,
                    });
                } else {
                    self.push(Instruction::Const(Literal::Int(*delta)));
                    self.store(Kind::Int, *index);
                }
            }
            Stmt::Widen(value) => {
                self.expr(value);
                self.push(Instruction::Convert {
                    from: Kind::Int,
                    to: Kind::Long,
                });
                self.store(Kind::Long, WIDE);
            }
            Stmt::Accumulate => {
                if self.is_stored(WIDE) {
                    self.push(load(Kind::Long, WIDE));
                    self.push(load(Kind::Long, WIDE));
                    self.push(Instruction::Arith {
                        op: ArithOp::Add,
                        kind: Kind::Long,
                    });
                    self.store(Kind::Long, WIDE);
                }
            }
            Stmt::Narrow(index) => {
                if self.is_stored(WIDE) {
                    self.push(load(Kind::Long, WIDE));
                    self.push(Instruction::Convert {
                        from: Kind::Long,
                        to: Kind::Int,
                    });
                    self.store(Kind::Int, *index);
                }
            }
            Stmt::Clear => {
                self.push(Instruction::Const(Literal::Null));
                self.store(Kind::Reference, OBJECT);
            }
            Stmt::Skip(index, cond, body) => {
                self.int_local(*index);
                let branch = self.push(Instruction::IfZero {
                    cond: *cond,
                    target: 0,
                });
                self.conditional(body);
                let end = self.here();
                self.patch(branch, end);
            }
            Stmt::SkipIfNull(body) => {
                self.ensure_object();
                self.push(load(Kind::Reference, OBJECT));
                let branch = self.push(Instruction::IfNull {
                    is_null: true,
                    target: 0,
                });
                self.conditional(body);
                let end = self.here();
                self.patch(branch, end);
            }
            Stmt::CountDown(index, body) => {
                if !self.is_stored(*index) {
                    self.push(Instruction::Const(Literal::Int(3)));
                    self.store(Kind::Int, *index);
                }
                let header = self.here();
                self.push(load(Kind::Int, *index));
                let exit = self.push(Instruction::IfZero {
                    cond: Condition::Eq,
                    target: 0,
                });
                let before = self.stored;
                body.iter().for_each(|stmt| self.stmt(stmt));
                // The body may have overwritten the counter, but never unset it.
                self.push(Instruction::Iinc {
                    index: *index,
                    delta: -1,
                });
                self.stored = before;
                self.push(Instruction::Goto { target: header });
                let end = self.here();
                self.patch(exit, end);
            }
        }
    }
}

fn load(kind: Kind, index: u16) -> Instruction {
    Instruction::Load { kind, index }
}

/// `static int m(int, int)`; only the parameters are set on entry.
fn emit(program: &Program) -> Method {
    let mut emitter = Emitter::new();
    program.body.iter().for_each(|stmt| emitter.stmt(stmt));
    emitter.int_local(program.result);
    emitter.push(Instruction::Return(Kind::Int));

    let end = emitter.here();
    if program.guarded {
        emitter.push(Instruction::Pop);
        emitter.push(load(Kind::Int, 0));
        emitter.push(Instruction::Return(Kind::Int));
    }

    let mut builder = Method::builder(MethodId::new(0), "generated")
        .params(vec![Kind::Int, Kind::Int])
        .result(Kind::Int)
        .max_locals(LOCALS)
        .max_stack(8)
        .code(emitter.code);
    if program.guarded {
        builder = builder.handler(0, end, end);
    }
    builder.build()
}

// -- Properties --

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn every_stage_verifies(program in program()) {
        let method = emit(&program);
        let symbols = SymbolPool::new();
        let translated = Translator::new(&symbols)
            .with_config(TranslateConfig::strict())
            .translate(&method);
        prop_assert!(translated.is_ok(), "{:?}\n{:#?}", translated.as_ref().err(), method.code);
        prop_assert_eq!(translated.unwrap().params().len(), 4);
    }

    #[test]
    fn conversion_is_idempotent(program in program()) {
        let method = emit(&program);
        let symbols = SymbolPool::new();
        let (mut arena, root) =
            translate_blocks(&method, &symbols, &TranslateConfig::plain()).unwrap();
        let variables = arena.num_vars();
        let first = convert(&mut arena, root);
        prop_assert!(first.worklist_steps <= first.blocks * variables);
        verify_closed(&arena, root).unwrap();
        let before = print(&arena, root);

        let second = convert(&mut arena, root);
        prop_assert_eq!(second.free_variables, 0);
        prop_assert_eq!(second.pruned_parameters, 0);
        prop_assert_eq!(
            second,
            ConversionStats {
                blocks: first.blocks,
                call_sites: first.call_sites,
                worklist_steps: 0,
                ..ConversionStats::default()
            }
        );
        prop_assert_eq!(print(&arena, root), before);
    }

    #[test]
    fn lowering_leaves_no_operators(program in program()) {
        let method = emit(&program);
        let symbols = SymbolPool::new();
        let translated = Translator::new(&symbols)
            .with_config(TranslateConfig::strict())
            .translate(&method)
            .unwrap();
        let arena = &translated.arena;
        let remaining = arena
            .reachable(translated.root)
            .calls
            .into_iter()
            .filter(|&call| matches!(arena.call(call).procedure, Value::Operator(_)))
            .count();
        prop_assert_eq!(remaining, 0);
    }
}
