#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use cps_bytecode::{
    ArithOp, Condition, Instruction, InvokeMode, Kind, Literal, MethodFlags, MethodId, SymbolRef,
};
use cps_ir::print::print;
use cps_ir::verify::verify_hcir;
use cps_ir::{Builtin, Constant, Operator, SwitchOp, Value, VarRole};
use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::{
    binary_method, block_at, calls_where, closure_of, hcir, method, only_call, pool,
    resolved_args, HOLDER,
};

const M0: MethodId = MethodId::new(0);

fn add() -> Builtin {
    Builtin::Arith {
        op: ArithOp::Add,
        kind: Kind::Int,
    }
}

fn div() -> Builtin {
    Builtin::Arith {
        op: ArithOp::Div,
        kind: Kind::Int,
    }
}

fn translate_err(method: &Method, symbols: &cps_bytecode::SymbolPool) -> TranslateError {
    translate_blocks(method, symbols, &TranslateConfig::plain()).unwrap_err()
}

// ── Straight-line code ──────────────────────────────────────────────

#[test]
fn root_binds_params_then_continuations() {
    let m = binary_method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Return(Kind::Int),
    ]);
    let (arena, root) = hcir(&m, &pool());
    let params = &arena.closure(root).params;
    assert_eq!(params.len(), 4);
    assert_eq!(arena.var(params[0]).role, VarRole::Local(0));
    assert_eq!(arena.var(params[1]).role, VarRole::Local(1));
    assert_eq!(arena.var(params[2]).role, VarRole::NormalContinuation);
    assert_eq!(arena.var(params[3]).role, VarRole::ExceptionContinuation);

    let entry = block_at(&arena, root, 0);
    let body = arena.closure(root).body;
    assert_eq!(arena.call(body).procedure, Value::Block(entry));
    assert_eq!(arena.block(entry).calls, 1);
}

#[test]
fn addition_continues_in_cc_without_exception_edge() {
    let m = binary_method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::Arith {
            op: ArithOp::Add,
            kind: Kind::Int,
        },
        Instruction::Return(Kind::Int),
    ]);
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();

    let params = arena.closure(root).params.clone();
    let call = only_call(&arena, root, &Value::Builtin(add()));
    let args = resolved_args(&arena, root, call);
    assert_eq!(args[..2].to_vec(), vec![Value::Var(params[0]), Value::Var(params[1])]);
    assert_eq!(args[3], Value::Undefined);
    assert!(arena.call(call).frame.is_none());

    let cc = arena.closure(closure_of(&args[2]));
    assert!(cc.continuation);
    assert_eq!(cc.params.len(), 1);

    // The sum flows straight into the method's continuation.
    let ret = only_call(&arena, root, &Value::Var(params[2]));
    assert_eq!(arena.call(ret).args, vec![Value::Var(cc.params[0])]);
}

#[test]
fn integer_division_records_frame_and_exception_edge() {
    let m = binary_method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::Arith {
            op: ArithOp::Div,
            kind: Kind::Int,
        },
        Instruction::Return(Kind::Int),
    ]);
    let (arena, root) = hcir(&m, &pool());
    let params = arena.closure(root).params.clone();
    let call = only_call(&arena, root, &Value::Builtin(div()));
    assert_eq!(arena.call(call).args[3], Value::Var(params[3]));

    let frame = arena.frame(arena.call(call).frame.unwrap());
    assert_eq!(frame.offset, 2);
    assert_eq!(
        frame.locals,
        vec![
            Value::Var(params[0]),
            Value::Var(params[1]),
            Value::Undefined,
            Value::Undefined,
        ]
    );
    // Operands are popped before the snapshot.
    assert!(frame.stack.is_empty());
}

#[test]
fn iinc_rebinds_the_local() {
    let m = method(vec![
        Instruction::Iinc { index: 0, delta: 3 },
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Return(Kind::Int),
    ])
    .params(vec![Kind::Int])
    .result(Kind::Int)
    .build();
    let (arena, root) = hcir(&m, &pool());
    let local = arena.closure(root).params[0];
    let call = arena.call(only_call(&arena, root, &Value::Builtin(add())));
    assert_eq!(call.args[0], Value::Var(local));
    assert_eq!(call.args[1], Value::from(Literal::Int(3)));
    assert_eq!(arena.closure(closure_of(&call.args[2])).params, vec![local]);
}

#[test]
fn swap_reads_both_values_before_rebinding() {
    let m = binary_method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::Swap,
        Instruction::Arith {
            op: ArithOp::Sub,
            kind: Kind::Int,
        },
        Instruction::Return(Kind::Int),
    ]);
    let (arena, root) = hcir(&m, &pool());
    let params = arena.closure(root).params.clone();
    let sub = Builtin::Arith {
        op: ArithOp::Sub,
        kind: Kind::Int,
    };
    let call = only_call(&arena, root, &Value::Builtin(sub));
    let args = resolved_args(&arena, root, call);
    assert_eq!(args[..2].to_vec(), vec![Value::Var(params[1]), Value::Var(params[0])]);
}

#[test]
fn dup_x1_inserts_copy_below_second_value() {
    // a b -> b a b; then a - b, then b - (a - b)
    let m = binary_method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::DupX1,
        Instruction::Arith {
            op: ArithOp::Sub,
            kind: Kind::Int,
        },
        Instruction::Arith {
            op: ArithOp::Sub,
            kind: Kind::Int,
        },
        Instruction::Return(Kind::Int),
    ]);
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();
    let params = arena.closure(root).params.clone();
    let subs = calls_where(&arena, root, |p| {
        matches!(
            p,
            Value::Builtin(Builtin::Arith {
                op: ArithOp::Sub,
                ..
            })
        )
    });
    assert_eq!(subs.len(), 2);

    let first = resolved_args(&arena, root, subs[0]);
    assert_eq!(first[..2].to_vec(), vec![Value::Var(params[0]), Value::Var(params[1])]);

    let difference = arena.closure(closure_of(&arena.call(subs[0]).args[2])).params[0];
    let second = resolved_args(&arena, root, subs[1]);
    assert_eq!(second[..2].to_vec(), vec![Value::Var(params[1]), Value::Var(difference)]);
}

#[test]
fn two_slot_values_move_as_one_under_dup2() {
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Long,
            index: 0,
        },
        Instruction::Dup2,
        Instruction::Arith {
            op: ArithOp::Mul,
            kind: Kind::Long,
        },
        Instruction::Return(Kind::Long),
    ])
    .params(vec![Kind::Long])
    .result(Kind::Long)
    .build();
    let (arena, root) = hcir(&m, &pool());
    let local = arena.closure(root).params[0];
    let mul = Builtin::Arith {
        op: ArithOp::Mul,
        kind: Kind::Long,
    };
    let call = only_call(&arena, root, &Value::Builtin(mul));
    let args = resolved_args(&arena, root, call);
    assert_eq!(args[..2].to_vec(), vec![Value::Var(local), Value::Var(local)]);
}

#[test]
fn dup_x2_then_pop2_leaves_copy_under_first_value() {
    // a b c -> c a b c -> c a; then c - a
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 2,
        },
        Instruction::DupX2,
        Instruction::Pop2,
        Instruction::Arith {
            op: ArithOp::Sub,
            kind: Kind::Int,
        },
        Instruction::Return(Kind::Int),
    ])
    .params(vec![Kind::Int, Kind::Int, Kind::Int])
    .result(Kind::Int)
    .build();
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();
    let params = arena.closure(root).params.clone();
    let sub = Builtin::Arith {
        op: ArithOp::Sub,
        kind: Kind::Int,
    };
    let call = only_call(&arena, root, &Value::Builtin(sub));
    let args = resolved_args(&arena, root, call);
    assert_eq!(args[..2].to_vec(), vec![Value::Var(params[2]), Value::Var(params[0])]);
}

#[test]
fn dup2_x2_moves_two_slot_values_as_units() {
    // a b -> b a b; then a - b, then b - (a - b), all longs
    let sub = Builtin::Arith {
        op: ArithOp::Sub,
        kind: Kind::Long,
    };
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Long,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Long,
            index: 2,
        },
        Instruction::Dup2X2,
        Instruction::Arith {
            op: ArithOp::Sub,
            kind: Kind::Long,
        },
        Instruction::Arith {
            op: ArithOp::Sub,
            kind: Kind::Long,
        },
        Instruction::Return(Kind::Long),
    ])
    .params(vec![Kind::Long, Kind::Long])
    .result(Kind::Long)
    .max_stack(6)
    .build();
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();
    let params = arena.closure(root).params.clone();
    let subs = calls_where(&arena, root, |p| *p == Value::Builtin(sub));
    assert_eq!(subs.len(), 2);

    let first = resolved_args(&arena, root, subs[0]);
    assert_eq!(first[..2].to_vec(), vec![Value::Var(params[0]), Value::Var(params[1])]);
    let difference = arena.closure(closure_of(&arena.call(subs[0]).args[2])).params[0];
    let second = resolved_args(&arena, root, subs[1]);
    assert_eq!(second[..2].to_vec(), vec![Value::Var(params[1]), Value::Var(difference)]);
}

#[test]
fn pop2_cannot_split_a_two_slot_value() {
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Long,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 2,
        },
        Instruction::Pop2,
        Instruction::Return(Kind::Void),
    ])
    .params(vec![Kind::Long, Kind::Int])
    .build();
    assert_eq!(
        translate_err(&m, &pool()),
        TranslateError::malformed(M0, 2, Malformed::SplitValue)
    );
}

// ── Control flow ────────────────────────────────────────────────────

#[test]
fn conditional_branch_is_a_compare_switch() {
    // 0: iload0; 1: ifeq 4; 2: iload1; 3: ireturn; 4: iload0; 5: ireturn
    let m = binary_method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::IfZero {
            cond: Condition::Eq,
            target: 4,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::Return(Kind::Int),
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Return(Kind::Int),
    ]);
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();

    let switch = Value::Switch(SwitchOp::Compare {
        kind: Kind::Int,
        cond: Condition::Eq,
    });
    let call = arena.call(only_call(&arena, root, &switch));
    assert_eq!(call.args.len(), 4);
    assert_eq!(call.args[1], Value::from(Literal::Int(0)));

    let jump_of = |value: &Value| {
        let closure = arena.closure(closure_of(value));
        assert!(closure.continuation);
        arena.call(closure.body).procedure.clone()
    };
    assert_eq!(jump_of(&call.args[2]), Value::Block(block_at(&arena, root, 4)));
    assert_eq!(jump_of(&call.args[3]), Value::Block(block_at(&arena, root, 2)));
}

#[test]
fn null_test_compares_against_null() {
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Reference,
            index: 0,
        },
        Instruction::IfNull {
            is_null: false,
            target: 3,
        },
        Instruction::Return(Kind::Void),
        Instruction::Return(Kind::Void),
    ])
    .params(vec![Kind::Reference])
    .build();
    let (arena, root) = hcir(&m, &pool());
    let switch = Value::Switch(SwitchOp::Compare {
        kind: Kind::Reference,
        cond: Condition::Ne,
    });
    let call = arena.call(only_call(&arena, root, &switch));
    assert_eq!(call.args[1], Value::from(Literal::Null));
}

#[test]
fn table_switch_is_a_multi_switch() {
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::TableSwitch {
            low: 1,
            targets: vec![2, 3],
            default: 4,
        },
        Instruction::Return(Kind::Void),
        Instruction::Return(Kind::Void),
        Instruction::Return(Kind::Void),
    ])
    .params(vec![Kind::Int])
    .build();
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();

    let switch = Value::Switch(SwitchOp::Multi { cases: 2 });
    let call = arena.call(only_call(&arena, root, &switch));
    assert_eq!(call.args.len(), 6);
    assert_eq!(call.args[1], Value::from(Literal::Int(1)));
    assert_eq!(call.args[2], Value::from(Literal::Int(2)));
    for (arg, offset) in call.args[3..].iter().zip([2, 3, 4]) {
        let body = arena.closure(closure_of(arg)).body;
        assert_eq!(arena.call(body).procedure, Value::Block(block_at(&arena, root, offset)));
    }
}

#[test]
fn lookup_switch_lists_match_values_then_targets() {
    // 0: iload0; 1: lookupswitch {1: 2, 9: 3, default: 4}
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::LookupSwitch {
            pairs: vec![(1, 2), (9, 3)],
            default: 4,
        },
        Instruction::Return(Kind::Void),
        Instruction::Return(Kind::Void),
        Instruction::Return(Kind::Void),
    ])
    .params(vec![Kind::Int])
    .build();
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();

    let param = arena.closure(root).params[0];
    let switch = Value::Switch(SwitchOp::Multi { cases: 2 });
    let call = only_call(&arena, root, &switch);
    let args = resolved_args(&arena, root, call);
    assert_eq!(
        args[..3].to_vec(),
        vec![
            Value::Var(param),
            Value::from(Literal::Int(1)),
            Value::from(Literal::Int(9)),
        ]
    );
    for (arg, offset) in args[3..].iter().zip([2, 3, 4]) {
        let body = arena.closure(closure_of(arg)).body;
        assert_eq!(arena.call(body).procedure, Value::Block(block_at(&arena, root, offset)));
    }
    assert!(print(&arena, root).contains("switch.multi2"));
}

#[test]
fn loop_header_starts_with_a_safepoint() {
    let m = method(vec![Instruction::Goto { target: 0 }]).build();
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();

    let header = block_at(&arena, root, 0);
    assert_eq!(arena.block(header).calls, 2);
    let body = arena.closure(arena.block(header).closure).body;
    let call = arena.call(body);
    assert_eq!(call.procedure, Value::Operator(Operator::Safepoint));
    assert_eq!(call.args.len(), 2);
    assert_eq!(call.args[1], Value::Undefined);
    assert!(call.frame.is_some());
}

#[test]
fn blocks_are_shared_between_predecessors() {
    // 0: iload0; 1: ifeq 3; 2: goto 3; 3: return
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::IfZero {
            cond: Condition::Eq,
            target: 3,
        },
        Instruction::Goto { target: 3 },
        Instruction::Return(Kind::Void),
    ])
    .params(vec![Kind::Int])
    .build();
    let (arena, root) = hcir(&m, &pool());
    let join = block_at(&arena, root, 3);
    assert_eq!(arena.block(join).calls, 2);
    assert_eq!(arena.reachable(root).blocks.len(), 3);
}

// ── Exception handlers ──────────────────────────────────────────────

fn guarded_divisions(between: Vec<Instruction>) -> Method {
    let mut code = vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::Arith {
            op: ArithOp::Div,
            kind: Kind::Int,
        },
    ];
    code.extend(between);
    code.extend([
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::Arith {
            op: ArithOp::Div,
            kind: Kind::Int,
        },
        Instruction::Return(Kind::Int),
    ]);
    let handler = u32::try_from(code.len()).unwrap();
    code.extend([
        Instruction::Pop,
        Instruction::Const(Literal::Int(0)),
        Instruction::Return(Kind::Int),
    ]);
    method(code)
        .params(vec![Kind::Int, Kind::Int])
        .result(Kind::Int)
        .handler(0, handler, handler)
        .build()
}

#[test]
fn handler_continuation_is_shared_within_a_block() {
    let m = guarded_divisions(Vec::new());
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();

    let divs = calls_where(&arena, root, |p| *p == Value::Builtin(div()));
    assert_eq!(divs.len(), 2);
    let first = arena.call(divs[0]).args[3].clone();
    let second = arena.call(divs[1]).args[3].clone();
    assert_eq!(first, second);

    let handler = arena.closure(closure_of(&first));
    assert!(handler.continuation);
    assert_eq!(handler.params.len(), 1);
    assert_eq!(arena.var(handler.params[0]).kind, Kind::Reference);
    assert_eq!(
        arena.call(handler.body).procedure,
        Value::Block(block_at(&arena, root, 6))
    );
}

#[test]
fn local_store_starts_a_new_handler_continuation() {
    // a / b is stored to local 2 between the divisions.
    let m = guarded_divisions(vec![
        Instruction::Store {
            kind: Kind::Int,
            index: 2,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 2,
        },
    ]);
    let (arena, root) = hcir(&m, &pool());
    verify_hcir(&arena, root).unwrap();

    let divs = calls_where(&arena, root, |p| *p == Value::Builtin(div()));
    let first = arena.call(divs[0]).args[3].clone();
    let second = arena.call(divs[1]).args[3].clone();
    assert_ne!(first, second);
    assert_eq!(arena.block(block_at(&arena, root, 8)).calls, 2);
}

#[test]
fn throw_passes_no_normal_continuation() {
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Reference,
            index: 0,
        },
        Instruction::Athrow,
    ])
    .params(vec![Kind::Reference])
    .build();
    let (arena, root) = hcir(&m, &pool());
    let params = arena.closure(root).params.clone();
    let call = arena.call(only_call(&arena, root, &Value::Operator(Operator::Throw)));
    assert_eq!(call.args.len(), 3);
    assert_eq!(call.args[1], Value::Undefined);
    assert_eq!(call.args[2], Value::Var(params[2]));
    assert!(call.frame.is_some());
}

// ── Symbols ─────────────────────────────────────────────────────────

#[test]
fn resolved_static_constant_is_folded() {
    let mut symbols = pool();
    let field = symbols.add_static_field("LIMIT", HOLDER, Kind::Int, Some(Literal::Int(7)));
    symbols.mark_resolved(field);
    symbols.mark_initialized(HOLDER);
    let m = method(vec![Instruction::GetStatic(field), Instruction::Return(Kind::Int)])
        .result(Kind::Int)
        .build();

    let (arena, root) = translate_blocks(&m, &symbols, &TranslateConfig::default()).unwrap();
    assert!(calls_where(&arena, root, |p| matches!(p, Value::Operator(_))).is_empty());
    let folded = calls_where(&arena, root, |p| matches!(p, Value::Closure(_)));
    assert_eq!(
        arena.call(folded[0]).args,
        vec![Value::Const(Constant::Literal(Literal::Int(7)))]
    );

    let (arena, root) = hcir(&m, &symbols);
    let read = Value::Operator(Operator::GetStatic {
        field,
        kind: Kind::Int,
    });
    only_call(&arena, root, &read);
}

#[test]
fn unresolved_static_constant_is_read_at_runtime() {
    let mut symbols = pool();
    let field = symbols.add_static_field("LIMIT", HOLDER, Kind::Int, Some(Literal::Int(7)));
    let m = method(vec![Instruction::GetStatic(field), Instruction::Return(Kind::Int)])
        .result(Kind::Int)
        .build();
    let (arena, root) = translate_blocks(&m, &symbols, &TranslateConfig::default()).unwrap();
    assert_eq!(
        calls_where(&arena, root, |p| matches!(p, Value::Operator(_))).len(),
        1
    );
    // Asking must not have resolved it.
    assert!(!cps_bytecode::SymbolTable::is_resolved(&symbols, field));
}

#[test]
fn invoke_pops_receiver_and_arguments_in_order() {
    let mut symbols = pool();
    let target = symbols.add_method(
        "put",
        HOLDER,
        MethodId::new(7),
        vec![Kind::Int],
        Kind::Void,
    );
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Reference,
            index: 0,
        },
        Instruction::Load {
            kind: Kind::Int,
            index: 1,
        },
        Instruction::Invoke {
            mode: InvokeMode::Virtual,
            method: target,
        },
        Instruction::Return(Kind::Void),
    ])
    .params(vec![Kind::Reference, Kind::Int])
    .build();
    let (arena, root) = hcir(&m, &symbols);
    verify_hcir(&arena, root).unwrap();

    let params = arena.closure(root).params.clone();
    let invoke = Value::Operator(Operator::Invoke {
        mode: InvokeMode::Virtual,
        method: target,
    });
    let call = only_call(&arena, root, &invoke);
    let args = resolved_args(&arena, root, call);
    assert_eq!(args.len(), 4);
    assert_eq!(args[..2].to_vec(), vec![Value::Var(params[0]), Value::Var(params[1])]);
    let cc = arena.closure(closure_of(&args[2]));
    assert!(cc.params.is_empty());
}

#[test]
fn native_call_from_interrupt_handler_is_restricted() {
    let mut symbols = pool();
    let write = symbols.add_static_method(
        "write",
        HOLDER,
        MethodId::new(5),
        vec![Kind::Int],
        Kind::Void,
    );
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::CallNative { method: write },
        Instruction::Return(Kind::Void),
    ])
    .params(vec![Kind::Int])
    .flags(MethodFlags::STATIC | MethodFlags::C_FUNCTION | MethodFlags::INTERRUPT_HANDLER)
    .build();
    let (arena, root) = hcir(&m, &symbols);
    let native = Value::Operator(Operator::CallNative {
        method: write,
        result: Kind::Void,
        restricted: true,
    });
    only_call(&arena, root, &native);
}

// ── Malformed input ─────────────────────────────────────────────────

#[test]
fn reading_a_long_local_as_int_is_a_kind_mismatch() {
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::Return(Kind::Int),
    ])
    .params(vec![Kind::Long])
    .result(Kind::Int)
    .build();
    assert_eq!(
        translate_err(&m, &pool()),
        TranslateError::malformed(
            M0,
            0,
            Malformed::KindMismatch {
                expected: Kind::Int,
                found: Kind::Long,
            }
        )
    );
}

#[test]
fn words_pass_as_references_only_in_unsafe_code() {
    let code = vec![
        Instruction::Load {
            kind: Kind::Reference,
            index: 0,
        },
        Instruction::ArrayLength,
        Instruction::Return(Kind::Int),
    ];
    let safe = method(code.clone())
        .params(vec![Kind::Word])
        .result(Kind::Int)
        .build();
    assert_eq!(
        translate_err(&safe, &pool()),
        TranslateError::malformed(
            M0,
            1,
            Malformed::KindMismatch {
                expected: Kind::Reference,
                found: Kind::Word,
            }
        )
    );

    let unsafe_method = method(code)
        .params(vec![Kind::Word])
        .result(Kind::Int)
        .flags(MethodFlags::STATIC | MethodFlags::UNSAFE)
        .build();
    let (arena, root) = hcir(&unsafe_method, &pool());
    verify_hcir(&arena, root).unwrap();
}

#[test]
fn underflow_and_overflow_report_the_offset() {
    let m = method(vec![Instruction::Pop]).build();
    assert_eq!(
        translate_err(&m, &pool()),
        TranslateError::malformed(M0, 0, Malformed::StackUnderflow)
    );

    let m = method(vec![
        Instruction::Const(Literal::Int(1)),
        Instruction::Const(Literal::Int(2)),
        Instruction::Return(Kind::Void),
    ])
    .max_stack(1)
    .build();
    assert_eq!(
        translate_err(&m, &pool()),
        TranslateError::malformed(M0, 1, Malformed::StackOverflow { max: 1 })
    );
}

#[test]
fn falling_off_the_end_is_rejected() {
    let m = method(vec![Instruction::Const(Literal::Int(1)), Instruction::Pop]).build();
    assert_eq!(
        translate_err(&m, &pool()),
        TranslateError::malformed(M0, 1, Malformed::FallsOffEnd)
    );
}

#[test]
fn join_with_different_stack_depths_is_rejected() {
    // The taken edge reaches 3 with an empty stack, the fall-through with
    // one value.
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Int,
            index: 0,
        },
        Instruction::IfZero {
            cond: Condition::Eq,
            target: 3,
        },
        Instruction::Const(Literal::Int(5)),
        Instruction::Return(Kind::Void),
    ])
    .params(vec![Kind::Int])
    .build();
    assert_eq!(
        translate_err(&m, &pool()),
        TranslateError::malformed(
            M0,
            2,
            Malformed::InconsistentStack {
                expected: 0,
                found: 1,
            }
        )
    );
}

#[test]
fn subroutines_are_unsupported() {
    let m = method(vec![
        Instruction::Jsr { target: 1 },
        Instruction::Return(Kind::Void),
    ])
    .build();
    assert_eq!(
        translate_err(&m, &pool()),
        TranslateError::malformed(M0, 0, Malformed::Unsupported("jsr"))
    );
}

#[test]
fn symbol_kind_is_checked_against_the_instruction() {
    let mut symbols = pool();
    let field = symbols.add_static_field("COUNT", HOLDER, Kind::Int, None);
    let m = method(vec![
        Instruction::Load {
            kind: Kind::Reference,
            index: 0,
        },
        Instruction::GetField(field),
        Instruction::Return(Kind::Int),
    ])
    .params(vec![Kind::Reference])
    .result(Kind::Int)
    .build();
    assert_eq!(
        translate_err(&m, &symbols),
        TranslateError::malformed(
            M0,
            1,
            Malformed::WrongSymbolKind {
                symbol: field,
                expected: "instance field",
            }
        )
    );

    let unknown = SymbolRef::new(9);
    let m = method(vec![
        Instruction::Invoke {
            mode: InvokeMode::Static,
            method: unknown,
        },
        Instruction::Return(Kind::Void),
    ])
    .build();
    assert_eq!(
        translate_err(&m, &symbols),
        TranslateError::malformed(M0, 0, Malformed::UnknownSymbol { symbol: unknown })
    );
}
