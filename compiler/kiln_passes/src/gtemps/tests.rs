#![allow(clippy::unwrap_used)]

use kiln_ir::{BinaryOpType, BlockSlot, InsertGuard, IrBuilder, Program, StmtKind};
use kiln_types::PrimitiveType;
use pretty_assertions::assert_eq;

use super::*;
use crate::identify_parallel_loops;
use crate::test_helpers::{body_of, count, int_field};

fn is_local_access(kind: &StmtKind) -> bool {
    matches!(kind, StmtKind::LocalLoad | StmtKind::LocalStore)
}

#[test]
fn serial_local_read_in_parallel_loop_is_promoted() {
    let mut program = Program::new();
    let x = int_field(&mut program, 4);
    let mut b = IrBuilder::new();
    let t = b.create_alloca(PrimitiveType::I32);
    let five = b.create_const_i32(5);
    let init = b.create_local_store(t, five);
    let n = b.create_const_i32(4);
    let lp = b.create_range_for(n, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let v = g.create_local_load(t);
        let ptr = g.create_global_ptr(&x, &[i], 0);
        g.create_global_store(ptr, v);
    }
    let mut module = b.into_module();
    identify_parallel_loops(&mut module);

    let stats = insert_global_temporaries(&mut module);

    assert_eq!(stats.promoted_allocas, 1);
    assert_eq!(stats.slots, 1);
    assert!(matches!(module.kind(t), StmtKind::GlobalTemporary { offset: 0 }));
    assert!(matches!(module.kind(init), StmtKind::GlobalTemporaryStore));
    let body = body_of(&module, lp);
    assert!(body.iter().all(|&id| !is_local_access(module.kind(id))));
    assert_eq!(count(&module, |k| matches!(k, StmtKind::GlobalTemporaryLoad)), 1);
}

#[test]
fn loop_local_alloca_stays_local() {
    let mut program = Program::new();
    let x = int_field(&mut program, 4);
    let mut b = IrBuilder::new();
    let n = b.create_const_i32(4);
    let lp = b.create_range_for(n, false);
    let local;
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        local = g.create_alloca(PrimitiveType::I32);
        g.create_local_store(local, i);
        let v = g.create_local_load(local);
        let ptr = g.create_global_ptr(&x, &[i], 0);
        g.create_global_store(ptr, v);
    }
    let mut module = b.into_module();
    identify_parallel_loops(&mut module);

    let stats = insert_global_temporaries(&mut module);

    assert_eq!(stats, GlobalTemporaryStats::default());
    assert!(matches!(module.kind(local), StmtKind::Alloca));
}

#[test]
fn dynamic_trip_count_is_hoisted() {
    let mut b = IrBuilder::new();
    let n = b.create_arg_load(PrimitiveType::I32, 0);
    let lp = b.create_range_for(n, false);
    let mut module = b.into_module();
    identify_parallel_loops(&mut module);

    let stats = insert_global_temporaries(&mut module);

    assert_eq!(stats.trip_counts, 1);
    let root = module.root.stmts.clone();
    assert_eq!(root.len(), 4);
    assert_eq!(root[0], n);
    assert_eq!(root[3], lp);
    let slot = module.stmt(lp).operand(0).unwrap();
    assert_eq!(slot, root[1]);
    assert!(matches!(module.kind(slot), StmtKind::GlobalTemporary { offset: 0 }));
    let store = module.stmt(root[2]);
    assert!(matches!(store.kind, StmtKind::GlobalTemporaryStore));
    assert_eq!(store.operands.as_slice(), &[slot, n]);
}

#[test]
fn constant_trip_count_is_not_hoisted() {
    let mut b = IrBuilder::new();
    let n = b.create_const_i32(8);
    let lp = b.create_range_for(n, false);
    let mut module = b.into_module();
    identify_parallel_loops(&mut module);

    let stats = insert_global_temporaries(&mut module);

    assert_eq!(stats.trip_counts, 0);
    assert_eq!(module.stmt(lp).operand(0), Some(n));
}

#[test]
fn computed_value_is_spilled_and_reloaded() {
    let mut program = Program::new();
    let x = int_field(&mut program, 4);
    let mut b = IrBuilder::new();
    let a = b.create_arg_load(PrimitiveType::I32, 0);
    let squared = b.create_binary(BinaryOpType::Mul, a, a);
    let n = b.create_const_i32(4);
    let lp = b.create_range_for(n, false);
    let store;
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let ptr = g.create_global_ptr(&x, &[i], 0);
        store = g.create_global_store(ptr, squared);
    }
    let mut module = b.into_module();
    identify_parallel_loops(&mut module);

    let stats = insert_global_temporaries(&mut module);

    assert_eq!(stats.spilled_values, 1);
    let root = module.root.stmts.clone();
    let squared_at = root.iter().position(|&id| id == squared).unwrap();
    assert!(matches!(
        module.kind(root[squared_at + 2]),
        StmtKind::GlobalTemporaryStore
    ));

    let reloaded = module.stmt(store).operand(1).unwrap();
    assert_ne!(reloaded, squared);
    assert!(matches!(module.kind(reloaded), StmtKind::GlobalTemporaryLoad));
    let body = body_of(&module, lp);
    assert!(body.contains(&reloaded));
    assert!(body.iter().position(|&id| id == reloaded) < body.iter().position(|&id| id == store));
}

#[test]
fn constants_and_args_are_rematerialized() {
    let mut program = Program::new();
    let x = int_field(&mut program, 4);
    let mut b = IrBuilder::new();
    let three = b.create_const_i32(3);
    let arg = b.create_arg_load(PrimitiveType::I32, 1);
    let n = b.create_const_i32(4);
    let lp = b.create_range_for(n, false);
    let sum;
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        sum = g.create_binary(BinaryOpType::Add, three, arg);
        let ptr = g.create_global_ptr(&x, &[i], 0);
        g.create_global_store(ptr, sum);
    }
    let mut module = b.into_module();
    identify_parallel_loops(&mut module);

    let stats = insert_global_temporaries(&mut module);

    assert_eq!(stats.rematerialized, 2);
    assert_eq!(stats.slots, 0);
    let body = body_of(&module, lp);
    let ops = module.stmt(sum).operands.clone();
    assert!(ops.iter().all(|op| body.contains(op)));
    assert!(matches!(module.kind(body[0]), StmtKind::Const(_)));
    assert!(matches!(module.kind(body[1]), StmtKind::ArgLoad { arg_id: 1 }));
}

#[test]
fn slots_follow_first_use_order() {
    let mut b = IrBuilder::new();
    let first = b.create_alloca(PrimitiveType::F32);
    let second = b.create_alloca(PrimitiveType::F32);
    let n = b.create_const_i32(2);
    let lp = b.create_range_for(n, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let v = g.create_local_load(second);
        g.create_local_store(first, v);
    }
    let mut module = b.into_module();
    identify_parallel_loops(&mut module);

    insert_global_temporaries(&mut module);

    assert!(matches!(module.kind(second), StmtKind::GlobalTemporary { offset: 0 }));
    assert!(matches!(module.kind(first), StmtKind::GlobalTemporary { offset: 1 }));
}
