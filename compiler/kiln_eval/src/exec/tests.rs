#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;

use kiln_diagnostic::ErrorKind;
use kiln_ir::{
    AtomicOpType, BinaryOpType, Block, BlockSlot, Field, FieldOptions, InsertGuard, IrBuilder,
    Module, Program,
};
use kiln_passes::{run_pipeline, OffloadKind, OffloadedModule, PassOptions};
use kiln_types::{PrimitiveType, Type};

use super::execute;
use crate::device::Device;
use crate::operators::{f32_word, word_f32};

fn int_field(program: &mut Program, len: u32) -> Field {
    program.create_field(Type::I32, vec![len], FieldOptions::default())
}

/// Run the pass pipeline over `module` and execute it.
fn run(mut module: Module, device: &mut Device) -> Result<(), kiln_diagnostic::CompileError> {
    let offloaded = run_pipeline(&mut module, &PassOptions::default())?;
    execute(&module, &offloaded, device)
}

#[test]
fn parallel_loops_run_every_iteration() {
    let mut program = Program::new();
    let x = int_field(&mut program, 8);
    let mut b = IrBuilder::new();
    let range = b.create_const_i32(8);
    let lp = b.create_range_for(range, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let two = g.create_const_i32(2);
        let doubled = g.create_binary(BinaryOpType::Mul, i, two);
        let ptr = g.create_global_ptr(&x, &[i], 0);
        g.create_global_store(ptr, doubled);
    }

    let mut device = Device::new(&program);
    run(b.into_module(), &mut device).unwrap();
    assert_eq!(
        device.field_words(&x).unwrap(),
        &[0, 2, 4, 6, 8, 10, 12, 14]
    );
}

#[test]
fn trip_counts_from_arguments_go_through_global_temporaries() {
    let mut program = Program::new();
    let x = int_field(&mut program, 8);
    let mut b = IrBuilder::new();
    let n = b.create_arg_load(PrimitiveType::I32, 0);
    let lp = b.create_range_for(n, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let one = g.create_const_i32(1);
        let value = g.create_binary(BinaryOpType::Add, i, one);
        let ptr = g.create_global_ptr(&x, &[i], 0);
        g.create_global_store(ptr, value);
    }

    let mut device = Device::new(&program).with_args(vec![3]);
    run(b.into_module(), &mut device).unwrap();
    assert_eq!(device.field_words(&x).unwrap(), &[1, 2, 3, 0, 0, 0, 0, 0]);
    assert_eq!(device.gtemps[0], 3);
}

#[test]
fn serial_kernels_write_the_return_buffer() {
    let mut b = IrBuilder::new();
    let a = b.create_arg_load(PrimitiveType::F32, 0);
    let two = b.create_const_f32(2.0);
    let product = b.create_binary(BinaryOpType::Mul, a, two);
    b.create_return(&[product]);

    let mut device = Device::new(&Program::new()).with_args(vec![f32_word(1.25)]);
    run(b.into_module(), &mut device).unwrap();
    assert_eq!(device.rets.len(), 1);
    assert_eq!(word_f32(device.rets[0]), 2.5);
}

#[test]
fn while_loops_stop_at_break() {
    let mut b = IrBuilder::new();
    let counter = b.create_alloca(PrimitiveType::I32);
    let zero = b.create_const_i32(0);
    b.create_local_store(counter, zero);
    let w = b.create_while();
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(w));
        let current = g.create_local_load(counter);
        let five = g.create_const_i32(5);
        let done = g.create_binary(BinaryOpType::CmpGe, current, five);
        let exit = g.create_if(done);
        InsertGuard::attach(&mut *g, BlockSlot::Then(exit)).create_break();
        let one = g.create_const_i32(1);
        let next = g.create_binary(BinaryOpType::Add, current, one);
        g.create_local_store(counter, next);
    }
    let result = b.create_local_load(counter);
    b.create_return(&[result]);

    let mut device = Device::new(&Program::new());
    run(b.into_module(), &mut device).unwrap();
    assert_eq!(device.rets, vec![5]);
}

#[test]
fn atomic_adds_from_every_invocation_land() {
    let mut program = Program::new();
    let sum = int_field(&mut program, 1);
    let mut b = IrBuilder::new();
    let range = b.create_const_i32(10);
    let lp = b.create_range_for(range, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let zero = g.create_const_i32(0);
        let ptr = g.create_global_ptr(&sum, &[zero], 0);
        g.create_atomic_op(AtomicOpType::Add, ptr, i);
    }

    let mut device = Device::new(&program);
    run(b.into_module(), &mut device).unwrap();
    assert_eq!(device.field_words(&sum).unwrap(), &[45]);
}

#[test]
fn random_numbers_are_reproducible() {
    let build = || {
        let mut b = IrBuilder::new();
        let first = b.create_rand(PrimitiveType::F32);
        let second = b.create_rand(PrimitiveType::F32);
        b.create_return(&[first, second]);
        b.into_module()
    };
    let mut one = Device::new(&Program::new());
    let mut two = Device::new(&Program::new());
    run(build(), &mut one).unwrap();
    run(build(), &mut two).unwrap();

    assert_eq!(one.rets, two.rets);
    assert_ne!(one.rets[0], one.rets[1]);
    for word in one.rets {
        let value = word_f32(word);
        assert!((0.0..1.0).contains(&value));
    }
}

#[test]
fn out_of_bounds_accesses_are_reported() {
    let mut program = Program::new();
    let x = int_field(&mut program, 4);
    let mut b = IrBuilder::new();
    let index = b.create_const_i32(9);
    let ptr = b.create_global_ptr(&x, &[index], 0);
    let one = b.create_const_i32(1);
    b.create_global_store(ptr, one);

    let mut device = Device::new(&program);
    let err = run(b.into_module(), &mut device).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
}

#[test]
fn graphics_sub_modules_are_rejected() {
    let vertex = OffloadedModule {
        kind: OffloadKind::Vertex,
        block: Block::new(),
        loop_stmt: None,
        trip_count: None,
    };
    let mut device = Device::new(&Program::new());
    let err = execute(&Module::new(), &[vertex], &mut device).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
}
