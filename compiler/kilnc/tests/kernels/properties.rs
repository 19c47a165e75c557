//! Whole-pipeline properties.

use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use kiln_eval::Device;
use kiln_frontend::{HostValue, Scope};
use kiln_ir::{print_module, Program, StmtKind};
use kiln_passes::{eliminate_dead_instructions, OffloadKind, TripCount};
use kiln_syntax::{BinaryOperator, TreeBuilder};
use kiln_types::Type;
use kilnc::{compile_kernel, descriptor_json, CompilerOptions, KernelRequest};

use crate::common::{block_kernel, compile, count, doubling_loop, int_field, kernel, lower, run};

fn doubling_setup(len: u32) -> (Program, Scope) {
    let mut program = Program::new();
    let x = int_field(&mut program, len);
    (program, Scope::new().with("x", HostValue::Field(x)))
}

#[test]
fn compiling_twice_gives_identical_kernels() {
    let compile_once = || {
        let (mut program, scope) = doubling_setup(300);
        let mut b = TreeBuilder::new();
        let lp = doubling_loop(&mut b, "x", 300);
        let function = block_kernel(b, vec![lp]);
        compile(&mut program, &scope, &function).unwrap()
    };
    let (first, second) = (compile_once(), compile_once());
    assert_eq!(first, second);
    assert_eq!(
        descriptor_json(&first).unwrap(),
        descriptor_json(&second).unwrap()
    );
}

#[test]
fn dead_code_elimination_reaches_a_fixed_point() {
    let (mut program, scope) = doubling_setup(16);
    let mut b = TreeBuilder::new();
    // An unused value next to the loop.
    let one = b.int(1);
    let unused = b.let_("unused", one);
    let lp = doubling_loop(&mut b, "x", 16);
    let function = block_kernel(b, vec![unused, lp]);

    let mut lowered = lower(&mut program, &scope, &function, &FxHashMap::default()).unwrap();
    let before = print_module(&lowered.module);
    assert_eq!(eliminate_dead_instructions(&mut lowered.module), 0);
    assert_eq!(print_module(&lowered.module), before);
}

/// `(n) => { let m = n + 1; for (let i of ti.range(m)) { x[i] = m } }`
#[test]
fn values_cross_dispatches_through_global_temporaries() {
    let mut program = Program::new();
    let x = int_field(&mut program, 8);
    let scope = Scope::new().with("x", HostValue::Field(x.clone()));

    let mut b = TreeBuilder::new();
    let n = b.ident("n");
    let one = b.int(1);
    let sum = b.binary(BinaryOperator::Add, n, one);
    let decl = b.let_("m", sum);
    let target = b.ident("x");
    let i = b.ident("i");
    let element = b.index(target, i);
    let m = b.ident("m");
    let assign = b.assign(element, m);
    let stmt = b.expr_stmt(assign);
    let body = b.block(vec![stmt]);
    let m = b.ident("m");
    let range = b.call_path("ti.range", vec![m]);
    let lp = b.for_of(&["i"], range, body);
    let body = b.block(vec![decl, lp]);
    let root = b.function(&["n"], body);
    let function = kernel(b, root);

    let mut annotations = FxHashMap::default();
    annotations.insert("n".to_owned(), Type::I32);
    let lowered = lower(&mut program, &scope, &function, &annotations).unwrap();

    let kinds: Vec<_> = lowered.offloaded.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![OffloadKind::Serial, OffloadKind::Compute]);
    assert!(matches!(
        lowered.offloaded[1].trip_count,
        Some(TripCount::GlobalTemporary(_))
    ));
    assert_eq!(count(&lowered.module, |k| matches!(k, StmtKind::Alloca)), 0);
    assert!(count(&lowered.module, |k| matches!(k, StmtKind::GlobalTemporaryStore)) > 0);

    let mut device = Device::new(&program).with_args(vec![3]);
    run(&lowered, &mut device);
    assert_eq!(device.field_words(&x).unwrap(), &[4, 4, 4, 4, 0, 0, 0, 0]);
}

#[test]
fn template_arguments_fix_the_trip_count() {
    let (mut program, scope) = doubling_setup(64);
    let mut b = TreeBuilder::new();
    let target = b.ident("x");
    let i = b.ident("i");
    let element = b.index(target, i);
    let value = b.ident("i");
    let assign = b.assign(element, value);
    let stmt = b.expr_stmt(assign);
    let body = b.block(vec![stmt]);
    let n = b.ident("n");
    let range = b.call_path("ti.range", vec![n]);
    let lp = b.for_of(&["i"], range, body);
    let body = b.block(vec![lp]);
    let root = b.function(&["n"], body);
    let function = kernel(b, root);

    let annotations = FxHashMap::default();
    let template_args = [("n".to_owned(), HostValue::Number(40.0))];
    let options = CompilerOptions {
        workgroup_size: 16,
        ..CompilerOptions::default()
    };
    let params = compile_kernel(
        &mut program,
        &kiln_frontend::Library::new(),
        KernelRequest {
            function: &function,
            scope: &scope,
            annotations: &annotations,
            template_args: Some(&template_args),
        },
        &options,
    )
    .unwrap();

    assert!(params.arg_types.is_empty());
    let tasks: Vec<_> = params.compute_tasks().collect();
    assert_eq!(tasks.len(), 1);
    assert_eq!((tasks[0].workgroup_size, tasks[0].num_workgroups), (16, 3));
}
