//! Reference kernels.

use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use kiln_codegen::ResourceType;
use kiln_diagnostic::ErrorKind;
use kiln_eval::Device;
use kiln_frontend::{HostValue, Scope};
use kiln_ir::{Program, StmtKind, TextureDimensionality, TextureKind};
use kiln_passes::{OffloadKind, TripCount};
use kiln_syntax::TreeBuilder;

use crate::common::{block_kernel, compile, count, doubling_loop, int_field, lower, run};

#[test]
fn doubling_loop_is_one_compute_dispatch() {
    let mut program = Program::new();
    let x = int_field(&mut program, 10);
    let scope = Scope::new().with("x", HostValue::Field(x.clone()));
    let mut b = TreeBuilder::new();
    let lp = doubling_loop(&mut b, "x", 10);
    let function = block_kernel(b, vec![lp]);

    let lowered = lower(&mut program, &scope, &function, &FxHashMap::default()).unwrap();
    assert_eq!(lowered.offloaded.len(), 1);
    assert_eq!(lowered.offloaded[0].kind, OffloadKind::Compute);
    assert_eq!(lowered.offloaded[0].trip_count, Some(TripCount::Const(10)));

    let mut device = Device::new(&program);
    run(&lowered, &mut device);
    assert_eq!(
        device.field_words(&x).unwrap(),
        &[0, 2, 4, 6, 8, 10, 12, 14, 16, 18]
    );

    let params = compile(&mut program, &scope, &function).unwrap();
    let tasks: Vec<_> = params.compute_tasks().collect();
    assert_eq!(tasks.len(), 1);
    assert_eq!((tasks[0].workgroup_size, tasks[0].num_workgroups), (128, 1));
}

#[test]
fn float_into_integer_local_is_rejected() {
    let mut b = TreeBuilder::new();
    let one = b.int(1);
    let decl = b.let_("y", one);
    let y = b.ident("y");
    let half = b.float(1.5);
    let assign = b.assign(y, half);
    let stmt = b.expr_stmt(assign);
    let function = block_kernel(b, vec![decl, stmt]);

    let mut program = Program::new();
    let err = compile(&mut program, &Scope::new(), &function).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.node.is_some());
}

#[test]
fn color_output_without_a_vertex_loop_is_a_pipeline_error() {
    let mut program = Program::new();
    let target = program.create_texture(
        TextureDimensionality::Dim2d,
        TextureKind::Canvas {
            format: "bgra8unorm".to_owned(),
        },
        1,
    );
    let scope = Scope::new().with("target", HostValue::Texture(target));

    let mut b = TreeBuilder::new();
    let target = b.ident("target");
    let components = vec![b.float(1.0), b.float(0.0), b.float(0.0), b.float(1.0)];
    let color = b.array(components);
    let output = b.call_path("ti.outputColor", vec![target, color]);
    let stmt = b.expr_stmt(output);
    let function = block_kernel(b, vec![stmt]);

    let err = compile(&mut program, &scope, &function).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PipelineState);
}

#[test]
fn plain_stores_next_to_atomics_become_atomic() {
    let mut program = Program::new();
    let buf = int_field(&mut program, 4);
    let scope = Scope::new().with("buf", HostValue::Field(buf.clone()));

    let mut b = TreeBuilder::new();
    // for (let j of ti.range(4)) { buf[j] = 0 }
    let target = b.ident("buf");
    let j = b.ident("j");
    let element = b.index(target, j);
    let zero = b.int(0);
    let assign = b.assign(element, zero);
    let stmt = b.expr_stmt(assign);
    let body = b.block(vec![stmt]);
    let extent = b.int(4);
    let range = b.call_path("ti.range", vec![extent]);
    let clear = b.for_of(&["j"], range, body);

    // for (let i of ti.range(4)) { ti.atomicAdd(buf[i], 1); ti.atomicAdd(buf[i], 1) }
    let mut adds = Vec::new();
    for _ in 0..2 {
        let target = b.ident("buf");
        let i = b.ident("i");
        let element = b.index(target, i);
        let one = b.int(1);
        let add = b.call_path("ti.atomicAdd", vec![element, one]);
        adds.push(b.expr_stmt(add));
    }
    let body = b.block(adds);
    let extent = b.int(4);
    let range = b.call_path("ti.range", vec![extent]);
    let add = b.for_of(&["i"], range, body);
    let function = block_kernel(b, vec![clear, add]);

    let lowered = lower(&mut program, &scope, &function, &FxHashMap::default()).unwrap();
    let module = &lowered.module;
    assert_eq!(count(module, |k| matches!(k, StmtKind::GlobalStore)), 0);
    assert_eq!(count(module, |k| matches!(k, StmtKind::AtomicStore)), 1);
    assert_eq!(count(module, |k| matches!(k, StmtKind::AtomicOp(_))), 2);

    let mut device = Device::new(&program);
    device.field_words_mut(&buf).unwrap().fill(9);
    run(&lowered, &mut device);
    assert_eq!(device.field_words(&buf).unwrap(), &[2, 2, 2, 2]);

    let params = compile(&mut program, &scope, &function).unwrap();
    for task in params.compute_tasks() {
        let types: Vec<_> = task.bindings.iter().map(|b| b.info.ty).collect();
        assert!(types.contains(&ResourceType::RootAtomic));
        assert!(!types.contains(&ResourceType::Root));
        assert!(task.code.contains("atomic"));
    }
}
