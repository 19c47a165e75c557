#![allow(clippy::unwrap_used)]

use kiln_diagnostic::{CompileResult, ErrorKind};
use kiln_ir::{
    AtomicOpType, BinaryOpType, BlockSlot, BuiltInOutputKind, FieldOptions, InsertGuard,
    IrBuilder, Module, Program, TextureDimensionality, TextureFunctionKind, TextureKind,
};
use kiln_passes::{run_pipeline, OffloadKind, PassOptions};
use kiln_types::{PrimitiveType, Type};
use pretty_assertions::assert_eq;

use super::*;

/// Run the passes and generate every shader, chaining vertex bindings into
/// the following fragment stage.
fn shaders(program: &Program, mut module: Module) -> CompileResult<Vec<ShaderParams>> {
    let offloaded = run_pipeline(&mut module, &PassOptions::default())?;
    let options = CodegenOptions::default();
    let input = CodegenInput {
        program,
        module: &module,
        arg_bytes: 8,
        ret_bytes: 4,
        options: &options,
    };
    let mut out = Vec::new();
    let mut vertex_bindings = Vec::new();
    for sub in &offloaded {
        let previous = if sub.kind == OffloadKind::Fragment {
            vertex_bindings.clone()
        } else {
            Vec::new()
        };
        let shader = generate(&input, sub, &previous)?;
        if let ShaderParams::Vertex(vertex) = &shader {
            vertex_bindings.clone_from(&vertex.bindings);
        }
        out.push(shader);
    }
    Ok(out)
}

fn task(shader: &ShaderParams) -> &TaskParams {
    match shader {
        ShaderParams::Task(task) => task,
        other => panic!("expected a compute task, got {other:?}"),
    }
}

fn root(tree: u32, binding: u32) -> ResourceBinding {
    ResourceBinding {
        info: ResourceInfo::with_id(ResourceType::Root, tree),
        binding,
    }
}

/// `for i in range(n) { x[i] = i * 2 }`.
fn doubling(program: &mut Program, n: i32) -> Module {
    let x = program.create_field(Type::I32, vec![10], FieldOptions::default());
    let mut b = IrBuilder::new();
    let range = b.create_const_i32(n);
    let lp = b.create_range_for(range, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let two = g.create_const_i32(2);
        let doubled = g.create_binary(BinaryOpType::Mul, i, two);
        let ptr = g.create_global_ptr(&x, &[i], 0);
        g.create_global_store(ptr, doubled);
    }
    b.into_module()
}

// ── Compute ──

#[test]
fn parallel_loop_becomes_grid_strided_compute_shader() {
    let mut program = Program::new();
    let module = doubling(&mut program, 10);

    let shaders = shaders(&program, module).unwrap();

    assert_eq!(shaders.len(), 1);
    let task = task(&shaders[0]);
    assert_eq!(task.workgroup_size, 128);
    assert_eq!(task.num_workgroups, 1);
    assert_eq!(task.bindings, vec![root(0, 0)]);

    let expected_body = "\
  let _t0_end : i32 = 10;
  let _t1_total_invocs : i32 = 128 * i32(n_workgroups.x);
  var ii : i32 = i32(gid3.x);
  loop {
    if (ii >= _t0_end) { break; }
    let _2 : i32 = ii;
    let _3 : i32 = 2;
    let _4 : i32 = i32((_2 * _3));
    root_buffer_binding_0.member[0 + 1 * (1 * _2) + 0] = bitcast<i32>(_4);
    continuing { ii = ii + _t1_total_invocs; }
  }
}
";
    assert!(task.code.ends_with(expected_body), "{}", task.code);
    assert!(task.code.contains("@compute @workgroup_size(128, 1, 1)"));
    assert!(task
        .code
        .contains("member : array<i32, 10>,\n};\n@group(0) @binding(0)\nvar<storage, read_write> root_buffer_binding_0 : root_buffer_binding_0_type;"));
}

#[test]
fn workgroup_count_rounds_up() {
    let mut program = Program::new();
    let module = doubling(&mut program, 300);

    let shaders = shaders(&program, module).unwrap();

    assert_eq!(task(&shaders[0]).num_workgroups, 3);
}

#[test]
fn generation_is_deterministic() {
    let mut first = Program::new();
    let mut second = Program::new();
    let first_module = doubling(&mut first, 10);
    let second_module = doubling(&mut second, 10);
    let a = shaders(&first, first_module).unwrap();
    let b = shaders(&second, second_module).unwrap();
    assert_eq!(a, b);
}

#[test]
fn dynamic_trip_count_is_read_from_global_temporaries() {
    let program = Program::new();
    let mut b = IrBuilder::new();
    let n = b.create_arg_load(PrimitiveType::I32, 0);
    let lp = b.create_range_for(n, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        g.create_return(&[i]);
    }

    let shaders = shaders(&program, b.into_module()).unwrap();

    assert_eq!(shaders.len(), 2);
    let serial = task(&shaders[0]);
    assert_eq!((serial.workgroup_size, serial.num_workgroups), (1, 1));
    assert!(serial.code.contains("global_tmps_.member[0] = bitcast<i32>(_0);"));
    assert!(serial.code.contains("let _0 : i32 = bitcast<i32>(args_.member[0]);"));

    let compute = task(&shaders[1]);
    assert_eq!(compute.num_workgroups, 512);
    assert!(compute.code.contains("let _t0_end : i32 = global_tmps_.member[0];"));
    assert!(compute.code.contains("rets_.member[0] = _"));
}

#[test]
fn serial_kernel_loads_arguments_and_writes_returns() {
    let program = Program::new();
    let mut b = IrBuilder::new();
    let a = b.create_arg_load(PrimitiveType::F32, 1);
    b.create_return(&[a]);

    let shaders = shaders(&program, b.into_module()).unwrap();

    let task = task(&shaders[0]);
    assert_eq!(task.workgroup_size, 1);
    assert_eq!(
        task.bindings,
        vec![
            ResourceBinding {
                info: ResourceInfo::new(ResourceType::Args),
                binding: 0
            },
            ResourceBinding {
                info: ResourceInfo::new(ResourceType::Rets),
                binding: 1
            },
        ]
    );
    assert!(task.code.contains("let _0 : f32 = bitcast<f32>(args_.member[1]);"));
    assert!(task.code.contains("rets_.member[0] = bitcast<i32>(_0);"));
    assert!(task.code.contains("member : array<i32, 2>,"));
}

#[test]
fn strictly_serial_loop_counts_with_a_var() {
    let mut program = Program::new();
    let x = program.create_field(Type::I32, vec![3], FieldOptions::default());
    let mut b = IrBuilder::new();
    let n = b.create_const_i32(3);
    let lp = b.create_range_for(n, true);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let ptr = g.create_global_ptr(&x, &[i], 0);
        g.create_global_store(ptr, i);
    }

    let shaders = shaders(&program, b.into_module()).unwrap();

    let code = &task(&shaders[0]).code;
    assert!(code.contains(
        "  var _1 : i32 = 0;
  loop {
    if (_1 >= _0) { break; }
    let _2 : i32 = _1;
    root_buffer_binding_0.member[0 + 1 * (1 * _2) + 0] = bitcast<i32>(_2);
    continuing { _1 = _1 + 1; }
  }
"
    ));
}

#[test]
fn if_without_else_branch() {
    let mut program = Program::new();
    let x = program.create_field(Type::I32, vec![1], FieldOptions::default());
    let mut b = IrBuilder::new();
    let cond = b.create_arg_load(PrimitiveType::I32, 0);
    let branch = b.create_if(cond);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Then(branch));
        let zero = g.create_const_i32(0);
        let ptr = g.create_global_ptr(&x, &[zero], 0);
        g.create_global_store(ptr, cond);
    }

    let shaders = shaders(&program, b.into_module()).unwrap();

    let code = &task(&shaders[0]).code;
    assert!(code.contains("  if (bool(_0)) {\n    let _2 : i32 = 0;\n"));
    assert!(!code.contains("else"));
}

#[test]
fn random_functions_are_declared_once() {
    let mut program = Program::new();
    let x = program.create_field(Type::F32, vec![2], FieldOptions::default());
    let mut b = IrBuilder::new();
    let zero = b.create_const_i32(0);
    let one = b.create_const_i32(1);
    let r0 = b.create_rand(PrimitiveType::F32);
    let r1 = b.create_rand(PrimitiveType::F32);
    let p0 = b.create_global_ptr(&x, &[zero], 0);
    b.create_global_store(p0, r0);
    let p1 = b.create_global_ptr(&x, &[one], 0);
    b.create_global_store(p1, r1);

    let shaders = shaders(&program, b.into_module()).unwrap();

    let task = task(&shaders[0]);
    assert_eq!(task.code.matches("fn rand_u32").count(), 1);
    assert_eq!(task.code.matches("struct RandState").count(), 1);
    assert!(task.code.contains("rand_f32(gid3.x)"));
    assert!(task
        .bindings
        .iter()
        .any(|b| b.info.ty == ResourceType::RandStates));
}

// ── Atomics ──

fn atomic_kernel(prim: PrimitiveType) -> (Program, Module) {
    let mut program = Program::new();
    let x = program.create_field(Type::Scalar(prim), vec![1], FieldOptions::default());
    let mut b = IrBuilder::new();
    let n = b.create_const_i32(64);
    let lp = b.create_range_for(n, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let zero = g.create_const_i32(0);
        let one = g.create_constant(prim, 1.0);
        let ptr = g.create_global_ptr(&x, &[zero], 0);
        g.create_atomic_op(AtomicOpType::Add, ptr, one);
    }
    (program, b.into_module())
}

#[test]
fn i32_atomics_use_builtins() {
    let (program, module) = atomic_kernel(PrimitiveType::I32);

    let shaders = shaders(&program, module).unwrap();

    let task = task(&shaders[0]);
    assert_eq!(
        task.bindings[0].info,
        ResourceInfo::with_id(ResourceType::RootAtomic, 0)
    );
    assert!(task.code.contains("member : array<atomic<i32>, 1>,"));
    assert!(task
        .code
        .contains("= atomicAdd(&(root_buffer_atomic_binding_0.member[0 + 1 * (1 * _"));
}

#[test]
fn f32_atomics_use_compare_exchange_loops() {
    let (program, module) = atomic_kernel(PrimitiveType::F32);

    let shaders = shaders(&program, module).unwrap();

    let code = &task(&shaders[0]).code;
    assert!(code.contains("var _t2_atomic_op_result : f32;"));
    assert!(code.contains("let _t4_new_val : f32 = _t3_old_val + _"));
    assert!(code.contains(
        "if (atomicCompareExchangeWeak(&(root_buffer_atomic_binding_0.member["
    ));
    assert!(code.contains(").exchanged) {"));
}

// ── Graphics ──

/// A vertex loop forwarding location 0 and a fragment loop writing it as a
/// color.
fn render_kernel(fragment_store: Option<&kiln_ir::Field>) -> Module {
    let mut b = IrBuilder::new();
    let vertex = b.create_vertex_for();
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(vertex));
        let v = g.create_vertex_input(PrimitiveType::F32, 0);
        let one = g.create_const_f32(1.0);
        g.create_builtin_output(BuiltInOutputKind::Position, &[v, v, v, one]);
        g.create_vertex_output(v, 0);
    }
    let fragment = b.create_fragment_for();
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(fragment));
        let f = g.create_fragment_input(PrimitiveType::F32, 0);
        let one = g.create_const_f32(1.0);
        g.create_builtin_output(BuiltInOutputKind::Color(0), &[f, f, f, one]);
        if let Some(field) = fragment_store {
            let zero = g.create_const_i32(0);
            let ptr = g.create_global_ptr(field, &[zero], 0);
            g.create_global_store(ptr, f);
        }
    }
    b.into_module()
}

#[test]
fn vertex_and_fragment_stage_structs() {
    let program = Program::new();

    let shaders = shaders(&program, render_kernel(None)).unwrap();

    assert_eq!(shaders.len(), 2);
    let ShaderParams::Vertex(vertex) = &shaders[0] else {
        panic!("expected a vertex shader");
    };
    let ShaderParams::Fragment(fragment) = &shaders[1] else {
        panic!("expected a fragment shader");
    };

    assert!(vertex.code.starts_with(
        "struct StageInput {\n  @location(0) in_0_f32 : f32,\n};\n\
         struct StageOutput {\n  @builtin(position) position : vec4<f32>,\n  @location(0) out_0_f32 : f32,\n};\n"
    ));
    assert!(vertex.code.contains(
        "@vertex\nfn main(@builtin(vertex_index) vertex_index : u32, @builtin(instance_index) instance_index : u32, stage_input : StageInput) -> StageOutput\n{\n  var stage_output : StageOutput;\n"
    ));
    assert!(vertex.code.ends_with("  return stage_output;\n}\n"));
    assert!(vertex.bindings.is_empty());

    assert!(fragment
        .code
        .contains("  @location(0) color_0 : vec4<f32>,\n"));
    assert!(fragment.code.contains(
        "@fragment\nfn main(@builtin(position) frag_coord : vec4<f32>, stage_input : StageInput) -> StageOutput"
    ));
}

#[test]
fn fragment_bindings_continue_after_vertex_bindings() {
    let mut program = Program::new();
    let x = program.create_field(Type::F32, vec![4], FieldOptions::default());
    let mut b = IrBuilder::new();
    for fragment in [false, true] {
        let stage = if fragment {
            b.create_fragment_for()
        } else {
            b.create_vertex_for()
        };
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(stage));
        let zero = g.create_const_i32(0);
        let ptr = g.create_global_ptr(&x, &[zero], 0);
        let v = g.create_global_load(ptr);
        if fragment {
            g.create_builtin_output(BuiltInOutputKind::Color(0), &[v, v, v, v]);
        } else {
            g.create_builtin_output(BuiltInOutputKind::Position, &[v, v, v, v]);
        }
    }

    let shaders = shaders(&program, b.into_module()).unwrap();

    assert_eq!(shaders[0].bindings(), &[root(0, 0)]);
    assert_eq!(shaders[1].bindings(), &[root(0, 1)]);
    assert!(shaders[0]
        .code()
        .contains("var<storage, read> root_buffer_binding_0 :"));
    assert!(shaders[1]
        .code()
        .contains("var<storage, read> root_buffer_binding_1 :"));
    assert!(shaders[0].code().contains("member : array<i32, 4>,"));
}

#[test]
fn vertex_shaders_cannot_write_fields() {
    let mut program = Program::new();
    let x = program.create_field(Type::F32, vec![4], FieldOptions::default());
    let mut b = IrBuilder::new();
    let vertex = b.create_vertex_for();
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(vertex));
        let zero = g.create_const_i32(0);
        let one = g.create_const_f32(1.0);
        let ptr = g.create_global_ptr(&x, &[zero], 0);
        g.create_global_store(ptr, one);
    }

    let err = shaders(&program, b.into_module()).unwrap_err();

    assert_eq!(err.kind, ErrorKind::PipelineState);
    assert!(err.message.contains("vertex shader"));
}

#[test]
fn fragment_writes_need_a_writable_tree() {
    let mut program = Program::new();
    let plain = program.create_field(Type::F32, vec![4], FieldOptions::default());
    let err = shaders(&program, render_kernel(Some(&plain))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PipelineState);

    let mut program = Program::new();
    let writable = program.create_field(
        Type::F32,
        vec![4],
        FieldOptions {
            fragment_shader_writable: true,
        },
    );
    let shaders = shaders(&program, render_kernel(Some(&writable))).unwrap();
    let fragment = shaders[1].code();
    assert!(fragment.contains("var<storage, read_write> root_buffer_binding_0 :"));
    assert_eq!(
        shaders[1].bindings(),
        &[ResourceBinding {
            info: ResourceInfo::with_id(ResourceType::Root, writable.tree.raw()),
            binding: 0
        }]
    );
}

#[test]
fn sampled_and_storage_textures() {
    let mut program = Program::new();
    let sampled = program.create_texture(
        TextureDimensionality::Dim2d,
        TextureKind::Color {
            format: "rgba8unorm".to_owned(),
        },
        1,
    );
    let mut b = IrBuilder::new();
    let vertex = b.create_vertex_for();
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(vertex));
        let one = g.create_const_f32(1.0);
        g.create_builtin_output(BuiltInOutputKind::Position, &[one, one, one, one]);
        g.create_vertex_output(one, 0);
    }
    let fragment = b.create_fragment_for();
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(fragment));
        let u = g.create_fragment_input(PrimitiveType::F32, 0);
        let texel = g.create_texture_function(&sampled, TextureFunctionKind::Sample, &[u, u], &[]);
        let r = g.create_composite_extract(texel, 0);
        g.create_builtin_output(BuiltInOutputKind::Color(0), &[r, r, r, r]);
    }

    let shaders = shaders(&program, b.into_module()).unwrap();

    let fragment = shaders[1].code();
    assert!(fragment.contains("@group(0) @binding(0)\nvar texture_binding_0 : texture_2d<f32>;"));
    assert!(fragment.contains("@group(0) @binding(1)\nvar sampler_binding_1 : sampler;"));
    assert!(fragment.contains(
        "textureSample(texture_binding_0, sampler_binding_1, vec2<f32>(_"
    ));
    assert!(fragment.contains(".x;"));
}

#[test]
fn compute_texture_store_uses_storage_binding() {
    let mut program = Program::new();
    let image = program.create_texture(
        TextureDimensionality::Dim2d,
        TextureKind::Color {
            format: "rgba8unorm".to_owned(),
        },
        1,
    );
    let mut b = IrBuilder::new();
    let n = b.create_const_i32(16);
    let lp = b.create_range_for(n, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let one = g.create_const_f32(1.0);
        g.create_texture_function(
            &image,
            TextureFunctionKind::Store,
            &[i, i],
            &[one, one, one, one],
        );
    }

    let shaders = shaders(&program, b.into_module()).unwrap();

    let task = task(&shaders[0]);
    assert!(task
        .code
        .contains("var storage_texture_binding_0 : texture_storage_2d<rgba8unorm, write>;"));
    assert!(task.code.contains("textureStore(storage_texture_binding_0, vec2<i32>(_"));
    assert_eq!(
        task.bindings[0].info,
        ResourceInfo::with_id(ResourceType::StorageTexture, image.id.raw())
    );
}

#[test]
fn graphics_binding_limits() {
    let mut program = Program::new();
    let big = program.create_field(Type::I32, vec![32_768], FieldOptions::default());
    let bindings = [root(big.tree.raw(), 0)];

    assert!(check_graphics_bindings(&program, &bindings, 1 << 20).is_ok());
    let err = check_graphics_bindings(&program, &bindings, 65_536).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PipelineState);

    let rand = [ResourceBinding {
        info: ResourceInfo::new(ResourceType::RandStates),
        binding: 0,
    }];
    assert_eq!(
        check_graphics_bindings(&program, &rand, 65_536)
            .unwrap_err()
            .kind,
        ErrorKind::PipelineState
    );
}
