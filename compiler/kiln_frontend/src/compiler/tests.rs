#![allow(clippy::unwrap_used)]

use std::rc::Rc;

use rustc_hash::FxHashMap;

use kiln_diagnostic::{CompileResult, ErrorKind};
use kiln_ir::{
    FieldOptions, Module, Program, StmtKind, TextureDimensionality, TextureKind,
};
use kiln_syntax::{BinaryOperator, NodeId, TreeBuilder};
use kiln_types::{PrimitiveType, Type};

use super::{Compiler, KernelIr};
use crate::host::{HostValue, Scope};
use crate::library::Library;
use crate::oracle::ParsedFunction;

fn kernel(b: TreeBuilder, root: NodeId) -> ParsedFunction {
    ParsedFunction::new(Rc::new(b.finish()), root).unwrap()
}

fn compile_in(
    program: &mut Program,
    scope: &Scope,
    function: &ParsedFunction,
    annotations: &FxHashMap<String, Type>,
    templates: Option<&[(String, HostValue)]>,
) -> CompileResult<KernelIr> {
    Compiler::compile_kernel(
        program,
        scope,
        &Library::new(),
        function,
        annotations,
        templates,
    )
}

fn compile(function: &ParsedFunction) -> CompileResult<KernelIr> {
    compile_in(
        &mut Program::new(),
        &Scope::new(),
        function,
        &FxHashMap::default(),
        None,
    )
}

fn count(module: &Module, pred: impl Fn(&StmtKind) -> bool) -> usize {
    module
        .reachable()
        .into_iter()
        .filter(|&id| pred(module.kind(id)))
        .count()
}

/// `() => { <stmts> }`
fn block_kernel(b: &mut TreeBuilder, stmts: Vec<NodeId>) -> NodeId {
    let body = b.block(stmts);
    b.function(&[], body)
}

// ── Expressions and declarations ────────────────────────────────────

#[test]
fn constant_arithmetic_is_folded() {
    let mut b = TreeBuilder::new();
    let one = b.int(1);
    let two = b.int(2);
    let sum = b.binary(BinaryOperator::Add, one, two);
    let decl = b.let_("x", sum);
    let root = block_kernel(&mut b, vec![decl]);

    let ir = compile(&kernel(b, root)).unwrap();
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::Binary(_))), 0);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::Alloca)), 1);
    assert_eq!(ir.return_type, Type::Void);
}

#[test]
fn float_into_int_variable_is_a_type_error() {
    let mut b = TreeBuilder::new();
    let one = b.int(1);
    let decl = b.let_("x", one);
    let x = b.ident("x");
    let half = b.float(1.5);
    let assign = b.assign(x, half);
    let stmt = b.expr_stmt(assign);
    let root = block_kernel(&mut b, vec![decl, stmt]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.node.is_some());
}

#[test]
fn int_into_float_variable_converts() {
    let mut b = TreeBuilder::new();
    let init = b.float(0.5);
    let decl = b.let_("x", init);
    let x = b.ident("x");
    let three = b.int(3);
    let assign = b.assign(x, three);
    let stmt = b.expr_stmt(assign);
    let root = block_kernel(&mut b, vec![decl, stmt]);

    let ir = compile(&kernel(b, root)).unwrap();
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::LocalStore)), 2);
}

#[test]
fn unknown_names_are_scope_errors() {
    let mut b = TreeBuilder::new();
    let missing = b.ident("missing");
    let stmt = b.expr_stmt(missing);
    let root = block_kernel(&mut b, vec![stmt]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Scope);
    assert_eq!(err.node, Some(missing));
}

#[test]
fn reserved_names_cannot_be_declared() {
    let mut b = TreeBuilder::new();
    let one = b.int(1);
    let decl = b.let_("ti", one);
    let root = block_kernel(&mut b, vec![decl]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedConstruct);
}

#[test]
fn declarations_need_an_initializer() {
    let mut b = TreeBuilder::new();
    let decl = b.let_uninit("x");
    let root = block_kernel(&mut b, vec![decl]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedConstruct);
}

#[test]
fn swizzles_pick_vector_components() {
    let mut b = TreeBuilder::new();
    let elems = vec![b.float(1.0), b.float(2.0), b.float(3.0)];
    let vector = b.array(elems);
    let decl = b.let_("v", vector);
    let v = b.ident("v");
    let zy = b.prop(v, "zy");
    let ret = b.return_(Some(zy));
    let root = block_kernel(&mut b, vec![decl, ret]);

    let ir = compile(&kernel(b, root)).unwrap();
    assert_eq!(ir.return_type, Type::vector(PrimitiveType::F32, 2));
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::Return)), 1);
}

// ── Kernel arguments ────────────────────────────────────────────────

#[test]
fn annotated_arguments_load_in_order() {
    let mut b = TreeBuilder::new();
    let a = b.ident("a");
    let one = b.int(1);
    let body = b.binary(BinaryOperator::Add, a, one);
    let root = b.function(&["a", "scale"], body);
    let function = kernel(b, root);

    let mut annotations = FxHashMap::default();
    annotations.insert("a".to_owned(), Type::I32);
    let ir = compile_in(
        &mut Program::new(),
        &Scope::new(),
        &function,
        &annotations,
        None,
    )
    .unwrap();
    assert_eq!(ir.arg_types, vec![Type::I32, Type::F32]);
    assert_eq!(ir.return_type, Type::I32);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::ArgLoad { .. })), 2);
}

#[test]
fn annotations_must_name_parameters() {
    let mut b = TreeBuilder::new();
    let body = b.block(vec![]);
    let root = b.function(&["a"], body);
    let function = kernel(b, root);

    let mut annotations = FxHashMap::default();
    annotations.insert("b".to_owned(), Type::I32);
    let err = compile_in(
        &mut Program::new(),
        &Scope::new(),
        &function,
        &annotations,
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Scope);
}

#[test]
fn template_arguments_are_compile_time_constants() {
    let mut b = TreeBuilder::new();
    let x = b.ident("x");
    let k = b.ident("k");
    let body = b.binary(BinaryOperator::Mul, x, k);
    let root = b.function(&["k", "x"], body);
    let function = kernel(b, root);

    let templates = vec![("k".to_owned(), HostValue::Number(2.0))];
    let ir = compile_in(
        &mut Program::new(),
        &Scope::new(),
        &function,
        &FxHashMap::default(),
        Some(&templates),
    )
    .unwrap();
    assert_eq!(ir.arg_types, vec![Type::F32]);
    assert_eq!(ir.return_type, Type::F32);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::ArgLoad { .. })), 1);
}

// ── Control flow ────────────────────────────────────────────────────

#[test]
fn statements_after_return_are_rejected() {
    let mut b = TreeBuilder::new();
    let ret = b.return_(None);
    let one = b.int(1);
    let decl = b.let_("x", one);
    let root = block_kernel(&mut b, vec![ret, decl]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedConstruct);
}

#[test]
fn break_needs_an_enclosing_while() {
    let mut b = TreeBuilder::new();
    let four = b.int(4);
    let range = b.call_path("ti.range", vec![four]);
    let brk = b.break_();
    let body = b.block(vec![brk]);
    let for_of = b.for_of(&["i"], range, body);
    let root = block_kernel(&mut b, vec![for_of]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedConstruct);
}

#[test]
fn while_loops_test_their_condition_first() {
    let mut b = TreeBuilder::new();
    let zero = b.int(0);
    let decl = b.let_("i", zero);
    let i = b.ident("i");
    let ten = b.int(10);
    let cond = b.binary(BinaryOperator::Lt, i, ten);
    let i2 = b.ident("i");
    let i3 = b.ident("i");
    let one = b.int(1);
    let next = b.binary(BinaryOperator::Add, i3, one);
    let step = b.assign(i2, next);
    let step = b.expr_stmt(step);
    let body = b.block(vec![step]);
    let while_ = b.while_(cond, body);
    let root = block_kernel(&mut b, vec![decl, while_]);

    let ir = compile(&kernel(b, root)).unwrap();
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::While { .. })), 1);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::Break)), 1);
}

#[test]
fn top_level_range_loops_may_run_in_parallel() {
    let mut b = TreeBuilder::new();
    let n = b.int(16);
    let range = b.call_path("ti.range", vec![n]);
    let body = b.block(vec![]);
    let for_of = b.for_of(&["i"], range, body);
    let root = block_kernel(&mut b, vec![for_of]);

    let ir = compile(&kernel(b, root)).unwrap();
    let serial = count(&ir.module, |k| {
        matches!(k, StmtKind::RangeFor { strictly_serialize: true, .. })
    });
    let loops = count(&ir.module, |k| matches!(k, StmtKind::RangeFor { .. }));
    assert_eq!((loops, serial), (1, 0));
}

#[test]
fn loops_in_inlined_functions_are_serial() {
    let mut b = TreeBuilder::new();
    let n = b.ident("n");
    let range = b.call_path("range", vec![n]);
    let loop_body = b.block(vec![]);
    let for_of = b.for_of(&["i"], range, loop_body);
    let helper_body = b.block(vec![for_of]);
    let helper = b.function_decl("helper", &["n"], helper_body);
    let callee = b.ident("helper");
    let four = b.int(4);
    let call = b.call(callee, vec![four]);
    let call = b.expr_stmt(call);
    let root = block_kernel(&mut b, vec![helper, call]);

    let ir = compile(&kernel(b, root)).unwrap();
    assert_eq!(
        count(&ir.module, |k| matches!(
            k,
            StmtKind::RangeFor { strictly_serialize: true, .. }
        )),
        1
    );
}

#[test]
fn recursion_hits_the_inlining_limit() {
    let mut b = TreeBuilder::new();
    let callee = b.ident("again");
    let call = b.call(callee, vec![]);
    let call = b.expr_stmt(call);
    let body = b.block(vec![call]);
    let decl = b.function_decl("again", &[], body);
    let outer = b.ident("again");
    let first = b.call(outer, vec![]);
    let first = b.expr_stmt(first);
    let root = block_kernel(&mut b, vec![decl, first]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedConstruct);
}

#[test]
fn static_range_unrolls_with_constant_indices() {
    let mut b = TreeBuilder::new();
    let three = b.int(3);
    let range = b.call_path("range", vec![three]);
    let iterable = b.call_path("ti.static", vec![range]);
    let i = b.ident("i");
    let decl = b.let_("x", i);
    let body = b.block(vec![decl]);
    let for_of = b.for_of(&["i"], iterable, body);
    let root = block_kernel(&mut b, vec![for_of]);

    let ir = compile(&kernel(b, root)).unwrap();
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::RangeFor { .. })), 0);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::Alloca)), 3);
}

#[test]
fn for_of_needs_a_known_iterable() {
    let mut b = TreeBuilder::new();
    let four = b.int(4);
    let iterable = b.call_path("items", vec![four]);
    let body = b.block(vec![]);
    let for_of = b.for_of(&["i"], iterable, body);
    let root = block_kernel(&mut b, vec![for_of]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedConstruct);
}

// ── Fields ──────────────────────────────────────────────────────────

#[test]
fn field_elements_are_global_pointers() {
    let mut program = Program::new();
    let field = program.create_field(Type::F32, vec![8], FieldOptions::default());
    let scope = Scope::new().with("data", HostValue::Field(field));

    let mut b = TreeBuilder::new();
    let data = b.ident("data");
    let one = b.int(1);
    let element = b.index(data, one);
    let value = b.float(2.0);
    let assign = b.assign(element, value);
    let stmt = b.expr_stmt(assign);
    let root = block_kernel(&mut b, vec![stmt]);
    let function = kernel(b, root);

    let ir = compile_in(&mut program, &scope, &function, &FxHashMap::default(), None).unwrap();
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::GlobalPtr { .. })), 1);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::GlobalStore)), 1);
}

// ── Render pipelines ────────────────────────────────────────────────

/// A vertex-for over `vertices` writing to `target`, optionally followed
/// by a statement and a fragment-for.
fn render_kernel(between: bool, fragment: bool) -> (Program, Scope, ParsedFunction) {
    let mut program = Program::new();
    let vertices = program.create_field(
        Type::vector(PrimitiveType::F32, 2),
        vec![3],
        FieldOptions::default(),
    );
    let target = program.create_texture(
        TextureDimensionality::Dim2d,
        TextureKind::Canvas {
            format: "bgra8unorm".to_owned(),
        },
        1,
    );
    program.materialize_current_tree();
    let scope = Scope::new()
        .with("vertices", HostValue::Field(vertices))
        .with("target", HostValue::Texture(target));

    let mut b = TreeBuilder::new();
    let v = b.ident("v");
    let output = b.call_path("ti.outputVertex", vec![v]);
    let output = b.expr_stmt(output);
    let x = b.path("v.x");
    let y = b.path("v.y");
    let z = b.float(0.0);
    let w = b.float(1.0);
    let position = b.array(vec![x, y, z, w]);
    let position = b.call_path("ti.outputPosition", vec![position]);
    let position = b.expr_stmt(position);
    let vertex_body = b.block(vec![output, position]);
    let vertices = b.ident("vertices");
    let input = b.call_path("ti.inputVertices", vec![vertices]);
    let vertex_for = b.for_of(&["v"], input, vertex_body);

    let mut stmts = vec![vertex_for];
    if between {
        let one = b.int(1);
        stmts.push(b.let_("x", one));
    }
    if fragment {
        let target = b.ident("target");
        let components = vec![b.float(1.0), b.float(0.0), b.float(0.0), b.float(1.0)];
        let color = b.array(components);
        let output = b.call_path("ti.outputColor", vec![target, color]);
        let output = b.expr_stmt(output);
        let fragment_body = b.block(vec![output]);
        let input = b.call_path("ti.inputFragments", vec![]);
        stmts.push(b.for_of(&["f"], input, fragment_body));
    }
    let root = block_kernel(&mut b, stmts);
    (program, scope, kernel(b, root))
}

#[test]
fn vertex_and_fragment_loops_form_a_pipeline() {
    let (mut program, scope, function) = render_kernel(false, true);
    let ir = compile_in(&mut program, &scope, &function, &FxHashMap::default(), None).unwrap();

    assert_eq!(ir.pipelines.len(), 1);
    assert_eq!(
        ir.pipelines[0].interpolated_type,
        Type::vector(PrimitiveType::F32, 2)
    );
    let pass = ir.render_pass.unwrap();
    assert_eq!(pass.color_attachments.len(), 1);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::VertexFor { .. })), 1);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::FragmentFor { .. })), 1);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::VertexInput { .. })), 2);
    assert_eq!(count(&ir.module, |k| matches!(k, StmtKind::FragmentInput { .. })), 2);
}

#[test]
fn nothing_may_sit_between_vertex_and_fragment_loops() {
    let (mut program, scope, function) = render_kernel(true, true);
    let err = compile_in(&mut program, &scope, &function, &FxHashMap::default(), None)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PipelineState);
}

#[test]
fn vertex_loops_need_a_fragment_loop() {
    let (mut program, scope, function) = render_kernel(false, false);
    let err = compile_in(&mut program, &scope, &function, &FxHashMap::default(), None)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PipelineState);
}

#[test]
fn fragment_loops_need_a_vertex_loop() {
    let mut b = TreeBuilder::new();
    let input = b.call_path("ti.inputFragments", vec![]);
    let body = b.block(vec![]);
    let for_of = b.for_of(&["f"], input, body);
    let root = block_kernel(&mut b, vec![for_of]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PipelineState);
}

#[test]
fn vertex_outputs_outside_a_vertex_loop_are_rejected() {
    let mut b = TreeBuilder::new();
    let one = b.float(1.0);
    let output = b.call_path("ti.outputVertex", vec![one]);
    let stmt = b.expr_stmt(output);
    let root = block_kernel(&mut b, vec![stmt]);

    let err = compile(&kernel(b, root)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PipelineState);
}
