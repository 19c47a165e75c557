//! Factories shared by the kernel tests.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use kiln_codegen::KernelParams;
use kiln_diagnostic::CompileResult;
use kiln_eval::Device;
use kiln_frontend::{KernelCompiler, LoweredKernel, ParsedFunction, Scope};
use kiln_ir::{Field, FieldOptions, Module, Program, StmtKind};
use kiln_syntax::{BinaryOperator, NodeId, TreeBuilder};
use kiln_types::Type;
use kilnc::{compile_kernel, CompilerOptions, KernelRequest};

pub fn kernel(b: TreeBuilder, root: NodeId) -> ParsedFunction {
    ParsedFunction::new(Rc::new(b.finish()), root).unwrap()
}

pub fn int_field(program: &mut Program, len: u32) -> Field {
    program.create_field(Type::I32, vec![len], FieldOptions::default())
}

/// `for (let i of ti.range(n)) { <field>[i] = i * 2 }`
pub fn doubling_loop(b: &mut TreeBuilder, field: &str, n: i64) -> NodeId {
    let target = b.ident(field);
    let i = b.ident("i");
    let element = b.index(target, i);
    let i = b.ident("i");
    let two = b.int(2);
    let doubled = b.binary(BinaryOperator::Mul, i, two);
    let assign = b.assign(element, doubled);
    let stmt = b.expr_stmt(assign);
    let body = b.block(vec![stmt]);
    let extent = b.int(n);
    let range = b.call_path("ti.range", vec![extent]);
    b.for_of(&["i"], range, body)
}

/// `() => { <stmts> }`
pub fn block_kernel(mut b: TreeBuilder, stmts: Vec<NodeId>) -> ParsedFunction {
    let body = b.block(stmts);
    let root = b.function(&[], body);
    kernel(b, root)
}

pub fn lower(
    program: &mut Program,
    scope: &Scope,
    function: &ParsedFunction,
    annotations: &FxHashMap<String, Type>,
) -> CompileResult<LoweredKernel> {
    KernelCompiler::new(program).lower(function, scope, annotations, None)
}

pub fn compile(
    program: &mut Program,
    scope: &Scope,
    function: &ParsedFunction,
) -> CompileResult<KernelParams> {
    let annotations = FxHashMap::default();
    let request = KernelRequest {
        function,
        scope,
        annotations: &annotations,
        template_args: None,
    };
    compile_kernel(
        program,
        &kiln_frontend::Library::new(),
        request,
        &CompilerOptions::default(),
    )
}

/// Run a lowered kernel on `device`.
pub fn run(lowered: &LoweredKernel, device: &mut Device) {
    kiln_eval::execute(&lowered.module, &lowered.offloaded, device).unwrap();
}

pub fn count(module: &Module, pred: impl Fn(&StmtKind) -> bool) -> usize {
    module
        .reachable()
        .into_iter()
        .filter(|&id| pred(module.kind(id)))
        .count()
}
