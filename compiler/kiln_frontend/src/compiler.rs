//! The compiling visitor.
//!
//! Walks the syntax tree of one kernel and builds a single flat IR module,
//! written as if the kernel ran on one thread. Calls to user and library
//! functions are inlined; the loops they contain are strictly serial.
//!
//! State that belongs to the function being compiled lives in a [`Frame`].
//! Inlining swaps in a fresh frame and restores the caller's afterwards, so
//! the builder, the storage registry and the render state are shared by the
//! whole kernel.

mod call;
mod expr;
mod loops;
mod render;
mod stmt;

use std::rc::Rc;

use rustc_hash::FxHashMap;

use kiln_codegen::{RenderPassParams, RenderPipelineParams};
use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{BuilderHost, IrBuilder, Module, Program};
use kiln_stack::ensure_sufficient_stack;
use kiln_syntax::{NodeId, NodeKind, SymbolId};
use kiln_types::{PrimitiveType, Type};

use crate::builtin::{global_registry, load_value, Registry};
use crate::host::{HostValue, Scope};
use crate::library::Library;
use crate::oracle::ParsedFunction;
use crate::value::Value;

/// Nesting limit for inlined calls. Kernels cannot recurse.
const MAX_INLINE_DEPTH: usize = 64;

/// Host values nested deeper than this are kept as opaque references.
const MAX_IMPORT_DEPTH: usize = 1024;

type SymbolTable = FxHashMap<SymbolId, Value>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LoopKind {
    For,
    /// A `static(range(..))` or `static(ndrange(..))` loop being unrolled.
    Unrolled,
    While,
    VertexFor,
    FragmentFor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FrameKind {
    Kernel,
    Inlined,
}

/// Where the kernel is in the vertex-for / fragment-for sequence.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Idle,
    InVertex,
    /// A vertex-for has ended; only its fragment-for may follow.
    VertexDone,
    InFragment,
}

#[derive(Debug, Default)]
struct RenderState {
    stage: Stage,
    current: Option<RenderPipelineParams>,
    pipelines: Vec<RenderPipelineParams>,
    pass: Option<RenderPassParams>,
}

/// Template arguments of the kernel. Only expressions rooted at a kernel
/// parameter are evaluated against them.
#[derive(Debug)]
struct TemplateArgs {
    scope: Scope,
    params: Vec<SymbolId>,
}

struct Frame {
    function: ParsedFunction,
    kind: FrameKind,
    symbols: SymbolTable,
    loops: Vec<LoopKind>,
    branch_depth: usize,
    return_value: Option<Value>,
    templates: Option<Rc<TemplateArgs>>,
}

impl Frame {
    fn new(function: ParsedFunction, kind: FrameKind) -> Self {
        Frame {
            function,
            kind,
            symbols: SymbolTable::default(),
            loops: Vec::new(),
            branch_depth: 0,
            return_value: None,
            templates: None,
        }
    }
}

/// IR of a kernel before the passes run.
#[derive(Debug)]
pub(crate) struct KernelIr {
    pub module: Module,
    pub arg_types: Vec<Type>,
    pub return_type: Type,
    /// Pipelines in kernel order, shaders not yet generated.
    pub pipelines: Vec<RenderPipelineParams>,
    pub render_pass: Option<RenderPassParams>,
}

pub(crate) struct Compiler<'a> {
    builder: IrBuilder,
    program: &'a mut Program,
    scope: &'a Scope,
    library: &'a Library,
    registry: &'static Registry,
    render: RenderState,
    frame: Frame,
    inline_depth: usize,
}

impl BuilderHost for Compiler<'_> {
    fn builder(&mut self) -> &mut IrBuilder {
        &mut self.builder
    }
}

impl<'a> Compiler<'a> {
    /// Build the IR of `function` as a kernel.
    ///
    /// Parameters named in `template_args` are bound at compile time;
    /// every other parameter becomes a kernel argument of its annotated
    /// type (`f32` when unannotated).
    pub(crate) fn compile_kernel(
        program: &'a mut Program,
        scope: &'a Scope,
        library: &'a Library,
        function: &ParsedFunction,
        annotations: &FxHashMap<String, Type>,
        template_args: Option<&[(String, HostValue)]>,
    ) -> CompileResult<KernelIr> {
        let mut compiler = Compiler {
            builder: IrBuilder::new(),
            program,
            scope,
            library,
            registry: global_registry(),
            render: RenderState::default(),
            frame: Frame::new(function.clone(), FrameKind::Kernel),
            inline_depth: 0,
        };
        let arg_types = compiler.register_kernel_args(annotations, template_args)?;
        compiler.visit_function_body()?;

        if compiler.render.stage != Stage::Idle {
            return Err(CompileError::pipeline(
                "a vertex-for must be followed by a fragment-for",
            )
            .at_node(&function.tree, function.root));
        }

        let return_type = compiler
            .frame
            .return_value
            .as_ref()
            .map_or(Type::Void, |value| value.ty.clone());
        Ok(KernelIr {
            module: compiler.builder.into_module(),
            arg_types,
            return_type,
            pipelines: compiler.render.pipelines,
            render_pass: compiler.render.pass,
        })
    }

    fn register_kernel_args(
        &mut self,
        annotations: &FxHashMap<String, Type>,
        template_args: Option<&[(String, HostValue)]>,
    ) -> CompileResult<Vec<Type>> {
        let function = self.frame.function.clone();
        let names = function.param_names();

        let mut annotated: Vec<&String> = annotations.keys().collect();
        annotated.sort();
        if let Some(unknown) = annotated.iter().find(|name| !names.contains(&name.as_str())) {
            return Err(CompileError::scope(format!(
                "argument type annotation for `{unknown}`, which is not a parameter of the kernel"
            ))
            .at_node(&function.tree, function.root));
        }

        let mut templates = Scope::new();
        for (name, value) in template_args.unwrap_or_default() {
            templates.add(name.clone(), value.clone());
        }

        let mut arg_types = Vec::new();
        let mut params = Vec::with_capacity(function.params.len());
        let mut arg_id = 0;
        for &param in &function.params {
            let symbol = self.param_symbol(&function, param)?;
            params.push(symbol);
            let name = function.tree.identifier(param).unwrap_or_default();
            if templates.get(name).is_some() {
                continue;
            }
            let ty = annotations.get(name).cloned().unwrap_or(Type::F32);
            if !ty.has_storage() {
                return Err(CompileError::type_error(format!(
                    "kernel argument `{name}` cannot have type {ty}"
                ))
                .at_node(&function.tree, param));
            }
            let stmts = ty
                .primitives()
                .into_iter()
                .map(|prim| {
                    let stmt = self.builder.create_arg_load(prim, arg_id);
                    arg_id += 1;
                    stmt
                })
                .collect();
            self.frame.symbols.insert(symbol, Value::new(ty.clone(), stmts));
            arg_types.push(ty);
        }

        self.frame.templates = Some(Rc::new(TemplateArgs {
            scope: templates,
            params,
        }));
        tracing::debug!(args = arg_types.len(), "registered kernel arguments");
        Ok(arg_types)
    }

    fn param_symbol(&self, function: &ParsedFunction, param: NodeId) -> CompileResult<SymbolId> {
        function.oracle.symbol(param).ok_or_else(|| {
            CompileError::internal("function parameter has no symbol").at_node(&function.tree, param)
        })
    }

    /// Visit the body of the current frame's function. A concise arrow body
    /// is compiled as `return <expr>`.
    fn visit_function_body(&mut self) -> CompileResult<()> {
        let body = self.frame.function.body;
        if self.frame.function.has_expression_body() {
            self.visit_return(Some(body))
        } else {
            self.visit_stmt(body)
        }
    }

    // ── Dispatch ────────────────────────────────────────────────────

    fn visit_stmt(&mut self, node: NodeId) -> CompileResult<()> {
        ensure_sufficient_stack(|| self.visit_stmt_inner(node))
            .map_err(|err| err.at_node(&self.frame.function.tree, node))
    }

    fn visit_stmt_inner(&mut self, node: NodeId) -> CompileResult<()> {
        if self.frame.return_value.is_some() {
            return Err(CompileError::unsupported(
                "a `return` must be the last statement of its function",
            ));
        }
        if self.render.stage == Stage::VertexDone && !self.is_fragment_for(node) {
            return Err(CompileError::pipeline(
                "no statements are allowed between a vertex-for and its fragment-for",
            ));
        }
        self.dispatch_stmt(node)
    }

    fn visit_expr(&mut self, node: NodeId) -> CompileResult<Value> {
        ensure_sufficient_stack(|| self.dispatch_expr(node))
            .map_err(|err| err.at_node(&self.frame.function.tree, node))
    }

    /// Visit `node` and dereference the result.
    fn visit_rvalue(&mut self, node: NodeId) -> CompileResult<Value> {
        let value = self.visit_expr(node)?;
        Ok(self.load(&value))
    }

    fn kind(&self, node: NodeId) -> NodeKind {
        self.frame.function.tree.kind(node).clone()
    }

    fn text(&self, node: NodeId) -> String {
        self.frame.function.tree.expr_text(node)
    }

    // ── Values ──────────────────────────────────────────────────────

    fn load(&mut self, value: &Value) -> Value {
        load_value(&mut self.builder, value)
    }

    /// Copy a value into fresh allocas and return the pointer to them.
    fn local_copy(&mut self, value: &Value) -> Value {
        let ptrs = value
            .ty
            .primitives()
            .into_iter()
            .zip(&value.stmts)
            .map(|(prim, &stmt)| {
                let alloca = self.builder.create_alloca(prim);
                self.builder.create_local_store(alloca, stmt);
                alloca
            })
            .collect();
        Value::new(Type::pointer(value.ty.clone(), false), ptrs)
    }

    /// Look up and call a non-atomic builtin.
    fn call_operation(&mut self, name: &str, args: &[Value]) -> CompileResult<Value> {
        let op = self
            .registry
            .operation(name)
            .ok_or_else(|| CompileError::unsupported(format!("operator `{name}` is not supported")))?;
        Ok(op.call(&mut self.builder, args)?)
    }

    fn constant_i32(&mut self, value: i32) -> Value {
        let stmt = self.builder.create_const_i32(value);
        Value::constant_scalar(stmt, f64::from(value), PrimitiveType::I32)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "f32 constants are narrowed from the literal's f64 value"
    )]
    fn constant_f32(&mut self, value: f64) -> Value {
        let narrowed = value as f32;
        let stmt = self.builder.create_const_f32(narrowed);
        Value::constant_scalar(stmt, f64::from(narrowed), PrimitiveType::F32)
    }

    fn is_top_level(&self) -> bool {
        self.frame.loops.is_empty() && self.frame.branch_depth == 0
    }

    fn in_graphics_stage(&self) -> bool {
        matches!(self.render.stage, Stage::InVertex | Stage::InFragment)
    }

    // ── Names ───────────────────────────────────────────────────────

    /// Symbol of the identifier an access path starts from. `None` for free
    /// paths, including those rooted at `this`.
    fn base_symbol(&self, mut node: NodeId) -> Option<SymbolId> {
        let tree = &self.frame.function.tree;
        loop {
            match tree.kind(node) {
                NodeKind::Identifier(_) => return self.frame.function.oracle.symbol(node),
                NodeKind::PropertyAccess { object, .. } | NodeKind::ElementAccess { object, .. } => {
                    node = *object;
                }
                NodeKind::Call { callee, .. } => node = *callee,
                _ => return None,
            }
        }
    }

    /// Evaluate an identifier or access path on the host: free paths in the
    /// kernel scope, paths rooted at a kernel parameter in the template
    /// arguments.
    fn evaluate_on_host(&self, node: NodeId) -> Option<HostValue> {
        let text = self.text(node);
        let oracle = &self.frame.function.oracle;
        match self.base_symbol(node) {
            Some(symbol) => {
                let templates = self.frame.templates.as_ref()?;
                if !templates.params.contains(&symbol) {
                    return None;
                }
                oracle.evaluate(&text, &templates.scope)
            }
            None => oracle.evaluate(&text, self.scope),
        }
    }

    fn visit_identifier(&mut self, node: NodeId, name: &str) -> CompileResult<Value> {
        if let Some(symbol) = self.frame.function.oracle.symbol(node) {
            if let Some(value) = self.frame.symbols.get(&symbol) {
                return Ok(value.clone());
            }
        }
        if let Some(host) = self.evaluate_on_host(node) {
            return Ok(self.import_host(&host));
        }
        match name {
            "undefined" => Ok(Value::host_object(HostValue::Undefined)),
            "null" => Ok(Value::host_object(HostValue::Null)),
            _ => Err(CompileError::scope(format!("unresolved identifier `{name}`"))),
        }
    }

    fn bind(&mut self, ident: NodeId, value: Value) -> CompileResult<()> {
        let function = &self.frame.function;
        let symbol = function.oracle.symbol(ident).ok_or_else(|| {
            CompileError::internal("declared name has no symbol").at_node(&function.tree, ident)
        })?;
        self.frame.symbols.insert(symbol, value);
        Ok(())
    }

    // ── Host values ─────────────────────────────────────────────────

    /// Bring a host value into the kernel: numbers, booleans and plain
    /// numeric data become constants, functions become inlinable values,
    /// everything else stays an opaque host reference.
    fn import_host(&mut self, host: &HostValue) -> Value {
        self.try_import(host, 0)
            .unwrap_or_else(|| Value::host_object(host.clone()))
    }

    fn try_import(&mut self, host: &HostValue, depth: usize) -> Option<Value> {
        if depth > MAX_IMPORT_DEPTH {
            return None;
        }
        match host {
            HostValue::Number(n) => Some(self.import_number(*n)),
            HostValue::Bool(b) => Some(self.constant_i32(i32::from(*b))),
            HostValue::Function(function) if depth == 0 => Some(Value::function(function.clone())),
            HostValue::Array(elements) if is_numeric_array(elements) => {
                self.import_array(elements, depth)
            }
            HostValue::Object(members) => {
                let mut values = Vec::with_capacity(members.len());
                for (name, member) in members {
                    values.push((name.clone(), self.try_import(member, depth + 1)?));
                }
                Value::make_struct(values).ok()
            }
            _ => None,
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "integral values inside the i32 range convert exactly"
    )]
    fn import_number(&mut self, n: f64) -> Value {
        if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
            self.constant_i32(n as i32)
        } else {
            self.constant_f32(n)
        }
    }

    fn import_array(&mut self, elements: &[HostValue], depth: usize) -> Option<Value> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.try_import(element, depth + 1)?);
        }
        let (first, rest) = values.split_first()?;
        if rest.is_empty() {
            return match first.ty {
                Type::Scalar(_) => Value::vector_from_scalars(&values).ok(),
                Type::Vector { .. } => Value::matrix_from_rows(&values).ok(),
                _ => None,
            };
        }
        let comma = self.registry.get(",")?;
        let mut result = first.clone();
        for value in rest {
            result = comma.call(&mut self.builder, &[result, value.clone()]).ok()?;
        }
        Some(result)
    }
}

/// `ti.name$3` and `name$3` name the same function as `name`.
fn bare_name(text: &str) -> &str {
    let name = text
        .strip_prefix("ti.")
        .or_else(|| text.strip_prefix("taichi."))
        .unwrap_or(text);
    match name.rsplit_once('$') {
        Some((base, suffix))
            if !base.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => name,
    }
}

/// A non-negative integral constant as an index.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "the value is checked to be a non-negative integer in u32 range"
)]
fn index_from_constant(value: f64) -> Option<usize> {
    (value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX)).then(|| value as usize)
}

/// Arrays of numbers (vectors) or of equally shaped number arrays
/// (matrices).
fn is_numeric_array(elements: &[HostValue]) -> bool {
    let number = |v: &HostValue| matches!(v, HostValue::Number(_) | HostValue::Bool(_));
    !elements.is_empty()
        && (elements.iter().all(number)
            || elements.iter().all(|row| match row {
                HostValue::Array(row) => !row.is_empty() && row.iter().all(number),
                _ => false,
            }))
}

#[cfg(test)]
mod tests;
