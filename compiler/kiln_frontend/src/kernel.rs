//! Kernel compilation from syntax tree to [`KernelParams`].
//!
//! [`KernelCompiler::lower`] builds the IR and runs the pass pipeline;
//! [`KernelCompiler::compile`] also generates one shader per offloaded
//! sub-module and pairs vertex and fragment shaders into the render
//! pipelines the kernel declared.

use rustc_hash::FxHashMap;

use kiln_codegen::{
    check_graphics_bindings, generate, CodegenInput, CodegenOptions, KernelParams,
    RenderPassParams, RenderPipelineParams, ShaderParams, TaskKind, VertexShaderParams,
};
use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{Module, Program};
use kiln_passes::{run_pipeline, OffloadedModule, PassOptions};
use kiln_types::Type;

use crate::compiler::Compiler;
use crate::host::{HostValue, Scope};
use crate::library::Library;
use crate::oracle::ParsedFunction;

/// Options for every stage after the frontend.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelOptions {
    pub passes: PassOptions,
    pub codegen: CodegenOptions,
}

/// A kernel after the pass pipeline, before code generation.
#[derive(Debug)]
pub struct LoweredKernel {
    /// The arena the offloaded blocks refer to.
    pub module: Module,
    pub offloaded: Vec<OffloadedModule>,
    pub arg_types: Vec<Type>,
    pub return_type: Type,
    /// One per vertex-for / fragment-for pair, shaders not generated yet.
    pub pipelines: Vec<RenderPipelineParams>,
    pub render_pass: Option<RenderPassParams>,
}

/// Compiles kernels against one [`Program`].
pub struct KernelCompiler<'p> {
    program: &'p mut Program,
    library: Library,
    options: KernelOptions,
}

impl<'p> KernelCompiler<'p> {
    pub fn new(program: &'p mut Program) -> Self {
        KernelCompiler {
            program,
            library: Library::new(),
            options: KernelOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: KernelOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_library(mut self, library: Library) -> Self {
        self.library = library;
        self
    }

    pub fn options(&self) -> &KernelOptions {
        &self.options
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    /// Build the IR of `function` and run the pass pipeline over it.
    pub fn lower(
        &mut self,
        function: &ParsedFunction,
        scope: &Scope,
        annotations: &FxHashMap<String, Type>,
        template_args: Option<&[(String, HostValue)]>,
    ) -> CompileResult<LoweredKernel> {
        let _span = tracing::debug_span!(
            "kernel",
            name = function.name.as_deref().unwrap_or("<anonymous>")
        )
        .entered();

        // Fields declared before this kernel get their final layout now.
        self.program.materialize_current_tree();
        let ir = Compiler::compile_kernel(
            self.program,
            scope,
            &self.library,
            function,
            annotations,
            template_args,
        )?;
        let mut module = ir.module;
        let offloaded = run_pipeline(&mut module, &self.options.passes)?;
        tracing::debug!(
            offloaded = offloaded.len(),
            pipelines = ir.pipelines.len(),
            "lowered kernel"
        );
        Ok(LoweredKernel {
            module,
            offloaded,
            arg_types: ir.arg_types,
            return_type: ir.return_type,
            pipelines: ir.pipelines,
            render_pass: ir.render_pass,
        })
    }

    /// Compile `function` into a launchable kernel.
    pub fn compile(
        &mut self,
        function: &ParsedFunction,
        scope: &Scope,
        annotations: &FxHashMap<String, Type>,
        template_args: Option<&[(String, HostValue)]>,
    ) -> CompileResult<KernelParams> {
        let lowered = self.lower(function, scope, annotations, template_args)?;
        self.generate(lowered)
    }

    /// Generate the shaders of an already lowered kernel.
    pub fn generate(&self, lowered: LoweredKernel) -> CompileResult<KernelParams> {
        let options = &self.options.codegen;
        let program = self.program();
        let input = CodegenInput {
            program,
            module: &lowered.module,
            arg_bytes: primitive_bytes(&lowered.arg_types)?,
            ret_bytes: primitive_bytes(std::slice::from_ref(&lowered.return_type))?,
            options,
        };

        let mut tasks = Vec::with_capacity(lowered.offloaded.len());
        let mut pipelines = lowered.pipelines.into_iter();
        let mut vertex: Option<VertexShaderParams> = None;
        for offloaded in &lowered.offloaded {
            let previous = vertex.as_ref().map_or(&[][..], |v| v.bindings.as_slice());
            match generate(&input, offloaded, previous)? {
                ShaderParams::Task(task) => tasks.push(TaskKind::Compute(task)),
                ShaderParams::Vertex(shader) => {
                    if vertex.is_some() {
                        return Err(CompileError::internal(
                            "two vertex shaders without a fragment shader in between",
                        ));
                    }
                    check_graphics_bindings(
                        program,
                        &shader.bindings,
                        options.graphics_buffer_limit_bytes,
                    )?;
                    vertex = Some(shader);
                }
                ShaderParams::Fragment(shader) => {
                    let vertex_shader = vertex.take().ok_or_else(|| {
                        CompileError::internal("fragment shader without a vertex shader")
                    })?;
                    check_graphics_bindings(
                        program,
                        &shader.bindings,
                        options.graphics_buffer_limit_bytes,
                    )?;
                    let mut pipeline = pipelines.next().ok_or_else(|| {
                        CompileError::internal("more shader pairs than render pipelines")
                    })?;
                    pipeline.set_shaders(vertex_shader, shader);
                    tasks.push(TaskKind::Render(pipeline));
                }
            }
        }
        if vertex.is_some() || pipelines.next().is_some() {
            return Err(CompileError::internal(
                "render pipelines and generated shaders do not pair up",
            ));
        }

        Ok(KernelParams {
            tasks,
            arg_types: lowered.arg_types,
            return_type: lowered.return_type,
            render_pass: lowered.render_pass,
        })
    }
}

/// Bytes of a buffer holding one 32-bit word per primitive of `types`.
fn primitive_bytes(types: &[Type]) -> CompileResult<u32> {
    let words: usize = types.iter().map(Type::num_primitives).sum();
    words
        .checked_mul(4)
        .and_then(|bytes| u32::try_from(bytes).ok())
        .ok_or_else(|| CompileError::internal("argument buffer does not fit in 32 bits"))
}
