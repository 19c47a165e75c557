//! WGSL emission for one offloaded sub-module.
//!
//! The shader text is assembled from ordered buffers: global declarations,
//! the stage-input struct, the stage-output struct, the function signature,
//! prologue, body, epilogue and function end. Statements are emitted into
//! the body in block order; every value statement becomes one `let` (or
//! `var` for locals) named after its id, so the output is deterministic.
//! Address statements (`GlobalPtr`, `GlobalTemporary`) emit nothing: the
//! index they denote is computed inline wherever they are dereferenced.

mod resources;
mod stmt;

use rustc_hash::FxHashSet;

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{Module, Program, TreeId};
use kiln_passes::{OffloadKind, OffloadedModule, TripCount};

use crate::emitter::SourceBuffer;
use crate::params::{FragmentShaderParams, TaskParams, VertexShaderParams};
use crate::resource::{ResourceBinding, ResourceBindingMap, ResourceInfo, ResourceType};
use crate::CodegenOptions;

pub use stmt::f32_literal;

/// What the generator reads besides the sub-module itself.
#[derive(Copy, Clone, Debug)]
pub struct CodegenInput<'a> {
    pub program: &'a Program,
    /// The module whose arena the sub-modules refer to.
    pub module: &'a Module,
    pub arg_bytes: u32,
    pub ret_bytes: u32,
    pub options: &'a CodegenOptions,
}

/// The generated shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShaderParams {
    Task(TaskParams),
    Vertex(VertexShaderParams),
    Fragment(FragmentShaderParams),
}

impl ShaderParams {
    pub fn code(&self) -> &str {
        match self {
            ShaderParams::Task(p) => &p.code,
            ShaderParams::Vertex(p) => &p.code,
            ShaderParams::Fragment(p) => &p.code,
        }
    }

    pub fn bindings(&self) -> &[ResourceBinding] {
        match self {
            ShaderParams::Task(p) => &p.bindings,
            ShaderParams::Vertex(p) => &p.bindings,
            ShaderParams::Fragment(p) => &p.bindings,
        }
    }
}

/// Generate the shader for `offloaded`.
///
/// `previous_stage` holds the bindings of the vertex shader when generating
/// its fragment shader: binding numbers continue after them, and the
/// fragment shader may not write what the vertex shader reads.
pub fn generate(
    input: &CodegenInput<'_>,
    offloaded: &OffloadedModule,
    previous_stage: &[ResourceBinding],
) -> CompileResult<ShaderParams> {
    let _span = tracing::debug_span!("codegen", kind = ?offloaded.kind).entered();
    let generator = WgslGenerator::new(input, offloaded, previous_stage);
    let params = match offloaded.kind {
        OffloadKind::Serial => ShaderParams::Task(generator.generate_serial()?),
        OffloadKind::Compute => ShaderParams::Task(generator.generate_compute()?),
        OffloadKind::Vertex => {
            let (code, bindings) = generator.generate_graphics()?;
            ShaderParams::Vertex(VertexShaderParams { code, bindings })
        }
        OffloadKind::Fragment => {
            let (code, bindings) = generator.generate_graphics()?;
            ShaderParams::Fragment(FragmentShaderParams { code, bindings })
        }
    };
    tracing::debug!(
        bindings = params.bindings().len(),
        bytes = params.code().len(),
        "generated shader"
    );
    Ok(params)
}

/// Reject resources a vertex or fragment shader may not bind.
pub fn check_graphics_bindings(
    program: &Program,
    bindings: &[ResourceBinding],
    limit_bytes: u32,
) -> CompileResult<()> {
    for binding in bindings {
        match binding.info.ty {
            ResourceType::RandStates => {
                return Err(CompileError::pipeline(
                    "vertex and fragment shaders are not allowed to use random numbers",
                ));
            }
            ResourceType::Rets => {
                return Err(CompileError::internal(
                    "vertex and fragment shaders cannot write return values",
                ));
            }
            ResourceType::RootAtomic | ResourceType::GlobalTmpsAtomic => {
                return Err(CompileError::pipeline(
                    "vertex and fragment shaders are not allowed to use atomics",
                ));
            }
            ResourceType::Root => {
                let size = binding
                    .info
                    .id
                    .and_then(|id| program.tree(TreeId::new(id)))
                    .map_or(0, |tree| tree.size_bytes);
                if size > limit_bytes {
                    return Err(CompileError::pipeline(format!(
                        "vertex and fragment shaders are not allowed to use fields \
                         larger than {limit_bytes} bytes (this storage tree holds {size} bytes)"
                    )));
                }
            }
            ResourceType::GlobalTmps
            | ResourceType::Args
            | ResourceType::Texture
            | ResourceType::Sampler
            | ResourceType::StorageTexture => {}
        }
    }
    Ok(())
}

// ── Stage structs ──────────────────────────────────────────────────

/// Members of `StageInput` or `StageOutput`, each declared once.
#[derive(Default)]
struct StageStruct {
    members: SourceBuffer,
    names: FxHashSet<String>,
}

impl StageStruct {
    fn add(&mut self, name: &str, declaration: &str) {
        if self.names.insert(name.to_owned()) {
            self.members.emit_line(1, declaration);
        }
    }

    fn is_used(&self) -> bool {
        !self.names.is_empty()
    }

    fn render(&self, struct_name: &str, out: &mut SourceBuffer) {
        if !self.is_used() {
            return;
        }
        out.emit("struct ");
        out.emit(struct_name);
        out.emit(" {");
        out.emit_newline();
        out.emit(self.members.as_str());
        out.emit("};");
        out.emit_newline();
    }
}

// ── Generator ──────────────────────────────────────────────────────

pub(crate) struct WgslGenerator<'a> {
    program: &'a Program,
    module: &'a Module,
    offloaded: &'a OffloadedModule,
    options: &'a CodegenOptions,
    arg_bytes: u32,
    ret_bytes: u32,
    previous_stage: &'a [ResourceBinding],
    bindings: ResourceBindingMap,

    global_decls: SourceBuffer,
    stage_input: StageStruct,
    stage_output: StageStruct,
    signature: SourceBuffer,
    prologue: SourceBuffer,
    body: SourceBuffer,
    epilogue: SourceBuffer,
    function_end: SourceBuffer,

    indent: usize,
    next_temp: u32,
    rand_declared: bool,
}

impl<'a> WgslGenerator<'a> {
    fn new(
        input: &CodegenInput<'a>,
        offloaded: &'a OffloadedModule,
        previous_stage: &'a [ResourceBinding],
    ) -> Self {
        WgslGenerator {
            program: input.program,
            module: input.module,
            offloaded,
            options: input.options,
            arg_bytes: input.arg_bytes,
            ret_bytes: input.ret_bytes,
            previous_stage,
            bindings: ResourceBindingMap::new(),
            global_decls: SourceBuffer::new(),
            stage_input: StageStruct::default(),
            stage_output: StageStruct::default(),
            signature: SourceBuffer::new(),
            prologue: SourceBuffer::new(),
            body: SourceBuffer::new(),
            epilogue: SourceBuffer::new(),
            function_end: SourceBuffer::new(),
            indent: 1,
            next_temp: 0,
            rand_declared: false,
        }
    }

    fn is_vertex(&self) -> bool {
        self.offloaded.kind == OffloadKind::Vertex
    }

    fn is_fragment(&self) -> bool {
        self.offloaded.kind == OffloadKind::Fragment
    }

    fn is_graphics(&self) -> bool {
        self.is_vertex() || self.is_fragment()
    }

    fn temp(&mut self, hint: &str) -> String {
        let name = format!("_t{}_{hint}", self.next_temp);
        self.next_temp += 1;
        name
    }

    fn generate_serial(mut self) -> CompileResult<TaskParams> {
        let offloaded = self.offloaded;
        self.start_compute_function(1);
        self.emit_block(&offloaded.block)?;
        Ok(TaskParams {
            code: self.assemble(),
            workgroup_size: 1,
            num_workgroups: 1,
            bindings: self.bindings.into_bindings(),
        })
    }

    /// A grid-strided loop: invocation `gid3.x` handles iterations
    /// `gid3.x`, `gid3.x + total`, ... where `total` is the number of
    /// invocations dispatched.
    fn generate_compute(mut self) -> CompileResult<TaskParams> {
        let offloaded = self.offloaded;
        let workgroup_size = self.options.workgroup_size.max(1);
        let (end_expr, num_workgroups) = match offloaded.trip_count {
            Some(TripCount::Const(n)) => (n.to_string(), n.div_ceil(workgroup_size)),
            Some(TripCount::GlobalTemporary(offset)) => {
                let buffer = self.buffer_member(ResourceInfo::new(ResourceType::GlobalTmps))?;
                (format!("{buffer}[{offset}]"), self.options.max_workgroups)
            }
            None => {
                return Err(CompileError::internal(
                    "compute sub-module without a trip count",
                ))
            }
        };

        self.start_compute_function(workgroup_size);
        let end = self.temp("end");
        self.emit_let(&end, "i32", &end_expr);
        let total = self.temp("total_invocs");
        self.emit_let(
            &total,
            "i32",
            &format!("{workgroup_size} * i32(n_workgroups.x)"),
        );
        self.emit_line("var ii : i32 = i32(gid3.x);");
        self.emit_line("loop {");
        self.indent += 1;
        self.emit_line(&format!("if (ii >= {end}) {{ break; }}"));
        self.emit_block(&offloaded.block)?;
        self.emit_line(&format!("continuing {{ ii = ii + {total}; }}"));
        self.indent -= 1;
        self.emit_line("}");

        tracing::debug!(workgroup_size, num_workgroups, "compute dispatch");
        Ok(TaskParams {
            code: self.assemble(),
            workgroup_size,
            num_workgroups,
            bindings: self.bindings.into_bindings(),
        })
    }

    /// The body is emitted first: the signature depends on which stage
    /// struct members it used.
    fn generate_graphics(mut self) -> CompileResult<(String, Vec<ResourceBinding>)> {
        let offloaded = self.offloaded;
        self.emit_block(&offloaded.block)?;
        self.start_graphics_function();
        check_graphics_bindings(
            self.program,
            self.bindings.bindings(),
            self.options.graphics_buffer_limit_bytes,
        )?;
        Ok((self.assemble(), self.bindings.into_bindings()))
    }

    fn start_compute_function(&mut self, workgroup_size: u32) {
        debug_assert!(self.signature.is_empty(), "signature already emitted");
        self.signature.emit_newline();
        self.signature.emit_line(
            0,
            &format!("@compute @workgroup_size({workgroup_size}, 1, 1)"),
        );
        self.signature.emit_line(0, "fn main(");
        self.signature
            .emit_line(2, "@builtin(global_invocation_id) gid3 : vec3<u32>,");
        self.signature
            .emit_line(2, "@builtin(num_workgroups) n_workgroups : vec3<u32>)");
        self.signature.emit_line(0, "{");
        self.function_end.emit_line(0, "}");
    }

    fn start_graphics_function(&mut self) {
        debug_assert!(self.signature.is_empty(), "signature already emitted");
        let (stage, builtins) = if self.is_vertex() {
            (
                "vertex",
                "@builtin(vertex_index) vertex_index : u32, @builtin(instance_index) instance_index : u32",
            )
        } else {
            ("fragment", "@builtin(position) frag_coord : vec4<f32>")
        };
        let input = if self.stage_input.is_used() {
            ", stage_input : StageInput"
        } else {
            ""
        };
        let output = if self.stage_output.is_used() {
            " -> StageOutput"
        } else {
            ""
        };
        self.signature.emit_newline();
        self.signature.emit_line(0, &format!("@{stage}"));
        self.signature
            .emit_line(0, &format!("fn main({builtins}{input}){output}"));
        self.signature.emit_line(0, "{");
        if self.stage_output.is_used() {
            self.prologue.emit_line(1, "var stage_output : StageOutput;");
            self.epilogue.emit_line(1, "return stage_output;");
        }
        self.function_end.emit_line(0, "}");
    }

    fn assemble(&self) -> String {
        let mut out = SourceBuffer::new();
        out.emit(self.global_decls.as_str());
        self.stage_input.render("StageInput", &mut out);
        self.stage_output.render("StageOutput", &mut out);
        out.emit(self.signature.as_str());
        out.emit(self.prologue.as_str());
        out.emit(self.body.as_str());
        out.emit(self.epilogue.as_str());
        out.emit(self.function_end.as_str());
        out.output()
    }

    // ── Body helpers ──

    fn emit_line(&mut self, text: &str) {
        self.body.emit_line(self.indent, text);
    }

    fn emit_let(&mut self, name: &str, ty: &str, value: &str) {
        self.emit_line(&format!("let {name} : {ty} = {value};"));
    }
}

#[cfg(test)]
mod tests;
