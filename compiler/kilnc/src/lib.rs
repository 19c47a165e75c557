//! Kiln compiler driver.
//!
//! The crates below this one each own one stage: `kiln_frontend` turns a
//! kernel's syntax tree into IR, `kiln_passes` splits it into GPU dispatches
//! and `kiln_codegen` writes the WGSL. This crate ties them together behind
//! [`compile_kernel`], with the knobs an embedder tunes in
//! [`CompilerOptions`], a [`KernelCache`] for compiled kernels, and
//! [`init_tracing`] for debug logging.

mod cache;
mod options;
mod tracing_setup;

use rustc_hash::FxHashMap;

use kiln_codegen::KernelParams;
use kiln_diagnostic::{CompileError, CompileResult};
use kiln_frontend::{HostValue, KernelCompiler, Library, ParsedFunction, Scope};
use kiln_ir::{print_block, Program};
use kiln_types::Type;

pub use cache::{CacheKey, KernelCache, KernelKey};
pub use options::CompilerOptions;
pub use tracing_setup::init_tracing;

/// One kernel compile request.
#[derive(Clone, Copy)]
pub struct KernelRequest<'a> {
    pub function: &'a ParsedFunction,
    /// Values the kernel body may refer to by name.
    pub scope: &'a Scope,
    /// Declared types of the kernel's arguments.
    pub annotations: &'a FxHashMap<String, Type>,
    /// Compile-time constants bound to parameters, if the kernel has any.
    pub template_args: Option<&'a [(String, HostValue)]>,
}

/// Compile a kernel against `program`.
///
/// Fields the program declared so far are laid out first, so a kernel sees
/// final buffer offsets.
pub fn compile_kernel(
    program: &mut Program,
    library: &Library,
    request: KernelRequest<'_>,
    options: &CompilerOptions,
) -> CompileResult<KernelParams> {
    let mut compiler = KernelCompiler::new(program)
        .with_options(options.kernel_options())
        .with_library(library.clone());
    let lowered = compiler.lower(
        request.function,
        request.scope,
        request.annotations,
        request.template_args,
    )?;
    if options.dump_ir {
        for (index, offloaded) in lowered.offloaded.iter().enumerate() {
            tracing::info!(
                index,
                kind = ?offloaded.kind,
                ir = %print_block(&lowered.module, &offloaded.block),
                "offloaded sub-module"
            );
        }
    }
    compiler.generate(lowered)
}

/// The kernel descriptor as pretty-printed JSON, for embedders that hand
/// it to a runtime in another process.
pub fn descriptor_json(params: &KernelParams) -> CompileResult<String> {
    serde_json::to_string_pretty(params)
        .map_err(|err| CompileError::internal(format!("cannot serialize kernel: {err}")))
}
