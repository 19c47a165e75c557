//! Compiler configuration.

use kiln_codegen::CodegenOptions;
use kiln_frontend::KernelOptions;
use kiln_passes::PassOptions;

/// Everything an embedder can tune about a compile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Invocations per compute workgroup.
    pub workgroup_size: u32,
    /// Workgroups dispatched when a loop's trip count is only known on the
    /// GPU.
    pub max_workgroups: u32,
    pub global_temporaries_bytes: u32,
    /// Largest storage tree a vertex or fragment shader may bind.
    pub graphics_buffer_limit_bytes: u32,
    /// Log the IR of every offloaded sub-module at `info` level.
    pub dump_ir: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            workgroup_size: 128,
            max_workgroups: 512,
            global_temporaries_bytes: 65536,
            graphics_buffer_limit_bytes: 65536,
            dump_ir: false,
        }
    }
}

impl CompilerOptions {
    pub fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions {
            workgroup_size: self.workgroup_size,
            max_workgroups: self.max_workgroups,
            global_temporaries_bytes: self.global_temporaries_bytes,
            graphics_buffer_limit_bytes: self.graphics_buffer_limit_bytes,
            ..CodegenOptions::default()
        }
    }

    pub fn pass_options(&self) -> PassOptions {
        PassOptions {
            global_temporaries_bytes: self.global_temporaries_bytes,
            ..PassOptions::default()
        }
    }

    pub fn kernel_options(&self) -> KernelOptions {
        KernelOptions {
            passes: self.pass_options(),
            codegen: self.codegen_options(),
        }
    }
}

impl From<CompilerOptions> for CodegenOptions {
    fn from(options: CompilerOptions) -> Self {
        options.codegen_options()
    }
}

impl From<CompilerOptions> for PassOptions {
    fn from(options: CompilerOptions) -> Self {
        options.pass_options()
    }
}
