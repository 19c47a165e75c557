//! WGSL code generation for the Kiln shader compiler.
//!
//! [`generate`] turns one [`OffloadedModule`](kiln_passes::OffloadedModule)
//! into one WGSL entry point plus the list of resources it binds:
//!
//! - serial and compute sub-modules become `@compute` shaders
//!   ([`TaskParams`]);
//! - vertex and fragment sub-modules become `@vertex` / `@fragment`
//!   shaders that the caller pairs into a [`RenderPipelineParams`].
//!
//! Buffers are declared lazily the first time a statement touches them, so
//! a shader binds exactly what it uses. [`KernelParams`] is the full
//! compiled kernel descriptor.

mod emitter;
mod params;
mod resource;
mod wgsl;

pub use params::{
    ColorAttachment, DepthAttachment, FragmentShaderParams, IndirectCount, KernelParams,
    RenderPassParams, RenderPipelineParams, TaskKind, TaskParams, VertexShaderParams,
};
pub use resource::{ResourceBinding, ResourceBindingMap, ResourceInfo, ResourceType};
pub use wgsl::{check_graphics_bindings, f32_literal, generate, CodegenInput, ShaderParams};

/// Code generator configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Invocations per workgroup of a compute sub-module.
    pub workgroup_size: u32,
    /// Workgroups dispatched when the trip count is only known on the GPU.
    pub max_workgroups: u32,
    pub global_temporaries_bytes: u32,
    /// Entries in the random-state buffer.
    pub rand_states: u32,
    /// Largest storage tree a vertex or fragment shader may bind.
    pub graphics_buffer_limit_bytes: u32,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            workgroup_size: 128,
            max_workgroups: 512,
            global_temporaries_bytes: 65536,
            rand_states: 65536,
            graphics_buffer_limit_bytes: 65536,
        }
    }
}
