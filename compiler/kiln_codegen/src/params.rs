//! The compiled kernel descriptor handed to the runtime.
//!
//! Everything here serializes to JSON; `kilnc` dumps it when asked.

use kiln_ir::{Field, Texture};
use kiln_types::Type;
use serde::Serialize;

use crate::resource::ResourceBinding;

/// One compute dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskParams {
    pub code: String,
    pub workgroup_size: u32,
    pub num_workgroups: u32,
    pub bindings: Vec<ResourceBinding>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VertexShaderParams {
    pub code: String,
    pub bindings: Vec<ResourceBinding>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FragmentShaderParams {
    pub code: String,
    pub bindings: Vec<ResourceBinding>,
}

/// Number of indirect draws.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndirectCount {
    Const(u32),
    /// Read from element 0 of this field at draw time.
    Field(Field),
}

/// A vertex + fragment pair drawn as one graphics dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderPipelineParams {
    pub vertex: VertexShaderParams,
    pub fragment: FragmentShaderParams,
    /// Struct of the values the vertex stage passes to the fragment stage.
    pub interpolated_type: Type,
    pub vertex_buffer: Option<Field>,
    pub index_buffer: Option<Field>,
    pub indirect_buffer: Option<Field>,
    pub indirect_count: IndirectCount,
    /// Union of both stages' bindings.
    pub bindings: Vec<ResourceBinding>,
}

impl RenderPipelineParams {
    /// A pipeline with no shaders generated yet.
    pub fn new(vertex_buffer: Option<Field>, index_buffer: Option<Field>) -> Self {
        RenderPipelineParams {
            vertex: VertexShaderParams::default(),
            fragment: FragmentShaderParams::default(),
            interpolated_type: Type::structure(Vec::new()),
            vertex_buffer,
            index_buffer,
            indirect_buffer: None,
            indirect_count: IndirectCount::Const(1),
            bindings: Vec::new(),
        }
    }

    /// Vertex bindings followed by fragment bindings, without duplicates.
    pub fn merged_bindings(&self) -> Vec<ResourceBinding> {
        let mut merged: Vec<ResourceBinding> = Vec::new();
        for binding in self.vertex.bindings.iter().chain(&self.fragment.bindings) {
            if !merged.contains(binding) {
                merged.push(*binding);
            }
        }
        merged
    }

    /// Install both stages and recompute [`bindings`](Self::bindings).
    pub fn set_shaders(&mut self, vertex: VertexShaderParams, fragment: FragmentShaderParams) {
        self.vertex = vertex;
        self.fragment = fragment;
        self.bindings = self.merged_bindings();
    }

    /// Vertices per draw: the index buffer's length if there is one, else
    /// the vertex buffer's.
    pub fn vertex_count(&self) -> u32 {
        self.index_buffer
            .as_ref()
            .or(self.vertex_buffer.as_ref())
            .map_or(0, Field::num_elements)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColorAttachment {
    pub texture: Texture,
    /// Clear to this RGBA color; `None` loads the existing contents.
    pub clear_color: Option<[f64; 4]>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DepthAttachment {
    pub texture: Texture,
    pub clear_depth: Option<f64>,
    pub store_depth: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RenderPassParams {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
}

/// One step of a kernel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Compute(TaskParams),
    Render(RenderPipelineParams),
}

/// Everything the runtime needs to launch a kernel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KernelParams {
    pub tasks: Vec<TaskKind>,
    pub arg_types: Vec<Type>,
    pub return_type: Type,
    pub render_pass: Option<RenderPassParams>,
}

impl KernelParams {
    /// The compute tasks, in launch order.
    pub fn compute_tasks(&self) -> impl Iterator<Item = &TaskParams> {
        self.tasks.iter().filter_map(|task| match task {
            TaskKind::Compute(params) => Some(params),
            TaskKind::Render(_) => None,
        })
    }

    pub fn render_pipelines(&self) -> impl Iterator<Item = &RenderPipelineParams> {
        self.tasks.iter().filter_map(|task| match task {
            TaskKind::Compute(_) => None,
            TaskKind::Render(params) => Some(params),
        })
    }
}

#[cfg(test)]
mod tests;
