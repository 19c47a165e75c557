#![allow(clippy::unwrap_used)]

use kiln_ir::{FieldOptions, Program};
use kiln_types::Type;
use pretty_assertions::assert_eq;

use super::*;
use crate::resource::{ResourceInfo, ResourceType};

fn binding(ty: ResourceType, id: Option<u32>, binding: u32) -> ResourceBinding {
    ResourceBinding {
        info: ResourceInfo { ty, id },
        binding,
    }
}

#[test]
fn merged_bindings_keep_vertex_first_and_drop_duplicates() {
    let mut pipeline = RenderPipelineParams::new(None, None);
    let shared = binding(ResourceType::Root, Some(0), 0);
    let args = binding(ResourceType::Args, None, 1);
    let texture = binding(ResourceType::Texture, Some(0), 2);
    pipeline.set_shaders(
        VertexShaderParams {
            code: String::new(),
            bindings: vec![shared, args],
        },
        FragmentShaderParams {
            code: String::new(),
            bindings: vec![args, texture],
        },
    );

    assert_eq!(pipeline.bindings, vec![shared, args, texture]);
}

#[test]
fn vertex_count_prefers_index_buffer() {
    let mut program = Program::new();
    let vertices = program.create_field(
        Type::vector(kiln_types::PrimitiveType::F32, 3),
        vec![8],
        FieldOptions::default(),
    );
    let indices = program.create_field(Type::I32, vec![36], FieldOptions::default());

    let only_vertices = RenderPipelineParams::new(Some(vertices.clone()), None);
    assert_eq!(only_vertices.vertex_count(), 8);

    let indexed = RenderPipelineParams::new(Some(vertices), Some(indices));
    assert_eq!(indexed.vertex_count(), 36);

    assert_eq!(RenderPipelineParams::new(None, None).vertex_count(), 0);
}

#[test]
fn kernel_params_serialize_to_json() {
    let params = KernelParams {
        tasks: vec![TaskKind::Compute(TaskParams {
            code: "fn main() {}".to_owned(),
            workgroup_size: 128,
            num_workgroups: 1,
            bindings: vec![binding(ResourceType::Root, Some(0), 0)],
        })],
        arg_types: vec![Type::F32],
        return_type: Type::Void,
        render_pass: None,
    };

    let json = serde_json::to_value(&params).unwrap();

    assert_eq!(json["tasks"][0]["compute"]["workgroup_size"], 128);
    assert_eq!(
        json["tasks"][0]["compute"]["bindings"][0]["info"]["ty"],
        "root"
    );
    assert_eq!(params.compute_tasks().count(), 1);
    assert_eq!(params.render_pipelines().count(), 0);
}
