use kiln_types::{PrimitiveType, Type};
use pretty_assertions::assert_eq;

use super::*;

fn vec3() -> Type {
    Type::vector(PrimitiveType::F32, 3)
}

#[test]
fn fields_pack_densely_into_pending_tree() {
    let mut program = Program::new();
    let a = program.create_field(Type::F32, vec![10], FieldOptions::default());
    let b = program.create_field(vec3(), vec![4, 2], FieldOptions::default());

    assert_eq!(a.tree, TreeId::new(0));
    assert_eq!(a.offset_bytes, 0);
    assert_eq!(a.size_bytes, 40);
    assert_eq!(b.tree, TreeId::new(0));
    assert_eq!(b.offset_bytes, 40);
    assert_eq!(b.size_bytes, 4 * 3 * 8);
    assert_eq!(program.tree(TreeId::new(0)).map(|t| t.size_bytes), Some(136));
}

#[test]
fn materialize_freezes_and_opens_next_tree() {
    let mut program = Program::new();
    program.create_field(Type::I32, vec![4], FieldOptions::default());
    program.materialize_current_tree();
    let next = program.create_field(Type::I32, vec![4], FieldOptions::default());

    assert!(program.trees()[0].materialized);
    assert_eq!(next.tree, TreeId::new(1));
    assert_eq!(next.offset_bytes, 0);
}

#[test]
fn materialize_empty_tree_is_noop() {
    let mut program = Program::new();
    program.materialize_current_tree();
    program.materialize_current_tree();
    assert_eq!(program.trees().len(), 1);
    assert!(!program.trees()[0].materialized);
}

#[test]
fn fragment_writable_field_gets_own_tree() {
    let mut program = Program::new();
    let plain = program.create_field(Type::F32, vec![2], FieldOptions::default());
    let writable = program.create_field(
        Type::F32,
        vec![2],
        FieldOptions {
            fragment_shader_writable: true,
        },
    );
    let after = program.create_field(Type::F32, vec![2], FieldOptions::default());

    assert_ne!(writable.tree, plain.tree);
    let tree = program.tree(writable.tree);
    assert_eq!(tree.map(|t| (t.fragment_shader_writable, t.materialized)), Some((true, true)));
    assert_eq!(after.tree, plain.tree);
    assert_eq!(after.offset_bytes, 8);
}

#[test]
fn flat_index_is_row_major() {
    let mut program = Program::new();
    let f = program.create_field(Type::I32, vec![3, 4], FieldOptions::default());
    assert_eq!(f.flat_index(&[0, 0]), Some(0));
    assert_eq!(f.flat_index(&[1, 2]), Some(6));
    assert_eq!(f.flat_index(&[2, 3]), Some(11));
    assert_eq!(f.flat_index(&[3, 0]), None);
    assert_eq!(f.flat_index(&[1]), None);
}

#[test]
fn field_primitive_layout() {
    let mut program = Program::new();
    let element = Type::structure(vec![
        ("a".to_owned(), Type::I32),
        ("b".to_owned(), Type::vector(PrimitiveType::F32, 2)),
    ]);
    let f = program.create_field(element, vec![1], FieldOptions::default());
    assert_eq!(f.element_primitives(), 3);
    assert_eq!(f.primitive_at(0), Some(PrimitiveType::I32));
    assert_eq!(f.primitive_at(2), Some(PrimitiveType::F32));
    assert_eq!(f.primitive_at(3), None);
}

#[test]
fn textures_get_sequential_ids() {
    let mut program = Program::new();
    let color = program.create_texture(
        TextureDimensionality::Dim2d,
        TextureKind::Color {
            format: "rgba8unorm".to_owned(),
        },
        1,
    );
    let depth = program.create_texture(TextureDimensionality::Dim2d, TextureKind::Depth, 4);
    assert_eq!(color.id, TextureId::new(0));
    assert_eq!(depth.id, TextureId::new(1));
    assert_eq!(color.format(), "rgba8unorm");
    assert_eq!(depth.format(), "depth32float");
    assert!(depth.is_depth());
    assert_eq!(program.texture(TextureId::new(1)).map(|t| t.sample_count), Some(4));
}
