#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::{PrimitiveType, StructType, Type, TypeCategory};

fn particle() -> Type {
    Type::structure(vec![
        ("pos".to_owned(), Type::vector(PrimitiveType::F32, 3)),
        ("id".to_owned(), Type::I32),
        ("basis".to_owned(), Type::matrix(PrimitiveType::F32, 2, 2)),
    ])
}

#[test]
fn struct_flattening_follows_member_order() {
    use PrimitiveType::{F32, I32};
    assert_eq!(
        particle().primitives(),
        vec![F32, F32, F32, I32, F32, F32, F32, F32]
    );
}

#[test]
fn member_offsets_count_primitives() {
    let ty = particle();
    let st = ty.as_struct().unwrap();
    assert_eq!(st.member_offset("pos"), Some(0));
    assert_eq!(st.member_offset("id"), Some(3));
    assert_eq!(st.member_offset("basis"), Some(4));
    assert_eq!(st.member_offset("missing"), None);
}

#[test]
fn pointers_flatten_to_pointee() {
    let ptr = Type::pointer(Type::vector(PrimitiveType::I32, 4), true);
    assert_eq!(ptr.num_primitives(), 4);
    assert!(ptr.is_global_pointer());
    assert!(ptr.is_value_or_pointer_of(TypeCategory::Vector));
    assert!(ptr.is_value_or_pointer_of_tensor());
}

#[test]
fn compile_time_kinds_have_no_primitives() {
    assert!(Type::Void.primitives().is_empty());
    assert!(Type::Function.primitives().is_empty());
    assert!(Type::host_object().primitives().is_empty());
}

#[test]
fn shape_match_ignores_primitive() {
    let a = Type::matrix(PrimitiveType::F32, 2, 3);
    let b = Type::matrix(PrimitiveType::I32, 2, 3);
    let c = Type::matrix(PrimitiveType::F32, 3, 2);
    assert!(a.tensor_shape_match(&b));
    assert!(!a.tensor_shape_match(&c));
    assert!(!a.tensor_shape_match(&Type::F32));
    assert!(!particle().tensor_shape_match(&particle()));
}

#[test]
fn with_primitive_rewrites_structs() {
    let ty = particle().with_primitive(PrimitiveType::I32);
    assert!(ty.primitives().iter().all(|p| *p == PrimitiveType::I32));
    assert_eq!(ty.as_struct().map(StructType::members).map(<[_]>::len), Some(3));
}

#[test]
fn display() {
    assert_eq!(Type::vector(PrimitiveType::F32, 3).to_string(), "vec3<f32>");
    assert_eq!(
        Type::matrix(PrimitiveType::I32, 2, 4).to_string(),
        "mat2x4<i32>"
    );
    assert_eq!(
        Type::pointer(Type::F32, false).to_string(),
        "ptr<local, f32>"
    );
}

fn arb_prim() -> impl Strategy<Value = PrimitiveType> {
    prop_oneof![Just(PrimitiveType::I32), Just(PrimitiveType::F32)]
}

fn arb_type() -> impl Strategy<Value = Type> {
    let leaf = prop_oneof![
        arb_prim().prop_map(Type::Scalar),
        (arb_prim(), 2usize..=4).prop_map(|(p, rows)| Type::vector(p, rows)),
        (arb_prim(), 2usize..=4, 2usize..=4).prop_map(|(p, r, c)| Type::matrix(p, r, c)),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop::collection::vec(inner, 1..4).prop_map(|members| {
            Type::structure(
                members
                    .into_iter()
                    .enumerate()
                    .map(|(i, ty)| (format!("m{i}"), ty))
                    .collect(),
            )
        })
    })
}

proptest! {
    #[test]
    fn equality_is_reflexive(ty in arb_type()) {
        prop_assert_eq!(&ty, &ty.clone());
    }

    #[test]
    fn flattening_is_stable(ty in arb_type()) {
        prop_assert_eq!(ty.primitives(), ty.clone().primitives());
        prop_assert_eq!(ty.primitives().len(), ty.num_primitives());
    }

    #[test]
    fn pointer_flattening_matches_pointee(ty in arb_type(), global in any::<bool>()) {
        let ptr = Type::pointer(ty.clone(), global);
        prop_assert_eq!(ptr.primitives(), ty.primitives());
    }
}
