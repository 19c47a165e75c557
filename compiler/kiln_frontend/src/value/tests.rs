#![allow(clippy::unwrap_used)]

use kiln_ir::IrBuilder;
use kiln_types::{PrimitiveType, Type};
use pretty_assertions::assert_eq;

use super::Value;

fn constant(builder: &mut IrBuilder, value: f64, prim: PrimitiveType) -> Value {
    let stmt = builder.create_constant(prim, value);
    Value::constant_scalar(stmt, value, prim)
}

fn vec_f32(builder: &mut IrBuilder, values: &[f64]) -> Value {
    let scalars: Vec<Value> = values
        .iter()
        .map(|v| constant(builder, *v, PrimitiveType::F32))
        .collect();
    Value::vector_from_scalars(&scalars).unwrap()
}

#[test]
fn vector_from_scalars_keeps_constants() {
    let mut b = IrBuilder::new();
    let v = vec_f32(&mut b, &[1.0, 2.0, 3.0]);
    assert_eq!(v.ty, Type::vector(PrimitiveType::F32, 3));
    assert_eq!(v.stmts.len(), 3);
    assert!(v.is_compile_time_constant());
    assert_eq!(v.constants, vec![1.0, 2.0, 3.0]);
}

#[test]
fn mixing_constant_and_runtime_drops_constants() {
    let mut b = IrBuilder::new();
    let c = constant(&mut b, 1.0, PrimitiveType::I32);
    let r = b.create_arg_load(PrimitiveType::I32, 0);
    let v = Value::vector_from_scalars(&[c, Value::scalar(r, PrimitiveType::I32)]).unwrap();
    assert!(!v.is_compile_time_constant());
    assert!(v.constants.is_empty());
}

#[test]
fn vector_components_of_mixed_primitives_is_rejected() {
    let mut b = IrBuilder::new();
    let i = constant(&mut b, 1.0, PrimitiveType::I32);
    let f = constant(&mut b, 1.0, PrimitiveType::F32);
    assert!(Value::vector_from_scalars(&[i, f]).is_err());
}

#[test]
fn matrix_rows_cols_and_transpose() {
    let mut b = IrBuilder::new();
    let r0 = vec_f32(&mut b, &[1.0, 2.0, 3.0]);
    let r1 = vec_f32(&mut b, &[4.0, 5.0, 6.0]);
    let m = Value::matrix_from_rows(&[r0, r1]).unwrap();
    assert_eq!(m.ty, Type::matrix(PrimitiveType::F32, 2, 3));

    let cols = m.matrix_cols().unwrap();
    assert_eq!(cols.len(), 3);
    assert_eq!(cols[1].constants, vec![2.0, 5.0]);

    let t = m.transpose_matrix().unwrap();
    assert_eq!(t.ty, Type::matrix(PrimitiveType::F32, 3, 2));
    assert_eq!(t.constants, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

    let comps = m.matrix_components().unwrap();
    assert_eq!(comps[1][2].scalar_constant(), Some(6.0));
}

#[test]
fn pointer_components_are_pointers() {
    let mut b = IrBuilder::new();
    let stmts: Vec<_> = (0..3).map(|_| b.create_alloca(PrimitiveType::I32)).collect();
    let ptr = Value::new(
        Type::pointer(Type::vector(PrimitiveType::I32, 3), false),
        stmts.clone(),
    );
    let comps = ptr.vector_components().unwrap();
    assert_eq!(comps[2].ty, Type::pointer(Type::I32, false));
    assert_eq!(comps[2].stmts, vec![stmts[2]]);
}

#[test]
fn mixing_pointers_and_values_is_rejected() {
    let mut b = IrBuilder::new();
    let alloca = b.create_alloca(PrimitiveType::I32);
    let ptr = Value::new(Type::pointer(Type::I32, false), vec![alloca]);
    let val = constant(&mut b, 2.0, PrimitiveType::I32);
    assert!(Value::vector_from_scalars(&[ptr, val]).is_err());
}

#[test]
fn concat_and_append() {
    let mut b = IrBuilder::new();
    let a = vec_f32(&mut b, &[1.0, 2.0]);
    let c = vec_f32(&mut b, &[3.0]);
    let joined = Value::concat_vectors(&a, &c).unwrap();
    assert_eq!(joined.constants, vec![1.0, 2.0, 3.0]);

    let s = constant(&mut b, 9.0, PrimitiveType::F32);
    let appended = Value::append_scalar_to_vector(&joined, &s).unwrap();
    assert_eq!(appended.ty, Type::vector(PrimitiveType::F32, 4));

    let m = Value::matrix_from_rows(&[a.clone(), a.clone()]).unwrap();
    let m3 = Value::append_row_to_matrix(&m, &a).unwrap();
    assert_eq!(m3.ty, Type::matrix(PrimitiveType::F32, 3, 2));
    let m5 = Value::concat_matrices(&m3, &m).unwrap();
    assert_eq!(m5.ty, Type::matrix(PrimitiveType::F32, 5, 2));
}

#[test]
fn structs_round_trip_members() {
    let mut b = IrBuilder::new();
    let pos = vec_f32(&mut b, &[1.0, 2.0]);
    let id = constant(&mut b, 7.0, PrimitiveType::I32);
    let st = Value::make_struct(vec![("pos".into(), pos), ("id".into(), id)]).unwrap();
    assert_eq!(st.stmts.len(), 3);
    let id = st.struct_member("id").unwrap();
    assert_eq!(id.ty, Type::I32);
    assert_eq!(id.scalar_constant(), Some(7.0));
    assert!(st.struct_member("missing").is_err());
}

#[test]
fn duplicate_struct_members_are_rejected() {
    let mut b = IrBuilder::new();
    let x = constant(&mut b, 1.0, PrimitiveType::I32);
    let err = Value::make_struct(vec![("a".into(), x.clone()), ("a".into(), x)]).unwrap_err();
    assert!(err.message.contains("duplicate"));
}

#[test]
fn matrix_from_scalars_checks_count() {
    let mut b = IrBuilder::new();
    let scalars: Vec<Value> = (0..4)
        .map(|i| constant(&mut b, f64::from(i), PrimitiveType::I32))
        .collect();
    let m = Value::matrix_from_scalars(&scalars, 2, 2).unwrap();
    assert_eq!(m.ty, Type::matrix(PrimitiveType::I32, 2, 2));
    assert!(Value::matrix_from_scalars(&scalars, 3, 2).is_err());
}
