//! Operations that are not a single element-wise IR operator: assignment,
//! vector construction, linear algebra and compile-time helpers.

use kiln_ir::{BinaryOpType, IrBuilder, UnaryOpType};
use kiln_types::{PrimitiveType, Type, TypeError};

use super::{
    address_kind, apply_binary, apply_unary, assemble, component, fold_unary, tensor_operand,
    Address, BuiltinOp,
};
use crate::value::Value;

pub(super) fn custom_ops() -> Vec<BuiltinOp> {
    vec![
        BuiltinOp::custom("=", 2, check_store, |b, args| {
            store_value(b, &args[0], &args[1]);
            Ok(Value::void())
        }),
        BuiltinOp::custom("load", 1, |_| Ok(()), |b, args| Ok(load_value(b, &args[0]))),
        BuiltinOp::custom(",", 2, check_comma, apply_comma),
        BuiltinOp::custom("concat", 2, check_concat, apply_concat),
        BuiltinOp::custom("len", 1, check_len, apply_len),
        BuiltinOp::custom("length", 1, check_vector_like, |b, args| Ok(norm(b, &args[0]))),
        BuiltinOp::custom("norm", 1, check_vector_like, |b, args| Ok(norm(b, &args[0]))),
        BuiltinOp::custom("norm_sqr", 1, check_vector_like, |b, args| {
            Ok(norm_sqr(b, &args[0]))
        }),
        BuiltinOp::custom("sum", 1, check_tensor, |b, args| Ok(sum(b, &scalars(&args[0])))),
        BuiltinOp::custom("normalized", 1, check_vector_like, |b, args| {
            let n = norm(b, &args[0]);
            Ok(apply_binary(b, BinaryOpType::Truediv, &args[0], &n))
        }),
        BuiltinOp::custom("dot", 2, check_dot, |b, args| Ok(dot(b, &args[0], &args[1]))),
        BuiltinOp::custom("cross", 2, check_cross, apply_cross),
        BuiltinOp::custom("outer_product", 2, check_outer_product, apply_outer_product),
        BuiltinOp::custom("matmul", 2, check_matmul, apply_matmul),
        BuiltinOp::custom("transpose", 1, check_transpose, |_, args| {
            args[0].transpose_matrix()
        }),
        BuiltinOp::custom("static", 1, check_static, apply_static),
        BuiltinOp::custom("Static", 1, check_static, apply_static),
        BuiltinOp::custom("mergeStructs", 2, check_merge_structs, apply_merge_structs),
        BuiltinOp::custom("slice", 3, check_slice, apply_slice),
    ]
}

// ── Memory ──────────────────────────────────────────────────────────

/// Dereference a pointer value; other values are returned unchanged.
pub fn load_value(builder: &mut IrBuilder, value: &Value) -> Value {
    if !value.is_pointer() {
        return value.clone();
    }
    let stmts = value
        .stmts
        .iter()
        .map(|&ptr| match address_kind(builder, ptr) {
            Address::Local => builder.create_local_load(ptr),
            Address::Global => builder.create_global_load(ptr),
            Address::GlobalTemporary => builder.create_global_temporary_load(ptr),
        })
        .collect();
    Value::new(value.ty.value_type().clone(), stmts)
}

/// Store `value` through `dest` component by component, converting each
/// component to the pointee primitive. A scalar value is broadcast.
pub fn store_value(builder: &mut IrBuilder, dest: &Value, value: &Value) {
    let value = load_value(builder, value);
    for (i, &ptr) in dest.stmts.iter().enumerate() {
        let (stmt, constant) = component(&value, i);
        let prim = builder
            .module()
            .pointed_type(ptr)
            .unwrap_or(PrimitiveType::I32);
        let stmt = match constant {
            _ if builder.module().return_type(stmt) == Some(prim) => stmt,
            Some(c) => builder.create_constant(prim, c),
            None => builder.create_cast(stmt, prim),
        };
        match address_kind(builder, ptr) {
            Address::Local => builder.create_local_store(ptr, stmt),
            Address::Global => builder.create_global_store(ptr, stmt),
            Address::GlobalTemporary => builder.create_global_temporary_store(ptr, stmt),
        };
    }
}

/// Convert a tensor value to `prim`, folding constant components.
pub fn cast_value(builder: &mut IrBuilder, value: &Value, prim: PrimitiveType) -> Value {
    let Some(from) = value.ty.tensor_primitive() else {
        return value.clone();
    };
    if from == prim {
        return value.clone();
    }
    let op = match prim {
        PrimitiveType::I32 => UnaryOpType::CastI32Value,
        PrimitiveType::F32 => UnaryOpType::CastF32Value,
    };
    let mut stmts = Vec::with_capacity(value.stmts.len());
    let mut constants = Vec::with_capacity(value.stmts.len());
    for i in 0..value.stmts.len() {
        let (stmt, constant) = component(value, i);
        let folded = constant.and_then(|c| fold_unary(op, c, from));
        stmts.push(match folded {
            Some(c) => builder.create_constant(prim, c),
            None => builder.create_cast(stmt, prim),
        });
        constants.push(folded);
    }
    assemble(value.ty.with_primitive(prim), stmts, constants)
}

fn check_store(args: &[Value]) -> Result<(), TypeError> {
    let (dest, value) = (&args[0], &args[1]);
    let Some(pointee) = dest.ty.pointee() else {
        return Err(TypeError::new(format!(
            "the left-hand side of an assignment must be assignable, got a value of type {}",
            dest.ty
        )));
    };
    let value_ty = value.ty.value_type();
    match pointee {
        Type::Struct(_) if value_ty == pointee => Ok(()),
        Type::Struct(_) => Err(TypeError::new(format!(
            "cannot assign a value of type {value_ty} to a {pointee}"
        ))),
        _ if pointee.is_tensor() => {
            let Some(vp) = value_ty.tensor_primitive() else {
                return Err(TypeError::new(format!("cannot assign {value_ty} to {pointee}")));
            };
            if pointee.tensor_primitive() == Some(PrimitiveType::I32) && vp == PrimitiveType::F32 {
                return Err(TypeError::new(format!(
                    "cannot assign {value_ty} to {pointee}: f32 does not convert to i32 implicitly"
                )));
            }
            if !pointee.tensor_shape_match(value_ty) && !matches!(value_ty, Type::Scalar(_)) {
                return Err(TypeError::new(format!(
                    "cannot assign {value_ty} to {pointee}: shapes differ"
                )));
            }
            Ok(())
        }
        _ => Err(TypeError::new(format!("values of type {pointee} cannot be assigned"))),
    }
}

// ── Construction ────────────────────────────────────────────────────

/// Cast both operands to `f32` when their primitives differ.
fn promote(builder: &mut IrBuilder, lhs: &Value, rhs: &Value) -> (Value, Value) {
    if lhs.ty.tensor_primitive() == rhs.ty.tensor_primitive() {
        return (lhs.clone(), rhs.clone());
    }
    (
        cast_value(builder, lhs, PrimitiveType::F32),
        cast_value(builder, rhs, PrimitiveType::F32),
    )
}

fn check_comma(args: &[Value]) -> Result<(), TypeError> {
    let (lhs, rhs) = (&args[0].ty, &args[1].ty);
    tensor_operand(",", &args[0])?;
    tensor_operand(",", &args[1])?;
    let ok = match (lhs, rhs) {
        (Type::Scalar(_), Type::Scalar(_)) | (Type::Vector { .. }, Type::Scalar(_)) => true,
        (Type::Vector { rows: a, .. }, Type::Vector { rows: b, .. }) => a == b,
        (Type::Matrix { cols, .. }, Type::Vector { rows, .. }) => cols == rows,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(TypeError::new(format!("cannot combine {lhs} and {rhs} into a vector or matrix")))
    }
}

fn apply_comma(builder: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let (lhs, rhs) = promote(builder, &args[0], &args[1]);
    match (&lhs.ty, &rhs.ty) {
        (Type::Scalar(_), _) => Value::vector_from_scalars(&[lhs, rhs]),
        (Type::Vector { .. }, Type::Scalar(_)) => Value::append_scalar_to_vector(&lhs, &rhs),
        (Type::Vector { .. }, _) => Value::matrix_from_rows(&[lhs, rhs]),
        _ => Value::append_row_to_matrix(&lhs, &rhs),
    }
}

fn check_concat(args: &[Value]) -> Result<(), TypeError> {
    match (&args[0].ty, &args[1].ty) {
        (Type::Vector { .. }, Type::Vector { .. }) => Ok(()),
        (Type::Matrix { cols: a, .. }, Type::Matrix { cols: b, .. }) if a == b => Ok(()),
        (lhs, rhs) => Err(TypeError::new(format!("cannot concatenate {lhs} and {rhs}"))),
    }
}

fn apply_concat(builder: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let (lhs, rhs) = promote(builder, &args[0], &args[1]);
    if matches!(lhs.ty, Type::Vector { .. }) {
        Value::concat_vectors(&lhs, &rhs)
    } else {
        Value::concat_matrices(&lhs, &rhs)
    }
}

fn check_len(args: &[Value]) -> Result<(), TypeError> {
    match args[0].ty {
        Type::Vector { .. } | Type::Matrix { .. } => Ok(()),
        ref other => Err(TypeError::new(format!("len expects a vector or matrix, got {other}"))),
    }
}

fn apply_len(builder: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let rows = match args[0].ty {
        Type::Vector { rows, .. } | Type::Matrix { rows, .. } => rows,
        _ => 0,
    };
    let rows = i32::try_from(rows).map_err(|_| TypeError::new("length does not fit in i32"))?;
    let stmt = builder.create_const_i32(rows);
    Ok(Value::constant_scalar(stmt, f64::from(rows), PrimitiveType::I32))
}

// ── Reductions and linear algebra ───────────────────────────────────

fn check_tensor(args: &[Value]) -> Result<(), TypeError> {
    tensor_operand("sum", &args[0]).map(|_| ())
}

fn check_vector_like(args: &[Value]) -> Result<(), TypeError> {
    match args[0].ty {
        Type::Scalar(_) | Type::Vector { .. } => Ok(()),
        ref other => Err(TypeError::new(format!("expected a scalar or vector, got {other}"))),
    }
}

/// Every component of a tensor as a scalar value.
fn scalars(value: &Value) -> Vec<Value> {
    let prim = value.ty.tensor_primitive().unwrap_or(PrimitiveType::I32);
    (0..value.stmts.len())
        .map(|i| match component(value, i) {
            (stmt, Some(c)) => Value::constant_scalar(stmt, c, prim),
            (stmt, None) => Value::scalar(stmt, prim),
        })
        .collect()
}

/// Left fold with `+`, starting from the first element.
fn sum(builder: &mut IrBuilder, values: &[Value]) -> Value {
    let mut iter = values.iter();
    let Some(first) = iter.next() else {
        let zero = builder.create_const_i32(0);
        return Value::constant_scalar(zero, 0.0, PrimitiveType::I32);
    };
    iter.fold(first.clone(), |acc, v| {
        apply_binary(builder, BinaryOpType::Add, &acc, v)
    })
}

fn dot(builder: &mut IrBuilder, a: &Value, b: &Value) -> Value {
    let products = apply_binary(builder, BinaryOpType::Mul, a, b);
    sum(builder, &scalars(&products))
}

fn norm_sqr(builder: &mut IrBuilder, v: &Value) -> Value {
    dot(builder, v, v)
}

fn norm(builder: &mut IrBuilder, v: &Value) -> Value {
    let squared = norm_sqr(builder, v);
    apply_unary(builder, UnaryOpType::Sqrt, &squared)
}

fn check_dot(args: &[Value]) -> Result<(), TypeError> {
    match (&args[0].ty, &args[1].ty) {
        (Type::Vector { rows: a, .. }, Type::Vector { rows: b, .. }) if a == b => Ok(()),
        (lhs, rhs) => Err(TypeError::new(format!(
            "dot expects two vectors of the same length, got {lhs} and {rhs}"
        ))),
    }
}

fn check_cross(args: &[Value]) -> Result<(), TypeError> {
    match (&args[0].ty, &args[1].ty) {
        (Type::Vector { rows: 3, .. }, Type::Vector { rows: 3, .. }) => Ok(()),
        (lhs, rhs) => Err(TypeError::new(format!(
            "cross expects two 3-component vectors, got {lhs} and {rhs}"
        ))),
    }
}

fn apply_cross(builder: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let a = scalars(&args[0]);
    let b = scalars(&args[1]);
    let mut term = |i: usize, j: usize| {
        let l = apply_binary(builder, BinaryOpType::Mul, &a[i], &b[j]);
        let r = apply_binary(builder, BinaryOpType::Mul, &a[j], &b[i]);
        apply_binary(builder, BinaryOpType::Sub, &l, &r)
    };
    let x = term(1, 2);
    let y = term(2, 0);
    let z = term(0, 1);
    Value::vector_from_scalars(&[x, y, z])
}

fn check_outer_product(args: &[Value]) -> Result<(), TypeError> {
    match (&args[0].ty, &args[1].ty) {
        (Type::Vector { .. }, Type::Vector { .. }) => Ok(()),
        (lhs, rhs) => Err(TypeError::new(format!(
            "outer_product expects two vectors, got {lhs} and {rhs}"
        ))),
    }
}

fn apply_outer_product(builder: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let a = scalars(&args[0]);
    let b = scalars(&args[1]);
    let mut entries = Vec::with_capacity(a.len() * b.len());
    for x in &a {
        for y in &b {
            entries.push(apply_binary(builder, BinaryOpType::Mul, x, y));
        }
    }
    Value::matrix_from_scalars(&entries, a.len(), b.len())
}

fn check_matmul(args: &[Value]) -> Result<(), TypeError> {
    match (&args[0].ty, &args[1].ty) {
        (Type::Matrix { cols, .. }, Type::Matrix { rows, .. })
        | (Type::Matrix { cols, .. }, Type::Vector { rows, .. })
            if cols == rows =>
        {
            Ok(())
        }
        (lhs, rhs) => Err(TypeError::new(format!("cannot multiply {lhs} by {rhs}"))),
    }
}

fn apply_matmul(builder: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let rows = args[0].matrix_rows()?;
    match args[1].ty {
        Type::Vector { .. } => {
            let entries: Vec<Value> = rows.iter().map(|row| dot(builder, row, &args[1])).collect();
            Value::vector_from_scalars(&entries)
        }
        _ => {
            let cols = args[1].matrix_cols()?;
            let mut entries = Vec::with_capacity(rows.len() * cols.len());
            for row in &rows {
                for col in &cols {
                    entries.push(dot(builder, row, col));
                }
            }
            Value::matrix_from_scalars(&entries, rows.len(), cols.len())
        }
    }
}

fn check_transpose(args: &[Value]) -> Result<(), TypeError> {
    match args[0].ty {
        Type::Matrix { .. } => Ok(()),
        ref other => Err(TypeError::new(format!("transpose expects a matrix, got {other}"))),
    }
}

// ── Compile-time helpers ────────────────────────────────────────────

fn check_static(args: &[Value]) -> Result<(), TypeError> {
    let value = &args[0];
    if value.is_compile_time_constant() || value.is_host_object() || value.is_function() {
        Ok(())
    } else {
        Err(TypeError::new("static(..) requires a value known at compile time"))
    }
}

fn apply_static(_: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let mut value = args[0].clone();
    if value.is_host_object() {
        value.ty = Type::HostObjectReference { is_static: true };
    }
    Ok(value)
}

fn check_merge_structs(args: &[Value]) -> Result<(), TypeError> {
    let (Some(a), Some(b)) = (args[0].ty.as_struct(), args[1].ty.as_struct()) else {
        return Err(TypeError::new(format!(
            "mergeStructs expects two structs, got {} and {}",
            args[0].ty, args[1].ty
        )));
    };
    if let Some(name) = b.member_names().find(|name| a.has_member(name)) {
        return Err(TypeError::new(format!(
            "mergeStructs: both structs have a member named {name}"
        )));
    }
    Ok(())
}

fn apply_merge_structs(_: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let mut members = args[0].struct_members()?;
    members.extend(args[1].struct_members()?);
    Value::make_struct(members)
}

/// Constant non-negative `i32` components of a bound.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn constant_bound(value: &Value) -> Option<Vec<usize>> {
    if value.ty.tensor_primitive() != Some(PrimitiveType::I32) || !value.is_compile_time_constant() {
        return None;
    }
    value
        .constants
        .iter()
        .map(|&c| (c >= 0.0).then_some(c as usize))
        .collect()
}

fn check_slice(args: &[Value]) -> Result<(), TypeError> {
    let (start, end) = match (constant_bound(&args[1]), constant_bound(&args[2])) {
        (Some(s), Some(e)) if s.len() == e.len() => (s, e),
        _ => {
            return Err(TypeError::new(
                "slice bounds must be non-negative i32 constants of the same shape",
            ))
        }
    };
    let extents: Vec<usize> = match (&args[0].ty, start.len()) {
        (Type::Vector { rows, .. }, 1) | (Type::Matrix { rows, .. }, 1) => vec![*rows],
        (Type::Matrix { rows, cols, .. }, 2) => vec![*rows, *cols],
        (other, _) => {
            return Err(TypeError::new(format!("cannot slice {other} with these bounds")))
        }
    };
    for ((s, e), extent) in start.iter().zip(&end).zip(&extents) {
        if s >= e || e > extent {
            return Err(TypeError::new(format!(
                "slice bounds {s}..{e} are out of range for {}",
                args[0].ty
            )));
        }
    }
    Ok(())
}

fn apply_slice(_: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
    let start = constant_bound(&args[1]).unwrap_or_default();
    let end = constant_bound(&args[2]).unwrap_or_default();
    match (&args[0].ty, start.as_slice(), end.as_slice()) {
        (Type::Vector { .. }, [s], [e]) => {
            Value::vector_from_scalars(&args[0].vector_components()?[*s..*e])
        }
        (Type::Matrix { .. }, [s], [e]) => Value::matrix_from_rows(&args[0].matrix_rows()?[*s..*e]),
        (Type::Matrix { .. }, [r0, c0], [r1, c1]) => {
            let rows = args[0].matrix_components()?[*r0..*r1]
                .iter()
                .map(|row| Value::vector_from_scalars(&row[*c0..*c1]))
                .collect::<Result<Vec<_>, _>>()?;
            Value::matrix_from_rows(&rows)
        }
        _ => Err(TypeError::new("invalid slice bounds")),
    }
}
