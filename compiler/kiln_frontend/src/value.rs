//! Compile-time values.
//!
//! Every expression of a kernel evaluates to a [`Value`]: a [`Type`] plus one
//! IR statement per primitive of that type. Pointer values hold one address
//! statement per pointee primitive, so the same slicing works for r-values
//! and l-values and a component of a pointer is itself a pointer.
//!
//! Functions and host objects have no statements. Their payload lives in
//! [`Value::host`].
//!
//! The helpers here only rearrange statements; they never emit IR. Anything
//! that needs a cast or an arithmetic statement lives in the builtin library.

use std::ops::Range;

use kiln_ir::StmtId;
use kiln_types::{PrimitiveType, Type, TypeError};

use crate::host::HostValue;
use crate::oracle::ParsedFunction;

/// The compile-time representation of an expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub ty: Type,
    pub stmts: Vec<StmtId>,
    /// One folded constant per statement, or empty when any component is
    /// only known at run time.
    pub constants: Vec<f64>,
    pub host: Option<HostValue>,
}

impl Value {
    pub fn new(ty: Type, stmts: Vec<StmtId>) -> Self {
        debug_assert_eq!(ty.num_primitives(), stmts.len(), "value of {ty} has wrong arity");
        Value {
            ty,
            stmts,
            constants: Vec::new(),
            host: None,
        }
    }

    /// A value whose every component is known at compile time.
    pub fn constant(ty: Type, stmts: Vec<StmtId>, constants: Vec<f64>) -> Self {
        debug_assert_eq!(stmts.len(), constants.len());
        Value {
            constants,
            ..Value::new(ty, stmts)
        }
    }

    pub fn void() -> Self {
        Value::new(Type::Void, Vec::new())
    }

    pub fn scalar(stmt: StmtId, prim: PrimitiveType) -> Self {
        Value::new(Type::scalar(prim), vec![stmt])
    }

    pub fn constant_scalar(stmt: StmtId, value: f64, prim: PrimitiveType) -> Self {
        Value::constant(Type::scalar(prim), vec![stmt], vec![value])
    }

    pub fn host_object(host: HostValue) -> Self {
        Value {
            ty: Type::host_object(),
            stmts: Vec::new(),
            constants: Vec::new(),
            host: Some(host),
        }
    }

    pub fn function(function: ParsedFunction) -> Self {
        Value {
            ty: Type::Function,
            stmts: Vec::new(),
            constants: Vec::new(),
            host: Some(HostValue::Function(function)),
        }
    }

    pub fn is_compile_time_constant(&self) -> bool {
        !self.stmts.is_empty() && self.constants.len() == self.stmts.len()
    }

    pub fn is_pointer(&self) -> bool {
        self.ty.is_pointer()
    }

    pub fn is_host_object(&self) -> bool {
        matches!(self.ty, Type::HostObjectReference { .. })
    }

    pub fn is_function(&self) -> bool {
        self.ty == Type::Function
    }

    /// The single constant of a constant scalar.
    pub fn scalar_constant(&self) -> Option<f64> {
        match (&self.ty, self.constants.as_slice()) {
            (Type::Scalar(_), [value]) => Some(*value),
            _ => None,
        }
    }

    pub fn host_value(&self) -> Option<&HostValue> {
        self.host.as_ref()
    }

    /// Re-wrap `ty` the way `self` is wrapped: a pointer of the same kind for
    /// pointers, unchanged for values.
    fn rewrap(&self, ty: Type) -> Type {
        match &self.ty {
            Type::Pointer { is_global, .. } => Type::pointer(ty, *is_global),
            _ => ty,
        }
    }

    fn slice(&self, ty: Type, range: Range<usize>) -> Value {
        let constants = if self.is_compile_time_constant() {
            self.constants[range.clone()].to_vec()
        } else {
            Vec::new()
        };
        Value {
            ty: self.rewrap(ty),
            stmts: self.stmts[range].to_vec(),
            constants,
            host: None,
        }
    }

    /// Pick statements by index.
    fn gather(&self, ty: Type, indices: impl Iterator<Item = usize>) -> Value {
        let constant = self.is_compile_time_constant();
        let mut stmts = Vec::new();
        let mut constants = Vec::new();
        for i in indices {
            stmts.push(self.stmts[i]);
            if constant {
                constants.push(self.constants[i]);
            }
        }
        Value {
            ty: self.rewrap(ty),
            stmts,
            constants,
            host: None,
        }
    }

    // ── Components ──────────────────────────────────────────────────

    pub fn vector_components(&self) -> Result<Vec<Value>, TypeError> {
        let Type::Vector { prim, rows } = *self.ty.value_type() else {
            return Err(TypeError::new(format!("expected a vector, got {}", self.ty)));
        };
        Ok((0..rows)
            .map(|i| self.slice(Type::scalar(prim), i..i + 1))
            .collect())
    }

    /// Scalars of a matrix, indexed `[row][col]`.
    pub fn matrix_components(&self) -> Result<Vec<Vec<Value>>, TypeError> {
        let (prim, rows, cols) = self.matrix_shape()?;
        Ok((0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| {
                        let i = r * cols + c;
                        self.slice(Type::scalar(prim), i..i + 1)
                    })
                    .collect()
            })
            .collect())
    }

    pub fn matrix_rows(&self) -> Result<Vec<Value>, TypeError> {
        let (prim, rows, cols) = self.matrix_shape()?;
        Ok((0..rows)
            .map(|r| self.slice(Type::vector(prim, cols), r * cols..(r + 1) * cols))
            .collect())
    }

    pub fn matrix_cols(&self) -> Result<Vec<Value>, TypeError> {
        let (prim, rows, cols) = self.matrix_shape()?;
        Ok((0..cols)
            .map(|c| self.gather(Type::vector(prim, rows), (0..rows).map(|r| r * cols + c)))
            .collect())
    }

    fn matrix_shape(&self) -> Result<(PrimitiveType, usize, usize), TypeError> {
        match *self.ty.value_type() {
            Type::Matrix { prim, rows, cols } => Ok((prim, rows, cols)),
            _ => Err(TypeError::new(format!("expected a matrix, got {}", self.ty))),
        }
    }

    pub fn transpose_matrix(&self) -> Result<Value, TypeError> {
        let (prim, rows, cols) = self.matrix_shape()?;
        let order = (0..cols).flat_map(|c| (0..rows).map(move |r| r * cols + c));
        Ok(self.gather(Type::matrix(prim, cols, rows), order))
    }

    // ── Assembly ────────────────────────────────────────────────────

    pub fn vector_from_scalars(scalars: &[Value]) -> Result<Value, TypeError> {
        let first = scalars
            .first()
            .ok_or_else(|| TypeError::new("cannot build a vector with no components"))?;
        let Type::Scalar(prim) = *first.ty.value_type() else {
            return Err(TypeError::new(format!(
                "vector components must be scalars, got {}",
                first.ty
            )));
        };
        for scalar in scalars {
            if *scalar.ty.value_type() != Type::scalar(prim) {
                return Err(TypeError::new(format!(
                    "vector components must all be {prim}, got {}",
                    scalar.ty
                )));
            }
        }
        join(scalars, Type::vector(prim, scalars.len()))
    }

    /// Stack equally long vectors as the rows of a matrix.
    pub fn matrix_from_rows(rows: &[Value]) -> Result<Value, TypeError> {
        let first = rows
            .first()
            .ok_or_else(|| TypeError::new("cannot build a matrix with no rows"))?;
        let Type::Vector { prim, rows: cols } = *first.ty.value_type() else {
            return Err(TypeError::new(format!(
                "matrix rows must be vectors, got {}",
                first.ty
            )));
        };
        for row in rows {
            if *row.ty.value_type() != Type::vector(prim, cols) {
                return Err(TypeError::new(format!(
                    "matrix rows must all be {}, got {}",
                    Type::vector(prim, cols),
                    row.ty
                )));
            }
        }
        join(rows, Type::matrix(prim, rows.len(), cols))
    }

    /// A `rows × cols` matrix from its scalars in row-major order.
    pub fn matrix_from_scalars(
        scalars: &[Value],
        rows: usize,
        cols: usize,
    ) -> Result<Value, TypeError> {
        if scalars.len() != rows * cols {
            return Err(TypeError::new(format!(
                "a {rows}x{cols} matrix needs {} components, got {}",
                rows * cols,
                scalars.len()
            )));
        }
        let vector = Value::vector_from_scalars(scalars)?;
        let prim = vector
            .ty
            .value_type()
            .tensor_primitive()
            .unwrap_or(PrimitiveType::F32);
        Ok(Value {
            ty: vector.rewrap(Type::matrix(prim, rows, cols)),
            ..vector
        })
    }

    pub fn append_scalar_to_vector(vector: &Value, scalar: &Value) -> Result<Value, TypeError> {
        let mut components = vector.vector_components()?;
        components.push(scalar.clone());
        Value::vector_from_scalars(&components)
    }

    pub fn concat_vectors(lhs: &Value, rhs: &Value) -> Result<Value, TypeError> {
        let mut components = lhs.vector_components()?;
        components.extend(rhs.vector_components()?);
        Value::vector_from_scalars(&components)
    }

    /// Stack the rows of `lhs` on top of the rows of `rhs`.
    pub fn concat_matrices(lhs: &Value, rhs: &Value) -> Result<Value, TypeError> {
        let mut rows = lhs.matrix_rows()?;
        rows.extend(rhs.matrix_rows()?);
        Value::matrix_from_rows(&rows)
    }

    pub fn append_row_to_matrix(matrix: &Value, row: &Value) -> Result<Value, TypeError> {
        let mut rows = matrix.matrix_rows()?;
        rows.push(row.clone());
        Value::matrix_from_rows(&rows)
    }

    // ── Structs ─────────────────────────────────────────────────────

    pub fn make_struct(members: Vec<(String, Value)>) -> Result<Value, TypeError> {
        let mut types: Vec<(String, Type)> = Vec::with_capacity(members.len());
        for (name, value) in &members {
            if types.iter().any(|(existing, _)| existing == name) {
                return Err(TypeError::new(format!("duplicate struct member `{name}`")));
            }
            if value.is_pointer() || !value.ty.has_storage() {
                return Err(TypeError::new(format!(
                    "struct member `{name}` must be a scalar, vector, matrix or struct, got {}",
                    value.ty
                )));
            }
            types.push((name.clone(), value.ty.clone()));
        }
        let values: Vec<Value> = members.into_iter().map(|(_, value)| value).collect();
        join(&values, Type::structure(types))
    }

    /// Members of a struct (or of a pointer to one), in declaration order.
    pub fn struct_members(&self) -> Result<Vec<(String, Value)>, TypeError> {
        let Type::Struct(st) = self.ty.value_type() else {
            return Err(TypeError::new(format!("expected a struct, got {}", self.ty)));
        };
        let mut offset = 0;
        let mut members = Vec::with_capacity(st.members().len());
        for (name, ty) in st.members() {
            let len = ty.num_primitives();
            members.push((name.clone(), self.slice(ty.clone(), offset..offset + len)));
            offset += len;
        }
        Ok(members)
    }

    pub fn struct_member(&self, name: &str) -> Result<Value, TypeError> {
        self.struct_members()?
            .into_iter()
            .find_map(|(member, value)| (member == name).then_some(value))
            .ok_or_else(|| TypeError::new(format!("{} has no member `{name}`", self.ty)))
    }
}

/// Concatenate the statements of `parts` under type `value_type`. Parts must
/// agree on pointer-ness; pointers must agree on global-ness.
fn join(parts: &[Value], value_type: Type) -> Result<Value, TypeError> {
    let storage = |v: &Value| match v.ty {
        Type::Pointer { is_global, .. } => Some(is_global),
        _ => None,
    };
    let first = parts.first().map(storage).unwrap_or_default();
    if parts.iter().any(|part| storage(part) != first) {
        return Err(TypeError::new(
            "cannot mix values and references of different storage in one aggregate",
        ));
    }
    let constant = parts.iter().all(Value::is_compile_time_constant);
    let mut stmts = Vec::new();
    let mut constants = Vec::new();
    for part in parts {
        stmts.extend_from_slice(&part.stmts);
        if constant {
            constants.extend_from_slice(&part.constants);
        }
    }
    let ty = match first {
        Some(is_global) => Type::pointer(value_type, is_global),
        None => value_type,
    };
    Ok(Value {
        ty,
        stmts,
        constants,
        host: None,
    })
}

#[cfg(test)]
mod tests;
