//! The kernel type lattice.
//!
//! [`Type`] is a closed enum: every consumer matches exhaustively, so adding a
//! kind is a compile error everywhere it needs handling.

use std::fmt;

use serde::Serialize;

/// One of the two machine primitives a kernel value is made of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    I32,
    F32,
}

impl PrimitiveType {
    /// WGSL spelling of the primitive.
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveType::I32 => "i32",
            PrimitiveType::F32 => "f32",
        }
    }

    /// Storage size in bytes. Both primitives occupy one 32-bit word.
    #[inline]
    pub fn size_bytes(self) -> u32 {
        4
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`Type`] without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Scalar,
    Vector,
    Matrix,
    Struct,
    Pointer,
    Void,
    Function,
    HostObjectReference,
}

/// An ordered `name → type` record.
///
/// Member order is significant: it fixes the flattening order and takes part
/// in equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct StructType {
    members: Vec<(String, Type)>,
}

impl StructType {
    pub fn new(members: Vec<(String, Type)>) -> Self {
        StructType { members }
    }

    pub fn members(&self) -> &[(String, Type)] {
        &self.members
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    pub fn member(&self, name: &str) -> Option<&Type> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, ty)| ty)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    /// Offset of `name`, counted in primitives from the start of the record.
    pub fn member_offset(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for (member, ty) in &self.members {
            if member == name {
                return Some(offset);
            }
            offset += ty.num_primitives();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A kernel type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Scalar(PrimitiveType),
    Vector {
        prim: PrimitiveType,
        rows: usize,
    },
    /// Row-major `rows × cols` matrix.
    Matrix {
        prim: PrimitiveType,
        rows: usize,
        cols: usize,
    },
    Struct(StructType),
    /// An l-value. `is_global` distinguishes field elements from locals.
    Pointer {
        value: Box<Type>,
        is_global: bool,
    },
    Void,
    /// A kernel-side reference to a function that will be inlined at its
    /// call sites.
    Function,
    /// A value that only exists on the host (fields, textures, plain
    /// objects). `is_static` marks references produced by `static(...)`.
    HostObjectReference {
        is_static: bool,
    },
}

impl Type {
    pub const I32: Type = Type::Scalar(PrimitiveType::I32);
    pub const F32: Type = Type::Scalar(PrimitiveType::F32);

    pub fn scalar(prim: PrimitiveType) -> Self {
        Type::Scalar(prim)
    }

    pub fn vector(prim: PrimitiveType, rows: usize) -> Self {
        Type::Vector { prim, rows }
    }

    pub fn matrix(prim: PrimitiveType, rows: usize, cols: usize) -> Self {
        Type::Matrix { prim, rows, cols }
    }

    pub fn pointer(value: Type, is_global: bool) -> Self {
        Type::Pointer {
            value: Box::new(value),
            is_global,
        }
    }

    pub fn structure(members: Vec<(String, Type)>) -> Self {
        Type::Struct(StructType::new(members))
    }

    pub fn host_object() -> Self {
        Type::HostObjectReference { is_static: false }
    }

    pub fn category(&self) -> TypeCategory {
        match self {
            Type::Scalar(_) => TypeCategory::Scalar,
            Type::Vector { .. } => TypeCategory::Vector,
            Type::Matrix { .. } => TypeCategory::Matrix,
            Type::Struct(_) => TypeCategory::Struct,
            Type::Pointer { .. } => TypeCategory::Pointer,
            Type::Void => TypeCategory::Void,
            Type::Function => TypeCategory::Function,
            Type::HostObjectReference { .. } => TypeCategory::HostObjectReference,
        }
    }

    /// Flatten to primitives.
    ///
    /// Pointers flatten to their pointee (a pointer value holds one address
    /// statement per pointee primitive). `Void`, `Function` and host objects
    /// have no primitives.
    pub fn primitives(&self) -> Vec<PrimitiveType> {
        let mut out = Vec::with_capacity(self.num_primitives());
        self.push_primitives(&mut out);
        out
    }

    fn push_primitives(&self, out: &mut Vec<PrimitiveType>) {
        match self {
            Type::Scalar(prim) => out.push(*prim),
            Type::Vector { prim, rows } => out.extend(std::iter::repeat(*prim).take(*rows)),
            Type::Matrix { prim, rows, cols } => {
                out.extend(std::iter::repeat(*prim).take(rows * cols));
            }
            Type::Struct(st) => {
                for (_, member) in &st.members {
                    member.push_primitives(out);
                }
            }
            Type::Pointer { value, .. } => value.push_primitives(out),
            Type::Void | Type::Function | Type::HostObjectReference { .. } => {}
        }
    }

    pub fn num_primitives(&self) -> usize {
        match self {
            Type::Scalar(_) => 1,
            Type::Vector { rows, .. } => *rows,
            Type::Matrix { rows, cols, .. } => rows * cols,
            Type::Struct(st) => st.members.iter().map(|(_, ty)| ty.num_primitives()).sum(),
            Type::Pointer { value, .. } => value.num_primitives(),
            Type::Void | Type::Function | Type::HostObjectReference { .. } => 0,
        }
    }

    /// Scalars, vectors and matrices.
    pub fn is_tensor(&self) -> bool {
        matches!(
            self,
            Type::Scalar(_) | Type::Vector { .. } | Type::Matrix { .. }
        )
    }

    /// The element primitive of a tensor type.
    pub fn tensor_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Type::Scalar(prim) | Type::Vector { prim, .. } | Type::Matrix { prim, .. } => {
                Some(*prim)
            }
            _ => None,
        }
    }

    /// Same category and dimensions, primitives ignored. False for
    /// non-tensor operands.
    pub fn tensor_shape_match(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Scalar(_), Type::Scalar(_)) => true,
            (Type::Vector { rows: a, .. }, Type::Vector { rows: b, .. }) => a == b,
            (
                Type::Matrix {
                    rows: r0, cols: c0, ..
                },
                Type::Matrix {
                    rows: r1, cols: c1, ..
                },
            ) => r0 == r1 && c0 == c1,
            _ => false,
        }
    }

    /// Replace the element primitive of a tensor type. Structs are rewritten
    /// member-wise; other kinds are returned unchanged.
    #[must_use]
    pub fn with_primitive(&self, prim: PrimitiveType) -> Type {
        match self {
            Type::Scalar(_) => Type::Scalar(prim),
            Type::Vector { rows, .. } => Type::vector(prim, *rows),
            Type::Matrix { rows, cols, .. } => Type::matrix(prim, *rows, *cols),
            Type::Struct(st) => Type::Struct(StructType::new(
                st.members
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.with_primitive(prim)))
                    .collect(),
            )),
            other => other.clone(),
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn is_global_pointer(&self) -> bool {
        matches!(
            self,
            Type::Pointer {
                is_global: true,
                ..
            }
        )
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The pointee for pointers, `self` otherwise.
    pub fn value_type(&self) -> &Type {
        match self {
            Type::Pointer { value, .. } => value,
            other => other,
        }
    }

    pub fn is_value_or_pointer_of(&self, category: TypeCategory) -> bool {
        self.value_type().category() == category
    }

    pub fn is_value_or_pointer_of_tensor(&self) -> bool {
        self.value_type().is_tensor()
    }

    /// Types that occupy kernel storage (i.e. can be assigned, loaded, passed
    /// as arguments).
    pub fn has_storage(&self) -> bool {
        match self {
            Type::Scalar(_) | Type::Vector { .. } | Type::Matrix { .. } => true,
            Type::Struct(st) => st.members.iter().all(|(_, ty)| ty.has_storage()),
            _ => false,
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Type::Struct(st) => Some(st),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Scalar(prim) => write!(f, "{prim}"),
            Type::Vector { prim, rows } => write!(f, "vec{rows}<{prim}>"),
            Type::Matrix { prim, rows, cols } => write!(f, "mat{rows}x{cols}<{prim}>"),
            Type::Struct(st) => {
                f.write_str("struct{")?;
                for (i, (name, ty)) in st.members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                f.write_str("}")
            }
            Type::Pointer { value, is_global } => {
                let space = if *is_global { "global" } else { "local" };
                write!(f, "ptr<{space}, {value}>")
            }
            Type::Void => f.write_str("void"),
            Type::Function => f.write_str("function"),
            Type::HostObjectReference { is_static } => {
                if *is_static {
                    f.write_str("static host")
                } else {
                    f.write_str("host")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
