//! Operator enums and their result-type rules.

use std::fmt;

use kiln_types::PrimitiveType;

/// Binary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOpType {
    Mul,
    Add,
    Sub,
    /// Division producing `f32` regardless of operand types.
    Truediv,
    /// Division rounding toward negative infinity, producing `i32`.
    Floordiv,
    /// Division in the operand type.
    Div,
    Mod,
    Max,
    Min,
    BitAnd,
    BitOr,
    BitXor,
    BitShl,
    /// Logical (unsigned) shift right.
    BitShr,
    /// Arithmetic shift right.
    BitSar,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
    CmpEq,
    CmpNe,
    Atan2,
    Pow,
    LogicalOr,
    LogicalAnd,
}

impl BinaryOpType {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOpType::Mul => "mul",
            BinaryOpType::Add => "add",
            BinaryOpType::Sub => "sub",
            BinaryOpType::Truediv => "truediv",
            BinaryOpType::Floordiv => "floordiv",
            BinaryOpType::Div => "div",
            BinaryOpType::Mod => "mod",
            BinaryOpType::Max => "max",
            BinaryOpType::Min => "min",
            BinaryOpType::BitAnd => "bit_and",
            BinaryOpType::BitOr => "bit_or",
            BinaryOpType::BitXor => "bit_xor",
            BinaryOpType::BitShl => "bit_shl",
            BinaryOpType::BitShr => "bit_shr",
            BinaryOpType::BitSar => "bit_sar",
            BinaryOpType::CmpLt => "cmp_lt",
            BinaryOpType::CmpLe => "cmp_le",
            BinaryOpType::CmpGt => "cmp_gt",
            BinaryOpType::CmpGe => "cmp_ge",
            BinaryOpType::CmpEq => "cmp_eq",
            BinaryOpType::CmpNe => "cmp_ne",
            BinaryOpType::Atan2 => "atan2",
            BinaryOpType::Pow => "pow",
            BinaryOpType::LogicalOr => "logical_or",
            BinaryOpType::LogicalAnd => "logical_and",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOpType::CmpLt
                | BinaryOpType::CmpLe
                | BinaryOpType::CmpGt
                | BinaryOpType::CmpGe
                | BinaryOpType::CmpEq
                | BinaryOpType::CmpNe
        )
    }

    /// Bitwise and logical operators, which only accept `i32` operands.
    pub fn requires_integers(self) -> bool {
        matches!(
            self,
            BinaryOpType::BitAnd
                | BinaryOpType::BitOr
                | BinaryOpType::BitXor
                | BinaryOpType::BitShl
                | BinaryOpType::BitShr
                | BinaryOpType::BitSar
                | BinaryOpType::LogicalAnd
                | BinaryOpType::LogicalOr
        )
    }

    /// Result primitive for operands of the given primitives.
    ///
    /// Comparisons produce `i32`, `truediv` and `atan2` produce `f32`,
    /// `floordiv` produces `i32`. Everything else keeps a shared operand
    /// type and promotes a mixed pair to `f32`, so `i32 ** i32` is `i32`.
    pub fn result_type(self, lhs: PrimitiveType, rhs: PrimitiveType) -> PrimitiveType {
        if self.is_comparison() || self.requires_integers() {
            return PrimitiveType::I32;
        }
        match self {
            BinaryOpType::Truediv | BinaryOpType::Atan2 => PrimitiveType::F32,
            BinaryOpType::Floordiv => PrimitiveType::I32,
            _ if lhs == rhs => lhs,
            _ => PrimitiveType::F32,
        }
    }
}

impl fmt::Display for BinaryOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOpType {
    Neg,
    Sqrt,
    Round,
    Floor,
    Ceil,
    CastI32Value,
    CastF32Value,
    /// Reinterpret the bits as `i32`.
    CastI32Bits,
    /// Reinterpret the bits as `f32`.
    CastF32Bits,
    Abs,
    Sgn,
    Sin,
    Asin,
    Cos,
    Acos,
    Tan,
    Tanh,
    Inv,
    Rcp,
    Exp,
    Log,
    Rsqrt,
    BitNot,
    LogicNot,
}

impl UnaryOpType {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOpType::Neg => "neg",
            UnaryOpType::Sqrt => "sqrt",
            UnaryOpType::Round => "round",
            UnaryOpType::Floor => "floor",
            UnaryOpType::Ceil => "ceil",
            UnaryOpType::CastI32Value => "cast_i32_value",
            UnaryOpType::CastF32Value => "cast_f32_value",
            UnaryOpType::CastI32Bits => "cast_i32_bits",
            UnaryOpType::CastF32Bits => "cast_f32_bits",
            UnaryOpType::Abs => "abs",
            UnaryOpType::Sgn => "sgn",
            UnaryOpType::Sin => "sin",
            UnaryOpType::Asin => "asin",
            UnaryOpType::Cos => "cos",
            UnaryOpType::Acos => "acos",
            UnaryOpType::Tan => "tan",
            UnaryOpType::Tanh => "tanh",
            UnaryOpType::Inv => "inv",
            UnaryOpType::Rcp => "rcp",
            UnaryOpType::Exp => "exp",
            UnaryOpType::Log => "log",
            UnaryOpType::Rsqrt => "rsqrt",
            UnaryOpType::BitNot => "bit_not",
            UnaryOpType::LogicNot => "logic_not",
        }
    }

    pub fn requires_integer(self) -> bool {
        matches!(self, UnaryOpType::BitNot | UnaryOpType::LogicNot)
    }

    /// Result primitive for an operand of primitive `operand`.
    pub fn result_type(self, operand: PrimitiveType) -> PrimitiveType {
        match self {
            UnaryOpType::Round
            | UnaryOpType::Floor
            | UnaryOpType::Ceil
            | UnaryOpType::CastI32Value
            | UnaryOpType::CastI32Bits
            | UnaryOpType::Sgn
            | UnaryOpType::BitNot
            | UnaryOpType::LogicNot => PrimitiveType::I32,
            UnaryOpType::Abs | UnaryOpType::Neg => operand,
            _ => PrimitiveType::F32,
        }
    }
}

impl fmt::Display for UnaryOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-modify-write atomics. All return the previous value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AtomicOpType {
    Add,
    Sub,
    Max,
    Min,
    BitAnd,
    BitOr,
    BitXor,
}

impl AtomicOpType {
    pub fn as_str(self) -> &'static str {
        match self {
            AtomicOpType::Add => "add",
            AtomicOpType::Sub => "sub",
            AtomicOpType::Max => "max",
            AtomicOpType::Min => "min",
            AtomicOpType::BitAnd => "bit_and",
            AtomicOpType::BitOr => "bit_or",
            AtomicOpType::BitXor => "bit_xor",
        }
    }

    /// The binary operator computing the new value from old and operand.
    pub fn binary_op(self) -> BinaryOpType {
        match self {
            AtomicOpType::Add => BinaryOpType::Add,
            AtomicOpType::Sub => BinaryOpType::Sub,
            AtomicOpType::Max => BinaryOpType::Max,
            AtomicOpType::Min => BinaryOpType::Min,
            AtomicOpType::BitAnd => BinaryOpType::BitAnd,
            AtomicOpType::BitOr => BinaryOpType::BitOr,
            AtomicOpType::BitXor => BinaryOpType::BitXor,
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            AtomicOpType::BitAnd | AtomicOpType::BitOr | AtomicOpType::BitXor
        )
    }
}

impl fmt::Display for AtomicOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builtin values a graphics stage writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BuiltInOutputKind {
    Position,
    /// Color attachment at `location`.
    Color(u32),
    FragDepth,
}

/// Builtin values a vertex stage reads.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BuiltInInputKind {
    VertexIndex,
    InstanceIndex,
}

/// Screen-space derivative direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DerivativeDirection {
    X,
    Y,
}

/// Texture access flavour.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFunctionKind {
    Sample,
    /// Sample at an explicit level of detail (one extra operand).
    SampleLod,
    Load,
    /// Write a texel (four extra operands: the `vec4<f32>` value).
    Store,
}

impl TextureFunctionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TextureFunctionKind::Sample => "sample",
            TextureFunctionKind::SampleLod => "sample_lod",
            TextureFunctionKind::Load => "load",
            TextureFunctionKind::Store => "store",
        }
    }

    /// Result primitive; stores produce nothing.
    pub fn result_type(self) -> Option<PrimitiveType> {
        match self {
            TextureFunctionKind::Sample
            | TextureFunctionKind::SampleLod
            | TextureFunctionKind::Load => Some(PrimitiveType::F32),
            TextureFunctionKind::Store => None,
        }
    }
}
