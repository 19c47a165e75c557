//! Scalar semantics of IR operators, matching the generated WGSL.
//!
//! Integer arithmetic wraps. Integer division by zero yields the dividend
//! and the remainder by zero yields zero, as WGSL defines them. Comparisons
//! and logical operators produce `0` or `1`.

use kiln_ir::{AtomicOpType, BinaryOpType, ConstValue, UnaryOpType};
use kiln_types::PrimitiveType;

/// A 32-bit value of known type.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Scalar {
    I32(i32),
    F32(f32),
}

impl Scalar {
    pub fn zero(prim: PrimitiveType) -> Self {
        match prim {
            PrimitiveType::I32 => Scalar::I32(0),
            PrimitiveType::F32 => Scalar::F32(0.0),
        }
    }

    pub fn primitive(self) -> PrimitiveType {
        match self {
            Scalar::I32(_) => PrimitiveType::I32,
            Scalar::F32(_) => PrimitiveType::F32,
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "f32 to i32 saturates, like WGSL's i32()"
    )]
    pub fn as_i32(self) -> i32 {
        match self {
            Scalar::I32(v) => v,
            Scalar::F32(v) => v as i32,
        }
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "i32 to f32 rounds, like WGSL's f32()"
    )]
    pub fn as_f32(self) -> f32 {
        match self {
            Scalar::I32(v) => v as f32,
            Scalar::F32(v) => v,
        }
    }

    /// Value conversion to `prim`.
    pub fn cast(self, prim: PrimitiveType) -> Self {
        match prim {
            PrimitiveType::I32 => Scalar::I32(self.as_i32()),
            PrimitiveType::F32 => Scalar::F32(self.as_f32()),
        }
    }

    /// The 32-bit word stored in a buffer.
    pub fn to_word(self) -> i32 {
        match self {
            Scalar::I32(v) => v,
            Scalar::F32(v) => f32_word(v),
        }
    }

    /// Reinterpret a buffer word as `prim`.
    pub fn from_word(word: i32, prim: PrimitiveType) -> Self {
        match prim {
            PrimitiveType::I32 => Scalar::I32(word),
            PrimitiveType::F32 => Scalar::F32(word_f32(word)),
        }
    }

    pub(crate) fn is_true(self) -> bool {
        match self {
            Scalar::I32(v) => v != 0,
            Scalar::F32(v) => v != 0.0,
        }
    }
}

impl From<ConstValue> for Scalar {
    fn from(value: ConstValue) -> Self {
        match value {
            ConstValue::I32(v) => Scalar::I32(v),
            ConstValue::F32(v) => Scalar::F32(v),
        }
    }
}

/// Bits of an `f32` as a buffer word.
pub fn f32_word(value: f32) -> i32 {
    i32::from_ne_bytes(value.to_ne_bytes())
}

/// A buffer word read as `f32`.
pub fn word_f32(word: i32) -> f32 {
    f32::from_ne_bytes(word.to_ne_bytes())
}

fn flag(value: bool) -> Scalar {
    Scalar::I32(i32::from(value))
}

/// Evaluate `lhs op rhs` and convert the result to `result`.
pub fn evaluate_binary(op: BinaryOpType, lhs: Scalar, rhs: Scalar, result: PrimitiveType) -> Scalar {
    let value = match op {
        BinaryOpType::Truediv => Scalar::F32(lhs.as_f32() / rhs.as_f32()),
        BinaryOpType::Floordiv => Scalar::F32((lhs.as_f32() / rhs.as_f32()).floor()),
        BinaryOpType::Atan2 => Scalar::F32(lhs.as_f32().atan2(rhs.as_f32())),
        BinaryOpType::Pow => {
            let power = lhs.as_f32().powf(rhs.as_f32());
            match result {
                PrimitiveType::I32 => Scalar::F32(power.round()),
                PrimitiveType::F32 => Scalar::F32(power),
            }
        }
        BinaryOpType::LogicalOr => flag(lhs.is_true() || rhs.is_true()),
        BinaryOpType::LogicalAnd => flag(lhs.is_true() && rhs.is_true()),
        BinaryOpType::BitAnd => Scalar::I32(lhs.as_i32() & rhs.as_i32()),
        BinaryOpType::BitOr => Scalar::I32(lhs.as_i32() | rhs.as_i32()),
        BinaryOpType::BitXor => Scalar::I32(lhs.as_i32() ^ rhs.as_i32()),
        BinaryOpType::BitShl => Scalar::I32(lhs.as_i32().wrapping_shl(shift(rhs))),
        BinaryOpType::BitSar => Scalar::I32(lhs.as_i32().wrapping_shr(shift(rhs))),
        BinaryOpType::BitShr => {
            let bits = u32::from_ne_bytes(lhs.as_i32().to_ne_bytes()).wrapping_shr(shift(rhs));
            Scalar::I32(i32::from_ne_bytes(bits.to_ne_bytes()))
        }
        BinaryOpType::CmpLt
        | BinaryOpType::CmpLe
        | BinaryOpType::CmpGt
        | BinaryOpType::CmpGe
        | BinaryOpType::CmpEq
        | BinaryOpType::CmpNe => compare(op, lhs, rhs),
        BinaryOpType::Mul
        | BinaryOpType::Add
        | BinaryOpType::Sub
        | BinaryOpType::Div
        | BinaryOpType::Mod
        | BinaryOpType::Max
        | BinaryOpType::Min => arithmetic(op, lhs, rhs),
    };
    value.cast(result)
}

fn shift(amount: Scalar) -> u32 {
    u32::from_ne_bytes(amount.as_i32().to_ne_bytes())
}

fn compare(op: BinaryOpType, lhs: Scalar, rhs: Scalar) -> Scalar {
    let ordering = match (lhs, rhs) {
        (Scalar::I32(a), Scalar::I32(b)) => a.partial_cmp(&b),
        _ => lhs.as_f32().partial_cmp(&rhs.as_f32()),
    };
    let Some(ordering) = ordering else {
        // NaN compares unequal to everything.
        return flag(op == BinaryOpType::CmpNe);
    };
    flag(match op {
        BinaryOpType::CmpLt => ordering.is_lt(),
        BinaryOpType::CmpLe => ordering.is_le(),
        BinaryOpType::CmpGt => ordering.is_gt(),
        BinaryOpType::CmpGe => ordering.is_ge(),
        BinaryOpType::CmpEq => ordering.is_eq(),
        _ => ordering.is_ne(),
    })
}

fn arithmetic(op: BinaryOpType, lhs: Scalar, rhs: Scalar) -> Scalar {
    if let (Scalar::I32(a), Scalar::I32(b)) = (lhs, rhs) {
        return Scalar::I32(match op {
            BinaryOpType::Mul => a.wrapping_mul(b),
            BinaryOpType::Add => a.wrapping_add(b),
            BinaryOpType::Sub => a.wrapping_sub(b),
            BinaryOpType::Div => a.checked_div(b).unwrap_or(a),
            BinaryOpType::Mod => a.checked_rem(b).unwrap_or(0),
            BinaryOpType::Max => a.max(b),
            _ => a.min(b),
        });
    }
    let (a, b) = (lhs.as_f32(), rhs.as_f32());
    Scalar::F32(match op {
        BinaryOpType::Mul => a * b,
        BinaryOpType::Add => a + b,
        BinaryOpType::Sub => a - b,
        BinaryOpType::Div => a / b,
        BinaryOpType::Mod => a % b,
        BinaryOpType::Max => a.max(b),
        _ => a.min(b),
    })
}

/// Evaluate `op operand` and convert the result to `result`.
pub fn evaluate_unary(op: UnaryOpType, operand: Scalar, result: PrimitiveType) -> Scalar {
    let f = operand.as_f32();
    let value = match op {
        UnaryOpType::Neg => match operand {
            Scalar::I32(v) => Scalar::I32(v.wrapping_neg()),
            Scalar::F32(v) => Scalar::F32(-v),
        },
        UnaryOpType::Abs => match operand {
            Scalar::I32(v) => Scalar::I32(v.wrapping_abs()),
            Scalar::F32(v) => Scalar::F32(v.abs()),
        },
        UnaryOpType::Sgn => match operand {
            Scalar::I32(v) => Scalar::I32(v.signum()),
            Scalar::F32(v) if v == 0.0 => Scalar::F32(0.0),
            Scalar::F32(v) => Scalar::F32(v.signum()),
        },
        UnaryOpType::BitNot => Scalar::I32(!operand.as_i32()),
        UnaryOpType::LogicNot => flag(!operand.is_true()),
        UnaryOpType::CastI32Value => Scalar::I32(operand.as_i32()),
        UnaryOpType::CastF32Value => Scalar::F32(f),
        UnaryOpType::CastI32Bits => Scalar::I32(operand.to_word()),
        UnaryOpType::CastF32Bits => Scalar::F32(word_f32(operand.to_word())),
        UnaryOpType::Sqrt => Scalar::F32(f.sqrt()),
        // WGSL rounds half to even.
        UnaryOpType::Round => Scalar::F32(f.round_ties_even()),
        UnaryOpType::Floor => Scalar::F32(f.floor()),
        UnaryOpType::Ceil => Scalar::F32(f.ceil()),
        UnaryOpType::Sin => Scalar::F32(f.sin()),
        UnaryOpType::Asin => Scalar::F32(f.asin()),
        UnaryOpType::Cos => Scalar::F32(f.cos()),
        UnaryOpType::Acos => Scalar::F32(f.acos()),
        UnaryOpType::Tan => Scalar::F32(f.tan()),
        UnaryOpType::Tanh => Scalar::F32(f.tanh()),
        UnaryOpType::Inv | UnaryOpType::Rcp => Scalar::F32(1.0 / f),
        UnaryOpType::Exp => Scalar::F32(f.exp()),
        UnaryOpType::Log => Scalar::F32(f.ln()),
        UnaryOpType::Rsqrt => Scalar::F32(1.0 / f.sqrt()),
    };
    value.cast(result)
}

/// New memory contents after `op` with `operand`.
pub fn evaluate_atomic(op: AtomicOpType, current: Scalar, operand: Scalar) -> Scalar {
    let prim = current.primitive();
    let value = match op {
        AtomicOpType::Add => arithmetic(BinaryOpType::Add, current, operand.cast(prim)),
        AtomicOpType::Sub => arithmetic(BinaryOpType::Sub, current, operand.cast(prim)),
        AtomicOpType::Max => arithmetic(BinaryOpType::Max, current, operand.cast(prim)),
        AtomicOpType::Min => arithmetic(BinaryOpType::Min, current, operand.cast(prim)),
        AtomicOpType::BitAnd => Scalar::I32(current.as_i32() & operand.as_i32()),
        AtomicOpType::BitOr => Scalar::I32(current.as_i32() | operand.as_i32()),
        AtomicOpType::BitXor => Scalar::I32(current.as_i32() ^ operand.as_i32()),
    };
    value.cast(prim)
}
