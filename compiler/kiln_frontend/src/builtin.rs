//! Builtin operation library.
//!
//! Every operator and intrinsic a kernel can call is a [`BuiltinOp`]:
//! a name, an arity, a type check and an `apply` that emits IR into an
//! [`IrBuilder`]. Element-wise operators work per primitive and fold
//! components whose operands are all compile-time constants.
//!
//! The library is a process-wide [`Registry`] built on first use
//! ([`global_registry`]). Lookups accept bundler-renamed names (`max$1`).

mod custom;

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use kiln_ir::{AtomicOpType, BinaryOpType, IrBuilder, StmtId, StmtKind, UnaryOpType};
use kiln_types::{PrimitiveType, Type, TypeError};

use crate::host::to_int32;
use crate::value::Value;

pub use custom::{cast_value, load_value, store_value};

type CheckFn = fn(&[Value]) -> Result<(), TypeError>;
type ApplyFn = fn(&mut IrBuilder, &[Value]) -> Result<Value, TypeError>;

/// How an operation computes its result.
#[derive(Clone, Copy)]
pub enum OpKind {
    Nullary(fn(&mut IrBuilder) -> Value),
    /// Element-wise over one tensor.
    Unary(UnaryOpType),
    /// Element-wise over two tensors. A scalar operand broadcasts to the
    /// other side's shape only in the directions the operator allows.
    Binary {
        op: BinaryOpType,
        allow_lhs_broadcast: bool,
        allow_rhs_broadcast: bool,
    },
    /// Read-modify-write on the destination pointer; yields the old value.
    Atomic(AtomicOpType),
    Custom { check: CheckFn, apply: ApplyFn },
}

/// A callable operation.
#[derive(Clone, Copy)]
pub struct BuiltinOp {
    pub name: &'static str,
    pub arity: usize,
    pub kind: OpKind,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl BuiltinOp {
    const fn binary(name: &'static str, op: BinaryOpType) -> Self {
        BuiltinOp {
            name,
            arity: 2,
            kind: OpKind::Binary {
                op,
                allow_lhs_broadcast: true,
                allow_rhs_broadcast: true,
            },
        }
    }

    const fn unary(name: &'static str, op: UnaryOpType) -> Self {
        BuiltinOp {
            name,
            arity: 1,
            kind: OpKind::Unary(op),
        }
    }

    const fn atomic(name: &'static str, op: AtomicOpType) -> Self {
        BuiltinOp {
            name,
            arity: 2,
            kind: OpKind::Atomic(op),
        }
    }

    const fn custom(name: &'static str, arity: usize, check: CheckFn, apply: ApplyFn) -> Self {
        BuiltinOp {
            name,
            arity,
            kind: OpKind::Custom { check, apply },
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, OpKind::Atomic(_))
    }

    /// Whether the operation takes its first argument by reference.
    pub fn takes_destination(&self) -> bool {
        self.is_atomic() || self.name == "="
    }

    pub fn check_type(&self, args: &[Value]) -> Result<(), TypeError> {
        if args.len() != self.arity {
            return Err(TypeError::new(format!(
                "{} expects {} argument{}, got {}",
                self.name,
                self.arity,
                if self.arity == 1 { "" } else { "s" },
                args.len()
            )));
        }
        match self.kind {
            OpKind::Nullary(_) => Ok(()),
            OpKind::Unary(op) => check_unary(self.name, op, &args[0]),
            OpKind::Binary {
                op,
                allow_lhs_broadcast,
                allow_rhs_broadcast,
            } => check_binary(
                self.name,
                op,
                &args[0],
                &args[1],
                allow_lhs_broadcast,
                allow_rhs_broadcast,
            ),
            OpKind::Atomic(op) => check_atomic(self.name, op, &args[0], &args[1]),
            OpKind::Custom { check, .. } => check(args),
        }
    }

    /// Emit the operation. `args` must have passed [`check_type`](Self::check_type).
    pub fn apply(&self, builder: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
        match self.kind {
            OpKind::Nullary(f) => Ok(f(builder)),
            OpKind::Unary(op) => Ok(apply_unary(builder, op, &args[0])),
            OpKind::Binary { op, .. } => Ok(apply_binary(builder, op, &args[0], &args[1])),
            OpKind::Atomic(op) => Ok(apply_atomic(builder, op, &args[0], &args[1])),
            OpKind::Custom { apply, .. } => apply(builder, args),
        }
    }

    /// Check, then apply.
    pub fn call(&self, builder: &mut IrBuilder, args: &[Value]) -> Result<Value, TypeError> {
        self.check_type(args)?;
        self.apply(builder, args)
    }
}

// ── Registry ────────────────────────────────────────────────────────

static GLOBAL_REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Lookup table of builtin operations.
#[derive(Debug, Default)]
pub struct Registry {
    ops: FxHashMap<&'static str, BuiltinOp>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&mut self, op: BuiltinOp) {
        self.ops.insert(op.name, op);
    }

    /// Look up `name`, ignoring a bundler suffix such as `$2`.
    pub fn get(&self, name: &str) -> Option<&BuiltinOp> {
        self.ops.get(strip_rename_suffix(name))
    }

    /// Like [`get`](Self::get), but only element-wise and custom operations.
    pub fn operation(&self, name: &str) -> Option<&BuiltinOp> {
        self.get(name).filter(|op| !op.is_atomic())
    }

    pub fn atomic(&self, name: &str) -> Option<&BuiltinOp> {
        self.get(name).filter(|op| op.is_atomic())
    }

    /// The operation registered under exactly `name`.
    pub fn require(&self, name: &str) -> Result<&BuiltinOp, TypeError> {
        self.ops
            .get(name)
            .ok_or_else(|| TypeError::new(format!("no builtin operation named {name}")))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ops.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The registry with every builtin operation.
pub fn global_registry() -> &'static Registry {
    GLOBAL_REGISTRY.get_or_init(|| {
        let mut registry = Registry::new();
        register_builtins(&mut registry);
        registry
    })
}

fn strip_rename_suffix(name: &str) -> &str {
    match name.rsplit_once('$') {
        Some((base, suffix))
            if !base.is_empty()
                && !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => name,
    }
}

fn register_builtins(registry: &mut Registry) {
    use BinaryOpType as B;
    use UnaryOpType as U;

    for (name, op) in [
        ("+", B::Add),
        ("-", B::Sub),
        ("*", B::Mul),
        ("**", B::Pow),
        ("%", B::Mod),
        ("<", B::CmpLt),
        ("<=", B::CmpLe),
        (">", B::CmpGt),
        (">=", B::CmpGe),
        ("==", B::CmpEq),
        ("!=", B::CmpNe),
        ("===", B::CmpEq),
        ("!==", B::CmpNe),
        ("&", B::BitAnd),
        ("&&", B::LogicalAnd),
        ("|", B::BitOr),
        ("||", B::LogicalOr),
        ("^", B::BitXor),
        ("/", B::Truediv),
        ("div", B::Floordiv),
        ("<<", B::BitShl),
        (">>>", B::BitShr),
        (">>", B::BitSar),
        ("max", B::Max),
        ("min", B::Min),
        ("pow", B::Pow),
        ("atan2", B::Atan2),
    ] {
        registry.register(BuiltinOp::binary(name, op));
    }

    for (name, op) in [
        ("sin", U::Sin),
        ("cos", U::Cos),
        ("asin", U::Asin),
        ("acos", U::Acos),
        ("tan", U::Tan),
        ("tanh", U::Tanh),
        ("exp", U::Exp),
        ("log", U::Log),
        ("neg", U::Neg),
        ("not", U::BitNot),
        ("logical_not", U::LogicNot),
        ("abs", U::Abs),
        ("floor", U::Floor),
        ("ceil", U::Ceil),
        ("round", U::Round),
        ("sgn", U::Sgn),
        ("sqrt", U::Sqrt),
        ("rsqrt", U::Rsqrt),
        ("i32", U::CastI32Value),
        ("f32", U::CastF32Value),
        ("bitcast_f32", U::CastF32Bits),
        ("bitcast_i32", U::CastI32Bits),
    ] {
        registry.register(BuiltinOp::unary(name, op));
    }

    registry.register(BuiltinOp {
        name: "random",
        arity: 0,
        kind: OpKind::Nullary(|builder| {
            Value::scalar(builder.create_rand(PrimitiveType::F32), PrimitiveType::F32)
        }),
    });

    for (name, op) in [
        ("atomicAdd", AtomicOpType::Add),
        ("atomicSub", AtomicOpType::Sub),
        ("atomicMax", AtomicOpType::Max),
        ("atomicMin", AtomicOpType::Min),
        ("atomicAnd", AtomicOpType::BitAnd),
        ("atomicOr", AtomicOpType::BitOr),
        ("atomicXor", AtomicOpType::BitXor),
    ] {
        registry.register(BuiltinOp::atomic(name, op));
    }

    for op in custom::custom_ops() {
        registry.register(op);
    }
}

// ── Element-wise operators ──────────────────────────────────────────

fn tensor_operand(name: &str, value: &Value) -> Result<PrimitiveType, TypeError> {
    match value.ty.tensor_primitive() {
        Some(prim) => Ok(prim),
        None => Err(TypeError::new(format!(
            "{name} expects a scalar, vector or matrix, got {}",
            value.ty
        ))),
    }
}

fn check_unary(name: &str, op: UnaryOpType, operand: &Value) -> Result<(), TypeError> {
    let prim = tensor_operand(name, operand)?;
    if op.requires_integer() && prim != PrimitiveType::I32 {
        return Err(TypeError::new(format!("{name} requires an i32 operand, got {}", operand.ty)));
    }
    Ok(())
}

fn check_binary(
    name: &str,
    op: BinaryOpType,
    lhs: &Value,
    rhs: &Value,
    allow_lhs_broadcast: bool,
    allow_rhs_broadcast: bool,
) -> Result<(), TypeError> {
    let lp = tensor_operand(name, lhs)?;
    let rp = tensor_operand(name, rhs)?;
    if op.requires_integers() && (lp != PrimitiveType::I32 || rp != PrimitiveType::I32) {
        return Err(TypeError::new(format!(
            "{name} requires i32 operands, got {} and {}",
            lhs.ty, rhs.ty
        )));
    }
    let shapes_ok = lhs.ty.tensor_shape_match(&rhs.ty)
        || (allow_lhs_broadcast && matches!(lhs.ty, Type::Scalar(_)))
        || (allow_rhs_broadcast && matches!(rhs.ty, Type::Scalar(_)));
    if !shapes_ok {
        return Err(TypeError::new(format!(
            "{name}: operand shapes {} and {} do not match",
            lhs.ty, rhs.ty
        )));
    }
    Ok(())
}

fn check_atomic(name: &str, op: AtomicOpType, dest: &Value, operand: &Value) -> Result<(), TypeError> {
    let Some(pointee) = dest.ty.pointee().filter(|ty| ty.is_tensor()) else {
        return Err(TypeError::new(format!(
            "{name}: destination must be a reference to a scalar, vector or matrix, got {}",
            dest.ty
        )));
    };
    let operand_prim = tensor_operand(name, operand)?;
    let dest_prim = pointee.tensor_primitive().unwrap_or(PrimitiveType::I32);
    if dest_prim == PrimitiveType::I32 && operand_prim == PrimitiveType::F32 {
        return Err(TypeError::new(format!(
            "{name}: cannot apply an f32 operand to an i32 destination"
        )));
    }
    if op.is_bitwise() && dest_prim == PrimitiveType::F32 {
        return Err(TypeError::new(format!("{name} requires an i32 destination")));
    }
    if !pointee.tensor_shape_match(&operand.ty) && !matches!(operand.ty, Type::Scalar(_)) {
        return Err(TypeError::new(format!(
            "{name}: destination {pointee} and operand {} do not match",
            operand.ty
        )));
    }
    Ok(())
}

/// Component `i` of `value`, repeating a scalar.
fn component(value: &Value, i: usize) -> (StmtId, Option<f64>) {
    let j = if value.stmts.len() == 1 { 0 } else { i };
    (value.stmts[j], value.constants.get(j).copied())
}

/// Turn a folded `f64` into the constant an IR statement of `prim` would
/// hold. `None` when the result is not representable.
#[allow(clippy::cast_possible_truncation)]
fn normalize(prim: PrimitiveType, value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    match prim {
        PrimitiveType::I32 => Some(f64::from(to_int32(value))),
        PrimitiveType::F32 => {
            let narrowed = value as f32;
            narrowed.is_finite().then_some(f64::from(narrowed))
        }
    }
}

fn bool_to_f64(b: bool) -> f64 {
    f64::from(u8::from(b))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fold_binary(op: BinaryOpType, l: f64, r: f64, lp: PrimitiveType, rp: PrimitiveType) -> Option<f64> {
    use BinaryOpType as B;
    let ints = lp == PrimitiveType::I32 && rp == PrimitiveType::I32;
    let (li, ri) = (to_int32(l), to_int32(r));
    let value = match op {
        B::Add if ints => f64::from(li.wrapping_add(ri)),
        B::Sub if ints => f64::from(li.wrapping_sub(ri)),
        B::Mul if ints => f64::from(li.wrapping_mul(ri)),
        B::Div | B::Mod if ints && ri == 0 => return None,
        B::Div if ints => f64::from(li.wrapping_div(ri)),
        B::Mod if ints => f64::from(li.wrapping_rem(ri)),
        B::Add => l + r,
        B::Sub => l - r,
        B::Mul => l * r,
        B::Div => l / r,
        B::Mod => l % r,
        B::Truediv => f64::from(l as f32 / r as f32),
        B::Floordiv => f64::from((l as f32 / r as f32).floor()),
        B::Max => l.max(r),
        B::Min => l.min(r),
        B::BitAnd => f64::from(li & ri),
        B::BitOr => f64::from(li | ri),
        B::BitXor => f64::from(li ^ ri),
        B::BitShl => f64::from(li.wrapping_shl(ri as u32 & 31)),
        B::BitShr => f64::from(((li as u32) >> (ri as u32 & 31)) as i32),
        B::BitSar => f64::from(li.wrapping_shr(ri as u32 & 31)),
        B::CmpLt => bool_to_f64(l < r),
        B::CmpLe => bool_to_f64(l <= r),
        B::CmpGt => bool_to_f64(l > r),
        B::CmpGe => bool_to_f64(l >= r),
        B::CmpEq => bool_to_f64(l == r),
        B::CmpNe => bool_to_f64(l != r),
        B::Atan2 => l.atan2(r),
        B::Pow => l.powf(r),
        B::LogicalOr => bool_to_f64(li != 0 || ri != 0),
        B::LogicalAnd => bool_to_f64(li != 0 && ri != 0),
    };
    normalize(op.result_type(lp, rp), value)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fold_unary(op: UnaryOpType, x: f64, prim: PrimitiveType) -> Option<f64> {
    use UnaryOpType as U;
    let value = match op {
        U::Neg if prim == PrimitiveType::I32 => f64::from(to_int32(x).wrapping_neg()),
        U::Neg => -x,
        U::Sqrt => x.sqrt(),
        U::Round => x.round_ties_even(),
        U::Floor => x.floor(),
        U::Ceil => x.ceil(),
        U::CastI32Value => x.trunc(),
        U::CastF32Value => x,
        U::CastI32Bits => f64::from((x as f32).to_bits() as i32),
        U::CastF32Bits => f64::from(f32::from_bits(to_int32(x) as u32)),
        U::Abs => x.abs(),
        U::Sgn => {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        U::Sin => x.sin(),
        U::Asin => x.asin(),
        U::Cos => x.cos(),
        U::Acos => x.acos(),
        U::Tan => x.tan(),
        U::Tanh => x.tanh(),
        U::Inv | U::Rcp => 1.0 / x,
        U::Exp => x.exp(),
        U::Log => x.ln(),
        U::Rsqrt => 1.0 / x.sqrt(),
        U::BitNot => f64::from(!to_int32(x)),
        U::LogicNot => bool_to_f64(to_int32(x) == 0),
    };
    normalize(op.result_type(prim), value)
}

/// Build the result value, keeping constants when every component folded.
fn assemble(ty: Type, stmts: Vec<StmtId>, constants: Vec<Option<f64>>) -> Value {
    match constants.into_iter().collect::<Option<Vec<f64>>>() {
        Some(constants) if !stmts.is_empty() => Value::constant(ty, stmts, constants),
        _ => Value::new(ty, stmts),
    }
}

/// Element-wise binary operation. Operands must have passed the binary
/// type check.
pub fn apply_binary(builder: &mut IrBuilder, op: BinaryOpType, lhs: &Value, rhs: &Value) -> Value {
    let lp = lhs.ty.tensor_primitive().unwrap_or(PrimitiveType::I32);
    let rp = rhs.ty.tensor_primitive().unwrap_or(PrimitiveType::I32);
    let result_prim = op.result_type(lp, rp);
    let shape = if matches!(lhs.ty, Type::Scalar(_)) { &rhs.ty } else { &lhs.ty };
    let ty = shape.with_primitive(result_prim);
    let n = lhs.stmts.len().max(rhs.stmts.len());

    let mut stmts = Vec::with_capacity(n);
    let mut constants = Vec::with_capacity(n);
    for i in 0..n {
        let (l, lc) = component(lhs, i);
        let (r, rc) = component(rhs, i);
        let folded = lc.zip(rc).and_then(|(lc, rc)| fold_binary(op, lc, rc, lp, rp));
        let stmt = match folded {
            Some(value) => builder.create_constant(result_prim, value),
            None => builder.create_binary(op, l, r),
        };
        stmts.push(stmt);
        constants.push(folded);
    }
    assemble(ty, stmts, constants)
}

/// Element-wise unary operation.
pub fn apply_unary(builder: &mut IrBuilder, op: UnaryOpType, operand: &Value) -> Value {
    let prim = operand.ty.tensor_primitive().unwrap_or(PrimitiveType::I32);
    let result_prim = op.result_type(prim);
    let ty = operand.ty.with_primitive(result_prim);

    let mut stmts = Vec::with_capacity(operand.stmts.len());
    let mut constants = Vec::with_capacity(operand.stmts.len());
    for i in 0..operand.stmts.len() {
        let (x, xc) = component(operand, i);
        let folded = xc.and_then(|xc| fold_unary(op, xc, prim));
        let stmt = match folded {
            Some(value) => builder.create_constant(result_prim, value),
            None => builder.create_unary(op, x),
        };
        stmts.push(stmt);
        constants.push(folded);
    }
    assemble(ty, stmts, constants)
}

fn apply_atomic(builder: &mut IrBuilder, op: AtomicOpType, dest: &Value, operand: &Value) -> Value {
    let pointee = dest.ty.value_type().clone();
    let dest_prim = pointee.tensor_primitive().unwrap_or(PrimitiveType::I32);
    let operand = cast_value(builder, operand, dest_prim);
    let stmts = dest
        .stmts
        .iter()
        .enumerate()
        .map(|(i, &ptr)| {
            let (value, _) = component(&operand, i);
            builder.create_atomic_op(op, ptr, value)
        })
        .collect();
    Value::new(pointee, stmts)
}

/// Store kind used for the address `ptr`.
fn address_kind(builder: &IrBuilder, ptr: StmtId) -> Address {
    match builder.module().kind(ptr) {
        StmtKind::GlobalPtr { .. } => Address::Global,
        StmtKind::GlobalTemporary { .. } => Address::GlobalTemporary,
        _ => Address::Local,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Address {
    Local,
    Global,
    GlobalTemporary,
}
