//! Per-statement emission.

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{
    AtomicOpType, BinaryOpType, Block, BlockSlot, BuiltInInputKind, BuiltInOutputKind,
    ConstValue, DerivativeDirection, Field, StmtId, StmtKind, Texture, TextureFunctionKind,
    UnaryOpType,
};
use kiln_types::PrimitiveType;

use super::WgslGenerator;
use crate::resource::{ResourceInfo, ResourceType};

/// WGSL literal for an `f32`: the shortest decimal that parses back to the
/// same bits, exponent form for very large or very small magnitudes, always
/// with the `f` suffix.
pub fn f32_literal(value: f32) -> String {
    if !value.is_finite() {
        return format!("bitcast<f32>({}u)", value.to_bits());
    }
    if value == 0.0 {
        return "0.0f".to_owned();
    }
    let magnitude = value.abs();
    let mut text = if (1e-6..1e8).contains(&magnitude) {
        format!("{value}")
    } else {
        format!("{value:e}")
    };
    if !text.contains(['.', 'e']) {
        text.push_str(".0");
    }
    text.push('f');
    text
}

fn vector_type_name(prim: PrimitiveType, components: usize) -> String {
    if components > 1 {
        format!("vec{components}<{prim}>")
    } else {
        prim.as_str().to_owned()
    }
}

fn component_suffix(index: usize) -> Option<&'static str> {
    match index {
        0 => Some("x"),
        1 => Some("y"),
        2 => Some("z"),
        3 => Some("w"),
        _ => None,
    }
}

fn atomic_i32_function(op: AtomicOpType) -> &'static str {
    match op {
        AtomicOpType::Add => "atomicAdd",
        AtomicOpType::Sub => "atomicSub",
        AtomicOpType::Max => "atomicMax",
        AtomicOpType::Min => "atomicMin",
        AtomicOpType::BitAnd => "atomicAnd",
        AtomicOpType::BitOr => "atomicOr",
        AtomicOpType::BitXor => "atomicXor",
    }
}

/// Expression computing a unary op. The caller converts the result to the
/// statement's type.
pub(super) fn unary_expr(op: UnaryOpType, operand: &str, operand_type: PrimitiveType) -> String {
    match op {
        UnaryOpType::Neg => format!("(-({operand}))"),
        UnaryOpType::Sqrt => format!("sqrt(f32({operand}))"),
        UnaryOpType::Round => format!("round(f32({operand}))"),
        UnaryOpType::Floor => format!("floor(f32({operand}))"),
        UnaryOpType::Ceil => format!("ceil(f32({operand}))"),
        UnaryOpType::CastI32Value => format!("i32({operand})"),
        UnaryOpType::CastF32Value => format!("f32({operand})"),
        UnaryOpType::CastI32Bits => format!("bitcast<i32>({operand})"),
        UnaryOpType::CastF32Bits => format!("bitcast<f32>({operand})"),
        UnaryOpType::Abs => format!("abs({operand})"),
        UnaryOpType::Sgn => format!("sign({operand})"),
        UnaryOpType::Sin => format!("sin(f32({operand}))"),
        UnaryOpType::Asin => format!("asin(f32({operand}))"),
        UnaryOpType::Cos => format!("cos(f32({operand}))"),
        UnaryOpType::Acos => format!("acos(f32({operand}))"),
        UnaryOpType::Tan => format!("tan(f32({operand}))"),
        UnaryOpType::Tanh => format!("tanh(f32({operand}))"),
        UnaryOpType::Inv | UnaryOpType::Rcp => format!("1.0f / f32({operand})"),
        UnaryOpType::Exp => format!("exp(f32({operand}))"),
        UnaryOpType::Log => format!("log(f32({operand}))"),
        UnaryOpType::Rsqrt => format!("inverseSqrt(f32({operand}))"),
        UnaryOpType::BitNot => format!("(~({operand}))"),
        UnaryOpType::LogicNot => {
            let zero = match operand_type {
                PrimitiveType::I32 => "0",
                PrimitiveType::F32 => "0.0f",
            };
            format!("i32({operand} == {zero})")
        }
    }
}

/// Expression computing a binary op whose result has type `result`. The
/// caller converts the result to the statement's type.
pub(super) fn binary_expr(op: BinaryOpType, lhs: &str, rhs: &str, result: PrimitiveType) -> String {
    match op {
        BinaryOpType::Mul => format!("({lhs} * {rhs})"),
        BinaryOpType::Add => format!("({lhs} + {rhs})"),
        BinaryOpType::Sub => format!("({lhs} - {rhs})"),
        BinaryOpType::Truediv => format!("(f32({lhs}) / f32({rhs}))"),
        BinaryOpType::Floordiv => format!("floor(f32({lhs}) / f32({rhs}))"),
        BinaryOpType::Div => format!("({lhs} / {rhs})"),
        BinaryOpType::Mod => format!("({lhs} % {rhs})"),
        BinaryOpType::Max => format!("max({lhs}, {rhs})"),
        BinaryOpType::Min => format!("min({lhs}, {rhs})"),
        BinaryOpType::BitAnd => format!("({lhs} & {rhs})"),
        BinaryOpType::BitOr => format!("({lhs} | {rhs})"),
        BinaryOpType::BitXor => format!("({lhs} ^ {rhs})"),
        BinaryOpType::BitShl => format!("({lhs} << u32({rhs}))"),
        BinaryOpType::BitShr => format!("(u32({lhs}) >> u32({rhs}))"),
        BinaryOpType::BitSar => format!("({lhs} >> u32({rhs}))"),
        BinaryOpType::CmpLt => format!("({lhs} < {rhs})"),
        BinaryOpType::CmpLe => format!("({lhs} <= {rhs})"),
        BinaryOpType::CmpGt => format!("({lhs} > {rhs})"),
        BinaryOpType::CmpGe => format!("({lhs} >= {rhs})"),
        BinaryOpType::CmpEq => format!("({lhs} == {rhs})"),
        BinaryOpType::CmpNe => format!("({lhs} != {rhs})"),
        BinaryOpType::Atan2 => format!("atan2(f32({lhs}), f32({rhs}))"),
        BinaryOpType::Pow => match result {
            PrimitiveType::I32 => format!("round(pow(f32({lhs}), f32({rhs})))"),
            PrimitiveType::F32 => format!("pow(f32({lhs}), f32({rhs}))"),
        },
        BinaryOpType::LogicalOr => format!("(({lhs} != 0) || ({rhs} != 0))"),
        BinaryOpType::LogicalAnd => format!("(({lhs} != 0) && ({rhs} != 0))"),
    }
}

impl WgslGenerator<'_> {
    fn name(&self, id: StmtId) -> String {
        self.module.stmt_name(id)
    }

    fn operand(&self, id: StmtId, index: usize) -> CompileResult<StmtId> {
        self.module.stmt(id).operand(index).ok_or_else(|| {
            CompileError::internal(format!(
                "{} statement {} is missing operand {index}",
                self.module.kind(id).name(),
                id.raw()
            ))
        })
    }

    fn value_type(&self, id: StmtId) -> CompileResult<PrimitiveType> {
        self.module.return_type(id).ok_or_else(|| {
            CompileError::internal(format!(
                "{} statement {} has no value type",
                self.module.kind(id).name(),
                id.raw()
            ))
        })
    }

    /// `values` as one expression of `prim` components: a scalar, or a
    /// `vecN` constructor. Components of the other primitive are converted.
    fn vector_expr(&self, values: &[StmtId], prim: PrimitiveType) -> CompileResult<String> {
        let mut components = Vec::with_capacity(values.len());
        for &value in values {
            let name = self.name(value);
            if self.value_type(value)? == prim {
                components.push(name);
            } else {
                components.push(format!("{prim}({name})"));
            }
        }
        if components.len() == 1 {
            return Ok(components.swap_remove(0));
        }
        Ok(format!(
            "{}({})",
            vector_type_name(prim, components.len()),
            components.join(", ")
        ))
    }

    pub(super) fn emit_block(&mut self, block: &Block) -> CompileResult<()> {
        for &id in &block.stmts {
            self.emit_stmt(id)?;
        }
        Ok(())
    }

    fn emit_nested(&mut self, slot: BlockSlot) -> CompileResult<()> {
        let module = self.module;
        let block = module
            .block(slot)
            .ok_or_else(|| CompileError::internal(format!("missing block {slot:?}")))?;
        self.indent += 1;
        let result = self.emit_block(block);
        self.indent -= 1;
        result
    }

    fn emit_stmt(&mut self, id: StmtId) -> CompileResult<()> {
        let module = self.module;
        let stmt = module.stmt(id);
        let name = stmt.name();
        match &stmt.kind {
            StmtKind::Const(value) => {
                let (ty, text) = match *value {
                    ConstValue::I32(v) => ("i32", v.to_string()),
                    ConstValue::F32(v) => ("f32", f32_literal(v)),
                };
                self.emit_let(&name, ty, &text);
            }

            // ── Arithmetic ──
            StmtKind::Binary(op) => {
                let lhs = self.operand(id, 0)?;
                let rhs = self.operand(id, 1)?;
                let ty = self.value_type(id)?;
                let value = binary_expr(*op, &self.name(lhs), &self.name(rhs), ty);
                self.emit_let(&name, ty.as_str(), &format!("{ty}({value})"));
            }
            StmtKind::Unary(op) => {
                let operand = self.operand(id, 0)?;
                let ty = self.value_type(id)?;
                let value = unary_expr(*op, &self.name(operand), self.value_type(operand)?);
                self.emit_let(&name, ty.as_str(), &format!("{ty}({value})"));
            }

            // ── Control flow ──
            StmtKind::RangeFor { .. } => {
                let range = self.operand(id, 0)?;
                self.emit_line(&format!("var {name} : i32 = 0;"));
                self.emit_line("loop {");
                self.indent += 1;
                self.emit_line(&format!(
                    "if ({name} >= {}) {{ break; }}",
                    self.name(range)
                ));
                self.indent -= 1;
                self.emit_nested(BlockSlot::Body(id))?;
                self.indent += 1;
                self.emit_line(&format!("continuing {{ {name} = {name} + 1; }}"));
                self.indent -= 1;
                self.emit_line("}");
            }
            StmtKind::LoopIndex => {
                let loop_stmt = self.operand(id, 0)?;
                let index = if Some(loop_stmt) == self.offloaded.loop_stmt {
                    "ii".to_owned()
                } else {
                    self.name(loop_stmt)
                };
                self.emit_let(&name, "i32", &index);
            }
            StmtKind::While { .. } => {
                self.emit_line("loop {");
                self.emit_nested(BlockSlot::Body(id))?;
                self.emit_line("}");
            }
            StmtKind::If {
                else_block: otherwise,
                ..
            } => {
                let cond = self.operand(id, 0)?;
                self.emit_line(&format!("if (bool({})) {{", self.name(cond)));
                self.emit_nested(BlockSlot::Then(id))?;
                if !otherwise.is_empty() {
                    self.emit_line("} else {");
                    self.emit_nested(BlockSlot::Else(id))?;
                }
                self.emit_line("}");
            }
            StmtKind::Break => self.emit_line("break;"),
            StmtKind::Continue => self.emit_line("continue;"),
            StmtKind::VertexFor { .. } | StmtKind::FragmentFor { .. } => {
                return Err(CompileError::internal(format!(
                    "{} statement {} was not offloaded",
                    stmt.kind.name(),
                    id.raw()
                )));
            }

            // ── Kernel interface ──
            StmtKind::ArgLoad { arg_id } => {
                let ty = self.value_type(id)?;
                let args = self.buffer_member(ResourceInfo::new(ResourceType::Args))?;
                self.emit_let(&name, ty.as_str(), &format!("bitcast<{ty}>({args}[{arg_id}])"));
            }
            StmtKind::Return => {
                if self.is_graphics() {
                    return Err(CompileError::pipeline(
                        "`return` cannot be used inside a vertex or fragment loop",
                    ));
                }
                let rets = self.buffer_member(ResourceInfo::new(ResourceType::Rets))?;
                for (i, &value) in stmt.operands.iter().enumerate() {
                    let value_name = self.name(value);
                    let word = match self.value_type(value)? {
                        PrimitiveType::I32 => value_name,
                        PrimitiveType::F32 => format!("bitcast<i32>({value_name})"),
                    };
                    self.emit_line(&format!("{rets}[{i}] = {word};"));
                }
            }
            StmtKind::Rand => {
                if self.is_graphics() {
                    return Err(CompileError::pipeline(
                        "vertex and fragment shaders are not allowed to use random numbers",
                    ));
                }
                let ty = self.value_type(id)?;
                self.declare_rand()?;
                self.emit_let(&name, ty.as_str(), &format!("rand_{ty}(gid3.x)"));
            }

            // ── Memory ──
            StmtKind::Alloca => {
                let ty = self.value_type(id)?;
                self.emit_line(&format!("var {name} : {ty};"));
            }
            StmtKind::LocalLoad => {
                let ptr = self.operand(id, 0)?;
                let ty = self.value_type(id)?;
                self.emit_let(&name, ty.as_str(), &self.name(ptr));
            }
            StmtKind::LocalStore => {
                let ptr = self.operand(id, 0)?;
                let value = self.operand(id, 1)?;
                self.emit_line(&format!("{} = {};", self.name(ptr), self.name(value)));
            }
            StmtKind::GlobalPtr { .. } | StmtKind::GlobalTemporary { .. } => {}
            StmtKind::GlobalLoad | StmtKind::GlobalTemporaryLoad => {
                self.emit_global_load(id, false)?;
            }
            StmtKind::AtomicLoad => self.emit_global_load(id, true)?,
            StmtKind::GlobalStore | StmtKind::GlobalTemporaryStore => {
                self.emit_global_store(id, false)?;
            }
            StmtKind::AtomicStore => self.emit_global_store(id, true)?,
            StmtKind::AtomicOp(op) => self.emit_atomic_op(id, *op)?,

            // ── Graphics ──
            StmtKind::VertexInput { location } | StmtKind::FragmentInput { location } => {
                let ty = self.value_type(id)?;
                let member = format!("in_{location}_{ty}");
                let flat = self.is_fragment() && ty == PrimitiveType::I32;
                let interpolate = if flat { "@interpolate(flat) " } else { "" };
                self.stage_input.add(
                    &member,
                    &format!("@location({location}) {interpolate}{member} : {ty},"),
                );
                self.emit_let(&name, ty.as_str(), &format!("stage_input.{member}"));
            }
            StmtKind::VertexOutput { location } => {
                let value = self.operand(id, 0)?;
                let ty = self.value_type(value)?;
                let member = format!("out_{location}_{ty}");
                let interpolate = if ty == PrimitiveType::I32 {
                    "@interpolate(flat) "
                } else {
                    ""
                };
                self.stage_output.add(
                    &member,
                    &format!("@location({location}) {interpolate}{member} : {ty},"),
                );
                self.emit_line(&format!("stage_output.{member} = {};", self.name(value)));
            }
            StmtKind::BuiltInOutput(kind) => self.emit_builtin_output(id, *kind)?,
            StmtKind::BuiltInInput(kind) => {
                if !self.is_vertex() {
                    return Err(CompileError::pipeline(
                        "vertex and instance indices are only available in a vertex loop",
                    ));
                }
                let builtin = match kind {
                    BuiltInInputKind::VertexIndex => "vertex_index",
                    BuiltInInputKind::InstanceIndex => "instance_index",
                };
                self.emit_let(&name, "i32", &format!("i32({builtin})"));
            }
            StmtKind::FragmentDerivative(direction) => {
                if !self.is_fragment() {
                    return Err(CompileError::pipeline(
                        "derivatives are only available in a fragment loop",
                    ));
                }
                let value = self.operand(id, 0)?;
                let function = match direction {
                    DerivativeDirection::X => "dpdxFine",
                    DerivativeDirection::Y => "dpdyFine",
                };
                self.emit_let(
                    &name,
                    "f32",
                    &format!("{function}(f32({}))", self.name(value)),
                );
            }
            StmtKind::Discard => {
                if !self.is_fragment() {
                    return Err(CompileError::pipeline(
                        "`discard` can only be used in a fragment loop",
                    ));
                }
                self.emit_line("discard;");
            }
            StmtKind::TextureFunction {
                texture,
                kind,
                coords_count,
            } => self.emit_texture_function(id, texture, *kind, *coords_count)?,
            StmtKind::CompositeExtract { element_index } => {
                let composite = self.operand(id, 0)?;
                let ty = self.value_type(id)?;
                let suffix = component_suffix(*element_index).ok_or_else(|| {
                    CompileError::internal(format!(
                        "composite component {element_index} is out of range"
                    ))
                })?;
                self.emit_let(
                    &name,
                    ty.as_str(),
                    &format!("{}.{suffix}", self.name(composite)),
                );
            }
        }
        Ok(())
    }

    // ── Memory helpers ──

    /// Flat word index of a field element's primitive within its tree.
    fn field_index(
        &self,
        field: &Field,
        indices: &[StmtId],
        offset_in_element: usize,
    ) -> CompileResult<String> {
        if indices.len() != field.dimensions.len() {
            return Err(CompileError::internal(format!(
                "field of {} dimensions indexed with {} indices",
                field.dimensions.len(),
                indices.len()
            )));
        }
        let mut terms = Vec::with_capacity(indices.len());
        let mut stride = 1u32;
        for (&index, &dim) in indices.iter().zip(&field.dimensions).rev() {
            terms.push(format!("{stride} * {}", self.name(index)));
            stride = stride.saturating_mul(dim);
        }
        let element = if terms.is_empty() {
            "0".to_owned()
        } else {
            terms.join(" + ")
        };
        Ok(format!(
            "{} + {} * ({element}) + {offset_in_element}",
            field.offset_bytes / 4,
            field.element_primitives()
        ))
    }

    /// Buffer and word index addressed by a global pointer or global
    /// temporary.
    fn global_address(&self, ptr: StmtId, atomic: bool) -> CompileResult<(ResourceInfo, String)> {
        let module = self.module;
        let stmt = module.stmt(ptr);
        match &stmt.kind {
            StmtKind::GlobalPtr {
                field,
                offset_in_element,
            } => {
                let ty = if atomic {
                    ResourceType::RootAtomic
                } else {
                    ResourceType::Root
                };
                let info = ResourceInfo::with_id(ty, field.tree.raw());
                let index = self.field_index(field, &stmt.operands, *offset_in_element)?;
                Ok((info, index))
            }
            StmtKind::GlobalTemporary { offset } => {
                let ty = if atomic {
                    ResourceType::GlobalTmpsAtomic
                } else {
                    ResourceType::GlobalTmps
                };
                Ok((ResourceInfo::new(ty), offset.to_string()))
            }
            other => Err(CompileError::internal(format!(
                "global access through a {} statement",
                other.name()
            ))),
        }
    }

    fn emit_global_load(&mut self, id: StmtId, atomic: bool) -> CompileResult<()> {
        let ptr = self.operand(id, 0)?;
        let (info, index) = self.global_address(ptr, atomic)?;
        self.check_buffer_readable(info)?;
        let buffer = self.buffer_member(info)?;
        let ty = self.value_type(id)?;
        let value = if atomic {
            format!("bitcast<{ty}>(atomicLoad(&({buffer}[{index}])))")
        } else {
            format!("bitcast<{ty}>({buffer}[{index}])")
        };
        self.emit_let(&self.name(id), ty.as_str(), &value);
        Ok(())
    }

    fn emit_global_store(&mut self, id: StmtId, atomic: bool) -> CompileResult<()> {
        let ptr = self.operand(id, 0)?;
        let value = self.operand(id, 1)?;
        let (info, index) = self.global_address(ptr, atomic)?;
        self.check_buffer_writable(info)?;
        let buffer = self.buffer_member(info)?;
        let word = format!("bitcast<i32>({})", self.name(value));
        if atomic {
            self.emit_line(&format!("atomicStore(&({buffer}[{index}]), {word});"));
        } else {
            self.emit_line(&format!("{buffer}[{index}] = {word};"));
        }
        Ok(())
    }

    /// `i32` atomics map to the WGSL builtins. `f32` atomics retry a
    /// compare-exchange on the raw bits until no other invocation
    /// interfered.
    fn emit_atomic_op(&mut self, id: StmtId, op: AtomicOpType) -> CompileResult<()> {
        let dest = self.operand(id, 0)?;
        let operand = self.name(self.operand(id, 1)?);
        let ty = self.module.pointed_type(dest).ok_or_else(|| {
            CompileError::internal("atomic destination is not an address")
        })?;
        let (info, index) = self.global_address(dest, true)?;
        self.check_buffer_writable(info)?;
        let buffer = self.buffer_member(info)?;
        let ptr = format!("&({buffer}[{index}])");
        let name = self.name(id);

        match ty {
            PrimitiveType::I32 => {
                let function = atomic_i32_function(op);
                self.emit_let(&name, "i32", &format!("{function}({ptr}, {operand})"));
            }
            PrimitiveType::F32 => {
                if op.is_bitwise() {
                    return Err(CompileError::internal(format!(
                        "atomic {op} on an f32 destination"
                    )));
                }
                let result = self.temp("atomic_op_result");
                self.emit_line(&format!("var {result} : f32;"));
                self.emit_line("loop {");
                self.indent += 1;
                let old = self.temp("old_val");
                self.emit_let(&old, "f32", &format!("bitcast<f32>(atomicLoad({ptr}))"));
                let new = self.temp("new_val");
                let new_value = match op {
                    AtomicOpType::Sub => format!("{old} - {operand}"),
                    AtomicOpType::Max => format!("max({old}, {operand})"),
                    AtomicOpType::Min => format!("min({old}, {operand})"),
                    AtomicOpType::Add
                    | AtomicOpType::BitAnd
                    | AtomicOpType::BitOr
                    | AtomicOpType::BitXor => format!("{old} + {operand}"),
                };
                self.emit_let(&new, "f32", &new_value);
                self.emit_line(&format!(
                    "if (atomicCompareExchangeWeak({ptr}, bitcast<i32>({old}), bitcast<i32>({new})).exchanged) {{"
                ));
                self.indent += 1;
                self.emit_line(&format!("{result} = {old};"));
                self.emit_line("break;");
                self.indent -= 1;
                self.emit_line("}");
                self.indent -= 1;
                self.emit_line("}");
                self.emit_let(&name, "f32", &result);
            }
        }
        Ok(())
    }

    // ── Graphics helpers ──

    fn emit_builtin_output(&mut self, id: StmtId, kind: BuiltInOutputKind) -> CompileResult<()> {
        let module = self.module;
        let values = &module.stmt(id).operands;
        let first = *values
            .first()
            .ok_or_else(|| CompileError::internal("builtin output without values"))?;
        let prim = self.value_type(first)?;
        let ty = vector_type_name(prim, values.len());
        let value = self.vector_expr(values, prim)?;
        let member = match kind {
            BuiltInOutputKind::Position => {
                if !self.is_vertex() {
                    return Err(CompileError::pipeline(
                        "positions can only be output from a vertex loop",
                    ));
                }
                self.stage_output
                    .add("position", &format!("@builtin(position) position : {ty},"));
                "position".to_owned()
            }
            BuiltInOutputKind::Color(location) => {
                if !self.is_fragment() {
                    return Err(CompileError::pipeline(
                        "colors can only be output from a fragment loop",
                    ));
                }
                let member = format!("color_{location}");
                self.stage_output
                    .add(&member, &format!("@location({location}) {member} : {ty},"));
                member
            }
            BuiltInOutputKind::FragDepth => {
                if !self.is_fragment() {
                    return Err(CompileError::pipeline(
                        "depth can only be output from a fragment loop",
                    ));
                }
                self.stage_output
                    .add("frag_depth", &format!("@builtin(frag_depth) frag_depth : {ty},"));
                "frag_depth".to_owned()
            }
        };
        self.emit_line(&format!("stage_output.{member} = {value};"));
        Ok(())
    }

    fn emit_texture_function(
        &mut self,
        id: StmtId,
        texture: &Texture,
        kind: TextureFunctionKind,
        coords_count: usize,
    ) -> CompileResult<()> {
        let module = self.module;
        let operands = &module.stmt(id).operands;
        if coords_count != texture.coords_components() || operands.len() < coords_count {
            return Err(CompileError::internal(format!(
                "texture addressed with {coords_count} coordinates, expected {}",
                texture.coords_components()
            )));
        }
        let (coords, extra) = operands.split_at(coords_count);
        let texel = vector_type_name(PrimitiveType::F32, if texture.is_depth() { 1 } else { 4 });
        let name = self.name(id);

        match kind {
            TextureFunctionKind::Sample => {
                let tex = self.texture_name(texture, false)?;
                let sampler = self.sampler_name(texture);
                let coords = self.vector_expr(coords, PrimitiveType::F32)?;
                self.emit_let(&name, &texel, &format!("textureSample({tex}, {sampler}, {coords})"));
            }
            TextureFunctionKind::SampleLod => {
                let lod = *extra
                    .first()
                    .ok_or_else(|| CompileError::internal("sample_lod without a level"))?;
                let tex = self.texture_name(texture, false)?;
                let sampler = self.sampler_name(texture);
                let coords = self.vector_expr(coords, PrimitiveType::F32)?;
                let level_type = if texture.is_depth() { "i32" } else { "f32" };
                self.emit_let(
                    &name,
                    &texel,
                    &format!(
                        "textureSampleLevel({tex}, {sampler}, {coords}, {level_type}({}))",
                        self.name(lod)
                    ),
                );
            }
            TextureFunctionKind::Load => {
                let tex = self.texture_name(texture, false)?;
                let coords = self.vector_expr(coords, PrimitiveType::I32)?;
                self.emit_let(&name, &texel, &format!("textureLoad({tex}, {coords}, 0)"));
            }
            TextureFunctionKind::Store => {
                if extra.len() != 4 {
                    return Err(CompileError::internal(format!(
                        "texture store with {} value components",
                        extra.len()
                    )));
                }
                let tex = self.texture_name(texture, true)?;
                let coords = self.vector_expr(coords, PrimitiveType::I32)?;
                let value = self.vector_expr(extra, PrimitiveType::F32)?;
                self.emit_line(&format!("textureStore({tex}, {coords}, {value});"));
            }
        }
        Ok(())
    }
}
