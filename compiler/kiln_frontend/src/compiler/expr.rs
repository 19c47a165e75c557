//! Expressions.

use std::f64::consts;

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::StmtKind;
use kiln_syntax::{BinaryOperator, NodeId, NodeKind, ObjectProperty, PrefixOperator};
use kiln_types::{PrimitiveType, Type};

use super::{index_from_constant, Compiler, Stage};
use crate::builtin::cast_value;
use crate::host::HostValue;
use crate::value::Value;

impl Compiler<'_> {
    pub(super) fn dispatch_expr(&mut self, node: NodeId) -> CompileResult<Value> {
        match self.kind(node) {
            NodeKind::NumericLiteral(text) => self.visit_numeric_literal(&text),
            NodeKind::BooleanLiteral(b) => Ok(self.constant_i32(i32::from(b))),
            NodeKind::Identifier(name) => self.visit_identifier(node, &name),
            NodeKind::This => {
                let this = self.scope.this().clone();
                Ok(self.import_host(&this))
            }
            NodeKind::ArrayLiteral(elements) => self.visit_array_literal(&elements),
            NodeKind::ObjectLiteral(properties) => self.visit_object_literal(&properties),
            NodeKind::PropertyAccess { object, name } => {
                self.visit_property_access(node, object, &name)
            }
            NodeKind::ElementAccess { object, index } => {
                self.visit_element_access(node, object, index)
            }
            NodeKind::Call { callee, args } => self.visit_call(callee, &args),
            NodeKind::Prefix { op, operand } => self.visit_prefix(op, operand),
            NodeKind::Postfix { increment, .. } => Err(CompileError::unsupported(format!(
                "postfix `{}` is not supported; use `+= 1` or `-= 1`",
                if increment { "++" } else { "--" }
            ))),
            NodeKind::Binary { op, lhs, rhs } => self.visit_binary(op, lhs, rhs),
            NodeKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.visit_rvalue(cond)?;
                match cond.scalar_constant() {
                    Some(c) if c != 0.0 => self.visit_expr(then_expr),
                    Some(_) => self.visit_expr(else_expr),
                    None => Err(CompileError::unsupported(
                        "conditional expressions need a compile-time constant condition; use an if statement",
                    )),
                }
            }
            NodeKind::Paren(inner) | NodeKind::TypeAssertion(inner) => self.visit_expr(inner),
            NodeKind::FunctionLiteral { .. } => {
                Ok(Value::function(self.frame.function.nested(node)?))
            }
            other => Err(CompileError::unsupported(format!(
                "a {} cannot be used as an expression",
                other.describe()
            ))),
        }
    }

    // ── Literals ────────────────────────────────────────────────────

    fn visit_numeric_literal(&mut self, text: &str) -> CompileResult<Value> {
        let cleaned: String = text
            .chars()
            .filter(|&c| c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        let malformed = || CompileError::unsupported(format!("cannot parse numeric literal `{text}`"));

        let radix = [("0x", 16), ("0o", 8), ("0b", 2)]
            .into_iter()
            .find_map(|(prefix, radix)| cleaned.strip_prefix(prefix).map(|digits| (digits, radix)));
        if let Some((digits, radix)) = radix {
            let n = u64::from_str_radix(digits, radix).map_err(|_| malformed())?;
            return self.integer_literal(n, text);
        }
        if cleaned.contains(['.', 'e']) {
            let value: f64 = cleaned.parse().map_err(|_| malformed())?;
            return Ok(self.constant_f32(value));
        }
        let n: u64 = cleaned.parse().map_err(|_| malformed())?;
        self.integer_literal(n, text)
    }

    /// Integer literals are 32-bit words: values above `i32::MAX` keep their
    /// bit pattern.
    fn integer_literal(&mut self, n: u64, text: &str) -> CompileResult<Value> {
        let bits = u32::try_from(n).map_err(|_| {
            CompileError::type_error(format!("integer literal `{text}` does not fit in 32 bits"))
        })?;
        Ok(self.constant_i32(i32::from_ne_bytes(bits.to_ne_bytes())))
    }

    fn visit_array_literal(&mut self, elements: &[NodeId]) -> CompileResult<Value> {
        let values = elements
            .iter()
            .map(|&element| self.visit_rvalue(element))
            .collect::<CompileResult<Vec<_>>>()?;
        match values.as_slice() {
            [] => Err(CompileError::unsupported("empty array literals are not supported")),
            [single] => match single.ty {
                Type::Scalar(_) => Ok(Value::vector_from_scalars(&values)?),
                Type::Vector { .. } => Ok(Value::matrix_from_rows(&values)?),
                _ => Err(CompileError::unsupported(format!(
                    "an array literal of one {} is not supported",
                    single.ty
                ))),
            },
            [first, rest @ ..] => {
                let mut result = first.clone();
                for value in rest {
                    result = self.call_operation(",", &[result, value.clone()])?;
                }
                Ok(result)
            }
        }
    }

    fn visit_object_literal(&mut self, properties: &[ObjectProperty]) -> CompileResult<Value> {
        let mut members = Vec::with_capacity(properties.len());
        for property in properties {
            let (name, node) = match property {
                ObjectProperty::Assignment { name, value } => (name.clone(), *value),
                ObjectProperty::Shorthand { ident } => (
                    self.frame
                        .function
                        .tree
                        .identifier(*ident)
                        .unwrap_or_default()
                        .to_owned(),
                    *ident,
                ),
            };
            members.push((name, self.visit_rvalue(node)?));
        }
        Ok(Value::make_struct(members)?)
    }

    // ── Operators ───────────────────────────────────────────────────

    fn visit_prefix(&mut self, op: PrefixOperator, operand: NodeId) -> CompileResult<Value> {
        let name = match op {
            PrefixOperator::Plus => return self.visit_rvalue(operand),
            PrefixOperator::Minus => "neg",
            PrefixOperator::Not => "logical_not",
            PrefixOperator::BitNot => "not",
            PrefixOperator::Increment | PrefixOperator::Decrement => {
                return Err(CompileError::unsupported(format!(
                    "prefix `{}` is not supported; use `+= 1` or `-= 1`",
                    op.as_str()
                )));
            }
        };
        let value = self.visit_rvalue(operand)?;
        self.call_operation(name, &[value])
    }

    fn visit_binary(
        &mut self,
        op: BinaryOperator,
        lhs: NodeId,
        rhs: NodeId,
    ) -> CompileResult<Value> {
        if op == BinaryOperator::Assign {
            let dest = self.visit_expr(lhs)?;
            self.check_assignable(&dest)?;
            let value = self.visit_rvalue(rhs)?;
            return self.call_operation("=", &[dest, value]);
        }
        if let Some(base) = op.compound_base() {
            return self.visit_compound_assignment(op, base, lhs, rhs);
        }

        let l = self.visit_expr(lhs)?;
        let r = self.visit_expr(rhs)?;
        if let (true, true, Some(lh), Some(rh)) =
            (l.is_host_object(), r.is_host_object(), l.host_value(), r.host_value())
        {
            let result = lh.binary(op, rh).ok_or_else(|| {
                CompileError::unsupported(format!(
                    "`{}` is not supported between {} and {}",
                    op.as_str(),
                    lh.describe(),
                    rh.describe()
                ))
            })?;
            return Ok(self.import_host(&result));
        }
        let l = self.load(&l);
        let r = self.load(&r);
        self.call_operation(op.as_str(), &[l, r])
    }

    /// `+=`, `-=` and the bitwise compound assignments are read-modify-write
    /// atomics; a pass demotes the ones that need no atomicity.
    fn visit_compound_assignment(
        &mut self,
        op: BinaryOperator,
        base: BinaryOperator,
        lhs: NodeId,
        rhs: NodeId,
    ) -> CompileResult<Value> {
        let atomic = match op {
            BinaryOperator::AddAssign => Some("atomicAdd"),
            BinaryOperator::SubAssign => Some("atomicSub"),
            BinaryOperator::BitAndAssign => Some("atomicAnd"),
            BinaryOperator::BitOrAssign => Some("atomicOr"),
            BinaryOperator::BitXorAssign => Some("atomicXor"),
            BinaryOperator::MulAssign | BinaryOperator::DivAssign => None,
            _ => {
                return Err(CompileError::unsupported(format!(
                    "compound assignment `{}` is not supported",
                    op.as_str()
                )));
            }
        };

        let dest = self.visit_expr(lhs)?;
        self.check_assignable(&dest)?;
        let value = self.visit_rvalue(rhs)?;
        match atomic {
            Some(name) => {
                let op = self.registry.atomic(name).ok_or_else(|| {
                    CompileError::internal(format!("atomic builtin `{name}` is not registered"))
                })?;
                Ok(op.call(&mut self.builder, &[dest, value])?)
            }
            None => {
                let current = self.load(&dest);
                let result = self.call_operation(base.as_str(), &[current, value])?;
                self.call_operation("=", &[dest, result])
            }
        }
    }

    /// The target of an assignment must be an l-value. Vertex and fragment
    /// shaders only write field elements the fragment stage may write.
    fn check_assignable(&self, dest: &Value) -> CompileResult<()> {
        if !dest.is_pointer() {
            return Err(CompileError::type_error(format!(
                "cannot assign to a value of type {}; only variables, field elements and their members can be assigned",
                dest.ty
            )));
        }
        if dest.ty.is_global_pointer()
            && self.in_graphics_stage()
            && !self.is_fragment_writable(dest)
        {
            return Err(CompileError::pipeline(
                "vertex-for and fragment-for bodies cannot write to fields",
            ));
        }
        Ok(())
    }

    fn is_fragment_writable(&self, dest: &Value) -> bool {
        self.render.stage == Stage::InFragment
            && dest
                .stmts
                .iter()
                .all(|&ptr| match self.builder.module().kind(ptr) {
                    StmtKind::GlobalPtr { field, .. } => self
                        .program
                        .tree(field.tree)
                        .is_some_and(|tree| tree.fragment_shader_writable),
                    _ => false,
                })
    }

    // ── Access ──────────────────────────────────────────────────────

    fn visit_element_access(
        &mut self,
        node: NodeId,
        object: NodeId,
        index: NodeId,
    ) -> CompileResult<Value> {
        if let Some(host) = self.evaluate_on_host(node) {
            return Ok(self.import_host(&host));
        }
        let target = self.visit_expr(object)?;
        if let Some(HostValue::Field(field)) = target.host_value() {
            let field = field.clone();
            return self.field_element(&field, index);
        }
        if let Some(host) = target.host_value() {
            let host = host.clone();
            let index = self.visit_rvalue(index)?;
            let element = index
                .scalar_constant()
                .and_then(index_from_constant)
                .and_then(|i| host.element(i))
                .ok_or_else(|| {
                    CompileError::type_error(format!(
                        "cannot index {} with a non-constant or out-of-range index",
                        host.describe()
                    ))
                })?;
            return Ok(self.import_host(&element));
        }

        let index = self.visit_rvalue(index)?;
        if !index.is_compile_time_constant() {
            return Err(CompileError::type_error(
                "vector and matrix indices must be compile-time constants",
            ));
        }
        if index.ty.tensor_primitive() != Some(PrimitiveType::I32) {
            return Err(CompileError::type_error(format!(
                "vector and matrix indices must be i32, got {}",
                index.ty
            )));
        }
        let position = |i: usize, len: usize| {
            index_from_constant(index.constants[i])
                .filter(|&p| p < len)
                .ok_or_else(|| CompileError::type_error("index out of range"))
        };
        match (target.ty.value_type(), &index.ty) {
            (Type::Vector { rows, .. }, Type::Scalar(_)) => {
                let i = position(0, *rows)?;
                Ok(target.vector_components()?.swap_remove(i))
            }
            (Type::Matrix { rows, .. }, Type::Scalar(_)) => {
                let i = position(0, *rows)?;
                Ok(target.matrix_rows()?.swap_remove(i))
            }
            (Type::Matrix { rows, cols, .. }, Type::Vector { rows: 2, .. }) => {
                let r = position(0, *rows)?;
                let c = position(1, *cols)?;
                Ok(target.matrix_components()?.swap_remove(r).swap_remove(c))
            }
            (ty, index_ty) => Err(CompileError::type_error(format!(
                "cannot index a value of type {ty} with {index_ty}"
            ))),
        }
    }

    /// One global pointer per primitive of the element at `index`.
    fn field_element(&mut self, field: &kiln_ir::Field, index: NodeId) -> CompileResult<Value> {
        let index = self.visit_rvalue(index)?;
        if !index.ty.is_tensor() || matches!(index.ty, Type::Matrix { .. }) {
            return Err(CompileError::type_error(format!(
                "field indices must be a scalar or a vector, got {}",
                index.ty
            )));
        }
        let index = cast_value(&mut self.builder, &index, PrimitiveType::I32);
        if index.stmts.len() != field.dimensions.len() {
            return Err(CompileError::type_error(format!(
                "field has {} dimension(s) but the index has {} component(s)",
                field.dimensions.len(),
                index.stmts.len()
            )));
        }
        let ptrs = (0..field.element_primitives())
            .map(|offset| self.builder.create_global_ptr(field, &index.stmts, offset))
            .collect();
        Ok(Value::new(
            Type::pointer(field.element_type.clone(), true),
            ptrs,
        ))
    }

    fn visit_property_access(
        &mut self,
        node: NodeId,
        object: NodeId,
        name: &str,
    ) -> CompileResult<Value> {
        if let Some(host) = self.evaluate_on_host(node) {
            return Ok(self.import_host(&host));
        }
        if self.is_free_name(object, "Math") {
            return match name {
                "PI" => Ok(self.constant_f32(consts::PI)),
                "E" => Ok(self.constant_f32(consts::E)),
                _ => Err(CompileError::type_error(format!("`Math.{name}` is not a constant"))),
            };
        }

        let target = self.visit_expr(object)?;
        if let Some(host) = target.host_value() {
            let member = host.member(name).ok_or_else(|| {
                CompileError::type_error(format!("{} has no member `{name}`", host.describe()))
            })?;
            return Ok(self.import_host(&member));
        }
        match target.ty.value_type() {
            Type::Vector { rows, .. } => swizzle(&target, *rows, name),
            Type::Struct(_) => Ok(target.struct_member(name)?),
            ty => Err(CompileError::type_error(format!(
                "a value of type {ty} has no member `{name}`"
            ))),
        }
    }

    /// Whether `node` is the identifier `name` with no local declaration.
    fn is_free_name(&self, node: NodeId, name: &str) -> bool {
        matches!(self.frame.function.tree.kind(node), NodeKind::Identifier(n) if n == name)
            && self.frame.function.oracle.symbol(node).is_none()
    }
}

/// `v.x`, `v.rgb`, `v.uv`. A multi-component swizzle builds a new vector.
fn swizzle(target: &Value, rows: usize, name: &str) -> CompileResult<Value> {
    let invalid =
        || CompileError::type_error(format!("`{name}` is not a member or swizzle of a vector"));
    let indices = name
        .chars()
        .map(|c| match c {
            'x' | 'r' | 'u' => Some(0),
            'y' | 'g' | 'v' => Some(1),
            'z' | 'b' => Some(2),
            'w' | 'a' => Some(3),
            _ => None,
        })
        .collect::<Option<Vec<usize>>>()
        .filter(|indices| !indices.is_empty() && indices.len() <= 4)
        .ok_or_else(invalid)?;
    if indices.iter().any(|&i| i >= rows) {
        return Err(invalid());
    }
    let components = target.vector_components()?;
    if let [single] = indices.as_slice() {
        return Ok(components[*single].clone());
    }
    let picked: Vec<Value> = indices.iter().map(|&i| components[i].clone()).collect();
    Ok(Value::vector_from_scalars(&picked)?)
}
