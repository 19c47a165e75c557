//! For-of loops: `range`, `ndrange`, and the vertex/fragment loops of a
//! render pipeline.

use kiln_codegen::{IndirectCount, RenderPipelineParams};
use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{BinaryOpType, BlockSlot, Field, FieldOptions, InsertGuard, StmtId};
use kiln_syntax::{NodeId, NodeKind};
use kiln_types::{PrimitiveType, Type};

use super::{bare_name, index_from_constant, Compiler, FrameKind, LoopKind, Stage};
use crate::builtin::{apply_binary, cast_value};
use crate::host::HostValue;
use crate::value::Value;

const ITERABLES: &str = "range(), ndrange(), inputVertices() or inputFragments()";

impl Compiler<'_> {
    pub(super) fn visit_for_of(
        &mut self,
        bindings: &[NodeId],
        iterable: NodeId,
        body: NodeId,
    ) -> CompileResult<()> {
        let unsupported =
            || CompileError::unsupported(format!("for-of loops must iterate over {ITERABLES}"));
        let NodeKind::Call { callee, args } = self.kind(iterable) else {
            return Err(unsupported());
        };

        if let Some(inner) = self.static_argument(iterable) {
            let NodeKind::Call { callee, args } = self.kind(inner) else {
                return Err(unsupported());
            };
            return match bare_name(&self.text(callee)) {
                "range" => self.visit_range_loop(bindings, &args, body, true),
                "ndrange" => self.visit_ndrange_loop(bindings, &args, body, true),
                _ => Err(CompileError::unsupported(
                    "static() loops must iterate over range() or ndrange()",
                )),
            };
        }

        match bare_name(&self.text(callee)) {
            "range" => self.visit_range_loop(bindings, &args, body, false),
            "ndrange" => self.visit_ndrange_loop(bindings, &args, body, false),
            "inputVertices" => self.visit_vertex_for(bindings, &args, body),
            "inputFragments" => self.visit_fragment_for(bindings, &args, body),
            _ => Err(unsupported()),
        }
    }

    pub(super) fn is_fragment_for(&self, node: NodeId) -> bool {
        let tree = &self.frame.function.tree;
        let NodeKind::ForOf { iterable, .. } = tree.kind(node) else {
            return false;
        };
        match tree.kind(*iterable) {
            NodeKind::Call { callee, .. } => {
                bare_name(&tree.expr_text(*callee)) == "inputFragments"
            }
            _ => false,
        }
    }

    /// Evaluate a loop extent as an i32 scalar.
    fn loop_extent(&mut self, node: NodeId, what: &str) -> CompileResult<Value> {
        let extent = self.visit_rvalue(node)?;
        if !matches!(extent.ty, Type::Scalar(_)) {
            return Err(CompileError::type_error(format!(
                "{what} expects scalar extents, got {}",
                extent.ty
            )));
        }
        Ok(cast_value(&mut self.builder, &extent, PrimitiveType::I32))
    }

    fn visit_range_loop(
        &mut self,
        bindings: &[NodeId],
        args: &[NodeId],
        body: NodeId,
        unroll: bool,
    ) -> CompileResult<()> {
        let ([binding], [arg]) = (bindings, args) else {
            return Err(CompileError::unsupported(
                "range() takes exactly one argument and binds one loop variable",
            ));
        };
        let count = self.loop_extent(*arg, "range()")?;
        if unroll {
            let extent = constant_extent(&count)?;
            return self.unroll(*binding, &[extent], body);
        }

        let serial = self.frame.kind == FrameKind::Inlined;
        let loop_stmt = self.builder.create_range_for(count.stmts[0], serial);
        let mut guard = InsertGuard::attach(self, BlockSlot::Body(loop_stmt));
        let index = guard.builder.create_loop_index(loop_stmt);
        guard.bind(*binding, Value::scalar(index, PrimitiveType::I32))?;
        guard.visit_loop_body(LoopKind::For, body)
    }

    /// `ndrange(a, b, ..)` runs one flat loop over `a * b * ..` and rebuilds
    /// the index vector, last dimension fastest.
    fn visit_ndrange_loop(
        &mut self,
        bindings: &[NodeId],
        args: &[NodeId],
        body: NodeId,
        unroll: bool,
    ) -> CompileResult<()> {
        let [binding] = bindings else {
            return Err(CompileError::unsupported("ndrange() binds one loop variable"));
        };
        if args.is_empty() {
            return Err(CompileError::unsupported("ndrange() needs at least one extent"));
        }
        let extents = args
            .iter()
            .map(|&arg| self.loop_extent(arg, "ndrange()"))
            .collect::<CompileResult<Vec<_>>>()?;
        if unroll {
            let extents = extents
                .iter()
                .map(constant_extent)
                .collect::<CompileResult<Vec<_>>>()?;
            return self.unroll(*binding, &extents, body);
        }

        let mut total = extents[0].clone();
        for extent in &extents[1..] {
            total = apply_binary(&mut self.builder, BinaryOpType::Mul, &total, extent);
        }
        let serial = self.frame.kind == FrameKind::Inlined;
        let loop_stmt = self.builder.create_range_for(total.stmts[0], serial);
        let mut guard = InsertGuard::attach(self, BlockSlot::Body(loop_stmt));

        let flat = guard.builder.create_loop_index(loop_stmt);
        let mut rest = Value::scalar(flat, PrimitiveType::I32);
        let mut indices = vec![Value::void(); extents.len()];
        for (slot, extent) in indices.iter_mut().zip(&extents).rev() {
            *slot = apply_binary(&mut guard.builder, BinaryOpType::Mod, &rest, extent);
            rest = apply_binary(&mut guard.builder, BinaryOpType::Div, &rest, extent);
        }
        let index = index_value(indices)?;
        guard.bind(*binding, index)?;
        guard.visit_loop_body(LoopKind::For, body)
    }

    /// Compile `body` once per index of the given extents, binding the
    /// index as constants.
    fn unroll(&mut self, binding: NodeId, extents: &[usize], body: NodeId) -> CompileResult<()> {
        let total: usize = extents.iter().product();
        tracing::trace!(iterations = total, "unrolling static loop");
        self.frame.loops.push(LoopKind::Unrolled);
        let result = (0..total).try_for_each(|flat| {
            let mut rest = flat;
            let mut components = vec![0; extents.len()];
            for (slot, extent) in components.iter_mut().zip(extents).rev() {
                *slot = rest % extent;
                rest /= extent;
            }
            let scalars = components
                .into_iter()
                .map(|c| self.constant_i32(i32::try_from(c).unwrap_or(i32::MAX)))
                .collect();
            let index = index_value(scalars)?;
            self.bind(binding, index)?;
            self.visit_stmt(body)
        });
        self.frame.loops.pop();
        result
    }

    fn visit_loop_body(&mut self, kind: LoopKind, body: NodeId) -> CompileResult<()> {
        self.frame.loops.push(kind);
        let result = self.visit_stmt(body);
        self.frame.loops.pop();
        result
    }

    // ── Render pipelines ────────────────────────────────────────────

    /// Checks shared by vertex-for and fragment-for.
    fn check_pipeline_loop(&self, what: &str) -> CompileResult<()> {
        if self.frame.kind == FrameKind::Inlined {
            return Err(CompileError::pipeline(format!(
                "{what} loops are only allowed in the kernel body, not in called functions"
            )));
        }
        if !self.is_top_level() {
            return Err(CompileError::pipeline(format!(
                "{what} loops must be at the top level of the kernel"
            )));
        }
        Ok(())
    }

    fn visit_vertex_for(
        &mut self,
        bindings: &[NodeId],
        args: &[NodeId],
        body: NodeId,
    ) -> CompileResult<()> {
        self.check_pipeline_loop("vertex-for")?;
        if self.render.stage != Stage::Idle {
            return Err(CompileError::pipeline(
                "a vertex-for cannot start before the previous pipeline's fragment-for",
            ));
        }
        let ([binding], [vertex_buffer, options @ ..]) = (bindings, args) else {
            return Err(CompileError::unsupported(
                "inputVertices() takes a vertex buffer and binds one loop variable",
            ));
        };
        if options.len() > 3 {
            return Err(CompileError::unsupported(
                "inputVertices() takes at most four arguments",
            ));
        }

        let vertex_buffer = self
            .field_argument(*vertex_buffer)?
            .ok_or_else(|| CompileError::type_error("inputVertices() needs a vertex buffer"))?;
        if vertex_buffer.dimensions.len() != 1 {
            return Err(CompileError::type_error("the vertex buffer must be a 1-D field"));
        }
        let index_buffer = match options.first() {
            Some(&arg) => self.field_argument(arg)?,
            None => None,
        };
        if let Some(ib) = &index_buffer {
            if ib.dimensions.len() != 1 || ib.element_type != Type::I32 {
                return Err(CompileError::type_error(
                    "the index buffer must be a 1-D field of i32",
                ));
            }
        }
        let indirect_buffer = match options.get(1) {
            Some(&arg) => self.field_argument(arg)?,
            None => None,
        };
        if indirect_buffer.as_ref().is_some_and(|f| f.dimensions.len() != 1) {
            return Err(CompileError::type_error("the indirect buffer must be a 1-D field"));
        }
        let indirect_count = match options.get(2) {
            Some(&arg) => Some(self.indirect_count(arg)?),
            None => None,
        };

        let mut pipeline = RenderPipelineParams::new(Some(vertex_buffer.clone()), index_buffer);
        pipeline.indirect_buffer = indirect_buffer;
        if let Some(count) = indirect_count {
            pipeline.indirect_count = count;
        }
        self.ensure_render_pass();
        self.render.current = Some(pipeline);
        self.render.stage = Stage::InVertex;

        let vertex_for = self.builder.create_vertex_for();
        {
            let mut guard = InsertGuard::attach(self, BlockSlot::Body(vertex_for));
            let inputs: Vec<StmtId> = vertex_buffer
                .element_type
                .primitives()
                .into_iter()
                .zip(0u32..)
                .map(|(prim, location)| guard.builder.create_vertex_input(prim, location))
                .collect();
            let vertex = Value::new(vertex_buffer.element_type.clone(), inputs);
            let local = guard.local_copy(&vertex);
            guard.bind(*binding, local)?;
            guard.visit_loop_body(LoopKind::VertexFor, body)?;
        }
        self.render.stage = Stage::VertexDone;
        Ok(())
    }

    fn visit_fragment_for(
        &mut self,
        bindings: &[NodeId],
        args: &[NodeId],
        body: NodeId,
    ) -> CompileResult<()> {
        self.check_pipeline_loop("fragment-for")?;
        if self.render.stage != Stage::VertexDone {
            return Err(CompileError::pipeline(
                "a fragment-for must directly follow a vertex-for",
            ));
        }
        let ([binding], []) = (bindings, args) else {
            return Err(CompileError::unsupported(
                "inputFragments() takes no arguments and binds one loop variable",
            ));
        };
        let interpolated = self
            .render
            .current
            .as_ref()
            .map(|pipeline| pipeline.interpolated_type.clone())
            .ok_or_else(|| CompileError::internal("fragment-for without a pending pipeline"))?;

        self.render.stage = Stage::InFragment;
        let fragment_for = self.builder.create_fragment_for();
        {
            let mut guard = InsertGuard::attach(self, BlockSlot::Body(fragment_for));
            let inputs: Vec<StmtId> = interpolated
                .primitives()
                .into_iter()
                .zip(0u32..)
                .map(|(prim, location)| guard.builder.create_fragment_input(prim, location))
                .collect();
            let fragment = Value::new(interpolated, inputs);
            let local = guard.local_copy(&fragment);
            guard.bind(*binding, local)?;
            guard.visit_loop_body(LoopKind::FragmentFor, body)?;
        }

        self.render.stage = Stage::Idle;
        let pipeline = self
            .render
            .current
            .take()
            .ok_or_else(|| CompileError::internal("fragment-for without a pending pipeline"))?;
        self.render.pipelines.push(pipeline);
        tracing::debug!(
            pipelines = self.render.pipelines.len(),
            "finished render pipeline"
        );
        Ok(())
    }

    /// A field argument; `undefined` and `null` skip an optional one.
    fn field_argument(&mut self, node: NodeId) -> CompileResult<Option<Field>> {
        let value = self.visit_expr(node)?;
        match value.host_value() {
            Some(HostValue::Field(field)) => Ok(Some(field.clone())),
            Some(HostValue::Undefined | HostValue::Null) => Ok(None),
            _ => Err(CompileError::type_error(format!(
                "expected a field, got a value of type {}",
                value.ty
            ))),
        }
    }

    /// A constant draw count is recorded as is. A dynamic one is written
    /// into a fresh one-element field that the draw reads.
    fn indirect_count(&mut self, node: NodeId) -> CompileResult<IndirectCount> {
        let count = self.visit_rvalue(node)?;
        if count.ty != Type::I32 {
            return Err(CompileError::type_error(format!(
                "the indirect draw count must be an i32 scalar, got {}",
                count.ty
            )));
        }
        if let Some(constant) = count.scalar_constant() {
            let constant = index_from_constant(constant)
                .and_then(|c| u32::try_from(c).ok())
                .ok_or_else(|| {
                    CompileError::type_error("the indirect draw count cannot be negative")
                })?;
            return Ok(IndirectCount::Const(constant));
        }
        let field = self
            .program
            .create_field(Type::I32, vec![1], FieldOptions::default());
        self.program.materialize_current_tree();
        let zero = self.builder.create_const_i32(0);
        let ptr = self.builder.create_global_ptr(&field, &[zero], 0);
        self.builder.create_global_store(ptr, count.stmts[0]);
        Ok(IndirectCount::Field(field))
    }
}

fn constant_extent(extent: &Value) -> CompileResult<usize> {
    let constant = extent.scalar_constant().ok_or_else(|| {
        CompileError::type_error("static() loops need compile-time constant extents")
    })?;
    Ok(index_from_constant(constant.max(0.0)).unwrap_or(0))
}

/// A scalar for one dimension, a vector otherwise.
fn index_value(mut components: Vec<Value>) -> CompileResult<Value> {
    if components.len() == 1 {
        return Ok(components.swap_remove(0));
    }
    Ok(Value::vector_from_scalars(&components)?)
}
