//! Rendering intrinsics.
//!
//! Stage-restricted intrinsics check the pipeline stage here; the stage of
//! builtin inputs and derivatives is checked by the code generator, which
//! sees the final shader each statement lands in.

use kiln_codegen::{ColorAttachment, DepthAttachment, RenderPassParams};
use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{
    BuiltInInputKind, BuiltInOutputKind, DerivativeDirection, Texture, TextureFunctionKind,
};
use kiln_syntax::NodeId;
use kiln_types::{PrimitiveType, Type};

use super::{Compiler, Stage};
use crate::host::HostValue;
use crate::value::Value;

impl Compiler<'_> {
    /// Compile a call to a rendering intrinsic. `None` when `name` is not
    /// one.
    pub(super) fn try_render_intrinsic(
        &mut self,
        name: &str,
        args: &[NodeId],
    ) -> CompileResult<Option<Value>> {
        let arity = match name {
            "discard" | "getVertexIndex" | "getInstanceIndex" => 0,
            "outputVertex" | "outputPosition" | "useDepth" | "outputDepth" | "dpdx" | "dpdy" => 1,
            "clearColor" | "outputColor" | "textureSample" | "textureLoad" => 2,
            "textureSampleLod" | "textureStore" => 3,
            _ => return Ok(None),
        };
        if args.len() != arity {
            return Err(CompileError::type_error(format!(
                "{name}() expects {arity} argument(s), got {}",
                args.len()
            )));
        }

        let value = match name {
            "outputVertex" => self.output_vertex(args[0])?,
            "outputPosition" => self.output_position(args[0])?,
            "clearColor" => self.clear_color(args[0], args[1])?,
            "useDepth" => self.use_depth(args[0])?,
            "outputColor" => self.output_color(args[0], args[1])?,
            "outputDepth" => self.output_depth(args[0])?,
            "discard" => {
                self.require_stage(Stage::InFragment, name)?;
                self.builder.create_discard();
                Value::void()
            }
            "textureSample" => self.texture_function(TextureFunctionKind::Sample, args)?,
            "textureSampleLod" => self.texture_function(TextureFunctionKind::SampleLod, args)?,
            "textureLoad" => self.texture_function(TextureFunctionKind::Load, args)?,
            "textureStore" => self.texture_function(TextureFunctionKind::Store, args)?,
            "getVertexIndex" => self.builtin_input(BuiltInInputKind::VertexIndex),
            "getInstanceIndex" => self.builtin_input(BuiltInInputKind::InstanceIndex),
            "dpdx" => self.derivative(DerivativeDirection::X, args[0])?,
            _ => self.derivative(DerivativeDirection::Y, args[0])?,
        };
        Ok(Some(value))
    }

    fn require_stage(&self, stage: Stage, what: &str) -> CompileResult<()> {
        if self.render.stage == stage {
            return Ok(());
        }
        let place = match stage {
            Stage::InVertex => "a vertex-for",
            _ => "a fragment-for",
        };
        Err(CompileError::pipeline(format!(
            "{what}() can only be used inside {place}"
        )))
    }

    fn require_top_level(&self, what: &str) -> CompileResult<()> {
        if self.is_top_level() && self.render.stage == Stage::Idle {
            Ok(())
        } else {
            Err(CompileError::pipeline(format!(
                "{what}() must be called at the top level of the kernel"
            )))
        }
    }

    pub(super) fn ensure_render_pass(&mut self) -> &mut RenderPassParams {
        self.render.pass.get_or_insert_with(RenderPassParams::default)
    }

    /// Location of `texture` among the color attachments, adding it if new.
    fn ensure_color_attachment(&mut self, texture: &Texture) -> usize {
        let pass = self.ensure_render_pass();
        if let Some(location) = pass
            .color_attachments
            .iter()
            .position(|attachment| attachment.texture == *texture)
        {
            return location;
        }
        pass.color_attachments.push(ColorAttachment {
            texture: texture.clone(),
            clear_color: None,
        });
        pass.color_attachments.len() - 1
    }

    fn texture_argument(&mut self, node: NodeId) -> CompileResult<Texture> {
        let value = self.visit_expr(node)?;
        match value.host_value() {
            Some(HostValue::Texture(texture)) => Ok(texture.clone()),
            _ => Err(CompileError::type_error(format!(
                "expected a texture, got a value of type {}",
                value.ty
            ))),
        }
    }

    // ── Vertex stage ────────────────────────────────────────────────

    /// Pass `v` to the fragment stage. Its type becomes the pipeline's
    /// interpolated type.
    fn output_vertex(&mut self, arg: NodeId) -> CompileResult<Value> {
        self.require_stage(Stage::InVertex, "outputVertex")?;
        let value = self.visit_rvalue(arg)?;
        if !value.ty.has_storage() {
            return Err(CompileError::type_error(format!(
                "outputVertex() cannot pass a value of type {}",
                value.ty
            )));
        }
        let pipeline = self
            .render
            .current
            .as_mut()
            .ok_or_else(|| CompileError::internal("vertex stage without a pending pipeline"))?;
        pipeline.interpolated_type = value.ty.clone();
        for (&stmt, location) in value.stmts.iter().zip(0u32..) {
            self.builder.create_vertex_output(stmt, location);
        }
        Ok(Value::void())
    }

    fn output_position(&mut self, arg: NodeId) -> CompileResult<Value> {
        self.require_stage(Stage::InVertex, "outputPosition")?;
        let position = self.visit_rvalue(arg)?;
        if position.ty != Type::vector(PrimitiveType::F32, 4) {
            return Err(CompileError::type_error(format!(
                "outputPosition() expects a vector of 4 f32, got {}",
                position.ty
            )));
        }
        self.builder
            .create_builtin_output(BuiltInOutputKind::Position, &position.stmts);
        Ok(Value::void())
    }

    // ── Render pass ─────────────────────────────────────────────────

    fn clear_color(&mut self, texture: NodeId, color: NodeId) -> CompileResult<Value> {
        self.require_top_level("clearColor")?;
        let texture = self.texture_argument(texture)?;
        let color = self.visit_rvalue(color)?;
        let constant = match (&color.ty, color.constants.as_slice()) {
            (Type::Vector { rows: 4, .. }, &[r, g, b, a]) if color.is_compile_time_constant() => {
                [r, g, b, a]
            }
            _ => {
                return Err(CompileError::type_error(format!(
                    "clearColor() expects a constant vector of 4 components, got {}",
                    color.ty
                )));
            }
        };
        let location = self.ensure_color_attachment(&texture);
        let pass = self.ensure_render_pass();
        pass.color_attachments[location].clear_color = Some(constant);
        Ok(Value::void())
    }

    fn use_depth(&mut self, texture: NodeId) -> CompileResult<Value> {
        self.require_top_level("useDepth")?;
        let texture = self.texture_argument(texture)?;
        if !texture.is_depth() {
            return Err(CompileError::type_error(
                "useDepth() expects a depth texture",
            ));
        }
        let pass = self.ensure_render_pass();
        if pass.depth_attachment.is_some() {
            return Err(CompileError::pipeline(
                "useDepth() can only be called once per kernel",
            ));
        }
        pass.depth_attachment = Some(DepthAttachment {
            texture,
            clear_depth: Some(1.0),
            store_depth: true,
        });
        Ok(Value::void())
    }

    // ── Fragment stage ──────────────────────────────────────────────

    fn output_color(&mut self, texture: NodeId, color: NodeId) -> CompileResult<Value> {
        self.require_stage(Stage::InFragment, "outputColor")?;
        let texture = self.texture_argument(texture)?;
        if texture.is_depth() {
            return Err(CompileError::type_error(
                "outputColor() cannot write a depth texture; use outputDepth()",
            ));
        }
        let color = self.visit_rvalue(color)?;
        let valid = match color.ty {
            Type::Scalar(prim) => prim == PrimitiveType::F32,
            Type::Vector { prim, rows } => prim == PrimitiveType::F32 && matches!(rows, 1 | 2 | 4),
            _ => false,
        };
        if !valid {
            return Err(CompileError::type_error(format!(
                "outputColor() expects an f32 scalar or a vector of 1, 2 or 4 f32, got {}",
                color.ty
            )));
        }
        let location = self.ensure_color_attachment(&texture);
        let location = u32::try_from(location)
            .map_err(|_| CompileError::internal("too many color attachments"))?;
        self.builder
            .create_builtin_output(BuiltInOutputKind::Color(location), &color.stmts);
        Ok(Value::void())
    }

    fn output_depth(&mut self, depth: NodeId) -> CompileResult<Value> {
        self.require_stage(Stage::InFragment, "outputDepth")?;
        let depth = self.visit_rvalue(depth)?;
        if depth.ty != Type::F32 {
            return Err(CompileError::type_error(format!(
                "outputDepth() expects an f32 scalar, got {}",
                depth.ty
            )));
        }
        self.builder
            .create_builtin_output(BuiltInOutputKind::FragDepth, &depth.stmts);
        Ok(Value::void())
    }

    fn derivative(&mut self, direction: DerivativeDirection, arg: NodeId) -> CompileResult<Value> {
        let value = self.visit_rvalue(arg)?;
        if value.ty.tensor_primitive() != Some(PrimitiveType::F32) {
            return Err(CompileError::type_error(format!(
                "derivatives need an f32 scalar, vector or matrix, got {}",
                value.ty
            )));
        }
        let stmts = value
            .stmts
            .iter()
            .map(|&stmt| self.builder.create_fragment_derivative(direction, stmt))
            .collect();
        Ok(Value::new(value.ty, stmts))
    }

    fn builtin_input(&mut self, kind: BuiltInInputKind) -> Value {
        let stmt = self.builder.create_builtin_input(kind);
        Value::scalar(stmt, PrimitiveType::I32)
    }

    // ── Textures ────────────────────────────────────────────────────

    /// Sampling and loading yield a `vec4<f32>` texel, or one f32 for
    /// depth textures. Stores yield nothing.
    fn texture_function(
        &mut self,
        kind: TextureFunctionKind,
        args: &[NodeId],
    ) -> CompileResult<Value> {
        let texture = self.texture_argument(args[0])?;
        let coords = self.visit_rvalue(args[1])?;
        let coord_prim = match kind {
            TextureFunctionKind::Load | TextureFunctionKind::Store => PrimitiveType::I32,
            TextureFunctionKind::Sample | TextureFunctionKind::SampleLod => PrimitiveType::F32,
        };
        let valid_coords = matches!(coords.ty, Type::Scalar(_) | Type::Vector { .. })
            && coords.ty.tensor_primitive() == Some(coord_prim)
            && coords.stmts.len() == texture.coords_components();
        if !valid_coords {
            return Err(CompileError::type_error(format!(
                "{}() on this texture expects {} {} coordinate(s), got {}",
                texture_function_name(kind),
                texture.coords_components(),
                coord_prim,
                coords.ty
            )));
        }

        let extra = match kind {
            TextureFunctionKind::SampleLod => {
                let lod = self.visit_rvalue(args[2])?;
                if lod.ty != Type::F32 {
                    return Err(CompileError::type_error(format!(
                        "textureSampleLod() expects an f32 level of detail, got {}",
                        lod.ty
                    )));
                }
                lod.stmts
            }
            TextureFunctionKind::Store => {
                let texel = self.visit_rvalue(args[2])?;
                if texel.ty != Type::vector(PrimitiveType::F32, 4) {
                    return Err(CompileError::type_error(format!(
                        "textureStore() expects a vector of 4 f32, got {}",
                        texel.ty
                    )));
                }
                texel.stmts
            }
            TextureFunctionKind::Sample | TextureFunctionKind::Load => Vec::new(),
        };

        let stmt = self
            .builder
            .create_texture_function(&texture, kind, &coords.stmts, &extra);
        Ok(match kind {
            TextureFunctionKind::Store => Value::void(),
            _ if texture.is_depth() => Value::scalar(stmt, PrimitiveType::F32),
            _ => {
                let components = (0..4)
                    .map(|i| self.builder.create_composite_extract(stmt, i))
                    .collect();
                Value::new(Type::vector(PrimitiveType::F32, 4), components)
            }
        })
    }
}

fn texture_function_name(kind: TextureFunctionKind) -> &'static str {
    match kind {
        TextureFunctionKind::Sample => "textureSample",
        TextureFunctionKind::SampleLod => "textureSampleLod",
        TextureFunctionKind::Load => "textureLoad",
        TextureFunctionKind::Store => "textureStore",
    }
}
