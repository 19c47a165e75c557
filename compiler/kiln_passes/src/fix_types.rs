//! Operand type fixing.
//!
//! Generated code has no implicit numeric conversions, so both operands of
//! a binary op must share one primitive. A mixed `i32`/`f32` pair gets a
//! `cast_f32_value` on its `i32` side.

use kiln_ir::{
    rebuild_module, BuilderHost, IrBuilder, Module, StmtId, StmtKind, Transformer, UnaryOpType,
};
use kiln_types::PrimitiveType;

struct FixTypes {
    builder: IrBuilder,
    casts: usize,
}

impl BuilderHost for FixTypes {
    fn builder(&mut self) -> &mut IrBuilder {
        &mut self.builder
    }
}

impl Transformer for FixTypes {
    fn visit(&mut self, id: StmtId) {
        let module = self.builder.module();
        let stmt = module.stmt(id);
        if let (StmtKind::Binary(_), Some(lhs), Some(rhs)) =
            (&stmt.kind, stmt.operand(0), stmt.operand(1))
        {
            let (lhs_ty, rhs_ty) = (module.return_type(lhs), module.return_type(rhs));
            if lhs_ty.is_some() && rhs_ty.is_some() && lhs_ty != rhs_ty {
                let (index, operand) = if lhs_ty == Some(PrimitiveType::I32) {
                    (0, lhs)
                } else {
                    (1, rhs)
                };
                let cast = self.builder.create_unary(UnaryOpType::CastF32Value, operand);
                self.builder.module_mut().stmt_mut(id).operands[index] = cast;
                self.casts += 1;
            }
        }
        self.keep(id);
    }
}

/// Run the pass. Returns the number of casts inserted.
pub fn fix_operand_types(module: &mut Module) -> usize {
    let mut pass = FixTypes {
        builder: IrBuilder::from_module(std::mem::take(module)),
        casts: 0,
    };
    rebuild_module(&mut pass);
    *module = pass.builder.into_module();
    tracing::debug!(casts = pass.casts, "fixed operand types");
    pass.casts
}
