//! Shared factories for pass tests.

use kiln_ir::{
    BinaryOpType, BlockSlot, Field, FieldOptions, InsertGuard, IrBuilder, Module, Program,
    StmtId, StmtKind,
};
use kiln_types::Type;

/// A 1-D `i32` field of `len` elements in a fresh program.
pub(crate) fn int_field(program: &mut Program, len: u32) -> Field {
    program.create_field(Type::I32, vec![len], FieldOptions::default())
}

/// `for (let i of range(n)) { x[i] = i * 2 }` with a constant `n`.
pub(crate) fn doubling_kernel(x: &Field, n: i32) -> (Module, StmtId) {
    let mut b = IrBuilder::new();
    let range = b.create_const_i32(n);
    let lp = b.create_range_for(range, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let two = g.create_const_i32(2);
        let doubled = g.create_binary(BinaryOpType::Mul, i, two);
        let ptr = g.create_global_ptr(x, &[i], 0);
        g.create_global_store(ptr, doubled);
    }
    (b.into_module(), lp)
}

/// Statements of the body of loop `lp`.
pub(crate) fn body_of(module: &Module, lp: StmtId) -> Vec<StmtId> {
    module
        .block(BlockSlot::Body(lp))
        .map(|b| b.stmts.clone())
        .unwrap_or_default()
}

/// Number of reachable statements matching `pred`.
pub(crate) fn count(module: &Module, pred: impl Fn(&StmtKind) -> bool) -> usize {
    module
        .reachable()
        .into_iter()
        .filter(|&id| pred(module.kind(id)))
        .count()
}
