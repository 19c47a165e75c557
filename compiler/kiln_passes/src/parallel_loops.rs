//! Marks top-level range loops as parallel.
//!
//! Only loops directly in the root block are dispatched as parallel compute
//! work. Nested loops, and loops that must keep sequential order, stay
//! serial.

use kiln_ir::{Module, StmtKind};

/// Returns the number of loops marked parallel.
pub fn identify_parallel_loops(module: &mut Module) -> usize {
    let roots = module.root.stmts.clone();
    let mut marked = 0;
    for id in roots {
        if let StmtKind::RangeFor {
            strictly_serialize,
            is_parallel,
            ..
        } = &mut module.stmt_mut(id).kind
        {
            *is_parallel = !*strictly_serialize;
            if *is_parallel {
                marked += 1;
            }
        }
    }
    tracing::debug!(marked, "identified parallel loops");
    marked
}
