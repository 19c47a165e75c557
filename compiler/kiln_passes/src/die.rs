//! Dead instruction elimination.
//!
//! Mark and sweep. Statements with an effect visible outside the kernel
//! invocation are seeded as useful, usefulness flows backward along operand
//! edges, and every statement left unmarked is removed from its block.

use rustc_hash::FxHashSet;

use kiln_ir::{rebuild_module, BuilderHost, IrBuilder, Module, StmtId, StmtKind, Transformer};

pub(crate) fn has_effect(kind: &StmtKind) -> bool {
    matches!(
        kind,
        StmtKind::GlobalStore
            | StmtKind::LocalStore
            | StmtKind::GlobalTemporaryStore
            | StmtKind::Return
            | StmtKind::AtomicOp(_)
            | StmtKind::AtomicLoad
            | StmtKind::AtomicStore
            | StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::RangeFor { .. }
            | StmtKind::VertexFor { .. }
            | StmtKind::FragmentFor { .. }
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Discard
            | StmtKind::VertexOutput { .. }
            | StmtKind::BuiltInOutput(_)
            | StmtKind::TextureFunction { .. }
    )
}

fn useful_statements(module: &Module) -> FxHashSet<StmtId> {
    let mut useful = FxHashSet::default();
    let mut worklist: Vec<StmtId> = module
        .reachable()
        .into_iter()
        .filter(|&id| has_effect(module.kind(id)))
        .collect();
    while let Some(id) = worklist.pop() {
        if useful.insert(id) {
            worklist.extend(module.stmt(id).operands.iter().copied());
        }
    }
    useful
}

struct Sweep {
    builder: IrBuilder,
    useful: FxHashSet<StmtId>,
}

impl BuilderHost for Sweep {
    fn builder(&mut self) -> &mut IrBuilder {
        &mut self.builder
    }
}

impl Transformer for Sweep {
    fn visit(&mut self, id: StmtId) {
        if self.useful.contains(&id) {
            self.keep(id);
        }
    }
}

/// Run the pass. Returns the number of statements removed.
pub fn eliminate_dead_instructions(module: &mut Module) -> usize {
    let before = module.reachable().len();
    let useful = useful_statements(module);
    if useful.len() == before {
        return 0;
    }
    let mut sweep = Sweep {
        builder: IrBuilder::from_module(std::mem::take(module)),
        useful,
    };
    rebuild_module(&mut sweep);
    *module = sweep.builder.into_module();

    let removed = before - module.reachable().len();
    tracing::debug!(removed, "eliminated dead instructions");
    removed
}
