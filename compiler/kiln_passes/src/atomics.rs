//! Atomic normalisation.
//!
//! [`demote_atomics`] rewrites atomics on plain locals into ordinary
//! read-modify-write sequences. [`promote_loads_stores_to_atomics`] then makes
//! every buffer all-atomic or all-plain: once any access to a root buffer (or
//! to the global-temporaries buffer) is atomic, every load and store on it
//! becomes an atomic load or store.

use rustc_hash::FxHashSet;

use kiln_ir::{
    rebuild_module, BuilderHost, IrBuilder, Module, Replacements, StmtId, StmtKind, Transformer,
    TreeId,
};

struct Demote {
    builder: IrBuilder,
    replacements: Replacements,
    demoted: usize,
}

impl BuilderHost for Demote {
    fn builder(&mut self) -> &mut IrBuilder {
        &mut self.builder
    }
}

impl Transformer for Demote {
    fn visit(&mut self, id: StmtId) {
        let module = self.builder.module();
        let stmt = module.stmt(id);
        let (Some(dest), value) = (stmt.operand(0), stmt.operand(1)) else {
            self.keep(id);
            return;
        };
        if !matches!(module.kind(dest), StmtKind::Alloca) {
            self.keep(id);
            return;
        }
        match (stmt.kind.clone(), value) {
            (StmtKind::AtomicOp(op), Some(operand)) => {
                let old = self.builder.create_local_load(dest);
                let new = self.builder.create_binary(op.binary_op(), old, operand);
                self.builder.create_local_store(dest, new);
                self.replacements.insert(id, old);
            }
            (StmtKind::AtomicLoad, _) => {
                let load = self.builder.create_local_load(dest);
                self.replacements.insert(id, load);
            }
            (StmtKind::AtomicStore, Some(value)) => {
                self.builder.create_local_store(dest, value);
            }
            _ => {
                self.keep(id);
                return;
            }
        }
        self.demoted += 1;
    }
}

/// Rewrite atomics whose destination is an `Alloca`. An atomic op becomes
/// load, binary op, store, and its uses see the loaded (old) value. Returns
/// the number of atomics demoted.
pub fn demote_atomics(module: &mut Module) -> usize {
    let mut pass = Demote {
        builder: IrBuilder::from_module(std::mem::take(module)),
        replacements: Replacements::new(),
        demoted: 0,
    };
    rebuild_module(&mut pass);
    *module = pass.builder.into_module();
    pass.replacements.apply(module);
    tracing::debug!(demoted = pass.demoted, "demoted atomics");
    pass.demoted
}

/// Buffers that are accessed atomically somewhere in the module.
#[derive(Debug, Default)]
struct AtomicBuffers {
    trees: FxHashSet<TreeId>,
    global_temporaries: bool,
}

fn atomic_buffers(module: &Module, order: &[StmtId]) -> AtomicBuffers {
    let mut buffers = AtomicBuffers::default();
    for &id in order {
        let stmt = module.stmt(id);
        if !matches!(
            stmt.kind,
            StmtKind::AtomicOp(_) | StmtKind::AtomicLoad | StmtKind::AtomicStore
        ) {
            continue;
        }
        let Some(dest) = stmt.operand(0) else {
            continue;
        };
        match module.kind(dest) {
            StmtKind::GlobalPtr { field, .. } => {
                buffers.trees.insert(field.tree);
            }
            StmtKind::GlobalTemporary { .. } => buffers.global_temporaries = true,
            _ => {}
        }
    }
    buffers
}

/// Make every access to an atomically used buffer atomic. Returns the
/// number of loads and stores rewritten.
pub fn promote_loads_stores_to_atomics(module: &mut Module) -> usize {
    let order = module.reachable();
    let buffers = atomic_buffers(module, &order);
    if buffers.trees.is_empty() && !buffers.global_temporaries {
        return 0;
    }

    let mut promoted = 0;
    for id in order {
        let Some(ptr) = module.stmt(id).operand(0) else {
            continue;
        };
        let on_atomic_buffer = match module.kind(ptr) {
            StmtKind::GlobalPtr { field, .. } => buffers.trees.contains(&field.tree),
            StmtKind::GlobalTemporary { .. } => buffers.global_temporaries,
            _ => false,
        };
        if !on_atomic_buffer {
            continue;
        }
        let stmt = module.stmt_mut(id);
        let rewritten = match stmt.kind {
            StmtKind::GlobalLoad | StmtKind::GlobalTemporaryLoad => StmtKind::AtomicLoad,
            StmtKind::GlobalStore | StmtKind::GlobalTemporaryStore => StmtKind::AtomicStore,
            _ => continue,
        };
        stmt.kind = rewritten;
        promoted += 1;
    }
    tracing::debug!(promoted, "promoted loads and stores to atomics");
    promoted
}
