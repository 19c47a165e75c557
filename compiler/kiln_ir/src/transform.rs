//! Rebuild skeleton for passes that rewrite blocks.
//!
//! A transformer walks the module's blocks and re-emits statements through
//! its builder. The default [`Transformer::visit`] keeps every statement as
//! is; a pass overrides it to drop statements, insert new ones around them,
//! or replace them. Each block is rebuilt under an attached [`InsertGuard`],
//! so the new block only replaces the old one once it is complete.

use crate::builder::{BuilderHost, InsertGuard};
use crate::module::BlockSlot;
use crate::stmt::StmtId;

pub trait Transformer: BuilderHost + Sized {
    /// Re-emit statement `id` into the current block.
    fn visit(&mut self, id: StmtId) {
        self.keep(id);
    }

    /// Append `id` unchanged and rebuild its nested blocks.
    fn keep(&mut self, id: StmtId) {
        self.builder().push_existing(id);
        let slots = self.builder().module().slots_of(id);
        for slot in slots {
            let old = self.builder().module_mut().take_block(slot);
            let mut guard = InsertGuard::attach(self, slot);
            for &child in &old.stmts {
                guard.visit(child);
            }
        }
    }
}

/// Rebuild the whole module through `transformer`.
pub fn rebuild_module<T: Transformer>(transformer: &mut T) {
    let root = transformer.builder().module_mut().take_block(BlockSlot::Root);
    let mut guard = InsertGuard::attach(transformer, BlockSlot::Root);
    for &id in &root.stmts {
        guard.visit(id);
    }
}
