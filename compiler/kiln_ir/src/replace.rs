//! Operand replacement.

use rustc_hash::FxHashMap;

use crate::module::Module;
use crate::stmt::StmtId;

/// A set of `old → new` statement substitutions.
///
/// Chains resolve transitively: after `a → b` and `b → c`, uses of `a`
/// become `c`.
#[derive(Clone, Debug, Default)]
pub struct Replacements {
    map: FxHashMap<StmtId, StmtId>,
}

impl Replacements {
    pub fn new() -> Self {
        Replacements::default()
    }

    pub fn insert(&mut self, old: StmtId, new: StmtId) {
        if old != new {
            self.map.insert(old, new);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Final replacement of `id`, or `id` itself.
    pub fn resolve(&self, mut id: StmtId) -> StmtId {
        // A cycle stops after one pass over the map.
        for _ in 0..=self.map.len() {
            match self.map.get(&id) {
                Some(&next) => id = next,
                None => break,
            }
        }
        id
    }

    /// Rewrite the operands of every statement in `module`. Returns the
    /// number of operands changed.
    pub fn apply(&self, module: &mut Module) -> usize {
        if self.map.is_empty() {
            return 0;
        }
        let mut changed = 0;
        for stmt in module.arena_mut() {
            for operand in &mut stmt.operands {
                let resolved = self.resolve(*operand);
                if resolved != *operand {
                    *operand = resolved;
                    changed += 1;
                }
            }
        }
        changed
    }
}

/// Rewrite every operand of `module` through `map`.
pub fn replace_operands(module: &mut Module, map: &Replacements) -> usize {
    map.apply(module)
}
