//! Blocks and the statement arena.

use smallvec::SmallVec;

use kiln_types::PrimitiveType;

use crate::stmt::{Operands, Stmt, StmtId, StmtKind};

/// An ordered statement list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub stmts: Vec<StmtId>,
}

impl Block {
    pub fn new() -> Self {
        Block::default()
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

/// Where a block lives: the module root, or a slot of a block-owning
/// statement.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockSlot {
    Root,
    /// Body of a `RangeFor`, `While`, `VertexFor` or `FragmentFor`.
    Body(StmtId),
    Then(StmtId),
    Else(StmtId),
}

/// A kernel's IR: the arena that owns every statement, and the root block.
///
/// Statements removed from blocks stay in the arena (unreachable) so ids
/// remain valid for the module's lifetime.
#[derive(Clone, Debug, Default)]
pub struct Module {
    stmts: Vec<Stmt>,
    pub root: Block,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    /// One past the highest allocated id.
    pub fn id_bound(&self) -> u32 {
        u32::try_from(self.stmts.len()).unwrap_or(u32::MAX)
    }

    /// Allocate a statement in the arena without placing it in a block.
    pub fn alloc(
        &mut self,
        kind: StmtKind,
        operands: Operands,
        return_type: Option<PrimitiveType>,
    ) -> StmtId {
        let id = StmtId::new(self.id_bound());
        self.stmts.push(Stmt {
            id,
            kind,
            operands,
            return_type,
            name_hint: None,
        });
        id
    }

    /// # Panics
    ///
    /// Panics if `id` was not allocated by this module.
    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[inline]
    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    #[inline]
    pub fn get(&self, id: StmtId) -> Option<&Stmt> {
        self.stmts.get(id.index())
    }

    #[inline]
    pub fn kind(&self, id: StmtId) -> &StmtKind {
        &self.stmt(id).kind
    }

    #[inline]
    pub fn return_type(&self, id: StmtId) -> Option<PrimitiveType> {
        self.stmt(id).return_type
    }

    pub fn set_name_hint(&mut self, id: StmtId, hint: impl Into<String>) {
        self.stmt_mut(id).name_hint = Some(hint.into());
    }

    /// Primitive stored behind an address statement.
    pub fn pointed_type(&self, ptr: StmtId) -> Option<PrimitiveType> {
        let stmt = self.stmt(ptr);
        if stmt.kind.is_pointer() {
            stmt.return_type
        } else {
            None
        }
    }

    pub fn stmt_name(&self, id: StmtId) -> String {
        self.stmt(id).name()
    }

    /// Block slots owned by statement `id`, in source order.
    pub fn slots_of(&self, id: StmtId) -> SmallVec<[BlockSlot; 2]> {
        let mut slots = SmallVec::new();
        match &self.stmt(id).kind {
            StmtKind::RangeFor { .. }
            | StmtKind::While { .. }
            | StmtKind::VertexFor { .. }
            | StmtKind::FragmentFor { .. } => slots.push(BlockSlot::Body(id)),
            StmtKind::If { .. } => {
                slots.push(BlockSlot::Then(id));
                slots.push(BlockSlot::Else(id));
            }
            _ => {}
        }
        slots
    }

    pub fn block(&self, slot: BlockSlot) -> Option<&Block> {
        match slot {
            BlockSlot::Root => Some(&self.root),
            BlockSlot::Body(id) => match &self.get(id)?.kind {
                StmtKind::RangeFor { body, .. }
                | StmtKind::While { body }
                | StmtKind::VertexFor { body }
                | StmtKind::FragmentFor { body } => Some(body),
                _ => None,
            },
            BlockSlot::Then(id) => match &self.get(id)?.kind {
                StmtKind::If { then_block, .. } => Some(then_block),
                _ => None,
            },
            BlockSlot::Else(id) => match &self.get(id)?.kind {
                StmtKind::If { else_block, .. } => Some(else_block),
                _ => None,
            },
        }
    }

    pub fn block_mut(&mut self, slot: BlockSlot) -> Option<&mut Block> {
        match slot {
            BlockSlot::Root => Some(&mut self.root),
            BlockSlot::Body(id) => match &mut self.stmts.get_mut(id.index())?.kind {
                StmtKind::RangeFor { body, .. }
                | StmtKind::While { body }
                | StmtKind::VertexFor { body }
                | StmtKind::FragmentFor { body } => Some(body),
                _ => None,
            },
            BlockSlot::Then(id) => match &mut self.stmts.get_mut(id.index())?.kind {
                StmtKind::If { then_block, .. } => Some(then_block),
                _ => None,
            },
            BlockSlot::Else(id) => match &mut self.stmts.get_mut(id.index())?.kind {
                StmtKind::If { else_block, .. } => Some(else_block),
                _ => None,
            },
        }
    }

    /// Move the block out of `slot`, leaving an empty one.
    pub fn take_block(&mut self, slot: BlockSlot) -> Block {
        self.block_mut(slot).map(std::mem::take).unwrap_or_default()
    }

    /// Install `block` into `slot`. Returns `false` if the slot does not
    /// exist.
    pub fn set_block(&mut self, slot: BlockSlot, block: Block) -> bool {
        match self.block_mut(slot) {
            Some(target) => {
                *target = block;
                true
            }
            None => false,
        }
    }

    /// Statements reachable from the root, in pre-order (a block-owning
    /// statement precedes its nested statements).
    pub fn reachable(&self) -> Vec<StmtId> {
        let mut out = Vec::new();
        self.collect_block(&self.root, &mut out);
        out
    }

    /// Statements reachable from `block`, in pre-order.
    pub fn reachable_from(&self, block: &Block) -> Vec<StmtId> {
        let mut out = Vec::new();
        self.collect_block(block, &mut out);
        out
    }

    fn collect_block(&self, block: &Block, out: &mut Vec<StmtId>) {
        for &id in &block.stmts {
            out.push(id);
            for slot in self.slots_of(id) {
                if let Some(nested) = self.block(slot) {
                    self.collect_block(nested, out);
                }
            }
        }
    }

    /// Iterate every arena statement, reachable or not.
    pub fn arena(&self) -> impl Iterator<Item = &Stmt> {
        self.stmts.iter()
    }

    pub(crate) fn arena_mut(&mut self) -> impl Iterator<Item = &mut Stmt> {
        self.stmts.iter_mut()
    }
}
