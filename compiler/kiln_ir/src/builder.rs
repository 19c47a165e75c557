//! IR construction.
//!
//! [`IrBuilder`] owns the module under construction and a stack of open
//! blocks. Every `create_*` factory allocates a statement in the arena and
//! appends it to the innermost open block, or to the module root when no
//! block is open.
//!
//! Blocks are opened and closed through [`InsertGuard`], a scoped insertion
//! point. A guard is released exactly once: explicitly with
//! [`InsertGuard::finish`], or by `Drop` on any other exit path, including a
//! `?` early return. Guards nest, and release happens in reverse order of
//! acquisition because each guard mutably borrows whatever opened it.

use std::ops::{Deref, DerefMut};

use smallvec::{smallvec, SmallVec};

use kiln_types::PrimitiveType;

use crate::module::{Block, BlockSlot, Module};
use crate::ops::{
    AtomicOpType, BinaryOpType, BuiltInInputKind, BuiltInOutputKind, DerivativeDirection,
    TextureFunctionKind, UnaryOpType,
};
use crate::program::{Field, Texture};
use crate::stmt::{ConstValue, Operands, StmtId, StmtKind};

/// Builds one [`Module`].
#[derive(Debug, Default)]
pub struct IrBuilder {
    module: Module,
    stack: Vec<Block>,
}

impl IrBuilder {
    pub fn new() -> Self {
        IrBuilder::default()
    }

    /// Continue building on an existing module. Used by passes that rebuild
    /// blocks.
    pub fn from_module(module: Module) -> Self {
        IrBuilder {
            module,
            stack: Vec::new(),
        }
    }

    pub fn into_module(self) -> Module {
        debug_assert!(
            self.stack.is_empty(),
            "module extracted with {} blocks still open",
            self.stack.len()
        );
        self.module
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    /// Number of currently open blocks.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn open_block(&mut self) -> usize {
        self.stack.push(Block::new());
        self.stack.len()
    }

    fn close_block(&mut self, depth: usize) -> Block {
        debug_assert_eq!(
            self.stack.len(),
            depth,
            "insertion guards released out of order"
        );
        self.stack.pop().unwrap_or_default()
    }

    /// Append an already allocated statement to the innermost open block.
    pub fn push_existing(&mut self, id: StmtId) -> StmtId {
        match self.stack.last_mut() {
            Some(block) => block.stmts.push(id),
            None => self.module.root.stmts.push(id),
        }
        id
    }

    /// Allocate and append a statement.
    pub fn push(
        &mut self,
        kind: StmtKind,
        operands: Operands,
        return_type: Option<PrimitiveType>,
    ) -> StmtId {
        let id = self.module.alloc(kind, operands, return_type);
        self.push_existing(id)
    }

    fn rt(&self, id: StmtId) -> PrimitiveType {
        let ty = self.module.return_type(id);
        debug_assert!(ty.is_some(), "operand {} has no value", id.raw());
        ty.unwrap_or(PrimitiveType::I32)
    }

    // ── Values ──────────────────────────────────────────────────────

    pub fn create_const_i32(&mut self, value: i32) -> StmtId {
        self.push(
            StmtKind::Const(ConstValue::I32(value)),
            SmallVec::new(),
            Some(PrimitiveType::I32),
        )
    }

    pub fn create_const_f32(&mut self, value: f32) -> StmtId {
        self.push(
            StmtKind::Const(ConstValue::F32(value)),
            SmallVec::new(),
            Some(PrimitiveType::F32),
        )
    }

    /// Constant of `prim` holding `value` (truncated toward zero for `i32`).
    pub fn create_constant(&mut self, prim: PrimitiveType, value: f64) -> StmtId {
        match prim {
            #[allow(clippy::cast_possible_truncation)]
            PrimitiveType::I32 => self.create_const_i32(value as i32),
            #[allow(clippy::cast_possible_truncation)]
            PrimitiveType::F32 => self.create_const_f32(value as f32),
        }
    }

    pub fn create_binary(&mut self, op: BinaryOpType, lhs: StmtId, rhs: StmtId) -> StmtId {
        let ty = op.result_type(self.rt(lhs), self.rt(rhs));
        self.push(StmtKind::Binary(op), smallvec![lhs, rhs], Some(ty))
    }

    pub fn create_unary(&mut self, op: UnaryOpType, operand: StmtId) -> StmtId {
        let ty = op.result_type(self.rt(operand));
        self.push(StmtKind::Unary(op), smallvec![operand], Some(ty))
    }

    /// Value cast to `prim`. Returns `value` itself when it already has that
    /// type.
    pub fn create_cast(&mut self, value: StmtId, prim: PrimitiveType) -> StmtId {
        if self.rt(value) == prim {
            return value;
        }
        let op = match prim {
            PrimitiveType::I32 => UnaryOpType::CastI32Value,
            PrimitiveType::F32 => UnaryOpType::CastF32Value,
        };
        self.create_unary(op, value)
    }

    pub fn create_arg_load(&mut self, prim: PrimitiveType, arg_id: u32) -> StmtId {
        self.push(StmtKind::ArgLoad { arg_id }, SmallVec::new(), Some(prim))
    }

    pub fn create_rand(&mut self, prim: PrimitiveType) -> StmtId {
        self.push(StmtKind::Rand, SmallVec::new(), Some(prim))
    }

    pub fn create_return(&mut self, values: &[StmtId]) -> StmtId {
        self.push(StmtKind::Return, SmallVec::from_slice(values), None)
    }

    // ── Memory ──────────────────────────────────────────────────────

    pub fn create_alloca(&mut self, prim: PrimitiveType) -> StmtId {
        self.push(StmtKind::Alloca, SmallVec::new(), Some(prim))
    }

    pub fn create_local_load(&mut self, ptr: StmtId) -> StmtId {
        let ty = self.module.pointed_type(ptr);
        self.push(StmtKind::LocalLoad, smallvec![ptr], ty)
    }

    pub fn create_local_store(&mut self, ptr: StmtId, value: StmtId) -> StmtId {
        self.push(StmtKind::LocalStore, smallvec![ptr, value], None)
    }

    /// Address of primitive `offset_in_element` of the element at `indices`.
    pub fn create_global_ptr(
        &mut self,
        field: &Field,
        indices: &[StmtId],
        offset_in_element: usize,
    ) -> StmtId {
        let ty = field.primitive_at(offset_in_element);
        self.push(
            StmtKind::GlobalPtr {
                field: field.clone(),
                offset_in_element,
            },
            SmallVec::from_slice(indices),
            ty,
        )
    }

    pub fn create_global_load(&mut self, ptr: StmtId) -> StmtId {
        let ty = self.module.pointed_type(ptr);
        self.push(StmtKind::GlobalLoad, smallvec![ptr], ty)
    }

    pub fn create_global_store(&mut self, ptr: StmtId, value: StmtId) -> StmtId {
        self.push(StmtKind::GlobalStore, smallvec![ptr, value], None)
    }

    pub fn create_global_temporary(&mut self, prim: PrimitiveType, offset: u32) -> StmtId {
        self.push(
            StmtKind::GlobalTemporary { offset },
            SmallVec::new(),
            Some(prim),
        )
    }

    pub fn create_global_temporary_load(&mut self, ptr: StmtId) -> StmtId {
        let ty = self.module.pointed_type(ptr);
        self.push(StmtKind::GlobalTemporaryLoad, smallvec![ptr], ty)
    }

    pub fn create_global_temporary_store(&mut self, ptr: StmtId, value: StmtId) -> StmtId {
        self.push(StmtKind::GlobalTemporaryStore, smallvec![ptr, value], None)
    }

    pub fn create_atomic_op(&mut self, op: AtomicOpType, dest: StmtId, operand: StmtId) -> StmtId {
        let ty = self.module.pointed_type(dest);
        self.push(StmtKind::AtomicOp(op), smallvec![dest, operand], ty)
    }

    pub fn create_atomic_load(&mut self, ptr: StmtId) -> StmtId {
        let ty = self.module.pointed_type(ptr);
        self.push(StmtKind::AtomicLoad, smallvec![ptr], ty)
    }

    pub fn create_atomic_store(&mut self, ptr: StmtId, value: StmtId) -> StmtId {
        self.push(StmtKind::AtomicStore, smallvec![ptr, value], None)
    }

    // ── Control flow ────────────────────────────────────────────────

    /// Range loop with an empty body; fill it through
    /// `InsertGuard::attach(.., BlockSlot::Body(id))`.
    pub fn create_range_for(&mut self, range: StmtId, strictly_serialize: bool) -> StmtId {
        self.push(
            StmtKind::RangeFor {
                strictly_serialize,
                is_parallel: false,
                body: Block::new(),
            },
            smallvec![range],
            None,
        )
    }

    pub fn create_loop_index(&mut self, loop_stmt: StmtId) -> StmtId {
        self.push(
            StmtKind::LoopIndex,
            smallvec![loop_stmt],
            Some(PrimitiveType::I32),
        )
    }

    pub fn create_while(&mut self) -> StmtId {
        self.push(
            StmtKind::While { body: Block::new() },
            SmallVec::new(),
            None,
        )
    }

    pub fn create_if(&mut self, cond: StmtId) -> StmtId {
        self.push(
            StmtKind::If {
                then_block: Block::new(),
                else_block: Block::new(),
            },
            smallvec![cond],
            None,
        )
    }

    pub fn create_break(&mut self) -> StmtId {
        self.push(StmtKind::Break, SmallVec::new(), None)
    }

    pub fn create_continue(&mut self) -> StmtId {
        self.push(StmtKind::Continue, SmallVec::new(), None)
    }

    // ── Graphics ────────────────────────────────────────────────────

    pub fn create_vertex_for(&mut self) -> StmtId {
        self.push(
            StmtKind::VertexFor { body: Block::new() },
            SmallVec::new(),
            None,
        )
    }

    pub fn create_fragment_for(&mut self) -> StmtId {
        self.push(
            StmtKind::FragmentFor { body: Block::new() },
            SmallVec::new(),
            None,
        )
    }

    pub fn create_vertex_input(&mut self, prim: PrimitiveType, location: u32) -> StmtId {
        self.push(StmtKind::VertexInput { location }, SmallVec::new(), Some(prim))
    }

    pub fn create_vertex_output(&mut self, value: StmtId, location: u32) -> StmtId {
        self.push(StmtKind::VertexOutput { location }, smallvec![value], None)
    }

    pub fn create_fragment_input(&mut self, prim: PrimitiveType, location: u32) -> StmtId {
        self.push(
            StmtKind::FragmentInput { location },
            SmallVec::new(),
            Some(prim),
        )
    }

    pub fn create_builtin_output(&mut self, kind: BuiltInOutputKind, values: &[StmtId]) -> StmtId {
        self.push(
            StmtKind::BuiltInOutput(kind),
            SmallVec::from_slice(values),
            None,
        )
    }

    pub fn create_builtin_input(&mut self, kind: BuiltInInputKind) -> StmtId {
        self.push(
            StmtKind::BuiltInInput(kind),
            SmallVec::new(),
            Some(PrimitiveType::I32),
        )
    }

    pub fn create_fragment_derivative(
        &mut self,
        direction: DerivativeDirection,
        value: StmtId,
    ) -> StmtId {
        self.push(
            StmtKind::FragmentDerivative(direction),
            smallvec![value],
            Some(PrimitiveType::F32),
        )
    }

    pub fn create_discard(&mut self) -> StmtId {
        self.push(StmtKind::Discard, SmallVec::new(), None)
    }

    pub fn create_texture_function(
        &mut self,
        texture: &Texture,
        kind: TextureFunctionKind,
        coords: &[StmtId],
        extra: &[StmtId],
    ) -> StmtId {
        let mut operands: Operands = SmallVec::from_slice(coords);
        operands.extend_from_slice(extra);
        self.push(
            StmtKind::TextureFunction {
                texture: texture.clone(),
                kind,
                coords_count: coords.len(),
            },
            operands,
            kind.result_type(),
        )
    }

    pub fn create_composite_extract(&mut self, composite: StmtId, element_index: usize) -> StmtId {
        let ty = self.module.return_type(composite);
        self.push(
            StmtKind::CompositeExtract { element_index },
            smallvec![composite],
            ty,
        )
    }
}

/// Anything that can lend its [`IrBuilder`].
///
/// Implemented by the builder itself and by every component that builds IR
/// (the compiling visitor, rebuilding passes), so that [`InsertGuard`] can
/// wrap them and keep their full API reachable through `Deref`.
pub trait BuilderHost {
    fn builder(&mut self) -> &mut IrBuilder;
}

impl BuilderHost for IrBuilder {
    fn builder(&mut self) -> &mut IrBuilder {
        self
    }
}

/// Scoped insertion point.
///
/// While the guard is alive, statements created through its host are
/// appended to the guard's block. On release the block is either installed
/// into its target slot (attached guards) or handed back to the caller
/// (detached guards, via [`finish`](Self::finish)).
pub struct InsertGuard<'h, H: BuilderHost> {
    host: &'h mut H,
    target: Option<BlockSlot>,
    depth: usize,
    released: bool,
}

impl<'h, H: BuilderHost> InsertGuard<'h, H> {
    /// Open a detached block.
    pub fn new(host: &'h mut H) -> Self {
        let depth = host.builder().open_block();
        InsertGuard {
            host,
            target: None,
            depth,
            released: false,
        }
    }

    /// Open a block that is installed into `slot` on release, replacing its
    /// current contents.
    pub fn attach(host: &'h mut H, slot: BlockSlot) -> Self {
        let depth = host.builder().open_block();
        InsertGuard {
            host,
            target: Some(slot),
            depth,
            released: false,
        }
    }

    fn release(&mut self) -> Block {
        if self.released {
            return Block::new();
        }
        self.released = true;
        let builder = self.host.builder();
        let block = builder.close_block(self.depth);
        match self.target {
            Some(slot) => {
                let installed = builder.module.set_block(slot, block);
                debug_assert!(installed, "guard target {slot:?} does not exist");
                Block::new()
            }
            None => block,
        }
    }

    /// Release the guard. Returns the built block for detached guards and an
    /// empty block for attached ones.
    pub fn finish(mut self) -> Block {
        self.release()
    }
}

impl<H: BuilderHost> Deref for InsertGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.host
    }
}

impl<H: BuilderHost> DerefMut for InsertGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.host
    }
}

impl<H: BuilderHost> Drop for InsertGuard<'_, H> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests;
