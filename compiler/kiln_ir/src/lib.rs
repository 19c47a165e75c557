//! Kiln IR - the statement IR kernels are lowered to.
//!
//! - [`Program`]: host-side registry of fields, storage trees and textures
//! - [`Stmt`] / [`Block`] / [`Module`]: arena-owned statements with stable ids
//! - [`IrBuilder`] and [`InsertGuard`]: construction with scoped insertion
//! - [`Transformer`]: block-rebuilding skeleton for passes
//! - [`Replacements`]: transitive operand substitution
//! - [`print_module`]: deterministic text dump
//!
//! # Design
//!
//! Statements never move: a pass that drops a statement only removes it from
//! its block. Every statement reference a generic pass must rewrite lives in
//! `Stmt::operands`, so [`Replacements::apply`] is the single place uses are
//! redirected.

mod builder;
mod module;
pub mod ops;
mod printer;
mod program;
mod replace;
mod stmt;
mod transform;

pub use builder::{BuilderHost, InsertGuard, IrBuilder};
pub use module::{Block, BlockSlot, Module};
pub use ops::{
    AtomicOpType, BinaryOpType, BuiltInInputKind, BuiltInOutputKind, DerivativeDirection,
    TextureFunctionKind, UnaryOpType,
};
pub use printer::{print_block, print_module};
pub use program::{
    Field, FieldId, FieldOptions, Program, StorageTree, Texture, TextureDimensionality,
    TextureId, TextureKind, TreeId,
};
pub use replace::{replace_operands, Replacements};
pub use stmt::{ConstValue, Operands, Stmt, StmtId, StmtKind};
pub use transform::{rebuild_module, Transformer};
