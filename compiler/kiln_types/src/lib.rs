//! Kernel value types for the Kiln compiler.
//!
//! Every value a kernel manipulates is built out of two primitives, `i32` and
//! `f32`. This crate provides:
//!
//! - [`PrimitiveType`]: the two machine primitives.
//! - [`Type`]: the closed set of kernel types (scalars, vectors, matrices,
//!   structs, pointers, plus the compile-time-only `Void`, `Function` and
//!   host-object kinds).
//! - [`TypeError`]: the error an operator reports from its type check.
//!
//! # Flattening
//!
//! Every type flattens to an ordered list of primitives via
//! [`Type::primitives`]. A value of that type is represented in IR by exactly
//! one statement per primitive, so the flattening order is part of the
//! contract between the frontend, the passes and the code generator:
//! matrices are row-major and struct members follow declaration order.

mod error;
mod ty;

pub use error::TypeError;
pub use ty::{PrimitiveType, StructType, Type, TypeCategory};
