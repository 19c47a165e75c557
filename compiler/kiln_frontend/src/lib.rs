//! Kiln frontend - from a kernel's syntax tree to compiled shaders.
//!
//! - [`Value`]: the compile-time representation of an expression
//! - [`HostValue`] and [`Scope`]: values owned by the embedding program
//! - [`SymbolOracle`] and [`ParsedFunction`]: what the compiler is given
//! - [`builtin`]: operators and intrinsics, with constant folding
//! - [`KernelCompiler`]: IR construction, passes and code generation
//!
//! The compiling visitor itself is private. It inlines every call, so a
//! kernel becomes one flat IR module that the passes split into GPU
//! dispatches.

pub mod builtin;
mod compiler;
mod host;
mod kernel;
mod library;
mod oracle;
mod value;

pub use host::{HostKey, HostValue, Scope};
pub use kernel::{KernelCompiler, KernelOptions, LoweredKernel};
pub use library::Library;
pub use oracle::{LexicalOracle, ParsedFunction, SymbolOracle};
pub use value::Value;
