//! Kiln Eval - reference executor for offloaded IR.
//!
//! Runs the serial and compute sub-modules the pass pipeline produces
//! against host buffers of 32-bit words, so tests can check what a compiled
//! kernel computes without a GPU:
//!
//! - [`Device`]: root buffers per storage tree, global temporaries,
//!   argument and return buffers, random states
//! - [`execute`]: runs sub-modules in dispatch order, compute invocations
//!   in index order
//! - [`operators`]: scalar semantics of the IR operators, as the generated
//!   WGSL computes them

mod device;
mod exec;
pub mod operators;

pub use device::Device;
pub use exec::execute;
pub use operators::{f32_word, word_f32, Scalar};
