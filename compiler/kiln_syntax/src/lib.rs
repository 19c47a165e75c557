//! Kernel syntax trees for the Kiln compiler.
//!
//! Kiln does not parse source text. A host-side parser hands over one
//! function literal as a [`SyntaxTree`]: a flat arena of [`Node`]s addressed
//! by [`NodeId`], each carrying the byte [`Span`] it was parsed from. This
//! crate owns that data structure plus:
//!
//! - [`TreeBuilder`]: programmatic construction (used by hosts that already
//!   have an AST of their own, and by tests).
//! - [`SyntaxTree::expr_text`]: the source text of an expression, used to
//!   evaluate free expressions against the kernel scope.
//! - [`resolve_symbols`]: lexical binding of identifier uses to their
//!   declarations, producing [`SymbolId`]s.

mod node;
mod resolve;
mod span;
mod tree;

pub use node::{BinaryOperator, Node, NodeKind, ObjectProperty, PrefixOperator};
pub use resolve::{resolve_symbols, Resolution, SymbolId};
pub use span::Span;
pub use tree::{NodeId, SyntaxTree, TreeBuilder};
