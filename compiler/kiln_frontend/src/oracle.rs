//! Symbol resolution and the function handle the compiler consumes.
//!
//! The compiler never looks at identifier names to decide what they refer
//! to. It asks a [`SymbolOracle`], which maps identifier nodes to the
//! declaration they bind to and evaluates free expressions on the host.

use std::fmt;
use std::rc::Rc;

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_syntax::{resolve_symbols, NodeId, NodeKind, Resolution, SymbolId, SyntaxTree};

use crate::host::{HostValue, Scope};

/// Resolves identifiers of one syntax tree.
pub trait SymbolOracle: fmt::Debug {
    /// The symbol an identifier node refers to. `None` for free names.
    fn symbol(&self, node: NodeId) -> Option<SymbolId>;

    /// Evaluate the text of a free expression in `scope`.
    fn evaluate(&self, text: &str, scope: &Scope) -> Option<HostValue> {
        scope.evaluate(text)
    }
}

/// Block-scoped lexical resolution over a whole tree.
#[derive(Debug)]
pub struct LexicalOracle {
    resolution: Resolution,
}

impl LexicalOracle {
    pub fn new(tree: &SyntaxTree, root: NodeId) -> Self {
        LexicalOracle {
            resolution: resolve_symbols(tree, root),
        }
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }
}

impl SymbolOracle for LexicalOracle {
    fn symbol(&self, node: NodeId) -> Option<SymbolId> {
        self.resolution.symbol(node)
    }
}

/// A function literal or declaration, ready to be compiled or inlined.
#[derive(Clone)]
pub struct ParsedFunction {
    pub tree: Rc<SyntaxTree>,
    pub root: NodeId,
    pub oracle: Rc<dyn SymbolOracle>,
    pub params: Vec<NodeId>,
    /// A `Block`, or an expression for concise arrow functions.
    pub body: NodeId,
    /// Declared name, for diagnostics and generated names.
    pub name: Option<String>,
}

impl ParsedFunction {
    /// Wrap the function at `root`, resolving symbols over the whole
    /// function.
    pub fn new(tree: Rc<SyntaxTree>, root: NodeId) -> CompileResult<Self> {
        let oracle: Rc<dyn SymbolOracle> = Rc::new(LexicalOracle::new(&tree, root));
        Self::with_oracle(tree, root, oracle)
    }

    pub fn with_oracle(
        tree: Rc<SyntaxTree>,
        root: NodeId,
        oracle: Rc<dyn SymbolOracle>,
    ) -> CompileResult<Self> {
        let (params, body, name) = match tree.kind(root) {
            NodeKind::FunctionLiteral { params, body } => (params.clone(), *body, None),
            NodeKind::FunctionDeclaration { name, params, body } => (
                params.clone(),
                *body,
                tree.identifier(*name).map(str::to_owned),
            ),
            other => {
                return Err(CompileError::unsupported(format!(
                    "expected a function, found a {}",
                    other.describe()
                ))
                .at_node(&tree, root));
            }
        };
        Ok(ParsedFunction {
            tree,
            root,
            oracle,
            params,
            body,
            name,
        })
    }

    /// A function nested inside this one. Shares the tree and the oracle.
    pub fn nested(&self, root: NodeId) -> CompileResult<Self> {
        Self::with_oracle(Rc::clone(&self.tree), root, Rc::clone(&self.oracle))
    }

    pub fn same_tree(&self, other: &ParsedFunction) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree)
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|p| self.tree.identifier(*p))
            .collect()
    }

    /// Concise arrow bodies are a single expression.
    pub fn has_expression_body(&self) -> bool {
        !matches!(self.tree.kind(self.body), NodeKind::Block(_))
    }
}

impl fmt::Debug for ParsedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedFunction")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("params", &self.param_names())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ParsedFunction {
    fn eq(&self, other: &Self) -> bool {
        self.same_tree(other) && self.root == other.root
    }
}

#[cfg(test)]
mod tests;
