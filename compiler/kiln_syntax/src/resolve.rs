//! Lexical symbol resolution.
//!
//! Binds every identifier use inside a function literal to the declaration
//! it refers to: parameters, `let`/`const` names, `for-of` bindings and named
//! function declarations (hoisted to the top of their block). Identifiers
//! with no enclosing declaration stay unresolved; the compiler looks those up
//! in the kernel scope instead.

use rustc_hash::FxHashMap;

use crate::node::{NodeKind, ObjectProperty};
use crate::tree::{NodeId, SyntaxTree};

/// A declared name. Two identifier nodes with the same `SymbolId` refer to
/// the same variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        SymbolId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Result of [`resolve_symbols`].
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    uses: FxHashMap<NodeId, SymbolId>,
    declarations: Vec<NodeId>,
}

impl Resolution {
    /// The symbol an identifier node refers to (declaration sites resolve to
    /// the symbol they declare).
    pub fn symbol(&self, ident: NodeId) -> Option<SymbolId> {
        self.uses.get(&ident).copied()
    }

    /// Identifier node that declared `symbol`.
    pub fn declaration(&self, symbol: SymbolId) -> Option<NodeId> {
        self.declarations.get(symbol.index()).copied()
    }

    pub fn num_symbols(&self) -> usize {
        self.declarations.len()
    }
}

/// Resolve all identifiers under `root`.
pub fn resolve_symbols(tree: &SyntaxTree, root: NodeId) -> Resolution {
    let mut resolver = Resolver {
        tree,
        scopes: vec![FxHashMap::default()],
        resolution: Resolution::default(),
    };
    resolver.walk(root);
    resolver.resolution
}

struct Resolver<'t> {
    tree: &'t SyntaxTree,
    scopes: Vec<FxHashMap<String, SymbolId>>,
    resolution: Resolution,
}

impl Resolver<'_> {
    fn declare(&mut self, ident: NodeId) {
        let Some(name) = self.tree.identifier(ident) else {
            return;
        };
        let symbol = SymbolId::new(
            u32::try_from(self.resolution.declarations.len()).unwrap_or(u32::MAX),
        );
        self.resolution.declarations.push(ident);
        self.resolution.uses.insert(ident, symbol);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), symbol);
        }
    }

    fn lookup(&mut self, ident: NodeId, name: &str) {
        if self.resolution.uses.contains_key(&ident) {
            return;
        }
        let found = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied());
        if let Some(symbol) = found {
            self.resolution.uses.insert(ident, symbol);
        }
    }

    fn with_scope(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(FxHashMap::default());
        f(self);
        self.scopes.pop();
    }

    fn walk_function(&mut self, params: &[NodeId], body: NodeId) {
        self.with_scope(|this| {
            for param in params {
                this.declare(*param);
            }
            this.walk(body);
        });
    }

    fn walk(&mut self, id: NodeId) {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::Identifier(name) => self.lookup(id, name),
            NodeKind::NumericLiteral(_)
            | NodeKind::BooleanLiteral(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::This
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Unsupported(_) => {}
            NodeKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.walk(*element);
                }
            }
            NodeKind::ObjectLiteral(members) => {
                for member in members {
                    match member {
                        ObjectProperty::Assignment { value, .. } => self.walk(*value),
                        ObjectProperty::Shorthand { ident } => self.walk(*ident),
                    }
                }
            }
            NodeKind::PropertyAccess { object, .. } => self.walk(*object),
            NodeKind::ElementAccess { object, index } => {
                self.walk(*object);
                self.walk(*index);
            }
            NodeKind::Call { callee, args } => {
                self.walk(*callee);
                for arg in args {
                    self.walk(*arg);
                }
            }
            NodeKind::Prefix { operand, .. } | NodeKind::Postfix { operand, .. } => {
                self.walk(*operand);
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                self.walk(*lhs);
                self.walk(*rhs);
            }
            NodeKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                self.walk(*cond);
                self.walk(*then_expr);
                self.walk(*else_expr);
            }
            NodeKind::Paren(inner)
            | NodeKind::TypeAssertion(inner)
            | NodeKind::ExpressionStatement(inner) => self.walk(*inner),
            NodeKind::FunctionLiteral { params, body } => self.walk_function(params, *body),
            NodeKind::FunctionDeclaration { name, params, body } => {
                // Declarations inside a block were hoisted already; a bare
                // root declaration binds its own name here.
                if !self.resolution.uses.contains_key(name) {
                    self.declare(*name);
                }
                self.walk_function(params, *body);
            }
            NodeKind::VariableStatement(decls) => {
                for (ident, init) in decls {
                    if let Some(init) = init {
                        self.walk(*init);
                    }
                    self.declare(*ident);
                }
            }
            NodeKind::Block(stmts) => self.with_scope(|this| {
                for stmt in stmts {
                    if let NodeKind::FunctionDeclaration { name, .. } = tree.kind(*stmt) {
                        this.declare(*name);
                    }
                }
                for stmt in stmts {
                    this.walk(*stmt);
                }
            }),
            NodeKind::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                self.walk(*cond);
                self.walk(*then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.walk(*else_stmt);
                }
            }
            NodeKind::While { cond, body } => {
                self.walk(*cond);
                self.walk(*body);
            }
            NodeKind::ForOf {
                bindings,
                iterable,
                body,
            } => {
                self.walk(*iterable);
                self.with_scope(|this| {
                    for binding in bindings {
                        this.declare(*binding);
                    }
                    this.walk(*body);
                });
            }
            NodeKind::ForIn {
                binding,
                iterable,
                body,
            } => {
                self.walk(*iterable);
                self.with_scope(|this| {
                    this.declare(*binding);
                    this.walk(*body);
                });
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => self.with_scope(|this| {
                for part in [init, cond, update].into_iter().flatten() {
                    this.walk(*part);
                }
                this.walk(*body);
            }),
            NodeKind::Return(value) => {
                if let Some(value) = value {
                    self.walk(*value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
