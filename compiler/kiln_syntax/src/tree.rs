//! The syntax tree arena and its builder.

use std::fmt::Write as _;

use smallvec::SmallVec;

use crate::node::{BinaryOperator, Node, NodeKind, ObjectProperty, PrefixOperator};
use crate::span::Span;

/// Index of a node in its [`SyntaxTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        NodeId(raw)
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

/// A parsed kernel: a flat node arena plus, optionally, the source text the
/// spans point into.
#[derive(Clone, Debug, Default)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    source: Option<String>,
}

impl SyntaxTree {
    /// The node with id `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not allocated by this tree.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    #[inline]
    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The identifier name of an `Identifier` node.
    pub fn identifier(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Source text of an expression.
    ///
    /// Slices the source when the node has a real span, otherwise rebuilds a
    /// canonical rendering from the node structure. Free expressions are
    /// evaluated on the host by this text, so paths such as `a.b[2].c`
    /// must round-trip exactly.
    pub fn expr_text(&self, id: NodeId) -> String {
        let node = self.node(id);
        if let Some(source) = &self.source {
            if !node.span.is_empty() {
                if let Some(text) = source.get(node.span.to_range()) {
                    return text.to_owned();
                }
            }
        }
        let mut out = String::new();
        self.render(id, &mut out);
        out
    }

    fn render(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::NumericLiteral(text) => out.push_str(text),
            NodeKind::BooleanLiteral(value) => {
                let _ = write!(out, "{value}");
            }
            NodeKind::StringLiteral(text) => {
                let _ = write!(out, "\"{text}\"");
            }
            NodeKind::Identifier(name) => out.push_str(name),
            NodeKind::This => out.push_str("this"),
            NodeKind::PropertyAccess { object, name } => {
                self.render(*object, out);
                out.push('.');
                out.push_str(name);
            }
            NodeKind::ElementAccess { object, index } => {
                self.render(*object, out);
                out.push('[');
                self.render(*index, out);
                out.push(']');
            }
            NodeKind::Call { callee, args } => {
                self.render(*callee, out);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render(*arg, out);
                }
                out.push(')');
            }
            NodeKind::ArrayLiteral(elements) => {
                out.push('[');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render(*element, out);
                }
                out.push(']');
            }
            NodeKind::Paren(inner) => {
                out.push('(');
                self.render(*inner, out);
                out.push(')');
            }
            NodeKind::TypeAssertion(inner) => self.render(*inner, out),
            NodeKind::Prefix { op, operand } => {
                out.push_str(op.as_str());
                self.render(*operand, out);
            }
            NodeKind::Binary { op, lhs, rhs } => {
                self.render(*lhs, out);
                let _ = write!(out, " {} ", op.as_str());
                self.render(*rhs, out);
            }
            other => {
                let _ = write!(out, "<{}>", other.describe());
            }
        }
    }
}

/// Incremental construction of a [`SyntaxTree`].
///
/// Every method allocates one node (plus identifier nodes for the names it
/// is given) and returns its id. Nodes get [`Span::DUMMY`] unless
/// [`set_span`](Self::set_span) is called.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: SyntaxTree,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder::default()
    }

    /// Builder whose spans refer into `source`.
    pub fn with_source(source: impl Into<String>) -> Self {
        TreeBuilder {
            tree: SyntaxTree {
                nodes: Vec::new(),
                source: Some(source.into()),
            },
        }
    }

    pub fn finish(self) -> SyntaxTree {
        self.tree
    }

    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(u32::try_from(self.tree.nodes.len()).unwrap_or(u32::MAX));
        self.tree.nodes.push(Node {
            kind,
            span: Span::DUMMY,
        });
        id
    }

    pub fn set_span(&mut self, id: NodeId, span: Span) -> NodeId {
        if let Some(node) = self.tree.nodes.get_mut(id.index()) {
            node.span = span;
        }
        id
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub fn num(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::NumericLiteral(text.to_owned()))
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.push(NodeKind::NumericLiteral(value.to_string()))
    }

    /// Float literal; always rendered with a `.` or exponent.
    pub fn float(&mut self, value: f64) -> NodeId {
        self.push(NodeKind::NumericLiteral(format!("{value:?}")))
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.push(NodeKind::BooleanLiteral(value))
    }

    pub fn string(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::StringLiteral(text.to_owned()))
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Identifier(name.to_owned()))
    }

    pub fn this(&mut self) -> NodeId {
        self.push(NodeKind::This)
    }

    pub fn array(&mut self, elements: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::ArrayLiteral(elements))
    }

    /// Object literal from `(name, value)` pairs.
    pub fn object(&mut self, members: Vec<(&str, NodeId)>) -> NodeId {
        let members = members
            .into_iter()
            .map(|(name, value)| ObjectProperty::Assignment {
                name: name.to_owned(),
                value,
            })
            .collect();
        self.push(NodeKind::ObjectLiteral(members))
    }

    pub fn object_with(&mut self, members: Vec<ObjectProperty>) -> NodeId {
        self.push(NodeKind::ObjectLiteral(members))
    }

    pub fn shorthand(&mut self, name: &str) -> ObjectProperty {
        ObjectProperty::Shorthand {
            ident: self.ident(name),
        }
    }

    pub fn prop(&mut self, object: NodeId, name: &str) -> NodeId {
        self.push(NodeKind::PropertyAccess {
            object,
            name: name.to_owned(),
        })
    }

    /// `a.b.c` from a dotted path.
    pub fn path(&mut self, dotted: &str) -> NodeId {
        let mut parts = dotted.split('.');
        let first = parts.next().unwrap_or_default();
        let mut node = self.ident(first);
        for part in parts {
            node = self.prop(node, part);
        }
        node
    }

    pub fn index(&mut self, object: NodeId, index: NodeId) -> NodeId {
        self.push(NodeKind::ElementAccess { object, index })
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Call {
            callee,
            args: SmallVec::from_vec(args),
        })
    }

    /// Call of a dotted path, e.g. `call_path("ti.sqrt", [x])`.
    pub fn call_path(&mut self, callee: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.path(callee);
        self.call(callee, args)
    }

    /// `object.method(args)`.
    pub fn method(&mut self, object: NodeId, method: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.prop(object, method);
        self.call(callee, args)
    }

    pub fn prefix(&mut self, op: PrefixOperator, operand: NodeId) -> NodeId {
        self.push(NodeKind::Prefix { op, operand })
    }

    pub fn postfix(&mut self, increment: bool, operand: NodeId) -> NodeId {
        self.push(NodeKind::Postfix { increment, operand })
    }

    pub fn binary(&mut self, op: BinaryOperator, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.push(NodeKind::Binary { op, lhs, rhs })
    }

    pub fn assign(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinaryOperator::Assign, lhs, rhs)
    }

    pub fn conditional(&mut self, cond: NodeId, then_expr: NodeId, else_expr: NodeId) -> NodeId {
        self.push(NodeKind::Conditional {
            cond,
            then_expr,
            else_expr,
        })
    }

    pub fn paren(&mut self, inner: NodeId) -> NodeId {
        self.push(NodeKind::Paren(inner))
    }

    pub fn assertion(&mut self, inner: NodeId) -> NodeId {
        self.push(NodeKind::TypeAssertion(inner))
    }

    /// Function literal with the given parameter names.
    pub fn function(&mut self, params: &[&str], body: NodeId) -> NodeId {
        let params = params.iter().map(|p| self.ident(p)).collect();
        self.push(NodeKind::FunctionLiteral { params, body })
    }

    // ── Statements ──────────────────────────────────────────────────

    pub fn let_(&mut self, name: &str, init: NodeId) -> NodeId {
        let ident = self.ident(name);
        self.push(NodeKind::VariableStatement(vec![(ident, Some(init))]))
    }

    pub fn let_uninit(&mut self, name: &str) -> NodeId {
        let ident = self.ident(name);
        self.push(NodeKind::VariableStatement(vec![(ident, None)]))
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.push(NodeKind::ExpressionStatement(expr))
    }

    pub fn block(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Block(stmts))
    }

    pub fn if_(&mut self, cond: NodeId, then_stmt: NodeId, else_stmt: Option<NodeId>) -> NodeId {
        self.push(NodeKind::If {
            cond,
            then_stmt,
            else_stmt,
        })
    }

    pub fn while_(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.push(NodeKind::While { cond, body })
    }

    pub fn for_of(&mut self, bindings: &[&str], iterable: NodeId, body: NodeId) -> NodeId {
        let bindings = bindings.iter().map(|b| self.ident(b)).collect();
        self.push(NodeKind::ForOf {
            bindings,
            iterable,
            body,
        })
    }

    pub fn for_in(&mut self, binding: &str, iterable: NodeId, body: NodeId) -> NodeId {
        let binding = self.ident(binding);
        self.push(NodeKind::ForIn {
            binding,
            iterable,
            body,
        })
    }

    pub fn for_c(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    ) -> NodeId {
        self.push(NodeKind::For {
            init,
            cond,
            update,
            body,
        })
    }

    pub fn break_(&mut self) -> NodeId {
        self.push(NodeKind::Break)
    }

    pub fn continue_(&mut self) -> NodeId {
        self.push(NodeKind::Continue)
    }

    pub fn return_(&mut self, value: Option<NodeId>) -> NodeId {
        self.push(NodeKind::Return(value))
    }

    pub fn function_decl(&mut self, name: &str, params: &[&str], body: NodeId) -> NodeId {
        let name = self.ident(name);
        let params = params.iter().map(|p| self.ident(p)).collect();
        self.push(NodeKind::FunctionDeclaration { name, params, body })
    }

    pub fn unsupported(&mut self, kind: &str) -> NodeId {
        self.push(NodeKind::Unsupported(kind.to_owned()))
    }
}
