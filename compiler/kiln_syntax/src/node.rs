//! Node kinds of the kernel syntax tree.
//!
//! The node set mirrors what a kernel body may contain: expressions,
//! statements and nested function literals. Constructs the compiler rejects
//! (C-style `for`, `for-in`) still get a node kind so the rejection carries a
//! precise location; anything else the host parser cannot map lands in
//! [`NodeKind::Unsupported`].

use smallvec::SmallVec;

use crate::span::Span;
use crate::tree::NodeId;

/// One node in a [`SyntaxTree`](crate::SyntaxTree).
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

/// Prefix (unary) operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrefixOperator {
    Plus,
    Minus,
    Not,
    BitNot,
    Increment,
    Decrement,
}

impl PrefixOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            PrefixOperator::Plus => "+",
            PrefixOperator::Minus => "-",
            PrefixOperator::Not => "!",
            PrefixOperator::BitNot => "~",
            PrefixOperator::Increment => "++",
            PrefixOperator::Decrement => "--",
        }
    }
}

/// Binary operator tokens, including assignments and the comma operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Shl,
    Sar,
    Shr,
    Comma,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
    ShlAssign,
    SarAssign,
    ShrAssign,
    PowAssign,
}

impl BinaryOperator {
    /// The source token.
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::StrictEq => "===",
            BinaryOperator::StrictNe => "!==",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::LogicalAnd => "&&",
            BinaryOperator::LogicalOr => "||",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Sar => ">>",
            BinaryOperator::Shr => ">>>",
            BinaryOperator::Comma => ",",
            BinaryOperator::Assign => "=",
            BinaryOperator::AddAssign => "+=",
            BinaryOperator::SubAssign => "-=",
            BinaryOperator::MulAssign => "*=",
            BinaryOperator::DivAssign => "/=",
            BinaryOperator::ModAssign => "%=",
            BinaryOperator::BitAndAssign => "&=",
            BinaryOperator::BitOrAssign => "|=",
            BinaryOperator::BitXorAssign => "^=",
            BinaryOperator::ShlAssign => "<<=",
            BinaryOperator::SarAssign => ">>=",
            BinaryOperator::ShrAssign => ">>>=",
            BinaryOperator::PowAssign => "**=",
        }
    }

    /// For `a op= b`, the operator `op`. `None` for plain `=` and for
    /// non-assignments.
    pub fn compound_base(self) -> Option<BinaryOperator> {
        Some(match self {
            BinaryOperator::AddAssign => BinaryOperator::Add,
            BinaryOperator::SubAssign => BinaryOperator::Sub,
            BinaryOperator::MulAssign => BinaryOperator::Mul,
            BinaryOperator::DivAssign => BinaryOperator::Div,
            BinaryOperator::ModAssign => BinaryOperator::Mod,
            BinaryOperator::BitAndAssign => BinaryOperator::BitAnd,
            BinaryOperator::BitOrAssign => BinaryOperator::BitOr,
            BinaryOperator::BitXorAssign => BinaryOperator::BitXor,
            BinaryOperator::ShlAssign => BinaryOperator::Shl,
            BinaryOperator::SarAssign => BinaryOperator::Sar,
            BinaryOperator::ShrAssign => BinaryOperator::Shr,
            BinaryOperator::PowAssign => BinaryOperator::Pow,
            _ => return None,
        })
    }

    pub fn is_assignment(self) -> bool {
        self == BinaryOperator::Assign || self.compound_base().is_some()
    }
}

/// A member of an object literal.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectProperty {
    /// `name: value`
    Assignment { name: String, value: NodeId },
    /// `{ name }`. `ident` is the identifier node, resolved like any other
    /// identifier use.
    Shorthand { ident: NodeId },
}

/// What a node is.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    // ── Expressions ─────────────────────────────────────────────────

    /// Numeric literal, verbatim (`3`, `1.5`, `2e3`, `0x10`).
    NumericLiteral(String),
    BooleanLiteral(bool),
    StringLiteral(String),
    Identifier(String),
    This,
    ArrayLiteral(Vec<NodeId>),
    ObjectLiteral(Vec<ObjectProperty>),
    PropertyAccess {
        object: NodeId,
        name: String,
    },
    ElementAccess {
        object: NodeId,
        index: NodeId,
    },
    Call {
        callee: NodeId,
        args: SmallVec<[NodeId; 4]>,
    },
    Prefix {
        op: PrefixOperator,
        operand: NodeId,
    },
    /// `x++` / `x--`.
    Postfix {
        increment: bool,
        operand: NodeId,
    },
    Binary {
        op: BinaryOperator,
        lhs: NodeId,
        rhs: NodeId,
    },
    Conditional {
        cond: NodeId,
        then_expr: NodeId,
        else_expr: NodeId,
    },
    Paren(NodeId),
    /// `x!` and `x as T`: no runtime meaning.
    TypeAssertion(NodeId),
    /// Arrow function or function expression. `body` is a `Block` or, for
    /// concise arrows, an expression.
    FunctionLiteral {
        params: Vec<NodeId>,
        body: NodeId,
    },

    // ── Statements ──────────────────────────────────────────────────

    /// `let`/`const`/`var` declarations. Each entry is `(identifier, init)`.
    VariableStatement(Vec<(NodeId, Option<NodeId>)>),
    ExpressionStatement(NodeId),
    Block(Vec<NodeId>),
    If {
        cond: NodeId,
        then_stmt: NodeId,
        else_stmt: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    /// `for (let <bindings> of <iterable>) body`. Destructuring bindings list
    /// more than one identifier.
    ForOf {
        bindings: Vec<NodeId>,
        iterable: NodeId,
        body: NodeId,
    },
    ForIn {
        binding: NodeId,
        iterable: NodeId,
        body: NodeId,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    Break,
    Continue,
    Return(Option<NodeId>),
    FunctionDeclaration {
        name: NodeId,
        params: Vec<NodeId>,
        body: NodeId,
    },
    /// A construct the host parser recognised but has no kernel meaning,
    /// named by its syntax kind.
    Unsupported(String),
}

impl NodeKind {
    /// Human-readable name of the syntax kind, used in diagnostics.
    pub fn describe(&self) -> &str {
        match self {
            NodeKind::NumericLiteral(_) => "numeric literal",
            NodeKind::BooleanLiteral(_) => "boolean literal",
            NodeKind::StringLiteral(_) => "string literal",
            NodeKind::Identifier(_) => "identifier",
            NodeKind::This => "this",
            NodeKind::ArrayLiteral(_) => "array literal",
            NodeKind::ObjectLiteral(_) => "object literal",
            NodeKind::PropertyAccess { .. } => "property access",
            NodeKind::ElementAccess { .. } => "element access",
            NodeKind::Call { .. } => "call expression",
            NodeKind::Prefix { .. } => "prefix expression",
            NodeKind::Postfix { .. } => "postfix expression",
            NodeKind::Binary { .. } => "binary expression",
            NodeKind::Conditional { .. } => "conditional expression",
            NodeKind::Paren(_) => "parenthesized expression",
            NodeKind::TypeAssertion(_) => "type assertion",
            NodeKind::FunctionLiteral { .. } => "function literal",
            NodeKind::VariableStatement(_) => "variable statement",
            NodeKind::ExpressionStatement(_) => "expression statement",
            NodeKind::Block(_) => "block",
            NodeKind::If { .. } => "if statement",
            NodeKind::While { .. } => "while statement",
            NodeKind::ForOf { .. } => "for-of statement",
            NodeKind::ForIn { .. } => "for-in statement",
            NodeKind::For { .. } => "for statement",
            NodeKind::Break => "break statement",
            NodeKind::Continue => "continue statement",
            NodeKind::Return(_) => "return statement",
            NodeKind::FunctionDeclaration { .. } => "function declaration",
            NodeKind::Unsupported(kind) => kind,
        }
    }
}
