//! Compile errors for the Kiln compiler.
//!
//! Compilation stops at the first error. Every error belongs to one of five
//! categories ([`ErrorKind`]); the first four are user errors and carry the
//! syntax node that triggered them, the fifth marks a broken internal
//! invariant and carries no location.

use std::fmt;

use kiln_syntax::{NodeId, Span, SyntaxTree};
use kiln_types::TypeError;
use thiserror::Error;

/// Error category.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A syntax construct with no kernel meaning (C-style `for`, `break`
    /// outside a `while`, a statement after `return`, ...).
    UnsupportedConstruct,
    /// Operands rejected by an operator's type check, bad literals, invalid
    /// property or element access.
    Type,
    /// Unresolved identifiers and function calls, illegal names.
    Scope,
    /// Rendering statements in the wrong place or order, or resources a
    /// shader stage may not use.
    PipelineState,
    /// The compiler reached a state it should never reach.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedConstruct => "unsupported",
            ErrorKind::Type => "type",
            ErrorKind::Scope => "scope",
            ErrorKind::PipelineState => "pipeline",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal compile error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    /// Originating syntax node, if the error came from one.
    pub node: Option<NodeId>,
    pub span: Option<Span>,
}

/// Result type used throughout the compiler.
pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompileError {
            kind,
            message: message.into(),
            node: None,
            span: None,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedConstruct, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn scope(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scope, message)
    }

    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PipelineState, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach a location unless one is already present. The innermost node
    /// that saw the error wins.
    #[must_use]
    pub fn at(mut self, node: NodeId, span: Span) -> Self {
        if self.node.is_none() {
            self.node = Some(node);
            self.span = Some(span);
        }
        self
    }

    /// Attach the location of `node` in `tree`.
    #[must_use]
    pub fn at_node(self, tree: &SyntaxTree, node: NodeId) -> Self {
        let span = tree.span(node);
        self.at(node, span)
    }

    /// `error[kind]: message`, followed by ` --> line:col` and the offending
    /// source line when a location and source text are available.
    pub fn render(&self, source: Option<&str>) -> String {
        let mut out = format!("error[{}]: {}", self.kind, self.message);
        if let (Some(span), Some(source)) = (self.span, source) {
            if !span.is_empty() {
                let (line, col) = span.line_col(source);
                out.push_str(&format!("\n --> {line}:{col}"));
                if let Some(text) = source.lines().nth(line as usize - 1) {
                    out.push_str(&format!("\n  | {text}"));
                }
            }
        }
        out
    }
}

impl From<TypeError> for CompileError {
    fn from(err: TypeError) -> Self {
        CompileError::type_error(err.message)
    }
}

/// Early-return an internal error when an invariant does not hold.
#[macro_export]
macro_rules! ensure_internal {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::CompileError::internal(format!($($arg)+)));
        }
    };
}
