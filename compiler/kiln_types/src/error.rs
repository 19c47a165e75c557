//! Type-check failures reported by operators.

use thiserror::Error;

/// A rejected operand combination.
///
/// Produced by an operator's type check before any IR is emitted. The caller
/// attaches the source location when turning it into a compile error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TypeError {
    pub message: String,
}

impl TypeError {
    pub fn new(message: impl Into<String>) -> Self {
        TypeError {
            message: message.into(),
        }
    }
}
