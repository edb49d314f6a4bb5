//! Parser error type.

use thiserror::Error;

/// Syntax error with a source line hint.
#[derive(Debug, Clone, Error)]
#[error("parse error at line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}
