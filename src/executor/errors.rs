//! Execution Errors
//!
//! Every failure inside the executor funnels into `ExecError`. Errors are
//! caught by an active try scope (stringified into `__last_error__`) or
//! propagated to the HTTP layer, which maps them to response statuses.

use thiserror::Error;

use crate::catalog::types::CatalogError;
use crate::packer::PackError;
use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command not found: {0}")]
    CommandNotFound(String),
    #[error("integrity failure in command '{command}': {source}")]
    Integrity {
        command: String,
        #[source]
        source: PackError,
    },
    #[error("{0}")]
    Execution(String),
    #[error("execution timeout: command '{0}' exceeded its time limit")]
    CommandTimeout(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Catalog(CatalogError),
}

impl ExecError {
    /// Catalog failures surface as call-site errors.
    pub fn from_catalog(command: &str, err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(name) => ExecError::CommandNotFound(name),
            CatalogError::Pack(source) => ExecError::Integrity {
                command: command.to_string(),
                source,
            },
            other => ExecError::Catalog(other),
        }
    }

    /// Whether this error indicates tampered bytecode.
    pub fn is_integrity(&self) -> bool {
        matches!(self, ExecError::Integrity { .. })
    }
}
