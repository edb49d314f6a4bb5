//! Command trait, task payload and executor bridge.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::types::{AstNode, Branches};
use crate::executor::context::Conector;
use crate::executor::errors::ExecError;
use crate::executor::executor::ScriptRun;

/// Invocation payload handed to a command body.
pub struct Task<'n> {
    /// Arguments, accessible positionally (`"0"`, `"1"`, ...) and through
    /// the interface item names.
    pub properties: IndexMap<String, Value>,
    /// Target variable of the call site, if any.
    pub target: Option<String>,
    /// Branch statement lists for `if` invocations.
    pub branches: Option<&'n Branches>,
    /// Body statement list for loop invocations.
    pub sequence: &'n [AstNode],
}

impl Task<'_> {
    /// First present argument among the given keys (interface name first,
    /// positional index as fallback).
    pub fn prop(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|k| self.properties.get(*k))
    }
}

/// Injected into command bodies: shared access to the conector plus
/// re-entry into the executor for branches and sequences.
pub struct Bridge<'r, 'e> {
    run: &'r mut ScriptRun<'e>,
}

impl<'r, 'e> Bridge<'r, 'e> {
    pub fn new(run: &'r mut ScriptRun<'e>) -> Self {
        Self { run }
    }

    pub fn conector(&mut self) -> &mut Conector {
        self.run.conector_mut()
    }

    pub fn conector_ref(&self) -> &Conector {
        self.run.conector()
    }

    /// Re-enter the executor for one nested node. From the command body's
    /// point of view this is a synchronous recursive descent.
    pub async fn process_step(&mut self, node: &AstNode) -> Result<(), ExecError> {
        self.run.exec_node(node).await.map(|_| ())
    }

    /// Outbound HTTP client shared across the worker.
    pub fn http(&self) -> reqwest::Client {
        self.run.engine().http_client()
    }
}

/// A native command implementation.
///
/// The signed bytecode payload served by the catalog is the implementation
/// identifier resolved against the registry; `name` doubles as that
/// identifier for the stock command set.
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    /// Declared parameter interface, as served by the Definition Engine.
    fn interface(&self) -> &'static str {
        "[]"
    }

    /// Heavy commands run under the per-command deadline on invocation.
    fn is_heavy(&self) -> bool {
        false
    }

    async fn run(&self, task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError>;
}
