//! Command Invoker
//!
//! Maps resolved positional arguments onto a command's declared interface,
//! builds the task payload, and runs the handler with the bridge attached.
//! The compiled form comes from the catalog: signature verification and
//! payload resolution happen once per command name and are cached.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::types::AstNode;
use crate::commands::types::{Bridge, Command as _, Task};
use crate::executor::errors::ExecError;
use crate::executor::executor::ScriptRun;

/// Deadline for commands tagged heavy (I/O-bound).
pub const HEAVY_COMMAND_DEADLINE: Duration = Duration::from_millis(500);

impl<'e> ScriptRun<'e> {
    pub(crate) async fn invoke_command(
        &mut self,
        name: &str,
        resolved: Vec<Value>,
        target: Option<&str>,
        node: &AstNode,
    ) -> Result<(), ExecError> {
        let catalog = self.engine().catalog();
        let (bytecode, interface) = catalog
            .get(name)
            .await
            .map_err(|e| ExecError::from_catalog(name, e))?;
        let handler = catalog
            .compiled(name, &bytecode)
            .await
            .map_err(|e| ExecError::from_catalog(name, e))?;

        // Positional access plus named access through the interface.
        let mut properties: IndexMap<String, Value> = IndexMap::new();
        for (i, v) in resolved.iter().enumerate() {
            properties.insert(i.to_string(), v.clone());
        }
        for (i, param) in interface.iter().enumerate() {
            if let Some(v) = resolved.get(i) {
                properties.insert(param.item.clone(), v.clone());
            }
        }

        let (branches, sequence) = match node {
            AstNode::If { branches, .. } => (Some(branches), &[][..]),
            AstNode::Loop { sequence, .. } => (None, sequence.as_slice()),
            _ => (None, &[][..]),
        };
        let task = Task {
            properties,
            target: target.map(str::to_string),
            branches,
            sequence,
        };

        let mut bridge = Bridge::new(self);
        if handler.is_heavy() {
            match tokio::time::timeout(HEAVY_COMMAND_DEADLINE, handler.run(&task, &mut bridge))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ExecError::CommandTimeout(name.to_string())),
            }
        } else {
            handler.run(&task, &mut bridge).await
        }
    }
}
