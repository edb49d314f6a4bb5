//! exception: read the captured error and close the try scope.
//!
//! The last caught error is copied into the named variable and into the
//! call-site target, then the try level decrements. Nested scopes are plain
//! counter semantics; there is no block-state unwinding.

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::context::LAST_ERROR_VAR;
use crate::executor::errors::ExecError;
use crate::executor::value::{strip_quotes, to_display};

pub struct ExceptionCommand;

#[async_trait]
impl Command for ExceptionCommand {
    fn name(&self) -> &'static str {
        "exception"
    }

    fn interface(&self) -> &'static str {
        r#"[{"item":"error","type":"var"}]"#
    }

    async fn run(&self, task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        let conector = bridge.conector();
        let err = conector
            .variables
            .get(LAST_ERROR_VAR)
            .cloned()
            .unwrap_or_else(|| Value::String("No error detected".to_string()));

        if let Some(arg) = task.prop(&["error", "0"]) {
            let var = match arg {
                Value::String(s) => strip_quotes(s).to_string(),
                other => to_display(other),
            };
            if !var.is_empty() {
                conector.variables.insert(var, err.clone());
            }
        }
        if let Some(target) = &task.target {
            conector.variables.insert(target.clone(), err);
        }
        conector.try_level -= 1;
        Ok(())
    }
}
