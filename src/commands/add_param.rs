//! addParam: bind an HTTP request parameter to a variable.
//!
//! Looks the parameter up in the query arguments first, then in the
//! top-level fields of the JSON request body. A missing parameter binds
//! nothing.

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::errors::ExecError;
use crate::executor::value::{strip_quotes, to_display};

pub struct AddParam;

fn as_name(v: &Value) -> String {
    match v {
        Value::String(s) => strip_quotes(s).to_string(),
        other => to_display(other),
    }
}

#[async_trait]
impl Command for AddParam {
    fn name(&self) -> &'static str {
        "addParam"
    }

    fn interface(&self) -> &'static str {
        r#"[{"item":"param","type":"value"},{"item":"variable","type":"var"}]"#
    }

    async fn run(&self, task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        let param = task
            .prop(&["param", "0"])
            .map(as_name)
            .ok_or_else(|| ExecError::Execution("addParam: missing parameter name".into()))?;
        let variable = task.prop(&["variable", "1"]).map(as_name);

        let conector = bridge.conector();
        let value = conector.req.param(&param);
        if let (Some(variable), Some(value)) = (variable, value) {
            if !variable.is_empty() {
                conector.variables.insert(variable, value);
            }
        }
        Ok(())
    }
}
