//! addVar: store a value into the request variables.
//!
//! A string value is first tried as an arithmetic expression over the
//! request variables, then as a variable reference; anything else is stored
//! verbatim.

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::errors::ExecError;
use crate::executor::eval::{self, Scope};
use crate::executor::value::{contains_math_op, strip_quotes, to_display};

pub struct AddVar;

#[async_trait]
impl Command for AddVar {
    fn name(&self) -> &'static str {
        "addVar"
    }

    fn interface(&self) -> &'static str {
        r#"[{"item":"targetVarName","type":"variable"},{"item":"varValue","type":"value"}]"#
    }

    async fn run(&self, task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        let target = task
            .prop(&["targetVarName", "0"])
            .map(|v| match v {
                Value::String(s) => strip_quotes(s).to_string(),
                other => to_display(other),
            })
            .ok_or_else(|| ExecError::Execution("addVar: missing target variable".into()))?;

        let mut val = task.prop(&["varValue", "1"]).cloned().unwrap_or(Value::Null);
        let replacement = match &val {
            Value::String(s) => {
                let conector = bridge.conector_ref();
                if contains_math_op(s) {
                    let scope = Scope {
                        globals: &conector.variables,
                        locals: None,
                    };
                    eval::evaluate(s, scope).ok()
                } else {
                    conector.variables.get(s.as_str()).cloned()
                }
            }
            _ => None,
        };
        if let Some(v) = replacement {
            val = v;
        }

        bridge.conector().variables.insert(target, val);
        Ok(())
    }
}
