//! addResult: publish a variable into the named results of the response.

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::errors::ExecError;
use crate::executor::value::{strip_quotes, to_display};

pub struct AddResult;

#[async_trait]
impl Command for AddResult {
    fn name(&self) -> &'static str {
        "addResult"
    }

    fn interface(&self) -> &'static str {
        r#"[{"item":"sourceVariable","type":"variable"}]"#
    }

    async fn run(&self, task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        let src = task
            .prop(&["sourceVariable", "0"])
            .cloned()
            .ok_or_else(|| ExecError::Execution("addResult: missing source variable".into()))?;
        let key = match &src {
            Value::String(s) => strip_quotes(s).to_string(),
            other => to_display(other),
        };

        let conector = bridge.conector();
        // Unknown names fall back to the literal itself.
        let val = conector
            .variables
            .get(&key)
            .cloned()
            .unwrap_or_else(|| match src {
                Value::String(_) => Value::String(key.clone()),
                other => other,
            });
        conector.results.insert(key, val);
        Ok(())
    }
}
