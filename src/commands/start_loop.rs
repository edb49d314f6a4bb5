//! startLoop: catalog-served loop command.
//!
//! The executor walks `startLoop` blocks natively; this handler keeps the
//! command callable through the catalog (nested resolution, catalog parity)
//! with the same inclusive-bounds semantics, driving the sequence through
//! the bridge.

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::errors::ExecError;
use crate::executor::value::{coerce_to_int, strip_quotes, to_display};

pub struct StartLoop;

fn bound(bridge: &Bridge<'_, '_>, task: &Task<'_>, keys: &[&str]) -> i64 {
    let Some(raw) = task.prop(keys) else {
        return 0;
    };
    let resolved = match raw {
        Value::String(s) => bridge
            .conector_ref()
            .variables
            .get(s.as_str())
            .cloned()
            .unwrap_or_else(|| raw.clone()),
        other => other.clone(),
    };
    coerce_to_int(&resolved).unwrap_or(0)
}

#[async_trait]
impl Command for StartLoop {
    fn name(&self) -> &'static str {
        "startLoop"
    }

    fn interface(&self) -> &'static str {
        r#"[{"item":"varName","type":"variable"},{"item":"from","type":"value"},{"item":"to","type":"value"}]"#
    }

    async fn run(&self, task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        let var = task
            .prop(&["varName", "0"])
            .map(|v| match v {
                Value::String(s) => strip_quotes(s).to_string(),
                other => to_display(other),
            })
            .ok_or_else(|| ExecError::Execution("startLoop: missing loop variable".into()))?;
        let start = bound(bridge, task, &["from", "1"]);
        let end = bound(bridge, task, &["to", "2"]);

        bridge
            .conector()
            .variables
            .insert(var.clone(), Value::from(start));
        loop {
            let current = bridge
                .conector_ref()
                .variables
                .get(&var)
                .and_then(Value::as_i64)
                .unwrap_or(end);
            if current > end {
                break;
            }
            for node in task.sequence {
                bridge.process_step(node).await?;
            }
            bridge
                .conector()
                .variables
                .insert(var.clone(), Value::from(current + 1));
        }
        Ok(())
    }
}
