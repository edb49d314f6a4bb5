//! if: smart-cast comparison driving one of two branch statement lists.
//!
//! Operands dereference through the request variables and numeric-looking
//! strings are cast before comparing. Equality comparators compare string
//! renderings; ordered comparators require both operands on the same side
//! of the number/string divide.

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::errors::ExecError;
use crate::executor::value::{strip_quotes, to_display};

pub struct IfCommand;

/// Dereference then cast: `"4"` becomes `4`, `"4.5"` becomes `4.5`,
/// anything else stays a (quote-stripped) string.
fn smart_cast(bridge: &Bridge<'_, '_>, raw: &Value) -> Value {
    let resolved = match raw {
        Value::String(s) => bridge
            .conector_ref()
            .variables
            .get(s.as_str())
            .cloned()
            .unwrap_or_else(|| raw.clone()),
        other => other.clone(),
    };
    if let Value::String(s) = &resolved {
        if s.contains('.') {
            if let Ok(f) = s.parse::<f64>() {
                if let Some(n) = serde_json::Number::from_f64(f) {
                    return Value::Number(n);
                }
            }
        } else if let Ok(i) = s.parse::<i64>() {
            return Value::Number(i.into());
        }
        return Value::String(strip_quotes(s).to_string());
    }
    resolved
}

fn ordered(op: &str, v1: &Value, v2: &Value) -> Result<bool, ExecError> {
    if let (Some(a), Some(b)) = (v1.as_f64(), v2.as_f64()) {
        return Ok(match op {
            ">" => a > b,
            "<" => a < b,
            ">=" => a >= b,
            _ => a <= b,
        });
    }
    if let (Value::String(a), Value::String(b)) = (v1, v2) {
        return Ok(match op {
            ">" => a > b,
            "<" => a < b,
            ">=" => a >= b,
            _ => a <= b,
        });
    }
    Err(ExecError::Execution(format!(
        "'{}' not supported between these operand types",
        op
    )))
}

#[async_trait]
impl Command for IfCommand {
    fn name(&self) -> &'static str {
        "if"
    }

    fn interface(&self) -> &'static str {
        r#"[{"item":"variable","type":"variable"},{"item":"variableValue","type":"variable"},{"item":"comparator","type":"value"}]"#
    }

    async fn run(&self, task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        let v1 = smart_cast(bridge, task.prop(&["variable", "0"]).unwrap_or(&Value::Null));
        let v2 = smart_cast(
            bridge,
            task.prop(&["variableValue", "1"]).unwrap_or(&Value::Null),
        );
        let op = task
            .prop(&["comparator", "2"])
            .map(to_display)
            .unwrap_or_else(|| "=".to_string());

        let result = match op.as_str() {
            "=" | "==" => to_display(&v1) == to_display(&v2),
            "!=" => to_display(&v1) != to_display(&v2),
            ">" | "<" | ">=" | "<=" => ordered(&op, &v1, &v2)?,
            other => {
                return Err(ExecError::Execution(format!(
                    "Unknown comparator: {}",
                    other
                )))
            }
        };

        if let Some(branches) = task.branches {
            let nodes = if result {
                &branches.on_true
            } else {
                &branches.on_false
            };
            for node in nodes {
                bridge.process_step(node).await?;
            }
        }
        Ok(())
    }
}
