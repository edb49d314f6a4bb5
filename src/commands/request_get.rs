//! RequestGet: outbound HTTP GET into a target variable.
//!
//! URL, query string and headers dereference through the request variables;
//! dictionary arguments accept either JSON objects or JSON-ish strings with
//! single quotes. The response lands in the call-site target (or `o_result`,
//! or `res`) as parsed JSON when possible, raw text otherwise. Non-2xx
//! responses are execution errors.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::errors::ExecError;
use crate::executor::value::to_display;

const REQUEST_DEADLINE: Duration = Duration::from_secs(5);

pub struct RequestGet;

fn resolve(bridge: &Bridge<'_, '_>, raw: &Value) -> Value {
    match raw {
        Value::String(s) => bridge
            .conector_ref()
            .variables
            .get(s.as_str())
            .cloned()
            .unwrap_or_else(|| raw.clone()),
        other => other.clone(),
    }
}

fn to_dict(v: &Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m.clone(),
        Value::String(s) => {
            serde_json::from_str::<Map<String, Value>>(&s.replace('\'', "\"")).unwrap_or_default()
        }
        _ => Map::new(),
    }
}

#[async_trait]
impl Command for RequestGet {
    fn name(&self) -> &'static str {
        "RequestGet"
    }

    fn interface(&self) -> &'static str {
        r#"[{"item":"url","type":"variable"},{"item":"querystring","type":"variable"},{"item":"headers","type":"variable"},{"item":"o_result","type":"variable"}]"#
    }

    async fn run(&self, task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        let url = task
            .prop(&["url", "0"])
            .map(|v| to_display(&resolve(bridge, v)))
            .unwrap_or_default();
        if url.is_empty() {
            return Err(ExecError::Execution("RequestGet: missing url".into()));
        }
        let query = task
            .prop(&["querystring", "1"])
            .map(|v| to_dict(&resolve(bridge, v)))
            .unwrap_or_default();
        let headers = task
            .prop(&["headers", "2"])
            .map(|v| to_dict(&resolve(bridge, v)))
            .unwrap_or_default();
        let target = task
            .target
            .clone()
            .or_else(|| task.prop(&["o_result", "3"]).map(to_display))
            .unwrap_or_else(|| "res".to_string());

        let mut request = bridge.http().get(&url).timeout(REQUEST_DEADLINE);
        let pairs: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.clone(), to_display(v)))
            .collect();
        if !pairs.is_empty() {
            request = request.query(&pairs);
        }
        for (k, v) in &headers {
            request = request.header(k.as_str(), to_display(v));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecError::Execution(format!("RequestGet: {}", e)))?
            .error_for_status()
            .map_err(|e| ExecError::Execution(format!("RequestGet: {}", e)))?;
        let text = response
            .text()
            .await
            .map_err(|e| ExecError::Execution(format!("RequestGet: {}", e)))?;
        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        bridge.conector().variables.insert(target, data);
        Ok(())
    }
}
