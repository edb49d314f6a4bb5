//! Per-request execution state.
//!
//! A context lives for exactly one request. Commands never see the context
//! directly; they go through the conector facade, which owns the variable
//! and result maps, the try-scope counter and the originating request data.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Reserved variable holding the last error caught inside a try scope.
pub const LAST_ERROR_VAR: &str = "__last_error__";

/// Inbound request data available to parameter-binding commands.
#[derive(Debug, Clone, Default)]
pub struct RequestEnv {
    /// Decoded query arguments.
    pub query: HashMap<String, String>,
    /// Parsed JSON request body.
    pub body: Value,
}

impl RequestEnv {
    pub fn new(query: HashMap<String, String>, body: Value) -> Self {
        Self { query, body }
    }

    /// Look a parameter up in the query arguments first, then in the
    /// top-level fields of the JSON body.
    pub fn param(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.query.get(name) {
            return Some(Value::String(v.clone()));
        }
        if let Value::Object(map) = &self.body {
            if let Some(v) = map.get(name) {
                return Some(v.clone());
            }
        }
        None
    }
}

/// Facade exposed to command bodies.
#[derive(Debug, Default)]
pub struct Conector {
    pub variables: IndexMap<String, Value>,
    pub results: IndexMap<String, Value>,
    pub try_level: i32,
    pub req: RequestEnv,
}

/// Log entry for one executed top-level node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub command: String,
    pub duration_ms: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-request execution state: the conector plus the step log.
#[derive(Debug, Default)]
pub struct Context {
    pub conector: Conector,
    pub logs: Vec<LogEntry>,
    /// Target variable of the command currently being invoked.
    pub current_target: Option<String>,
}

impl Context {
    pub fn new(variables: IndexMap<String, Value>, req: RequestEnv) -> Self {
        Self {
            conector: Conector {
                variables,
                results: IndexMap::new(),
                try_level: 0,
                req,
            },
            logs: Vec::new(),
            current_target: None,
        }
    }
}
