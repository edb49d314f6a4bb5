//! AST Executor
//!
//! Walks parsed nodes against the per-request context. Nested constructs
//! (branches, loop bodies, user functions) recurse through `exec_node`;
//! command bodies re-enter through the bridge's `process_step`, which from
//! their point of view behaves as a synchronous recursive descent.
//!
//! Dispatch order for a call node: user function table first, then the
//! command catalog.

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::ast::types::{AstNode, ParsedScript};
use crate::engine::Engine;
use crate::executor::context::{Conector, Context, LogEntry, RequestEnv, LAST_ERROR_VAR};
use crate::executor::errors::ExecError;
use crate::executor::eval::{self, Scope};
use crate::executor::value::{coerce_to_int, contains_math_op, to_display};
use crate::parser::arguments::parse_arguments;

/// Result of executing one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Normal completion with the node's value (`Null` if none).
    Value(Value),
    /// `return` sentinel propagating out of a function body.
    Return(Value),
}

impl Flow {
    pub fn into_value(self) -> Value {
        match self {
            Flow::Value(v) | Flow::Return(v) => v,
        }
    }
}

/// One script execution over a shared, immutable AST.
pub struct ScriptRun<'e> {
    engine: &'e Engine,
    script: Arc<ParsedScript>,
    pub ctx: Context,
    /// Function-local frames; the top frame shadows the request variables.
    locals: Vec<IndexMap<String, Value>>,
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"'))
            || (s.starts_with('\'') && s.ends_with('\'')))
}

impl<'e> ScriptRun<'e> {
    pub fn new(
        engine: &'e Engine,
        script: Arc<ParsedScript>,
        variables: IndexMap<String, Value>,
        req: RequestEnv,
    ) -> Self {
        Self {
            engine,
            script,
            ctx: Context::new(variables, req),
            locals: Vec::new(),
        }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    pub fn conector(&self) -> &Conector {
        &self.ctx.conector
    }

    pub fn conector_mut(&mut self) -> &mut Conector {
        &mut self.ctx.conector
    }

    pub fn into_context(self) -> Context {
        self.ctx
    }

    fn scope(&self) -> Scope<'_> {
        Scope {
            globals: &self.ctx.conector.variables,
            locals: self.locals.last(),
        }
    }

    /// Run all top-level nodes with per-node logging and try-scope error
    /// capture.
    pub async fn run(&mut self) -> Result<(), ExecError> {
        let script = Arc::clone(&self.script);
        for node in &script.nodes {
            self.exec_top_level(node).await?;
        }
        Ok(())
    }

    async fn exec_top_level(&mut self, node: &AstNode) -> Result<(), ExecError> {
        let started = Instant::now();
        match self.exec_node(node).await {
            Ok(_) => {
                self.ctx.logs.push(LogEntry {
                    command: node.type_name().to_string(),
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                    success: true,
                    error: None,
                });
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.ctx.logs.push(LogEntry {
                    command: node.type_name().to_string(),
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                    success: false,
                    error: Some(message.clone()),
                });
                if self.ctx.conector.try_level <= 0 {
                    return Err(err);
                }
                // Active try scope: capture and continue with the next node.
                self.ctx
                    .conector
                    .variables
                    .insert(LAST_ERROR_VAR.to_string(), Value::String(message));
                Ok(())
            }
        }
    }

    pub fn exec_node<'s>(
        &'s mut self,
        node: &'s AstNode,
    ) -> BoxFuture<'s, Result<Flow, ExecError>> {
        Box::pin(async move {
            match node {
                AstNode::If { properties, .. } => self.exec_if(properties, node).await,
                AstNode::Loop {
                    properties,
                    sequence,
                } => self.exec_loop(properties, sequence).await,
                AstNode::Return { expr } => self.exec_return(expr),
                AstNode::Assign { target, expr } => self.exec_assign(target, expr).await,
                AstNode::Call {
                    name,
                    properties,
                    target,
                } => {
                    if self.script.functions.contains_key(name) {
                        self.exec_function_call(name, properties, target.as_deref())
                            .await
                    } else {
                        self.exec_command(name, properties, target.as_deref(), node)
                            .await
                    }
                }
            }
        })
    }

    /// The comparator and smart-cast logic belong to the `if` command; the
    /// executor only hands it the unresolved arguments and the branches.
    async fn exec_if(&mut self, properties: &[Value], node: &AstNode) -> Result<Flow, ExecError> {
        let resolved = properties.to_vec();
        self.invoke_command("if", resolved, None, node).await?;
        Ok(Flow::Value(Value::Null))
    }

    /// Inclusive loop over integer bounds, truncated toward zero.
    async fn exec_loop(
        &mut self,
        properties: &[Value],
        sequence: &[AstNode],
    ) -> Result<Flow, ExecError> {
        let var = properties
            .first()
            .map(to_display)
            .ok_or_else(|| ExecError::Execution("startLoop: missing loop variable".into()))?;
        let raw_start = self
            .resolve_arg(properties.get(1).cloned().unwrap_or(Value::Null))
            .await?;
        let raw_end = self
            .resolve_arg(properties.get(2).cloned().unwrap_or(Value::Null))
            .await?;
        let start = coerce_to_int(&raw_start).ok_or_else(|| {
            ExecError::Execution(format!("startLoop: invalid start bound {:?}", raw_start))
        })?;
        let end = coerce_to_int(&raw_end).ok_or_else(|| {
            ExecError::Execution(format!("startLoop: invalid end bound {:?}", raw_end))
        })?;

        for i in start..=end {
            self.ctx
                .conector
                .variables
                .insert(var.clone(), Value::from(i));
            for child in sequence {
                self.exec_node(child).await?;
            }
        }
        Ok(Flow::Value(Value::Null))
    }

    fn exec_return(&self, expr: &str) -> Result<Flow, ExecError> {
        let scope = self.scope();
        let value = match eval::evaluate(expr, scope) {
            Ok(v) => v,
            Err(_) => scope
                .lookup(expr)
                .cloned()
                .unwrap_or_else(|| Value::String(expr.to_string())),
        };
        Ok(Flow::Return(value))
    }

    async fn exec_function_call(
        &mut self,
        name: &str,
        properties: &[Value],
        target: Option<&str>,
    ) -> Result<Flow, ExecError> {
        let script = Arc::clone(&self.script);
        let func = script
            .functions
            .get(name)
            .ok_or_else(|| ExecError::CommandNotFound(name.to_string()))?;

        let mut frame: IndexMap<String, Value> = IndexMap::new();
        for (i, param) in func.params.iter().enumerate() {
            let Some(prop) = properties.get(i) else {
                continue;
            };
            let mut val = self.resolve_arg(prop.clone()).await?;
            if let Value::String(s) = &val {
                if let Some(v) = self.scope().lookup(s) {
                    val = v.clone();
                } else if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                    if let Ok(n) = s.parse::<i64>() {
                        val = Value::from(n);
                    }
                }
            }
            frame.insert(param.clone(), val);
        }

        self.locals.push(frame);
        let mut func_value = Value::Null;
        let mut outcome = Ok(());
        for child in &func.nodes {
            match self.exec_node(child).await {
                Ok(Flow::Return(v)) => {
                    func_value = v;
                    break;
                }
                Ok(Flow::Value(_)) => {}
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        self.locals.pop();
        outcome?;

        if let Some(target) = target {
            self.ctx
                .conector
                .variables
                .insert(target.to_string(), func_value.clone());
        }
        Ok(Flow::Value(func_value))
    }

    async fn exec_assign(&mut self, target: &str, expr: &str) -> Result<Flow, ExecError> {
        // A user-function call on the right-hand side dispatches as a
        // function call with a single pre-evaluated argument.
        let script = Arc::clone(&self.script);
        let internal = script
            .functions
            .keys()
            .find(|f| expr.starts_with(&format!("{}(", f)))
            .cloned();
        if let Some(fname) = internal {
            let open = expr.find('(').unwrap_or(0);
            let close = expr.rfind(')').unwrap_or(expr.len());
            let raw_args = &expr[open + 1..close];
            let resolved = eval::evaluate(raw_args, self.scope())
                .map_err(|e| ExecError::Execution(e.to_string()))?;
            let call = AstNode::Call {
                name: fname,
                properties: vec![resolved],
                target: Some(target.to_string()),
            };
            return self.exec_node(&call).await;
        }

        let scope = self.scope();
        let value = match eval::evaluate(expr, scope) {
            Ok(v) => v,
            Err(_) => scope
                .lookup(expr)
                .cloned()
                .unwrap_or_else(|| Value::String(expr.to_string())),
        };
        self.ctx
            .conector
            .variables
            .insert(target.to_string(), value.clone());
        if let Some(frame) = self.locals.last_mut() {
            frame.insert(target.to_string(), value.clone());
        }
        Ok(Flow::Value(value))
    }

    /// Resolve one positional token for a command or loop bound.
    pub fn resolve_arg<'s>(&'s mut self, prop: Value) -> BoxFuture<'s, Result<Value, ExecError>> {
        Box::pin(async move {
            let p = match prop {
                Value::String(s) => s,
                other => return Ok(other),
            };

            // name(args) with no math operator: a nested command call.
            if p.contains('(') && p.contains(')') && !contains_math_op(&p) {
                let open = p.find('(').unwrap_or(0);
                let close = p.rfind(')').unwrap_or(p.len());
                let name = p[..open].trim().to_string();
                let args = parse_arguments(&p[open + 1..close], 0)
                    .map_err(|e| ExecError::Execution(e.to_string()))?;
                let call = AstNode::Call {
                    name,
                    properties: args,
                    target: None,
                };
                return Ok(self.exec_node(&call).await?.into_value());
            }

            if let Some(v) = self.scope().lookup(&p) {
                return Ok(v.clone());
            }

            if contains_math_op(&p) || p.contains('"') || p.contains('\'') {
                if let Ok(v) = eval::evaluate(&p, self.scope()) {
                    return Ok(v);
                }
            }

            Ok(Value::String(p))
        })
    }

    /// Resolve positional command arguments: expressions and nested calls
    /// evaluate, quoted literals strip, bare names pass through for the
    /// command to interpret.
    async fn exec_command(
        &mut self,
        name: &str,
        properties: &[Value],
        target: Option<&str>,
        node: &AstNode,
    ) -> Result<Flow, ExecError> {
        let mut resolved = Vec::with_capacity(properties.len());
        for p in properties {
            let v = match p {
                Value::String(s)
                    if (s.contains('(') && s.contains(')')) || contains_math_op(s) =>
                {
                    self.resolve_arg(p.clone()).await?
                }
                Value::String(s) if is_quoted(s) => {
                    Value::String(s[1..s.len() - 1].to_string())
                }
                other => other.clone(),
            };
            resolved.push(v);
        }

        self.ctx.current_target = target.map(str::to_string);
        self.invoke_command(name, resolved, target, node).await?;
        let res_val = target
            .and_then(|t| self.ctx.conector.variables.get(t).cloned())
            .unwrap_or(Value::Null);
        self.ctx.current_target = None;
        Ok(Flow::Value(res_val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::commands::CommandRegistry;
    use crate::engine::Engine;
    use crate::executor::context::Context;
    use crate::packer::BytecodePacker;
    use serde_json::json;
    use std::collections::HashMap;

    fn test_engine() -> Engine {
        let packer = BytecodePacker::new(b"executor_test_key".to_vec());
        let registry = Arc::new(CommandRegistry::builtin());
        Engine::new(Arc::new(Catalog::preloaded(packer, registry)))
    }

    async fn run(engine: &Engine, script: &str) -> Context {
        engine
            .execute_script(script, IndexMap::new(), RequestEnv::default())
            .await
            .unwrap()
    }

    async fn run_with_query(engine: &Engine, script: &str, query: &[(&str, &str)]) -> Context {
        let query: HashMap<String, String> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        engine
            .execute_script(script, IndexMap::new(), RequestEnv::new(query, Value::Null))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_assignment_and_result() {
        let engine = test_engine();
        let ctx = run(&engine, "addVar(numero, 123.45)\naddResult(numero)").await;
        assert_eq!(ctx.conector.variables["numero"], json!(123.45));
        assert_eq!(ctx.conector.results["numero"], json!(123.45));
    }

    #[tokio::test]
    async fn test_if_else_takes_true_branch() {
        let engine = test_engine();
        let script = "addVar(rol, \"admin\")\nif(rol, \"admin\", =)\n  addVar(acceso, \"concedido\")\nelse()\n  addVar(acceso, \"denegado\")\nend()\naddResult(acceso)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["acceso"], json!("concedido"));
    }

    #[tokio::test]
    async fn test_if_else_takes_false_branch() {
        let engine = test_engine();
        let script = "addVar(rol, \"guest\")\nif(rol, \"admin\", =)\n  addVar(acceso, \"concedido\")\nelse()\n  addVar(acceso, \"denegado\")\nend()\naddResult(acceso)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["acceso"], json!("denegado"));
    }

    #[tokio::test]
    async fn test_loop_with_variable_bound() {
        let engine = test_engine();
        let script = "addVar(limite, 3)\nstartLoop(i, 1, limite)\n  ticket = \"T-\" + str(i)\n  addVar(ultimo_ticket, ticket)\nendLoop()\naddResult(ultimo_ticket)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["ultimo_ticket"], json!("T-3"));
    }

    #[tokio::test]
    async fn test_loop_bounds_are_inclusive() {
        let engine = test_engine();
        let script = "addVar(total, 0)\nstartLoop(i, 1, 3)\n  total = total + i\nendLoop()\naddResult(total)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["total"], json!(6));
    }

    #[tokio::test]
    async fn test_loop_with_inverted_bounds_runs_zero_times() {
        let engine = test_engine();
        let script = "addVar(count, 0)\nstartLoop(i, 5, 1)\n  count = count + 1\nendLoop()\naddResult(count)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["count"], json!(0));
    }

    #[tokio::test]
    async fn test_query_parameter_binding() {
        let engine = test_engine();
        let ctx = run_with_query(
            &engine,
            "addParam(user, usuario)\naddResult(usuario)",
            &[("user", "rafa_test")],
        )
        .await;
        assert_eq!(ctx.conector.results["usuario"], json!("rafa_test"));
    }

    #[tokio::test]
    async fn test_full_integration_scenario() {
        let engine = test_engine();
        let script = "addParam(limit, max)\nif(max, 0, >)\n  startLoop(idx, 1, max)\n    val = idx * 10\n    addVar(tmp, val)\n  endLoop()\n  addVar(final, \"completado\")\nelse()\n  addVar(final, \"error\")\nend()\naddResult(final)\naddResult(tmp)";
        let ctx = run_with_query(&engine, script, &[("limit", "4")]).await;
        assert_eq!(ctx.conector.results["final"], json!("completado"));
        assert_eq!(ctx.conector.results["tmp"], json!(40));
    }

    #[tokio::test]
    async fn test_unknown_comparator_is_error() {
        let engine = test_engine();
        let err = engine
            .execute_script(
                "addVar(x, 1)\nif(x, 1, ~)\nend()",
                IndexMap::new(),
                RequestEnv::default(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown comparator"));
    }

    #[tokio::test]
    async fn test_error_without_try_propagates() {
        let engine = test_engine();
        let err = engine
            .execute_script("noSuchCommand(1)", IndexMap::new(), RequestEnv::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::CommandNotFound(_)));
    }

    #[tokio::test]
    async fn test_try_captures_error_and_continues() {
        let engine = test_engine();
        let script = "try()\nnoSuchCommand(1)\nexception(err)\naddResult(err)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.try_level, 0);
        let err = ctx.conector.results["err"].as_str().unwrap();
        assert!(err.contains("noSuchCommand"));
        // One log entry per top-level node, the failing one marked.
        assert_eq!(ctx.logs.len(), 4);
        assert!(ctx.logs[0].success);
        assert!(!ctx.logs[1].success);
        assert!(ctx.logs[2].success);
    }

    #[tokio::test]
    async fn test_nested_try_levels() {
        let engine = test_engine();
        let script = "try()\ntry()\nnoSuchCommand(1)\nexception(inner)\nnoSuchCommand(2)\nexception(outer)\naddResult(inner)\naddResult(outer)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.try_level, 0);
        assert!(ctx.conector.results["inner"]
            .as_str()
            .unwrap()
            .contains("noSuchCommand"));
    }

    #[tokio::test]
    async fn test_logs_cover_every_top_level_node() {
        let engine = test_engine();
        let script = "addVar(a, 1)\naddVar(b, 2)\nc = a + b\naddResult(c)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.logs.len(), 4);
        for entry in &ctx.logs {
            assert!(entry.duration_ms >= 0.0);
            assert!(entry.success);
        }
        assert_eq!(ctx.logs[2].command, "assign");
    }

    #[tokio::test]
    async fn test_user_function_with_return() {
        let engine = test_engine();
        let script = "function doble(n) {\n  r = n * 2\n  return r\n}\ntotal = doble(21)\naddResult(total)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["total"], json!(42));
    }

    #[tokio::test]
    async fn test_assign_dispatches_function_call_rhs() {
        let engine = test_engine();
        let script = "function doble(n) {\n  r = n * 2\n  return r\n}\nx = doble(10 + 11)\naddResult(x)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["x"], json!(42));
    }

    #[tokio::test]
    async fn test_function_locals_shadow_request_variables() {
        let engine = test_engine();
        let script = "addVar(valor, 1)\nfunction toca(valor) {\n  interno = valor + 1\n  return interno\n}\nr = toca(5)\naddResult(r)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["r"], json!(6));
        // The parameter shadowed only inside the call.
        assert_eq!(ctx.conector.variables["valor"], json!(1));
    }

    #[tokio::test]
    async fn test_function_argument_dereferences_variables() {
        let engine = test_engine();
        let script = "function doble(n) {\n  r = n * 2\n  return r\n}\naddVar(base, 7)\nx = doble(base)\naddResult(x)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["x"], json!(14));
    }

    #[tokio::test]
    async fn test_same_script_is_deterministic() {
        let engine = test_engine();
        let script = "addVar(a, 2)\nb = a * 3\naddResult(b)";
        let first = run(&engine, script).await;
        let second = run(&engine, script).await;
        assert_eq!(first.conector.variables, second.conector.variables);
        assert_eq!(first.conector.results, second.conector.results);
    }

    #[tokio::test]
    async fn test_ast_cache_parses_once_per_unique_script() {
        let engine = test_engine();
        let script = "addVar(a, 1)";
        run(&engine, script).await;
        run(&engine, script).await;
        assert_eq!(engine.ast_cache_len(), 1);
        run(&engine, "addVar(b, 2)").await;
        assert_eq!(engine.ast_cache_len(), 2);
    }

    #[tokio::test]
    async fn test_initial_variables_flow_through() {
        let engine = test_engine();
        let mut variables = IndexMap::new();
        variables.insert("limite".to_string(), json!(2));
        let ctx = engine
            .execute_script(
                "startLoop(i, 1, limite)\n  addVar(ultimo, i)\nendLoop()\naddResult(ultimo)",
                variables,
                RequestEnv::default(),
            )
            .await
            .unwrap();
        assert_eq!(ctx.conector.results["ultimo"], json!(2));
    }

    #[tokio::test]
    async fn test_float_loop_bound_truncates_toward_zero() {
        let engine = test_engine();
        let script = "addVar(fin, 2.9)\nstartLoop(i, 1, fin)\n  addVar(ultimo, i)\nendLoop()\naddResult(ultimo)";
        let ctx = run(&engine, script).await;
        assert_eq!(ctx.conector.results["ultimo"], json!(2));
    }

    #[tokio::test]
    async fn test_parse_error_surfaces() {
        let engine = test_engine();
        let err = engine
            .execute_script(
                "function rota(a) {\n  return a",
                IndexMap::new(),
                RequestEnv::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Parse(_)));
    }
}
