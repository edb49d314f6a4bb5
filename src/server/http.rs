//! HTTP Surface and Concurrency Envelope
//!
//! `POST /api/v1/execute` runs a script under the admission semaphore and
//! the execution watchdog; `POST /api/v1/compile` optimizes, signs and
//! stores a command package. Health and OpenMetrics round out the surface.
//!
//! Status mapping: parse/command/integrity errors are 400, admission
//! timeout 503, watchdog breach 504, and a successful script may override
//! its own status through the `_status` variable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{error, info};

use crate::catalog::db;
use crate::engine::Engine;
use crate::executor::context::RequestEnv;
use crate::optimizer;
use crate::packer::{sha256_hex, BytecodePacker};
use crate::server::metrics::Metrics;

/// How long a request may wait for an execution slot.
pub const ADMISSION_TIMEOUT: Duration = Duration::from_millis(500);
/// Overall per-script execution deadline.
pub const EXECUTION_DEADLINE: Duration = Duration::from_millis(800);

pub struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: Arc<Metrics>,
    pub semaphore: Arc<Semaphore>,
    pub admission_permits: usize,
    pub packer: BytecodePacker,
    pub db: Option<PgPool>,
}

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/execute", post(cmd_execute))
        .route("/api/v1/compile", post(cmd_compile))
        .route("/health", get(cmd_health))
        .route("/metrics", get(cmd_metrics))
        .route("/", get(|| async { Redirect::temporary("/health") }))
        .with_state(state)
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

/// `_status` override: an integer (or integer string) in `[100, 599]`.
fn status_override(variables: &IndexMap<String, Value>) -> Option<StatusCode> {
    let code = match variables.get("_status")? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if (100..=599).contains(&code) {
        StatusCode::from_u16(code as u16).ok()
    } else {
        None
    }
}

async fn cmd_execute(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    Metrics::inc(&state.metrics.requests_total);
    let started = Instant::now();
    let response = execute_inner(&state, query, &body).await;
    state.metrics.observe_execution(started.elapsed());
    response
}

async fn execute_inner(
    state: &AppState,
    query: HashMap<String, String>,
    body: &[u8],
) -> Response {
    // Backpressure: fail fast when no slot frees up in time.
    let permit = match timeout(ADMISSION_TIMEOUT, state.semaphore.clone().acquire_owned()).await
    {
        Ok(Ok(permit)) => permit,
        _ => {
            Metrics::inc(&state.metrics.rejects_concurrency);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "server overloaded, try again shortly"
                })),
            )
                .into_response();
        }
    };
    let _permit = permit;

    let body: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            Metrics::inc(&state.metrics.requests_error);
            return bad_request(format!("invalid JSON body: {}", e));
        }
    };
    let script = body
        .get("script")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if script.trim().is_empty() {
        Metrics::inc(&state.metrics.requests_error);
        return bad_request("script cannot be empty".to_string());
    }
    let variables: IndexMap<String, Value> = match body.get("variables") {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => IndexMap::new(),
    };
    let req = RequestEnv::new(query, body.clone());

    // Execution watchdog: no script exceeds its overall time budget.
    let context = match timeout(
        EXECUTION_DEADLINE,
        state.engine.execute_script(&script, variables, req),
    )
    .await
    {
        Err(_) => {
            Metrics::inc(&state.metrics.rejects_timeout);
            return (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "success": false,
                    "error": "script execution timeout (isolation)"
                })),
            )
                .into_response();
        }
        Ok(Err(err)) => {
            Metrics::inc(&state.metrics.requests_error);
            if err.is_integrity() {
                error!(error = %err, "rejected tampered command package");
            }
            return bad_request(err.to_string());
        }
        Ok(Ok(context)) => context,
    };
    Metrics::inc(&state.metrics.requests_success);

    let status = status_override(&context.conector.variables).unwrap_or(StatusCode::OK);
    (
        status,
        Json(json!({
            "success": true,
            "result": context.conector.results,
            "variables": context.conector.variables,
            "logs": context.logs,
        })),
    )
        .into_response()
}

async fn cmd_compile(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid JSON body: {}", e) })),
            )
                .into_response()
        }
    };
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let script = body
        .get("script")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if name.is_empty() || script.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing name or script" })),
        )
            .into_response();
    }

    // Optimization failures fall back to the original source.
    let optimized = match optimizer::optimize_script(&script) {
        Ok(s) => s,
        Err(e) => {
            info!(name = %name, error = %e, "optimization skipped");
            script.clone()
        }
    };

    let bytecode = state.packer.pack(&optimized);
    let source_hash = sha256_hex(optimized.as_bytes());

    let Some(pool) = &state.db else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "no database configured" })),
        )
            .into_response();
    };
    if let Err(e) = db::upsert_bytecode(pool, &name, &bytecode, &source_hash).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response();
    }

    Json(json!({
        "status": "optimized & compiled",
        "name": name,
        "original_chars": script.chars().count(),
        "optimized_chars": optimized.chars().count(),
    }))
    .into_response()
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "avap-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn cmd_metrics(State(state): State<Arc<AppState>>) -> Response {
    let active = state
        .admission_permits
        .saturating_sub(state.semaphore.available_permits());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(active),
    )
        .into_response()
}
