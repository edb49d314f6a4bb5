//! Outbound-HTTP command scenarios against a mock upstream server.

use std::sync::Arc;

use avap_server::catalog::Catalog;
use avap_server::commands::CommandRegistry;
use avap_server::engine::Engine;
use avap_server::packer::BytecodePacker;
use avap_server::server::{build_app, AppState, Metrics};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_app() -> (Router, Arc<AppState>) {
    let packer = BytecodePacker::new(b"http_test_key".to_vec());
    let registry = Arc::new(CommandRegistry::builtin());
    let catalog = Arc::new(Catalog::preloaded(packer.clone(), registry));
    let state = Arc::new(AppState {
        engine: Arc::new(Engine::new(catalog)),
        metrics: Arc::new(Metrics::new()),
        semaphore: Arc::new(Semaphore::new(20)),
        admission_permits: 20,
        packer,
        db: None,
    });
    (build_app(state.clone()), state)
}

async fn execute(app: Router, script: &str) -> (StatusCode, Value) {
    let payload = json!({ "script": script, "variables": {} });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/execute")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn request_get_stores_json_response() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "id": 7 })))
        .mount(&upstream)
        .await;

    let (app, _) = test_app();
    let script = format!(
        "RequestGet(\"{}/data\", {{}}, {{}}, salida)\naddResult(salida)",
        upstream.uri()
    );
    let (status, body) = execute(app, &script).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["salida"]["ok"], json!(true));
    assert_eq!(body["result"]["salida"]["id"], json!(7));
}

#[tokio::test]
async fn request_get_sends_query_dictionary() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "tickets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "found": 3 })))
        .mount(&upstream)
        .await;

    let (app, _) = test_app();
    let script = format!(
        "RequestGet(\"{}/search\", \"{{'q': 'tickets'}}\", {{}}, salida)\naddResult(salida)",
        upstream.uri()
    );
    let (status, body) = execute(app, &script).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["salida"]["found"], json!(3));
}

#[tokio::test]
async fn request_get_text_response_stays_text() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hola"))
        .mount(&upstream)
        .await;

    let (app, _) = test_app();
    let script = format!(
        "RequestGet(\"{}/plain\", {{}}, {{}}, salida)\naddResult(salida)",
        upstream.uri()
    );
    let (status, body) = execute(app, &script).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["salida"], json!("hola"));
}

#[tokio::test]
async fn failing_request_inside_try_overrides_status() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/boom"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;

    let (app, _) = test_app();
    let script = format!(
        "try()\nRequestGet(\"{}/boom\", {{}}, {{}}, salida)\nexception(err)\nmensaje_salida = \"Error critico detectado\"\naddVar(_status, 500)\naddResult(mensaje_salida)",
        upstream.uri()
    );
    let (status, body) = execute(app, &script).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        body["result"]["mensaje_salida"],
        json!("Error critico detectado")
    );
    // The failing step is on the log with its error.
    let logs = body["logs"].as_array().unwrap();
    assert!(logs.iter().any(|entry| entry["success"] == json!(false)));
}

#[tokio::test]
async fn failing_request_without_try_is_bad_request() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/boom"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;

    let (app, _) = test_app();
    let script = format!("RequestGet(\"{}/boom\", {{}}, {{}}, salida)", upstream.uri());
    let (status, body) = execute(app, &script).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn watchdog_terminates_slow_scripts() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(2)),
        )
        .mount(&upstream)
        .await;

    let (app, _state) = test_app();
    let script = format!(
        "RequestGet(\"{}/slow\", {{}}, {{}}, salida)\naddResult(salida)",
        upstream.uri()
    );
    let (status, body) = execute(app.clone(), &script).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["success"], json!(false));

    // The rejection shows up on the metrics surface.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("avap_rejects_timeout 1"));
}
