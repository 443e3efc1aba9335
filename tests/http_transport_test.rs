//! HTTP adapter: `GET /health`, `GET /tools`, `POST /tools/{name}`

mod common;

use common::*;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use toolgate::config::TransportsConfig;
use toolgate::mcp::configure_routes;
use toolgate::registry::{default_echo_tool, EchoHandler, ToolDefinition, ToolRegistry};

fn registry_with_write_tool() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(default_echo_tool()).unwrap();
    registry
        .register(ToolDefinition::new("store", Arc::new(EchoHandler)).with_description("Writes a record"))
        .unwrap();
    registry
}

#[actix_rt::test]
async fn test_health_endpoint() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with_write_tool()));

    let mut response = srv.get("/health").send().await.unwrap();
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tools"], 2);
    assert_eq!(body["version"], toolgate::VERSION);
}

#[actix_rt::test]
async fn test_list_tools_requires_credentials() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with_write_tool()));

    let response = srv.get("/tools").send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let mut response = srv
        .get("/tools")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["echo", "store"]);
    assert_eq!(body["tools"][0]["requiredCapability"], "read");
    assert!(body["tools"][0]["inputSchema"].is_object());
}

#[actix_rt::test]
async fn test_echo_with_internal_secret() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with_write_tool()));

    let mut response = srv
        .post("/tools/echo")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .insert_header(("x-correlation-id", "req-42"))
        .send_json(&json!({ "message": "hello" }))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers().get("x-correlation-id").unwrap(), "req-42");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "success": true, "result": { "message": "hello" } }));
}

#[actix_rt::test]
async fn test_missing_and_wrong_credentials_look_the_same() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with_write_tool()));

    let mut missing = srv
        .post("/tools/echo")
        .send_json(&json!({ "message": "hello" }))
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 401);
    let missing: Value = missing.json().await.unwrap();

    let mut wrong = srv
        .post("/tools/echo")
        .insert_header(("x-internal-key", "not-the-secret"))
        .send_json(&json!({ "message": "hello" }))
        .await
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 401);
    let wrong: Value = wrong.json().await.unwrap();

    assert_eq!(missing["success"], false);
    assert_eq!(missing["error"]["kind"], "Unauthorized");
    assert_eq!(missing["error"]["message"], "unauthorized");
    assert_eq!(missing["error"]["message"], wrong["error"]["message"]);
    assert!(!wrong.to_string().contains("not-the-secret"));
}

#[actix_rt::test]
async fn test_third_call_on_two_per_minute_plan_is_rate_limited() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with_write_tool()));

    for _ in 0..2 {
        let response = srv
            .post("/tools/echo")
            .insert_header(("x-api-key", API_KEY))
            .send_json(&json!({ "message": "hi" }))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    let mut response = srv
        .post("/tools/echo")
        .insert_header(("x-api-key", API_KEY))
        .send_json(&json!({ "message": "hi" }))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 429);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 60);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "RateLimited");
    assert!(body["error"]["retryAfterMs"].as_u64().unwrap() > 0);
}

#[actix_rt::test]
async fn test_invalid_arguments_and_body() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with_write_tool()));

    let mut response = srv
        .post("/tools/echo")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send_json(&json!({ "message": 42 }))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "InvalidArguments");

    let response = srv
        .post("/tools/echo")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .insert_header(("content-type", "application/json"))
        .send_body("{not json")
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Empty body means `{}`, which misses the required field
    let response = srv
        .post("/tools/echo")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[actix_rt::test]
async fn test_unknown_tool_and_missing_capability() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with_write_tool()));

    let mut response = srv
        .post("/tools/nope")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send_json(&json!({}))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "NotFound");

    let mut response = srv
        .post("/tools/store")
        .insert_header(("x-api-key", VIEWER_API_KEY))
        .send_json(&json!({ "record": 1 }))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "Forbidden");

    let response = srv
        .post("/tools/store")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send_json(&json!({ "record": 1 }))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[actix_rt::test]
async fn test_client_disconnect_cancels_handler() {
    let parked = Arc::new(ParkedHandler::default());
    let state = state_with(&gateway_config(), registry_with(parked.clone()));
    let transports = TransportsConfig::default();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(state.clone()))
            .configure(move |cfg| configure_routes(cfg, &transports)),
    )
    .await;

    let request = test::TestRequest::post()
        .uri("/tools/park")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .to_request();

    // Dropping the in-progress request is what a disconnect looks like to the handler
    tokio::select! {
        _ = test::call_service(&app, request) => panic!("parked call finished on its own"),
        _ = parked.started.notified() => {}
    }

    assert!(eventually(|| parked.cancelled.load(Ordering::SeqCst)).await);
    assert!(eventually(|| state.shutdown().in_flight() == 0).await);
}
