mod common;

use axum::http::StatusCode;
use common::{query_param, strip_base, Browser, TestApp, UnreachableArtifactResolver};
use handoff_service::models::TokenScope;
use handoff_service::services::StaticArtifactResolver;
use serde_json::json;

fn resolver() -> StaticArtifactResolver {
    StaticArtifactResolver::new()
        .with_export(
            42,
            Some(7),
            json!({"subject": 42, "resources": [{"id": 7, "title": "Rust", "html": "<p>7</p>"}]}),
        )
        .with_export(
            42,
            None,
            json!({"subject": 42, "resources": [{"id": 7}, {"id": 8}]}),
        )
}

/// Run create → approve → consume → bridge and return the export URL the bridge chose.
async fn export_url_via_handoff(app: &TestApp, body: serde_json::Value) -> String {
    let mut created = app.create_handoff(42, body).await;
    app.get(&mut created.device_a, &created.approve_path()).await;

    let mut device_b = Browser::new();
    let consume = app
        .get(&mut device_b, &format!("/handoff/consume/{}", created.id))
        .await;
    assert_eq!(consume.status, StatusCode::OK);

    let bridge = app
        .get(&mut device_b, &strip_base(&consume.redirect_target()))
        .await;
    assert_eq!(bridge.status, StatusCode::OK);
    bridge.redirect_target()
}

#[tokio::test]
async fn export_token_works_exactly_once() {
    let app = TestApp::with_resolver(resolver());
    let export_url = export_url_via_handoff(
        &app,
        json!({"resource_id": 7, "fallback_target": "https://site/x", "mode": "export"}),
    )
    .await;

    assert!(export_url.starts_with("https://site.test/export?resource_id=7&token="));
    assert!(query_param(&export_url, "token").is_some());

    let mut stranger = Browser::new();
    let first = app.get(&mut stranger, &strip_base(&export_url)).await;
    assert_eq!(first.status, StatusCode::OK);
    let body = first.json();
    assert_eq!(body["subject"], 42);
    assert!(body["resources"][0].get("html").is_none());

    let second = app.get(&mut stranger, &strip_base(&export_url)).await;
    assert_eq!(second.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn all_resources_export_uses_an_all_resources_token() {
    let app = TestApp::with_resolver(resolver());
    let export_url = export_url_via_handoff(
        &app,
        json!({"fallback_target": "https://site/x", "mode": "json"}),
    )
    .await;

    assert!(export_url.starts_with("https://site.test/export?token="));

    let mut stranger = Browser::new();
    let response = app.get(&mut stranger, &strip_base(&export_url)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["resources"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn token_scoped_to_one_resource_cannot_widen() {
    let app = TestApp::with_resolver(resolver());
    let token = app
        .state
        .tokens
        .mint(42, TokenScope::Resource(7), None)
        .await
        .unwrap();

    let mut stranger = Browser::new();
    let widened = app
        .get(&mut stranger, &format!("/export?token={}", token))
        .await;
    assert_eq!(widened.status, StatusCode::UNAUTHORIZED);

    let other = app
        .get(&mut stranger, &format!("/export?resource_id=8&token={}", token))
        .await;
    assert_eq!(other.status, StatusCode::UNAUTHORIZED);

    // Mismatched attempts leave the token usable for its own scope
    let exact = app
        .get(
            &mut stranger,
            &format!("/export?resource_id=7&include_html=1&token={}", token),
        )
        .await;
    assert_eq!(exact.status, StatusCode::OK);
    assert_eq!(exact.json()["resources"][0]["html"], "<p>7</p>");
}

#[tokio::test]
async fn export_accepts_a_logged_in_session() {
    let app = TestApp::with_resolver(resolver());
    let mut browser = Browser::new();
    app.login(&mut browser, 42).await;

    let response = app.get(&mut browser, "/export?resource_id=7").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["subject"], 42);
}

#[tokio::test]
async fn export_without_credentials_is_unauthorized() {
    let app = TestApp::with_resolver(resolver());
    let mut stranger = Browser::new();

    let response = app.get(&mut stranger, "/export?resource_id=7").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .get(&mut stranger, "/export?resource_id=7&token=forged-token-value")
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let app = TestApp::with_resolver(resolver());
    let token = app
        .state
        .tokens
        .mint(42, TokenScope::Resource(7), None)
        .await
        .unwrap();

    app.clock.advance(600);
    let mut stranger = Browser::new();
    let response = app
        .get(&mut stranger, &format!("/export?resource_id=7&token={}", token))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn provider_failure_is_a_bad_gateway_without_details() {
    let app = TestApp::with_resolver(UnreachableArtifactResolver);
    let mut browser = Browser::new();
    app.login(&mut browser, 42).await;

    let response = app.get(&mut browser, "/export?resource_id=7").await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(!response.body.contains("courses.internal"));
    assert!(!response.body.contains("error sending request"));
}
