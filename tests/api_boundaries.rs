/// Boundary status-code tests for the HTTP surface, driven through the
/// router without a live database: every request here must be rejected at
/// the signature or schema layer before any query runs.
use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::post,
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

use exxacta_pipeline_api::config::Config;
use exxacta_pipeline_api::handlers::{self, AppState};
use exxacta_pipeline_api::webhook_handler;

fn test_state(secret: Option<&str>) -> Arc<AppState> {
    // lazy pool: connects on first query, which these tests never reach
    let db = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgresql://localhost/unused")
        .expect("lazy pool");

    Arc::new(AppState {
        db,
        config: Config {
            database_url: "postgresql://localhost/unused".to_string(),
            port: 3000,
            webhook_secret: secret.map(str::to_string),
            n8n_webhook_url: None,
        },
        notifier: None,
    })
}

fn app(secret: Option<&str>) -> Router {
    Router::new()
        .route("/api/interacoes", post(handlers::create_interacao))
        .route("/api/leads/status", post(handlers::set_lead_status))
        .route(
            "/api/webhooks/n8n/lead-followup",
            post(webhook_handler::lead_followup),
        )
        .with_state(test_state(secret))
}

fn webhook_request(signature: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/n8n/lead-followup")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("x-exxacta-signature", sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn api_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn webhook_bad_secret_is_401_even_with_malformed_json() {
    // signature is checked before the body is parsed
    let response = app(Some("segredo"))
        .oneshot(webhook_request(Some("errado"), "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_missing_signature_is_401() {
    let response = app(Some("segredo"))
        .oneshot(webhook_request(None, r#"{"lead": {"id": "x"}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_without_configured_secret_fails_closed() {
    let response = app(None)
        .oneshot(webhook_request(Some("qualquer"), r#"{"lead": {"id": "x"}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_malformed_json_is_400() {
    let response = app(Some("segredo"))
        .oneshot(webhook_request(Some("segredo"), "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_missing_lead_id_is_400() {
    let response = app(Some("segredo"))
        .oneshot(webhook_request(
            Some("segredo"),
            r#"{"lead": {"nome": "Sem Id"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_malformed_lead_id_is_400() {
    let response = app(Some("segredo"))
        .oneshot(webhook_request(
            Some("segredo"),
            r#"{"lead": {"id": "nao-e-uuid"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn interacao_with_unknown_status_is_400() {
    // out-of-vocabulary status is a schema violation, not a 422
    let body = format!(
        r#"{{"lead_id": "{}", "status": "banana"}}"#,
        uuid::Uuid::new_v4()
    );
    let response = app(Some("segredo"))
        .oneshot(api_request("/api/interacoes", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn interacao_with_missing_fields_is_400() {
    let response = app(Some("segredo"))
        .oneshot(api_request("/api/interacoes", r#"{"status": "respondeu"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn set_status_with_malformed_lead_id_is_400() {
    let response = app(Some("segredo"))
        .oneshot(api_request(
            "/api/leads/status",
            r#"{"lead_id": "123", "status": "qualificado"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
