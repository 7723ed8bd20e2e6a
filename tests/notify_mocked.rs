/// Integration tests for the outbound n8n notifier with a mocked flow engine
use chrono::Utc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use exxacta_pipeline_api::models::Lead;
use exxacta_pipeline_api::notify::N8nNotifier;

fn sample_lead() -> Lead {
    Lead {
        id: Uuid::new_v4(),
        nome: "Paula Teste".to_string(),
        cargo: Some("CFO".to_string()),
        linkedin_url: Some("https://linkedin.com/in/paula".to_string()),
        email: Some("paula@example.com".to_string()),
        telefone: None,
        perfil: "financeiro".to_string(),
        empresa_id: None,
        status: Some("novo".to_string()),
        criado_em: Utc::now(),
        atualizado_em: None,
    }
}

#[tokio::test]
async fn notifier_posts_lead_created_with_signature() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/webhook/exxacta"))
        .and(header("x-exxacta-signature", "segredo"))
        .and(body_partial_json(serde_json::json!({
            "event": "lead_created",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = N8nNotifier::new(
        format!("{}/webhook/exxacta", mock_server.uri()),
        Some("segredo".to_string()),
    )
    .expect("client builds");

    let lead = sample_lead();
    notifier.notify_lead_created(&lead).await;

    // expectation is verified when the mock server drops
}

#[tokio::test]
async fn notifier_omits_signature_when_no_secret_configured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/webhook/exxacta"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = N8nNotifier::new(format!("{}/webhook/exxacta", mock_server.uri()), None)
        .expect("client builds");

    notifier.notify_lead_created(&sample_lead()).await;

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("x-exxacta-signature").is_none());
}

#[tokio::test]
async fn notifier_swallows_flow_engine_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let notifier = N8nNotifier::new(mock_server.uri(), Some("segredo".to_string()))
        .expect("client builds");

    // a flow-engine failure must never surface to the caller
    notifier.notify_lead_created(&sample_lead()).await;
}

#[tokio::test]
async fn notifier_swallows_unreachable_engine() {
    // nothing listens on this port; connection refused must not panic
    let notifier = N8nNotifier::new("http://127.0.0.1:1/webhook".to_string(), None)
        .expect("client builds");

    notifier.notify_lead_created(&sample_lead()).await;
}
