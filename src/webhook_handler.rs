use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::Lead;
use crate::store::PipelineStore;
use crate::transitions::{AutomationEvent, TransitionEngine};
use crate::webhook_models::{AutomationAck, AutomationPayload, CreatedLeadEnvelope};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

/// n8n Automation Webhooks
///
/// One endpoint per automation outcome. Each applies a fixed pipeline
/// transition and records a synthetic interacao via the transition engine.
/// Authentication: x-exxacta-signature header must match EXXACTA_N8N_SECRET.
///
/// Handlers take the raw body so the signature is checked before any
/// parsing: a caller with a bad secret gets 401 even when its JSON is
/// garbage, and schema problems come back as 400 in the standard error
/// body.

/// POST /api/webhooks/n8n/lead-followup
pub async fn lead_followup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AutomationAck>), AppError> {
    handle_automation_event(&state, &headers, &body, AutomationEvent::FollowUpSent).await
}

/// POST /api/webhooks/n8n/lead-responded
pub async fn lead_responded(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AutomationAck>), AppError> {
    handle_automation_event(&state, &headers, &body, AutomationEvent::Responded).await
}

/// POST /api/webhooks/n8n/lead-negociation
pub async fn lead_negotiation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AutomationAck>), AppError> {
    handle_automation_event(&state, &headers, &body, AutomationEvent::NegotiationStarted).await
}

/// POST /api/webhooks/n8n/lead-lost
pub async fn lead_lost(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AutomationAck>), AppError> {
    handle_automation_event(&state, &headers, &body, AutomationEvent::Lost).await
}

/// Perfil values accepted from automation flows; anything else collapses
/// to "outro".
const PERFIS_VALIDOS: [&str; 7] = [
    "ceo",
    "diretor",
    "socio",
    "contador",
    "gerente",
    "outro",
    "decisor",
];

fn normalize_perfil(raw: Option<&str>) -> &'static str {
    let value = raw.unwrap_or("").trim().to_lowercase();
    PERFIS_VALIDOS
        .iter()
        .find(|p| **p == value)
        .copied()
        .unwrap_or("outro")
}

/// POST /api/webhooks/n8n/lead-created
///
/// Upserts a lead announced by the flow engine. An id that is not a valid
/// UUID is logged and discarded rather than rejected, leaving the database
/// to assign one.
pub async fn lead_created(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    validate_signature(&state, &headers)?;
    let envelope: CreatedLeadEnvelope = parse_payload(&body)?;

    let payload = envelope
        .lead
        .ok_or_else(|| AppError::BadRequest("Missing lead object in payload".to_string()))?;

    let (Some(nome), Some(linkedin_url)) = (payload.nome.as_deref(), payload.linkedin_url.as_deref())
    else {
        return Err(AppError::BadRequest(
            "Missing required fields (nome, linkedin_url)".to_string(),
        ));
    };

    let id = match payload.id.as_deref() {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("discarding invalid lead id from flow engine: {}", raw);
                None
            }
        },
        None => None,
    };

    let empresa_id = payload
        .empresa_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok());

    let perfil = normalize_perfil(payload.perfil.as_deref());

    let lead: Lead = PipelineStore::new(state.db.clone())
        .upsert_lead_from_automation(
            id,
            nome,
            payload.cargo.as_deref(),
            linkedin_url,
            payload.email.as_deref(),
            payload.telefone.as_deref(),
            perfil,
            empresa_id,
        )
        .await?;

    tracing::info!("lead {} upserted via automation ({})", lead.id, lead.nome);
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "ok": true, "lead": lead })),
    ))
}

/// Shared handler body for the four automation event endpoints.
///
/// Replies 200 even when the lead no longer exists (`lead_atualizado:
/// false`): n8n retries non-2xx responses, and a deleted lead would
/// otherwise turn into a retry loop that can never succeed.
async fn handle_automation_event(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    event: AutomationEvent,
) -> Result<(StatusCode, Json<AutomationAck>), AppError> {
    validate_signature(state, headers)?;
    let payload: AutomationPayload = parse_payload(body)?;

    let lead = payload
        .lead
        .ok_or_else(|| AppError::BadRequest("Missing lead object in payload".to_string()))?;

    let raw_id = lead
        .id
        .ok_or_else(|| AppError::BadRequest("Missing lead id in payload".to_string()))?;
    let lead_id = Uuid::parse_str(&raw_id)
        .map_err(|_| AppError::BadRequest(format!("Invalid lead id '{}'", raw_id)))?;

    tracing::info!(
        "automation webhook {:?} for lead {} (event tag: {:?})",
        event,
        lead_id,
        payload.event
    );

    let engine = TransitionEngine::new(state.db.clone());
    let outcome = engine.apply_automation_event(lead_id, event).await?;

    let message = if outcome.lead_updated {
        format!("Lead movido para {}", outcome.stage.label())
    } else {
        "Lead nao encontrado; evento registrado e ignorado".to_string()
    };

    Ok((
        StatusCode::OK,
        Json(AutomationAck {
            ok: true,
            lead_id: lead_id.to_string(),
            status: outcome.stage.as_str().to_string(),
            lead_atualizado: outcome.lead_updated,
            message,
        }),
    ))
}

fn parse_payload<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON payload: {}", e)))
}

/// Validate the shared-secret signature header.
///
/// Fails closed: an unconfigured secret rejects every webhook rather than
/// accepting all of them. EXXACTA_N8N_SECRET must be set for the
/// automation endpoints to work at all.
fn validate_signature(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(ref expected_secret) = state.config.webhook_secret else {
        tracing::warn!("automation webhook rejected: EXXACTA_N8N_SECRET not configured");
        return Err(AppError::Unauthorized(
            "Webhook secret not configured".to_string(),
        ));
    };

    let signature = headers
        .get("x-exxacta-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("Missing x-exxacta-signature header".to_string())
        })?;

    // Constant-time comparison to prevent timing attacks
    if !constant_time_compare(signature, expected_secret) {
        tracing::warn!("invalid automation webhook signature");
        return Err(AppError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    Ok(())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfil_collapses_to_known_values() {
        assert_eq!(normalize_perfil(Some("CEO")), "ceo");
        assert_eq!(normalize_perfil(Some(" diretor ")), "diretor");
        assert_eq!(normalize_perfil(Some("estagiario")), "outro");
        assert_eq!(normalize_perfil(Some("")), "outro");
        assert_eq!(normalize_perfil(None), "outro");
    }

    #[test]
    fn constant_time_compare_matches_equal_strings() {
        assert!(constant_time_compare("segredo", "segredo"));
        assert!(!constant_time_compare("segredo", "segredo2"));
        assert!(!constant_time_compare("segredo", "SEGREDO"));
        assert!(constant_time_compare("", ""));
    }

    #[test]
    fn malformed_json_is_a_bad_request() {
        let body = Bytes::from_static(b"{not json");
        let err = parse_payload::<AutomationPayload>(&body).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
