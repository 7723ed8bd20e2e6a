use std::time::Duration;

use reqwest;
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::Lead;

/// Outbound client for the n8n workflow engine.
///
/// Pushes pipeline events so flows (follow-up sequencing, enrichment) can
/// react to leads created through the API. All notifications are
/// fire-and-forget: a flow-engine outage must never fail the API write that
/// triggered it.
#[derive(Clone)]
pub struct N8nNotifier {
    client: reqwest::Client,
    webhook_url: String,
    secret: Option<String>,
}

impl N8nNotifier {
    pub fn new(webhook_url: String, secret: Option<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create n8n client: {}", e))
            })?;

        Ok(Self {
            client,
            webhook_url,
            secret,
        })
    }

    /// Build from config; `None` when no N8N_WEBHOOK_URL is configured, in
    /// which case all notifications are skipped.
    pub fn from_config(config: &Config) -> Result<Option<Self>, AppError> {
        match config.n8n_webhook_url {
            Some(ref url) => Ok(Some(Self::new(
                url.clone(),
                config.webhook_secret.clone(),
            )?)),
            None => Ok(None),
        }
    }

    /// Notify the flow engine that a lead entered the pipeline.
    pub async fn notify_lead_created(&self, lead: &Lead) {
        let payload = json!({
            "event": "lead_created",
            "lead": {
                "id": lead.id,
                "nome": lead.nome,
                "email": lead.email,
                "telefone": lead.telefone,
                "perfil": lead.perfil,
                "status": lead.stage().as_str(),
            },
        });
        self.notify(lead.id, payload).await;
    }

    /// POST one event to the configured n8n webhook. Errors are logged and
    /// dropped.
    async fn notify(&self, lead_id: Uuid, payload: serde_json::Value) {
        let mut request = self.client.post(&self.webhook_url).json(&payload);
        if let Some(ref secret) = self.secret {
            request = request.header("x-exxacta-signature", secret);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("n8n notified for lead {}", lead_id);
            }
            Ok(response) => {
                tracing::warn!(
                    "n8n webhook returned {} for lead {}",
                    response.status(),
                    lead_id
                );
            }
            Err(e) => {
                tracing::warn!("n8n webhook unreachable for lead {}: {}", lead_id, e);
            }
        }
    }
}
