use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound automation payload posted by the n8n workflow engine.
///
/// n8n assembles this JSON from upstream nodes, so field presence varies by
/// flow version; only `lead.id` is required for the handlers to act.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationPayload {
    /// Lead the event refers to
    #[serde(default)]
    pub lead: Option<AutomationLead>,

    /// Flow-assigned event name (e.g. "followup_3dias"), informational only
    #[serde(default)]
    pub event: Option<String>,

    /// Any additional fields the flow attaches
    #[serde(flatten)]
    pub raw: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationLead {
    /// UUID as a string, and optional like every other field: the handler
    /// turns an absent or malformed id into a readable 400, never a serde
    /// rejection
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub nome: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub telefone: Option<String>,

    /// Raw lead data
    #[serde(flatten)]
    pub raw: Value,
}

/// Payload of the lead-created webhook: the full field set for an upsert.
/// `id` is optional — flows that generated their own UUID keep it, anything
/// else lets the database assign one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreatedLeadPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub cargo: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telefone: Option<String>,
    #[serde(default)]
    pub perfil: Option<String>,
    #[serde(default)]
    pub empresa_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreatedLeadEnvelope {
    #[serde(default)]
    pub lead: Option<CreatedLeadPayload>,
}

/// Acknowledgement sent back to the automation engine.
#[derive(Debug, Serialize)]
pub struct AutomationAck {
    pub ok: bool,
    pub lead_id: String,
    /// Canonical stage the lead was moved to
    pub status: String,
    /// False when the lead no longer exists; the flow must not retry
    pub lead_atualizado: bool,
    pub message: String,
}
