use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::status::{Canal, InteracaoStatus, LeadStage};

// ============ Database Models ============

/// A prospective contact tracked through the sales pipeline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    /// Unique identifier, assigned at creation.
    pub id: Uuid,
    /// Display name.
    pub nome: String,
    /// Role/title, when known.
    pub cargo: Option<String>,
    /// LinkedIn-style profile reference.
    pub linkedin_url: Option<String>,
    pub email: Option<String>,
    pub telefone: Option<String>,
    /// Free-text profile/niche tag.
    pub perfil: String,
    /// Owning company, optional and reassignable.
    pub empresa_id: Option<Uuid>,
    /// Raw pipeline status as persisted. Nullable because legacy rows
    /// predate the status column; read through [`Lead::stage`].
    pub status: Option<String>,
    pub criado_em: DateTime<Utc>,
    pub atualizado_em: Option<DateTime<Utc>>,
}

impl Lead {
    /// Canonical pipeline stage for this lead, absorbing legacy values.
    pub fn stage(&self) -> LeadStage {
        LeadStage::normalize(self.status.as_deref())
    }
}

/// An organization a lead may belong to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Empresa {
    pub id: Uuid,
    pub nome: String,
    pub cidade: Option<String>,
    /// Size bucket (e.g. "10_ate_20"), not a raw headcount.
    pub tamanho: String,
    pub site: Option<String>,
    pub linkedin_url: Option<String>,
    pub criado_em: DateTime<Utc>,
}

/// An audit entry of contact with a lead, append-only in spirit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Interacao {
    pub id: Uuid,
    pub lead_id: Uuid,
    /// Interaction status tag — a distinct vocabulary from lead status.
    pub status: String,
    pub canal: Option<String>,
    pub observacao: Option<String>,
    pub criado_em: DateTime<Utc>,
}

// ============ Request Models ============

/// Payload for creating a lead.
#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub nome: String,
    #[serde(default)]
    pub cargo: Option<String>,
    pub linkedin_url: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telefone: Option<String>,
    pub perfil: String,
    #[serde(default)]
    pub empresa_id: Option<Uuid>,
}

impl CreateLeadRequest {
    /// Validates field shapes before anything touches the database.
    pub fn validate(&self) -> Result<(), AppError> {
        validate_nome(&self.nome)?;
        validate_url("linkedin_url", &self.linkedin_url)?;
        if self.perfil.trim().len() < 2 {
            return Err(AppError::BadRequest(
                "perfil must have at least 2 characters".to_string(),
            ));
        }
        if let Some(ref email) = self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

/// Payload for updating a lead's direct fields (never its status — that
/// goes through the transition engine).
#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    pub nome: String,
    #[serde(default)]
    pub cargo: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telefone: Option<String>,
    pub perfil: String,
    #[serde(default)]
    pub empresa_id: Option<Uuid>,
}

impl UpdateLeadRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_nome(&self.nome)?;
        if self.perfil.trim().is_empty() {
            return Err(AppError::BadRequest("perfil cannot be empty".to_string()));
        }
        if let Some(ref url) = self.linkedin_url {
            validate_url("linkedin_url", url)?;
        }
        if let Some(ref email) = self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

/// Payload for creating an empresa.
#[derive(Debug, Deserialize)]
pub struct CreateEmpresaRequest {
    pub nome: String,
    #[serde(default)]
    pub cidade: Option<String>,
    pub tamanho: String,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
}

impl CreateEmpresaRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_nome(&self.nome)?;
        if self.tamanho.trim().is_empty() {
            return Err(AppError::BadRequest("tamanho is required".to_string()));
        }
        if let Some(ref site) = self.site {
            validate_url("site", site)?;
        }
        if let Some(ref url) = self.linkedin_url {
            validate_url("linkedin_url", url)?;
        }
        Ok(())
    }
}

/// Payload for updating an empresa.
#[derive(Debug, Deserialize)]
pub struct UpdateEmpresaRequest {
    pub nome: String,
    #[serde(default)]
    pub cidade: Option<String>,
    pub tamanho: String,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
}

impl UpdateEmpresaRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_nome(&self.nome)?;
        if self.tamanho.trim().is_empty() {
            return Err(AppError::BadRequest("tamanho is required".to_string()));
        }
        if let Some(ref site) = self.site {
            validate_url("site", site)?;
        }
        if let Some(ref url) = self.linkedin_url {
            validate_url("linkedin_url", url)?;
        }
        Ok(())
    }
}

/// Manual status endpoint payload. `status` is kept raw here so the
/// handler can reject non-canonical values with a readable 400 instead of
/// a serde rejection.
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub lead_id: String,
    pub status: String,
}

/// Payload for creating an interaction. Typed enums enforce the
/// interaction vocabulary at the boundary.
#[derive(Debug, Deserialize)]
pub struct CreateInteracaoRequest {
    pub lead_id: Uuid,
    pub status: InteracaoStatus,
    #[serde(default)]
    pub canal: Option<Canal>,
    #[serde(default)]
    pub observacao: Option<String>,
}

/// Payload for editing an interaction. Only status/canal/observacao are
/// editable; the owning lead and timestamps are not.
#[derive(Debug, Deserialize)]
pub struct UpdateInteracaoRequest {
    pub status: InteracaoStatus,
    #[serde(default)]
    pub canal: Option<Canal>,
    #[serde(default)]
    pub observacao: Option<String>,
}

// ============ Response Models ============

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub message: String,
    pub lead: Lead,
}

#[derive(Debug, Serialize)]
pub struct EmpresaResponse {
    pub message: String,
    pub empresa: Empresa,
}

/// Response for interaction creation: the created entry plus the lead
/// stage the interaction pulled the lead into (None when the tag maps to
/// no pipeline movement).
#[derive(Debug, Serialize)]
pub struct InteracaoResponse {
    pub message: String,
    pub interacao: Interacao,
    pub lead_status_atualizado: Option<LeadStage>,
}

/// Response for the manual status endpoint.
#[derive(Debug, Serialize)]
pub struct SetStatusResponse {
    pub message: String,
    /// False when the target equalled the current stage and no write happened.
    pub changed: bool,
    pub lead: Lead,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

// ============ Field validation helpers ============

fn validate_nome(nome: &str) -> Result<(), AppError> {
    if nome.trim().len() < 2 {
        return Err(AppError::BadRequest(
            "nome must have at least 2 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), AppError> {
    url::Url::parse(value)
        .map_err(|_| AppError::BadRequest(format!("{} must be a valid URL", field)))?;
    Ok(())
}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

/// Loose email shape check; exists to catch form typos, not to implement
/// RFC 5322.
pub fn is_valid_email(email: &str) -> bool {
    let re = EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email regex"));
    re.is_match(email)
}

fn validate_email(email: &str) -> Result<(), AppError> {
    if !is_valid_email(email) {
        return Err(AppError::BadRequest(format!(
            "email '{}' is not a valid address",
            email
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_lead_request() -> CreateLeadRequest {
        CreateLeadRequest {
            nome: "Maria Souza".to_string(),
            cargo: Some("CTO".to_string()),
            linkedin_url: "https://linkedin.com/in/maria".to_string(),
            email: Some("maria@example.com".to_string()),
            telefone: None,
            perfil: "tecnologia".to_string(),
            empresa_id: None,
        }
    }

    #[test]
    fn create_lead_request_accepts_valid_input() {
        assert!(base_lead_request().validate().is_ok());
    }

    #[test]
    fn create_lead_request_rejects_short_nome() {
        let mut req = base_lead_request();
        req.nome = "M".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_lead_request_rejects_bad_url_and_email() {
        let mut req = base_lead_request();
        req.linkedin_url = "not a url".to_string();
        assert!(req.validate().is_err());

        let mut req = base_lead_request();
        req.email = Some("not-an-email".to_string());
        assert!(req.validate().is_err());
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email("missing@domain"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("two words@example.com"));
    }

    #[test]
    fn lead_stage_normalizes_legacy_value() {
        let lead = Lead {
            id: Uuid::new_v4(),
            nome: "Teste".to_string(),
            cargo: None,
            linkedin_url: None,
            email: None,
            telefone: None,
            perfil: "empresa".to_string(),
            empresa_id: None,
            status: Some("respondido".to_string()),
            criado_em: Utc::now(),
            atualizado_em: None,
        };
        assert_eq!(lead.stage(), LeadStage::Interessado);

        let sem_status = Lead {
            status: None,
            ..lead.clone()
        };
        assert_eq!(sem_status.stage(), LeadStage::Novo);
    }
}
