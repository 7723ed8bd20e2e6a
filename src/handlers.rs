use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::notify::N8nNotifier;
use crate::pipeline::{self, StageFilter};
use crate::status::LeadStage;
use crate::store::PipelineStore;
use crate::transitions::TransitionEngine;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Outbound client for the n8n flow engine (optional).
    pub notifier: Option<N8nNotifier>,
}

impl AppState {
    fn store(&self) -> PipelineStore {
        PipelineStore::new(self.db.clone())
    }

    fn engine(&self) -> TransitionEngine {
        TransitionEngine::new(self.db.clone())
    }
}

/// JSON body extractor that reports schema violations as 400s in the
/// standard error body instead of axum's default 422.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(AppJson(value))
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "exxacta-pipeline-api",
            "version": "0.1.0"
        })),
    )
}

// ============ Leads ============

#[derive(Debug, Deserialize)]
pub struct LeadListParams {
    pub perfil: Option<String>,
    pub empresa_id: Option<Uuid>,
}

/// GET /api/leads
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeadListParams>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let leads = state
        .store()
        .list_leads(params.perfil.as_deref(), params.empresa_id)
        .await?;
    Ok(Json(leads))
}

/// GET /api/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    let lead = state
        .store()
        .get_lead(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
    Ok(Json(lead))
}

/// POST /api/leads
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    AppJson(input): AppJson<CreateLeadRequest>,
) -> Result<(StatusCode, Json<LeadResponse>), AppError> {
    input.validate()?;

    let store = state.store();
    if let Some(empresa_id) = input.empresa_id {
        if !store.empresa_exists(empresa_id).await? {
            return Err(AppError::BadRequest(format!(
                "Empresa {} does not exist",
                empresa_id
            )));
        }
    }

    let lead = store.create_lead(&input).await?;
    tracing::info!("lead {} created ({})", lead.id, lead.nome);

    // fire-and-forget: flow engine availability never blocks the write
    if let Some(ref notifier) = state.notifier {
        let notifier = notifier.clone();
        let created = lead.clone();
        tokio::spawn(async move {
            notifier.notify_lead_created(&created).await;
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(LeadResponse {
            message: "Lead criado com sucesso".to_string(),
            lead,
        }),
    ))
}

/// PUT /api/leads/:id
pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AppJson(input): AppJson<UpdateLeadRequest>,
) -> Result<Json<LeadResponse>, AppError> {
    input.validate()?;

    let store = state.store();
    if let Some(empresa_id) = input.empresa_id {
        if !store.empresa_exists(empresa_id).await? {
            return Err(AppError::BadRequest(format!(
                "Empresa {} does not exist",
                empresa_id
            )));
        }
    }

    let lead = store.update_lead(id, &input).await?;
    Ok(Json(LeadResponse {
        message: "Lead atualizado com sucesso".to_string(),
        lead,
    }))
}

/// DELETE /api/leads/:id
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.store().delete_lead(id).await?;
    tracing::info!("lead {} deleted", id);
    Ok(Json(DeleteResponse {
        message: "Lead removido com sucesso".to_string(),
    }))
}

/// POST /api/leads/status
///
/// Manual status set from the dashboard. The target must be a canonical
/// stage key; aliases are for reading legacy data, not for writing new.
pub async fn set_lead_status(
    State(state): State<Arc<AppState>>,
    AppJson(input): AppJson<SetStatusRequest>,
) -> Result<Json<SetStatusResponse>, AppError> {
    let lead_id = Uuid::parse_str(&input.lead_id)
        .map_err(|_| AppError::BadRequest(format!("Invalid lead id '{}'", input.lead_id)))?;

    let target = LeadStage::from_canonical(input.status.trim()).ok_or_else(|| {
        AppError::BadRequest(format!(
            "'{}' is not a valid status; expected one of: {}",
            input.status,
            LeadStage::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })?;

    let outcome = state.engine().set_status(lead_id, target).await?;
    let changed = outcome.changed();
    let message = if changed {
        format!("Status atualizado para {}", target.label())
    } else {
        "Status ja estava definido; nada a fazer".to_string()
    };

    Ok(Json(SetStatusResponse {
        message,
        changed,
        lead: outcome.lead().clone(),
    }))
}

// ============ Interacoes ============

/// GET /api/leads/:id/interacoes
pub async fn list_lead_interacoes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Interacao>>, AppError> {
    let store = state.store();
    if !store.lead_exists(id).await? {
        return Err(AppError::NotFound(format!("Lead {} not found", id)));
    }
    let interacoes = store.list_interacoes_for_lead(id).await?;
    Ok(Json(interacoes))
}

/// POST /api/interacoes
///
/// Records a contact event and applies the interaction→stage mapping.
pub async fn create_interacao(
    State(state): State<Arc<AppState>>,
    AppJson(input): AppJson<CreateInteracaoRequest>,
) -> Result<(StatusCode, Json<InteracaoResponse>), AppError> {
    let (interacao, lead_status_atualizado) = state
        .engine()
        .record_interaction(
            input.lead_id,
            input.status,
            input.canal,
            input.observacao.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InteracaoResponse {
            message: "Interacao registrada com sucesso".to_string(),
            interacao,
            lead_status_atualizado,
        }),
    ))
}

/// PUT /api/interacoes/:id
pub async fn update_interacao(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AppJson(input): AppJson<UpdateInteracaoRequest>,
) -> Result<Json<Interacao>, AppError> {
    let interacao = state.store().update_interacao(id, &input).await?;
    Ok(Json(interacao))
}

/// DELETE /api/interacoes/:id
///
/// Removes the audit entry only. The owning lead's status is never
/// recomputed: deleting history does not reverse a decision.
pub async fn delete_interacao(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.store().delete_interacao(id).await?;
    Ok(Json(DeleteResponse {
        message: "Interacao removida com sucesso".to_string(),
    }))
}

// ============ Empresas ============

#[derive(Debug, Deserialize)]
pub struct EmpresaListParams {
    pub nome: Option<String>,
    pub tamanho: Option<String>,
}

/// GET /api/empresas
pub async fn list_empresas(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EmpresaListParams>,
) -> Result<Json<Vec<Empresa>>, AppError> {
    let empresas = state
        .store()
        .list_empresas(params.nome.as_deref(), params.tamanho.as_deref())
        .await?;
    Ok(Json(empresas))
}

/// POST /api/empresas
///
/// Creates the empresa and an automatic companion lead (perfil 'empresa')
/// so the organization shows up in the pipeline immediately.
pub async fn create_empresa(
    State(state): State<Arc<AppState>>,
    AppJson(input): AppJson<CreateEmpresaRequest>,
) -> Result<(StatusCode, Json<EmpresaResponse>), AppError> {
    input.validate()?;

    let store = state.store();
    let empresa = store.create_empresa(&input).await?;

    // companion lead failure is logged, not raised: the empresa write is
    // the primary one
    if let Err(e) = store.create_lead_for_empresa(&empresa).await {
        tracing::error!(
            "empresa {} created but companion lead failed: {}",
            empresa.id,
            e
        );
    }

    tracing::info!("empresa {} created ({})", empresa.id, empresa.nome);
    Ok((
        StatusCode::CREATED,
        Json(EmpresaResponse {
            message: "Empresa criada com sucesso".to_string(),
            empresa,
        }),
    ))
}

/// PUT /api/empresas/:id
pub async fn update_empresa(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AppJson(input): AppJson<UpdateEmpresaRequest>,
) -> Result<Json<EmpresaResponse>, AppError> {
    input.validate()?;
    let empresa = state.store().update_empresa(id, &input).await?;
    Ok(Json(EmpresaResponse {
        message: "Empresa atualizada com sucesso".to_string(),
        empresa,
    }))
}

/// DELETE /api/empresas/:id
pub async fn delete_empresa(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.store().delete_empresa(id).await?;
    tracing::info!("empresa {} deleted", id);
    Ok(Json(DeleteResponse {
        message: "Empresa removida com sucesso".to_string(),
    }))
}

// ============ Pipeline view ============

#[derive(Debug, Deserialize)]
pub struct PipelineParams {
    /// Canonical stage key, or "todos"/"all" for everything.
    pub status: Option<String>,
    /// Case-insensitive substring over nome/cargo/perfil/linkedin_url.
    pub q: Option<String>,
}

/// GET /api/pipeline
///
/// The kanban view model: leads normalized, searched, filtered, then
/// grouped into one column per canonical stage (empty columns included).
pub async fn pipeline_view(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PipelineParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = match params.status.as_deref() {
        None => StageFilter::All,
        Some(raw) => StageFilter::parse(raw).ok_or_else(|| {
            AppError::BadRequest(format!("'{}' is not a valid status filter", raw))
        })?,
    };

    let leads = state.store().list_leads(None, None).await?;
    let leads = pipeline::normalize_all(leads);
    let leads = match params.q.as_deref() {
        Some(q) => pipeline::search(&leads, q),
        None => leads,
    };
    let leads = pipeline::filter_by_stage(&leads, filter);
    let total = leads.len();
    let columns = pipeline::group_by_stage(&leads);

    Ok(Json(json!({
        "total": total,
        "columns": columns,
    })))
}
