use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{Interacao, Lead};
use crate::status::{Canal, InteracaoStatus, LeadStage};
use crate::store::PipelineStore;

/// Automation outcomes pushed by the external workflow engine. Each kind
/// carries one fixed target stage and one synthetic audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationEvent {
    FollowUpSent,
    Responded,
    NegotiationStarted,
    Lost,
}

impl AutomationEvent {
    /// The stage the lead is moved to when this event fires.
    pub fn target_stage(&self) -> LeadStage {
        match self {
            AutomationEvent::FollowUpSent => LeadStage::EmailEnviado,
            AutomationEvent::Responded => LeadStage::Interessado,
            AutomationEvent::NegotiationStarted => LeadStage::Qualificado,
            AutomationEvent::Lost => LeadStage::Perdido,
        }
    }

    /// Status tag of the synthetic interaction recorded alongside.
    pub fn interacao_status(&self) -> InteracaoStatus {
        match self {
            AutomationEvent::FollowUpSent => InteracaoStatus::FollowUp,
            AutomationEvent::Responded => InteracaoStatus::Respondeu,
            AutomationEvent::NegotiationStarted => InteracaoStatus::Negociacao,
            AutomationEvent::Lost => InteracaoStatus::Perdido,
        }
    }

    pub fn canal(&self) -> Canal {
        match self {
            AutomationEvent::FollowUpSent | AutomationEvent::Responded => Canal::Email,
            AutomationEvent::NegotiationStarted | AutomationEvent::Lost => Canal::AutomacaoN8n,
        }
    }

    /// Audit note describing the automated cause.
    pub fn observacao(&self) -> &'static str {
        match self {
            AutomationEvent::FollowUpSent => "Follow-up automatico enviado via n8n",
            AutomationEvent::Responded => {
                "O lead respondeu ao contato automatico (detectado via n8n)"
            }
            AutomationEvent::NegotiationStarted => {
                "Negociacao iniciada automaticamente (lead em possivel fechamento)"
            }
            AutomationEvent::Lost => "Marcado como perdido automaticamente pelo fluxo n8n",
        }
    }
}

/// Result of a manual status set.
#[derive(Debug)]
pub enum SetStatusOutcome {
    /// Target equalled the current normalized stage; nothing was written.
    Unchanged(Lead),
    /// Status persisted with a fresh `atualizado_em`.
    Updated(Lead),
}

impl SetStatusOutcome {
    pub fn lead(&self) -> &Lead {
        match self {
            SetStatusOutcome::Unchanged(lead) | SetStatusOutcome::Updated(lead) => lead,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, SetStatusOutcome::Updated(_))
    }
}

/// Result of applying an automation event.
#[derive(Debug)]
pub struct AutomationOutcome {
    pub stage: LeadStage,
    /// False when the update touched zero rows (lead absent). Non-fatal:
    /// the automation source must not be retried into a poison loop.
    pub lead_updated: bool,
}

/// The single authority for what a lead's status becomes, and what gets
/// logged, for each of the three trigger kinds: manual set, logged
/// interaction, inbound automation event.
pub struct TransitionEngine {
    pool: PgPool,
    store: PipelineStore,
}

impl TransitionEngine {
    pub fn new(pool: PgPool) -> Self {
        let store = PipelineStore::new(pool.clone());
        Self { pool, store }
    }

    /// Manual status set from the UI.
    ///
    /// The caller already validated the target against the canonical set.
    /// Setting the stage the lead is already in is a no-op: no write, no
    /// `atualizado_em` bump. Never appends an interaction — the manual path
    /// is presentation-triggered.
    pub async fn set_status(
        &self,
        lead_id: Uuid,
        target: LeadStage,
    ) -> Result<SetStatusOutcome, AppError> {
        let current = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead_id)))?;

        if current.stage() == target {
            tracing::debug!(
                "set_status no-op: lead {} already at {}",
                lead_id,
                target
            );
            return Ok(SetStatusOutcome::Unchanged(current));
        }

        let updated = sqlx::query_as::<_, Lead>(
            r#"
            UPDATE leads
            SET status = $2, atualizado_em = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(lead_id)
        .bind(target.as_str())
        .fetch_one(&self.pool)
        .await
        .context("persisting manual status change")?;

        tracing::info!(
            "lead {} moved {} -> {} (manual)",
            lead_id,
            current.stage(),
            target
        );
        Ok(SetStatusOutcome::Updated(updated))
    }

    /// Interaction-driven transition.
    ///
    /// Appends the interaction (primary write — failure propagates), then
    /// applies the interaction→lead mapping. A tag with no mapping leaves
    /// the lead untouched. The lead-status update is the secondary write:
    /// a failure there is logged and swallowed, never rolled back into the
    /// already-recorded audit entry.
    pub async fn record_interaction(
        &self,
        lead_id: Uuid,
        status: InteracaoStatus,
        canal: Option<Canal>,
        observacao: Option<&str>,
    ) -> Result<(Interacao, Option<LeadStage>), AppError> {
        if !self.store.lead_exists(lead_id).await? {
            return Err(AppError::NotFound(format!("Lead {} not found", lead_id)));
        }

        let interacao = self
            .store
            .append_interacao(lead_id, status, canal, observacao)
            .await?;

        let new_stage = status.lead_stage_after();
        if let Some(stage) = new_stage {
            if let Err(e) = self.update_lead_stage(lead_id, stage).await {
                tracing::error!(
                    "failed to move lead {} to {} after interacao {}: {}",
                    lead_id,
                    stage,
                    interacao.id,
                    e
                );
                // audit entry exists; the stage move is best-effort
            }
        }

        Ok((interacao, new_stage))
    }

    /// Automation-event transition.
    ///
    /// The lead status update is the primary write. Zero rows affected
    /// means the lead does not exist; that is logged and reported as
    /// `lead_updated: false` rather than raised, so at-least-once delivery
    /// from the automation source stays safe. The synthetic interaction is
    /// the secondary write: losing it is recoverable from the automation
    /// engine's own logs, losing the status update is not.
    pub async fn apply_automation_event(
        &self,
        lead_id: Uuid,
        event: AutomationEvent,
    ) -> Result<AutomationOutcome, AppError> {
        let stage = event.target_stage();

        let result = sqlx::query(
            r#"
            UPDATE leads
            SET status = $2, atualizado_em = now()
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .bind(stage.as_str())
        .execute(&self.pool)
        .await
        .context("persisting automation status change")?;

        let lead_updated = result.rows_affected() > 0;
        if !lead_updated {
            tracing::warn!(
                "automation event {:?} for unknown lead {}: update affected zero rows",
                event,
                lead_id
            );
        } else {
            tracing::info!("lead {} moved to {} ({:?})", lead_id, stage, event);
        }

        // Each automation firing is a distinct audit-worthy event, so a
        // duplicate delivery produces a duplicate entry by design.
        if let Err(e) = self
            .store
            .append_interacao(
                lead_id,
                event.interacao_status(),
                Some(event.canal()),
                Some(event.observacao()),
            )
            .await
        {
            tracing::warn!(
                "could not record synthetic interacao for lead {} ({:?}): {}",
                lead_id,
                event,
                e
            );
        }

        Ok(AutomationOutcome { stage, lead_updated })
    }

    async fn update_lead_stage(&self, lead_id: Uuid, stage: LeadStage) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE leads
            SET status = $2, atualizado_em = now()
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .bind(stage.as_str())
        .execute(&self.pool)
        .await
        .context("updating lead stage")?;
        Ok(())
    }
}
