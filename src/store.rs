use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{
    CreateEmpresaRequest, CreateLeadRequest, Empresa, Interacao, Lead, UpdateEmpresaRequest,
    UpdateInteracaoRequest, UpdateLeadRequest,
};
use crate::status::{Canal, InteracaoStatus, LeadStage};

/// Thin persistence wrappers over the hosted Postgres.
///
/// Every method is a single read or write; storage, indexing, and
/// transactions live in the database. Business rules live in
/// [`crate::transitions`].
pub struct PipelineStore {
    pool: PgPool,
}

impl PipelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ============ Leads ============

    /// List leads newest-first, optionally filtered by perfil / empresa.
    pub async fn list_leads(
        &self,
        perfil: Option<&str>,
        empresa_id: Option<Uuid>,
    ) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE ($1::text IS NULL OR perfil = $1)
              AND ($2::uuid IS NULL OR empresa_id = $2)
            ORDER BY criado_em DESC
            "#,
        )
        .bind(perfil)
        .bind(empresa_id)
        .fetch_all(&self.pool)
        .await
        .context("listing leads")?;

        Ok(leads)
    }

    pub async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lead)
    }

    pub async fn lead_exists(&self, id: Uuid) -> Result<bool, AppError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM leads WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Create a lead, seeded at the initial pipeline stage.
    pub async fn create_lead(&self, input: &CreateLeadRequest) -> Result<Lead, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (nome, cargo, linkedin_url, email, telefone, perfil, empresa_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&input.nome)
        .bind(&input.cargo)
        .bind(&input.linkedin_url)
        .bind(&input.email)
        .bind(&input.telefone)
        .bind(&input.perfil)
        .bind(input.empresa_id)
        .bind(LeadStage::Novo.as_str())
        .fetch_one(&self.pool)
        .await
        .context("creating lead")?;

        Ok(lead)
    }

    /// Create the automatic lead that mirrors a freshly created empresa.
    pub async fn create_lead_for_empresa(&self, empresa: &Empresa) -> Result<Lead, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (nome, cargo, linkedin_url, email, telefone, perfil, empresa_id, status)
            VALUES ($1, NULL, $2, NULL, NULL, 'empresa', $3, $4)
            RETURNING *
            "#,
        )
        .bind(&empresa.nome)
        .bind(&empresa.linkedin_url)
        .bind(empresa.id)
        .bind(LeadStage::Novo.as_str())
        .fetch_one(&self.pool)
        .await
        .context("creating automatic lead for empresa")?;

        Ok(lead)
    }

    /// Upsert for the lead-created automation webhook.
    ///
    /// When the flow supplies a valid id the row is created or replaced
    /// under that id; otherwise the database assigns one. A replaced lead
    /// restarts at the entry stage: the flow re-announcing a lead means it
    /// re-entered the funnel.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_lead_from_automation(
        &self,
        id: Option<Uuid>,
        nome: &str,
        cargo: Option<&str>,
        linkedin_url: &str,
        email: Option<&str>,
        telefone: Option<&str>,
        perfil: &str,
        empresa_id: Option<Uuid>,
    ) -> Result<Lead, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (id, nome, cargo, linkedin_url, email, telefone, perfil, empresa_id, status, atualizado_em)
            VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7, $8, $9, now())
            ON CONFLICT (id) DO UPDATE
            SET nome = EXCLUDED.nome, cargo = EXCLUDED.cargo,
                linkedin_url = EXCLUDED.linkedin_url, email = EXCLUDED.email,
                telefone = EXCLUDED.telefone, perfil = EXCLUDED.perfil,
                empresa_id = EXCLUDED.empresa_id, status = EXCLUDED.status,
                atualizado_em = now()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(nome)
        .bind(cargo)
        .bind(linkedin_url)
        .bind(email)
        .bind(telefone)
        .bind(perfil)
        .bind(empresa_id)
        .bind(LeadStage::Novo.as_str())
        .fetch_one(&self.pool)
        .await
        .context("upserting lead from automation")?;

        Ok(lead)
    }

    /// Update a lead's direct fields. Status is deliberately not touched
    /// here; it only moves through the transition engine.
    pub async fn update_lead(&self, id: Uuid, input: &UpdateLeadRequest) -> Result<Lead, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            UPDATE leads
            SET nome = $2, cargo = $3, linkedin_url = $4, email = $5,
                telefone = $6, perfil = $7, empresa_id = $8,
                atualizado_em = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.nome)
        .bind(&input.cargo)
        .bind(&input.linkedin_url)
        .bind(&input.email)
        .bind(&input.telefone)
        .bind(&input.perfil)
        .bind(input.empresa_id)
        .fetch_optional(&self.pool)
        .await
        .context("updating lead")?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;

        Ok(lead)
    }

    /// Delete a lead. Blocked while interações reference it: deleting a
    /// lead must not orphan its audit history.
    pub async fn delete_lead(&self, id: Uuid) -> Result<(), AppError> {
        let interacoes = self.count_interacoes_for_lead(id).await?;
        if interacoes > 0 {
            return Err(AppError::BadRequest(format!(
                "Lead has {} linked interacoes; remove or detach them first",
                interacoes
            )));
        }

        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting lead")?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Lead {} not found", id)));
        }
        Ok(())
    }

    // ============ Empresas ============

    pub async fn list_empresas(
        &self,
        nome: Option<&str>,
        tamanho: Option<&str>,
    ) -> Result<Vec<Empresa>, AppError> {
        let empresas = sqlx::query_as::<_, Empresa>(
            r#"
            SELECT * FROM empresas
            WHERE ($1::text IS NULL OR nome ILIKE '%' || $1 || '%')
              AND ($2::text IS NULL OR tamanho = $2)
            ORDER BY criado_em DESC
            "#,
        )
        .bind(nome)
        .bind(tamanho)
        .fetch_all(&self.pool)
        .await
        .context("listing empresas")?;

        Ok(empresas)
    }

    pub async fn empresa_exists(&self, id: Uuid) -> Result<bool, AppError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM empresas WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn create_empresa(&self, input: &CreateEmpresaRequest) -> Result<Empresa, AppError> {
        let empresa = sqlx::query_as::<_, Empresa>(
            r#"
            INSERT INTO empresas (nome, cidade, tamanho, site, linkedin_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&input.nome)
        .bind(&input.cidade)
        .bind(&input.tamanho)
        .bind(&input.site)
        .bind(&input.linkedin_url)
        .fetch_one(&self.pool)
        .await
        .context("creating empresa")?;

        Ok(empresa)
    }

    pub async fn update_empresa(
        &self,
        id: Uuid,
        input: &UpdateEmpresaRequest,
    ) -> Result<Empresa, AppError> {
        let empresa = sqlx::query_as::<_, Empresa>(
            r#"
            UPDATE empresas
            SET nome = $2, cidade = $3, tamanho = $4, site = $5, linkedin_url = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.nome)
        .bind(&input.cidade)
        .bind(&input.tamanho)
        .bind(&input.site)
        .bind(&input.linkedin_url)
        .fetch_optional(&self.pool)
        .await
        .context("updating empresa")?
        .ok_or_else(|| AppError::NotFound(format!("Empresa {} not found", id)))?;

        Ok(empresa)
    }

    /// Delete an empresa. Blocked while any lead references it, mirroring
    /// the lead-deletion guard against interações.
    pub async fn delete_empresa(&self, id: Uuid) -> Result<(), AppError> {
        let linked_leads = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM leads WHERE empresa_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("checking empresa references")?;

        if linked_leads > 0 {
            return Err(AppError::BadRequest(format!(
                "Empresa has {} linked leads; detach or remove them first",
                linked_leads
            )));
        }

        let result = sqlx::query("DELETE FROM empresas WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting empresa")?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Empresa {} not found", id)));
        }
        Ok(())
    }

    // ============ Interaction log ============

    /// Append a contact event against a lead.
    ///
    /// The caller is responsible for having checked the lead exists; this
    /// is a plain insert so the transition engine can order its checks.
    pub async fn append_interacao(
        &self,
        lead_id: Uuid,
        status: InteracaoStatus,
        canal: Option<Canal>,
        observacao: Option<&str>,
    ) -> Result<Interacao, AppError> {
        let interacao = sqlx::query_as::<_, Interacao>(
            r#"
            INSERT INTO interacoes (lead_id, status, canal, observacao)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(lead_id)
        .bind(status.as_str())
        .bind(canal.map(|c| c.as_str()))
        .bind(observacao)
        .fetch_one(&self.pool)
        .await
        .context("appending interacao")?;

        Ok(interacao)
    }

    /// All interactions for a lead, newest first. Empty vec when none.
    pub async fn list_interacoes_for_lead(&self, lead_id: Uuid) -> Result<Vec<Interacao>, AppError> {
        let interacoes = sqlx::query_as::<_, Interacao>(
            "SELECT * FROM interacoes WHERE lead_id = $1 ORDER BY criado_em DESC",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .context("listing interacoes for lead")?;

        Ok(interacoes)
    }

    pub async fn get_interacao(&self, id: Uuid) -> Result<Option<Interacao>, AppError> {
        let interacao = sqlx::query_as::<_, Interacao>("SELECT * FROM interacoes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(interacao)
    }

    /// Edit an existing interaction. Only status/canal/observacao move.
    pub async fn update_interacao(
        &self,
        id: Uuid,
        input: &UpdateInteracaoRequest,
    ) -> Result<Interacao, AppError> {
        let interacao = sqlx::query_as::<_, Interacao>(
            r#"
            UPDATE interacoes
            SET status = $2, canal = $3, observacao = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.status.as_str())
        .bind(input.canal.map(|c| c.as_str()))
        .bind(&input.observacao)
        .fetch_optional(&self.pool)
        .await
        .context("updating interacao")?
        .ok_or_else(|| AppError::NotFound(format!("Interacao {} not found", id)))?;

        Ok(interacao)
    }

    /// Unconditional delete. Never touches the owning lead's status:
    /// deleting history is not the same as reversing a decision.
    pub async fn delete_interacao(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM interacoes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting interacao")?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Interacao {} not found", id)));
        }
        Ok(())
    }

    pub async fn count_interacoes_for_lead(&self, lead_id: Uuid) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM interacoes WHERE lead_id = $1")
                .bind(lead_id)
                .fetch_one(&self.pool)
                .await
                .context("counting interacoes")?;
        Ok(count)
    }
}
