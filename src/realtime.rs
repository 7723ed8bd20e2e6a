//! Realtime synchronization bridge.
//!
//! Consumes the persistence layer's row-level change feed (insert/update
//! events for leads, insert/update/delete for interacoes) and reconciles it
//! into identity-indexed local collections without a full reload. The
//! transport guarantees neither ordering nor exactly-once delivery, so every
//! operation here is idempotent by id: insert-if-absent, merge-by-id,
//! remove-by-id. Pushed rows may be partial; the bridge re-fetches the full
//! record where it can and falls back to the raw pushed fields where it
//! cannot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Interacao, Lead};
use crate::status::LeadStage;

/// Partial lead row as delivered by the change feed. Every field except the
/// id may be missing from the push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadChange {
    pub id: Uuid,
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
    pub empresa_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub criado_em: Option<DateTime<Utc>>,
    #[serde(default)]
    pub atualizado_em: Option<DateTime<Utc>>,
}

impl LeadChange {
    /// Minimum shape required to materialize a lead from the raw push
    /// payload when the re-fetch cannot supply the full record.
    fn has_insert_minimum(&self) -> bool {
        self.nome.is_some()
            && self.linkedin_url.is_some()
            && self.perfil.is_some()
            && self.criado_em.is_some()
    }

    fn into_lead(self) -> Option<Lead> {
        Some(Lead {
            id: self.id,
            nome: self.nome?,
            cargo: self.cargo,
            linkedin_url: self.linkedin_url,
            email: self.email,
            telefone: self.telefone,
            perfil: self.perfil?,
            empresa_id: self.empresa_id,
            status: Some(
                LeadStage::normalize(self.status.as_deref())
                    .as_str()
                    .to_string(),
            ),
            criado_em: self.criado_em?,
            atualizado_em: self.atualizado_em,
        })
    }
}

/// Partial interacao row from the change feed.
#[derive(Debug, Clone, Deserialize)]
pub struct InteracaoChange {
    pub id: Uuid,
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub canal: Option<String>,
    #[serde(default)]
    pub observacao: Option<String>,
    #[serde(default)]
    pub criado_em: Option<DateTime<Utc>>,
}

impl InteracaoChange {
    fn has_insert_minimum(&self) -> bool {
        self.lead_id.is_some() && self.status.is_some()
    }

    fn into_interacao(self) -> Option<Interacao> {
        Some(Interacao {
            id: self.id,
            lead_id: self.lead_id?,
            status: self.status?,
            canal: self.canal,
            observacao: self.observacao,
            // push payloads occasionally omit the timestamp; receipt time
            // keeps the entry sortable
            criado_em: self.criado_em.unwrap_or_else(Utc::now),
        })
    }
}

/// One row-level event from the change feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    LeadInserted(LeadChange),
    LeadUpdated(LeadChange),
    InteracaoInserted(InteracaoChange),
    InteracaoUpdated(InteracaoChange),
    InteracaoDeleted { id: Uuid },
}

/// Subscription lifecycle of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Subscribing,
    Live,
}

/// Re-fetch seam: the bridge pulls the authoritative record by id after a
/// push, because the push payload may omit joined/derived fields.
#[allow(async_fn_in_trait)]
pub trait RecordFetcher {
    async fn fetch_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError>;
    async fn fetch_interacao(&self, id: Uuid) -> Result<Option<Interacao>, AppError>;
}

/// Postgres-backed fetcher used by the live service.
pub struct PgFetcher {
    pool: PgPool,
}

impl PgFetcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RecordFetcher for PgFetcher {
    async fn fetch_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lead)
    }

    async fn fetch_interacao(&self, id: Uuid) -> Result<Option<Interacao>, AppError> {
        let interacao = sqlx::query_as::<_, Interacao>("SELECT * FROM interacoes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(interacao)
    }
}

/// Keeps the client-side lead and interacao collections consistent with
/// server state as changes occur elsewhere.
///
/// All mutation happens on a single task; the re-fetch calls are the only
/// suspension points. A second event for the same entity arriving while a
/// re-fetch is in flight is processed against the then-current local state —
/// last merge wins, which is safe because every write is idempotent by id.
pub struct RealtimeBridge<F: RecordFetcher> {
    fetcher: F,
    state: BridgeState,
    leads: HashMap<Uuid, Lead>,
    interacoes: HashMap<Uuid, Interacao>,
}

impl<F: RecordFetcher> RealtimeBridge<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            state: BridgeState::Idle,
            leads: HashMap::new(),
            interacoes: HashMap::new(),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Begin subscribing to the change feed.
    pub fn subscribe(&mut self) {
        if self.state == BridgeState::Idle {
            self.state = BridgeState::Subscribing;
        }
    }

    /// Channel confirmed; events will now be processed.
    pub fn mark_live(&mut self) {
        if self.state == BridgeState::Subscribing {
            self.state = BridgeState::Live;
        }
    }

    /// Tear down the subscription. Runs on every exit path; events arriving
    /// afterwards are dropped.
    pub fn unsubscribe(&mut self) {
        self.state = BridgeState::Idle;
    }

    /// Seed the local collections from an initial full load.
    pub fn seed(&mut self, leads: Vec<Lead>, interacoes: Vec<Interacao>) {
        self.leads = leads.into_iter().map(|l| (l.id, l)).collect();
        self.interacoes = interacoes.into_iter().map(|i| (i.id, i)).collect();
    }

    /// Leads sorted newest-first.
    pub fn leads_snapshot(&self) -> Vec<Lead> {
        let mut leads: Vec<Lead> = self.leads.values().cloned().collect();
        leads.sort_by(|a, b| b.criado_em.cmp(&a.criado_em));
        leads
    }

    /// Interacoes sorted newest-first. Sorting happens on every snapshot, so
    /// out-of-order delivery never leaks into display order.
    pub fn interacoes_snapshot(&self) -> Vec<Interacao> {
        let mut interacoes: Vec<Interacao> = self.interacoes.values().cloned().collect();
        interacoes.sort_by(|a, b| b.criado_em.cmp(&a.criado_em));
        interacoes
    }

    pub fn lead_by_id(&self, id: Uuid) -> Option<&Lead> {
        self.leads.get(&id)
    }

    pub fn interacao_by_id(&self, id: Uuid) -> Option<&Interacao> {
        self.interacoes.get(&id)
    }

    /// Process one change-feed event against current local state.
    pub async fn handle_event(&mut self, event: ChangeEvent) {
        if self.state != BridgeState::Live {
            tracing::debug!("change event dropped while not live: {:?}", event);
            return;
        }

        match event {
            ChangeEvent::LeadInserted(change) => self.on_lead_insert(change).await,
            ChangeEvent::LeadUpdated(change) => self.on_lead_update(change).await,
            ChangeEvent::InteracaoInserted(change) => self.on_interacao_insert(change).await,
            ChangeEvent::InteracaoUpdated(change) => self.on_interacao_update(change),
            ChangeEvent::InteracaoDeleted { id } => {
                self.interacoes.remove(&id);
            }
        }
    }

    async fn on_lead_insert(&mut self, change: LeadChange) {
        // duplicate delivery tolerance
        if self.leads.contains_key(&change.id) {
            return;
        }

        match self.fetcher.fetch_lead(change.id).await {
            Ok(Some(full)) => {
                // membership is re-checked against current state: another
                // event may have landed during the fetch
                self.leads
                    .entry(full.id)
                    .or_insert_with(|| normalized(full));
            }
            Ok(None) | Err(_) => {
                // race: row gone between push and fetch, or fetch failed.
                // Fall back to the raw pushed fields instead of dropping the
                // event, but only when the minimum shape is present.
                if change.has_insert_minimum() {
                    if let Some(lead) = change.into_lead() {
                        self.leads.entry(lead.id).or_insert(lead);
                    }
                } else {
                    tracing::debug!("discarding partial lead insert {}", change.id);
                }
            }
        }
    }

    async fn on_lead_update(&mut self, change: LeadChange) {
        let id = change.id;

        // optimistic merge first so the UI moves immediately
        let Some(existing) = self.leads.get_mut(&id) else {
            return;
        };
        merge_lead(existing, &change);

        // reconcile any fields the partial payload didn't carry; silent
        // no-op on failure, the optimistic merge already applied
        match self.fetcher.fetch_lead(id).await {
            Ok(Some(full)) => {
                self.leads.insert(id, normalized(full));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("lead {} re-fetch failed after update: {}", id, e);
            }
        }
    }

    async fn on_interacao_insert(&mut self, change: InteracaoChange) {
        if self.interacoes.contains_key(&change.id) {
            return;
        }

        match self.fetcher.fetch_interacao(change.id).await {
            Ok(Some(full)) => {
                self.interacoes.entry(full.id).or_insert(full);
            }
            Ok(None) | Err(_) => {
                if change.has_insert_minimum() {
                    if let Some(interacao) = change.into_interacao() {
                        self.interacoes.entry(interacao.id).or_insert(interacao);
                    }
                } else {
                    tracing::debug!("discarding partial interacao insert {}", change.id);
                }
            }
        }
    }

    fn on_interacao_update(&mut self, change: InteracaoChange) {
        let Some(existing) = self.interacoes.get_mut(&change.id) else {
            return;
        };
        if let Some(status) = change.status {
            existing.status = status;
        }
        if change.canal.is_some() {
            existing.canal = change.canal;
        }
        if change.observacao.is_some() {
            existing.observacao = change.observacao;
        }
        if let Some(criado_em) = change.criado_em {
            existing.criado_em = criado_em;
        }
    }
}

/// Shallow merge of the pushed fields into the local record. Absent fields
/// never clobber existing values; the status passes through the normalizer
/// so the client never displays a stale/legacy raw value.
fn merge_lead(existing: &mut Lead, change: &LeadChange) {
    if let Some(ref nome) = change.nome {
        existing.nome = nome.clone();
    }
    if change.cargo.is_some() {
        existing.cargo = change.cargo.clone();
    }
    if change.linkedin_url.is_some() {
        existing.linkedin_url = change.linkedin_url.clone();
    }
    if change.email.is_some() {
        existing.email = change.email.clone();
    }
    if change.telefone.is_some() {
        existing.telefone = change.telefone.clone();
    }
    if let Some(ref perfil) = change.perfil {
        existing.perfil = perfil.clone();
    }
    if change.empresa_id.is_some() {
        existing.empresa_id = change.empresa_id;
    }
    if let Some(ref status) = change.status {
        existing.status = Some(LeadStage::normalize(Some(status)).as_str().to_string());
    }
    if let Some(atualizado_em) = change.atualizado_em {
        existing.atualizado_em = Some(atualizado_em);
    }
}

/// Canonicalizes the status of an authoritative record before it enters the
/// local collection.
fn normalized(mut lead: Lead) -> Lead {
    lead.status = Some(lead.stage().as_str().to_string());
    lead
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Mutex;

    /// In-memory fetcher standing in for the database during bridge tests.
    struct MockFetcher {
        leads: Mutex<HashMap<Uuid, Lead>>,
        interacoes: Mutex<HashMap<Uuid, Interacao>>,
        fail: bool,
    }

    impl MockFetcher {
        fn empty() -> Self {
            Self {
                leads: Mutex::new(HashMap::new()),
                interacoes: Mutex::new(HashMap::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::empty()
            }
        }

        fn with_lead(lead: Lead) -> Self {
            let fetcher = Self::empty();
            fetcher.leads.lock().unwrap().insert(lead.id, lead);
            fetcher
        }
    }

    impl RecordFetcher for MockFetcher {
        async fn fetch_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
            if self.fail {
                return Err(AppError::InternalError("fetch failure".to_string()));
            }
            Ok(self.leads.lock().unwrap().get(&id).cloned())
        }

        async fn fetch_interacao(&self, id: Uuid) -> Result<Option<Interacao>, AppError> {
            if self.fail {
                return Err(AppError::InternalError("fetch failure".to_string()));
            }
            Ok(self.interacoes.lock().unwrap().get(&id).cloned())
        }
    }

    fn sample_lead(id: Uuid, nome: &str, status: Option<&str>) -> Lead {
        Lead {
            id,
            nome: nome.to_string(),
            cargo: None,
            linkedin_url: Some("https://linkedin.com/in/test".to_string()),
            email: None,
            telefone: None,
            perfil: "teste".to_string(),
            empresa_id: None,
            status: status.map(str::to_string),
            criado_em: Utc::now(),
            atualizado_em: None,
        }
    }

    fn sample_interacao(id: Uuid, lead_id: Uuid, criado_em: DateTime<Utc>) -> Interacao {
        Interacao {
            id,
            lead_id,
            status: "contatado".to_string(),
            canal: Some("email".to_string()),
            observacao: None,
            criado_em,
        }
    }

    fn empty_change(id: Uuid) -> LeadChange {
        LeadChange {
            id,
            nome: None,
            cargo: None,
            linkedin_url: None,
            email: None,
            telefone: None,
            perfil: None,
            empresa_id: None,
            status: None,
            criado_em: None,
            atualizado_em: None,
        }
    }

    fn live_bridge(fetcher: MockFetcher) -> RealtimeBridge<MockFetcher> {
        let mut bridge = RealtimeBridge::new(fetcher);
        bridge.subscribe();
        bridge.mark_live();
        bridge
    }

    #[tokio::test]
    async fn events_are_dropped_unless_live() {
        let id = Uuid::new_v4();
        let fetcher = MockFetcher::with_lead(sample_lead(id, "Ana", Some("novo")));
        let mut bridge = RealtimeBridge::new(fetcher);

        bridge.handle_event(ChangeEvent::LeadInserted(empty_change(id))).await;
        assert!(bridge.leads_snapshot().is_empty());

        bridge.subscribe();
        assert_eq!(bridge.state(), BridgeState::Subscribing);
        bridge.handle_event(ChangeEvent::LeadInserted(empty_change(id))).await;
        assert!(bridge.leads_snapshot().is_empty());

        bridge.mark_live();
        bridge.handle_event(ChangeEvent::LeadInserted(empty_change(id))).await;
        assert_eq!(bridge.leads_snapshot().len(), 1);

        bridge.unsubscribe();
        assert_eq!(bridge.state(), BridgeState::Idle);
        bridge
            .handle_event(ChangeEvent::LeadInserted(empty_change(Uuid::new_v4())))
            .await;
        assert_eq!(bridge.leads_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_does_not_duplicate() {
        let id = Uuid::new_v4();
        let fetcher = MockFetcher::with_lead(sample_lead(id, "Ana", Some("novo")));
        let mut bridge = live_bridge(fetcher);

        bridge.handle_event(ChangeEvent::LeadInserted(empty_change(id))).await;
        bridge.handle_event(ChangeEvent::LeadInserted(empty_change(id))).await;

        assert_eq!(bridge.leads_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn insert_refetches_the_full_record() {
        let id = Uuid::new_v4();
        let mut full = sample_lead(id, "Bruno Completo", Some("interessado"));
        full.cargo = Some("Diretor".to_string());
        let fetcher = MockFetcher::with_lead(full);
        let mut bridge = live_bridge(fetcher);

        // push payload carries only the id; the fetch supplies the rest
        bridge.handle_event(ChangeEvent::LeadInserted(empty_change(id))).await;

        let lead = bridge.lead_by_id(id).expect("lead inserted");
        assert_eq!(lead.nome, "Bruno Completo");
        assert_eq!(lead.cargo.as_deref(), Some("Diretor"));
    }

    #[tokio::test]
    async fn insert_falls_back_to_raw_fields_when_fetch_fails() {
        let id = Uuid::new_v4();
        let mut bridge = live_bridge(MockFetcher::failing());

        let change = LeadChange {
            nome: Some("Carla".to_string()),
            linkedin_url: Some("https://linkedin.com/in/carla".to_string()),
            perfil: Some("saude".to_string()),
            status: Some("respondido".to_string()),
            criado_em: Some(Utc::now()),
            ..empty_change(id)
        };
        bridge.handle_event(ChangeEvent::LeadInserted(change)).await;

        let lead = bridge.lead_by_id(id).expect("fallback inserted");
        assert_eq!(lead.nome, "Carla");
        // even the fallback path never stores a legacy raw status
        assert_eq!(lead.status.as_deref(), Some("interessado"));
    }

    #[tokio::test]
    async fn insert_without_minimum_shape_is_discarded() {
        let id = Uuid::new_v4();
        let mut bridge = live_bridge(MockFetcher::failing());

        let change = LeadChange {
            nome: Some("So Nome".to_string()),
            ..empty_change(id)
        };
        bridge.handle_event(ChangeEvent::LeadInserted(change)).await;

        assert!(bridge.lead_by_id(id).is_none());
    }

    #[tokio::test]
    async fn update_merges_partial_fields_and_normalizes_status() {
        let id = Uuid::new_v4();
        let mut local = sample_lead(id, "Daniela", Some("novo"));
        local.email = Some("daniela@example.com".to_string());

        // fetch failure forces the optimistic merge to stand alone
        let mut bridge = live_bridge(MockFetcher::failing());
        bridge.seed(vec![local], vec![]);

        let change = LeadChange {
            status: Some("respondido".to_string()),
            ..empty_change(id)
        };
        bridge.handle_event(ChangeEvent::LeadUpdated(change)).await;

        let lead = bridge.lead_by_id(id).unwrap();
        assert_eq!(lead.status.as_deref(), Some("interessado"));
        // absent fields in the push payload did not clobber local values
        assert_eq!(lead.email.as_deref(), Some("daniela@example.com"));
        assert_eq!(lead.nome, "Daniela");
    }

    #[tokio::test]
    async fn update_reconciles_against_server_state() {
        let id = Uuid::new_v4();
        let local = sample_lead(id, "Eduardo", Some("novo"));

        // server already holds the final state both pushes race toward
        let mut server = sample_lead(id, "Eduardo Atualizado", Some("qualificado"));
        server.telefone = Some("+5511999990000".to_string());
        let fetcher = MockFetcher::with_lead(server);

        let mut bridge = live_bridge(fetcher);
        bridge.seed(vec![local], vec![]);

        // two partial pushes, each carrying a different slice of the update
        let first = LeadChange {
            status: Some("contatado".to_string()),
            ..empty_change(id)
        };
        let second = LeadChange {
            nome: Some("Eduardo Atualizado".to_string()),
            ..empty_change(id)
        };
        bridge.handle_event(ChangeEvent::LeadUpdated(first)).await;
        bridge.handle_event(ChangeEvent::LeadUpdated(second)).await;

        // final local state equals the server's final state, never a mix of
        // the two partial pushes
        let lead = bridge.lead_by_id(id).unwrap();
        assert_eq!(lead.nome, "Eduardo Atualizado");
        assert_eq!(lead.status.as_deref(), Some("qualificado"));
        assert_eq!(lead.telefone.as_deref(), Some("+5511999990000"));
    }

    #[tokio::test]
    async fn update_for_unknown_id_is_a_noop() {
        let mut bridge = live_bridge(MockFetcher::empty());
        let change = LeadChange {
            nome: Some("Fantasma".to_string()),
            ..empty_change(Uuid::new_v4())
        };
        bridge.handle_event(ChangeEvent::LeadUpdated(change)).await;
        assert!(bridge.leads_snapshot().is_empty());
    }

    #[tokio::test]
    async fn interacao_snapshot_is_sorted_newest_first_regardless_of_delivery() {
        let lead_id = Uuid::new_v4();
        let now = Utc::now();
        let older = sample_interacao(Uuid::new_v4(), lead_id, now - Duration::hours(2));
        let newer = sample_interacao(Uuid::new_v4(), lead_id, now);

        let fetcher = MockFetcher::empty();
        fetcher
            .interacoes
            .lock()
            .unwrap()
            .insert(older.id, older.clone());
        fetcher
            .interacoes
            .lock()
            .unwrap()
            .insert(newer.id, newer.clone());

        let mut bridge = live_bridge(fetcher);

        // deliver newest first, oldest second: display order must not care
        for id in [newer.id, older.id] {
            bridge
                .handle_event(ChangeEvent::InteracaoInserted(InteracaoChange {
                    id,
                    lead_id: None,
                    status: None,
                    canal: None,
                    observacao: None,
                    criado_em: None,
                }))
                .await;
        }

        let snapshot = bridge.interacoes_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, newer.id);
        assert_eq!(snapshot[1].id, older.id);
    }

    #[tokio::test]
    async fn interacao_delete_removes_by_id() {
        let lead_id = Uuid::new_v4();
        let entry = sample_interacao(Uuid::new_v4(), lead_id, Utc::now());
        let mut bridge = live_bridge(MockFetcher::empty());
        bridge.seed(vec![], vec![entry.clone()]);

        bridge
            .handle_event(ChangeEvent::InteracaoDeleted { id: entry.id })
            .await;
        assert!(bridge.interacoes_snapshot().is_empty());

        // deleting again is harmless
        bridge
            .handle_event(ChangeEvent::InteracaoDeleted { id: entry.id })
            .await;
    }

    #[tokio::test]
    async fn lead_insert_race_with_deleted_row_uses_fallback() {
        // fetch returns None (row deleted between push and fetch)
        let id = Uuid::new_v4();
        let mut bridge = live_bridge(MockFetcher::empty());

        let change = LeadChange {
            nome: Some("Gabriela".to_string()),
            linkedin_url: Some("https://linkedin.com/in/gabriela".to_string()),
            perfil: Some("varejo".to_string()),
            criado_em: Some(Utc::now()),
            ..empty_change(id)
        };
        bridge.handle_event(ChangeEvent::LeadInserted(change)).await;

        let lead = bridge.lead_by_id(id).expect("raw fields inserted");
        assert_eq!(lead.nome, "Gabriela");
        assert_eq!(lead.status.as_deref(), Some("novo"));
    }
}
