use serde::Serialize;

use crate::models::Lead;
use crate::status::LeadStage;

/// Stage filter as selected in the pipeline header: everything, or one
/// canonical stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFilter {
    All,
    Stage(LeadStage),
}

impl StageFilter {
    /// Parses a filter key from the UI. `todos`/`all` (or empty) select
    /// everything; anything else must be a canonical stage key.
    pub fn parse(raw: &str) -> Option<StageFilter> {
        let value = raw.trim().to_lowercase();
        if value.is_empty() || value == "todos" || value == "all" {
            return Some(StageFilter::All);
        }
        LeadStage::from_canonical(&value).map(StageFilter::Stage)
    }
}

/// One pipeline column: a canonical stage and the leads sitting in it.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineColumn {
    pub stage: LeadStage,
    pub label: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
    pub leads: Vec<Lead>,
}

/// Rewrites every lead's status to its canonical key.
///
/// Display code downstream can then group and filter by exact match
/// without re-running the alias table.
pub fn normalize_all(leads: Vec<Lead>) -> Vec<Lead> {
    leads
        .into_iter()
        .map(|mut lead| {
            lead.status = Some(lead.stage().as_str().to_string());
            lead
        })
        .collect()
}

/// Exact-match stage filter over normalized leads; identity for `All`.
pub fn filter_by_stage(leads: &[Lead], filter: StageFilter) -> Vec<Lead> {
    match filter {
        StageFilter::All => leads.to_vec(),
        StageFilter::Stage(stage) => leads
            .iter()
            .filter(|lead| lead.stage() == stage)
            .cloned()
            .collect(),
    }
}

/// Case-insensitive substring search across nome, cargo, perfil and the
/// profile URL. An empty query is the identity.
pub fn search(leads: &[Lead], query: &str) -> Vec<Lead> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return leads.to_vec();
    }

    leads
        .iter()
        .filter(|lead| {
            let mut haystacks = vec![lead.nome.to_lowercase(), lead.perfil.to_lowercase()];
            if let Some(ref cargo) = lead.cargo {
                haystacks.push(cargo.to_lowercase());
            }
            if let Some(ref url) = lead.linkedin_url {
                haystacks.push(url.to_lowercase());
            }
            haystacks.iter().any(|h| h.contains(&needle))
        })
        .cloned()
        .collect()
}

/// Groups leads into one column per canonical stage, in fixed display
/// order. A stage with zero leads still appears with an empty list, so
/// the pipeline UI always shows the full stage set regardless of data
/// sparsity.
pub fn group_by_stage(leads: &[Lead]) -> Vec<PipelineColumn> {
    LeadStage::ALL
        .iter()
        .map(|&stage| PipelineColumn {
            stage,
            label: stage.label(),
            color: stage.color(),
            icon: stage.icon(),
            leads: leads
                .iter()
                .filter(|lead| lead.stage() == stage)
                .cloned()
                .collect(),
        })
        .collect()
}
