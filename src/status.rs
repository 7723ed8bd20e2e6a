use serde::{Deserialize, Serialize};

/// Canonical lead pipeline stages, in display order.
///
/// This enum is the single source of truth for the pipeline vocabulary.
/// Every status string that may appear on a lead row — current canonical
/// values, legacy aliases, values written by earlier automation revisions —
/// is mapped onto exactly one of these stages by [`LeadStage::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    Novo,
    EmailEnviado,
    Aquecimento,
    Contatado,
    Interessado,
    Qualificado,
    Frio,
    Fechado,
    Perdido,
}

impl LeadStage {
    /// All stages in fixed pipeline display order.
    pub const ALL: [LeadStage; 9] = [
        LeadStage::Novo,
        LeadStage::EmailEnviado,
        LeadStage::Aquecimento,
        LeadStage::Contatado,
        LeadStage::Interessado,
        LeadStage::Qualificado,
        LeadStage::Frio,
        LeadStage::Fechado,
        LeadStage::Perdido,
    ];

    /// Canonical storage key for the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStage::Novo => "novo",
            LeadStage::EmailEnviado => "email_enviado",
            LeadStage::Aquecimento => "aquecimento",
            LeadStage::Contatado => "contatado",
            LeadStage::Interessado => "interessado",
            LeadStage::Qualificado => "qualificado",
            LeadStage::Frio => "frio",
            LeadStage::Fechado => "fechado",
            LeadStage::Perdido => "perdido",
        }
    }

    /// Human-readable label shown in the pipeline UI.
    pub fn label(&self) -> &'static str {
        match self {
            LeadStage::Novo => "Novo",
            LeadStage::EmailEnviado => "Contato realizado",
            LeadStage::Aquecimento => "Aquecimento",
            LeadStage::Contatado => "Em contato",
            LeadStage::Interessado => "Interessado",
            LeadStage::Qualificado => "Qualificado",
            LeadStage::Frio => "Frio",
            LeadStage::Fechado => "Fechado",
            LeadStage::Perdido => "Perdido",
        }
    }

    /// Color token used by the dashboard to paint the pipeline column.
    pub fn color(&self) -> &'static str {
        match self {
            LeadStage::Novo => "blue",
            LeadStage::EmailEnviado => "sky",
            LeadStage::Aquecimento => "amber",
            LeadStage::Contatado => "indigo",
            LeadStage::Interessado => "purple",
            LeadStage::Qualificado => "green",
            LeadStage::Frio => "gray",
            LeadStage::Fechado => "emerald",
            LeadStage::Perdido => "red",
        }
    }

    /// Icon name associated with the stage.
    pub fn icon(&self) -> &'static str {
        match self {
            LeadStage::Novo => "sparkles",
            LeadStage::EmailEnviado => "mail",
            LeadStage::Aquecimento => "flame",
            LeadStage::Contatado => "message-circle",
            LeadStage::Interessado => "eye",
            LeadStage::Qualificado => "badge-check",
            LeadStage::Frio => "snowflake",
            LeadStage::Fechado => "handshake",
            LeadStage::Perdido => "x-circle",
        }
    }

    /// Strict membership test against the canonical set.
    ///
    /// Only exact canonical keys are accepted; legacy aliases are rejected.
    /// Used to validate UI-originated input before it is sent for
    /// persistence — never trust an unnormalized value as a transition
    /// target.
    pub fn from_canonical(value: &str) -> Option<LeadStage> {
        match value {
            "novo" => Some(LeadStage::Novo),
            "email_enviado" => Some(LeadStage::EmailEnviado),
            "aquecimento" => Some(LeadStage::Aquecimento),
            "contatado" => Some(LeadStage::Contatado),
            "interessado" => Some(LeadStage::Interessado),
            "qualificado" => Some(LeadStage::Qualificado),
            "frio" => Some(LeadStage::Frio),
            "fechado" => Some(LeadStage::Fechado),
            "perdido" => Some(LeadStage::Perdido),
            _ => None,
        }
    }

    /// Maps any raw status string onto a canonical stage.
    ///
    /// Trims and lowercases the input. Empty or unrecognized values fall
    /// back to [`LeadStage::Novo`] so downstream rendering never crashes on
    /// a malformed row. The alias table absorbs every historical variant
    /// permanently — it is the compatibility seam between old persisted
    /// data and current display/logic, and must never be pruned.
    pub fn normalize(raw: Option<&str>) -> LeadStage {
        let value = raw.unwrap_or("").trim().to_lowercase();
        if value.is_empty() {
            return LeadStage::Novo;
        }

        if let Some(stage) = LeadStage::from_canonical(&value) {
            return stage;
        }

        match value.as_str() {
            // early automation revisions tagged each follow-up day separately
            "email_enviado_3dias" | "email_enviado_7dias" => LeadStage::EmailEnviado,
            // pre-rename canonical keys
            "contato_realizado" => LeadStage::EmailEnviado,
            "em_contato" => LeadStage::Contatado,
            // follow-up in flight counts as being in contact
            "followup" | "follow_up" => LeadStage::Contatado,
            // lead replied
            "respondido" | "respondeu" => LeadStage::Interessado,
            // negotiation was stored directly on leads before the stage split
            "negociacao" => LeadStage::Qualificado,
            _ => LeadStage::Novo,
        }
    }
}

impl std::fmt::Display for LeadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display label for a raw status key; unknown keys echo back unchanged.
pub fn label_for(raw: &str) -> String {
    match LeadStage::from_canonical(raw) {
        Some(stage) => stage.label().to_string(),
        None => raw.to_string(),
    }
}

/// Status vocabulary for interaction log entries.
///
/// Distinct from [`LeadStage`]: an interaction describes what happened in a
/// contact event, not where the lead sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteracaoStatus {
    Contatado,
    Respondeu,
    FollowUp,
    Negociacao,
    Fechado,
    Perdido,
}

impl InteracaoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteracaoStatus::Contatado => "contatado",
            InteracaoStatus::Respondeu => "respondeu",
            InteracaoStatus::FollowUp => "follow_up",
            InteracaoStatus::Negociacao => "negociacao",
            InteracaoStatus::Fechado => "fechado",
            InteracaoStatus::Perdido => "perdido",
        }
    }

    /// Lead stage an interaction with this status pulls the lead into.
    ///
    /// `None` means the interaction is logged without touching the lead
    /// (a follow-up is not a pipeline movement). This is the current
    /// authoritative rule set; earlier revisions shipped conflicting maps
    /// and must not be reintroduced alongside this one.
    pub fn lead_stage_after(&self) -> Option<LeadStage> {
        match self {
            InteracaoStatus::Contatado => Some(LeadStage::Contatado),
            InteracaoStatus::Respondeu => Some(LeadStage::Interessado),
            InteracaoStatus::FollowUp => None,
            InteracaoStatus::Negociacao => Some(LeadStage::Qualificado),
            InteracaoStatus::Fechado => Some(LeadStage::Fechado),
            InteracaoStatus::Perdido => Some(LeadStage::Perdido),
        }
    }
}

impl std::fmt::Display for InteracaoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact channel for an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Canal {
    Linkedin,
    Email,
    Telefone,
    Reuniao,
    AutomacaoN8n,
}

impl Canal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Canal::Linkedin => "linkedin",
            Canal::Email => "email",
            Canal::Telefone => "telefone",
            Canal::Reuniao => "reuniao",
            Canal::AutomacaoN8n => "automacao_n8n",
        }
    }
}
