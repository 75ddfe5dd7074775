use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::election::ElectionId, mongodb::Id};

/// What an audit entry describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ElectionCreated,
    ElectionActivated,
    ElectionCompleted,
    ElectionDeleted,
    VoterRegistered,
    WalletBound,
    VoteCast,
    LedgerDivergence,
    Reconciled,
}

/// Whether the audited action succeeded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor: Option<String>,
    pub election_id: Option<ElectionId>,
    pub details: String,
    pub outcome: AuditOutcome,
    pub tx_ref: Option<String>,
}

impl AuditEntry {
    /// A successful action with no actor, election or transaction attached.
    pub fn new(action: AuditAction, details: impl Into<String>) -> Self {
        Self {
            id: Id::new(),
            timestamp: Utc::now(),
            action,
            actor: None,
            election_id: None,
            details: details.into(),
            outcome: AuditOutcome::Success,
            tx_ref: None,
        }
    }

    pub fn election(mut self, election_id: ElectionId) -> Self {
        self.election_id = Some(election_id);
        self
    }

    pub fn actor(mut self, actor: impl ToString) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn tx_ref(mut self, tx_ref: Option<&str>) -> Self {
        self.tx_ref = tx_ref.map(str::to_string);
        self
    }

    pub fn failed(mut self) -> Self {
        self.outcome = AuditOutcome::Failure;
        self
    }
}
