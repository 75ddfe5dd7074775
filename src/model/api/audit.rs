use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::election::ElectionId,
    db::audit::{AuditAction, AuditEntry, AuditOutcome},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryDescription {
    pub id: ApiId,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor: Option<String>,
    pub election_id: Option<ElectionId>,
    pub details: String,
    pub outcome: AuditOutcome,
    pub tx_ref: Option<String>,
}

impl From<AuditEntry> for AuditEntryDescription {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id.into(),
            timestamp: entry.timestamp,
            action: entry.action,
            actor: entry.actor,
            election_id: entry.election_id,
            details: entry.details,
            outcome: entry.outcome,
            tx_ref: entry.tx_ref,
        }
    }
}
