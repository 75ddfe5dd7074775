use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, ElectionId},
    mongodb::Id,
};

/// An immutable record of one accepted vote.
///
/// Exactly one exists per voter per election; it is the audit trail for the
/// vote and records what happened when the vote was relayed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    #[serde(rename = "_id")]
    pub id: Id,
    pub election_id: ElectionId,
    pub voter_id: Id,
    pub candidate_id: CandidateId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
    pub ledger: LedgerStatus,
}

/// Outcome of relaying a vote to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LedgerStatus {
    /// The ledger finalized the vote.
    Finalized { tx_ref: String },
    /// The ledger accepted the vote but had not finalized it when we stopped waiting.
    Accepted { tx_ref: String },
    /// The ledger never applied the vote as far as we know; queued for reconciliation.
    Divergent { reason: String },
    /// The vote was never meant for the ledger: the voter has no on-chain
    /// registration, or ledger enforcement is disabled.
    OffChainOnly,
}

impl LedgerStatus {
    /// Does this record need out-of-band reconciliation?
    pub fn is_divergent(&self) -> bool {
        matches!(self, LedgerStatus::Divergent { .. })
    }

    /// The on-chain transaction reference, if there is one.
    pub fn tx_ref(&self) -> Option<&str> {
        match self {
            LedgerStatus::Finalized { tx_ref } | LedgerStatus::Accepted { tx_ref } => Some(tx_ref),
            LedgerStatus::Divergent { .. } | LedgerStatus::OffChainOnly => None,
        }
    }
}

impl VoteRecord {
    pub fn new(
        election_id: ElectionId,
        voter_id: Id,
        candidate_id: CandidateId,
        ledger: LedgerStatus,
    ) -> Self {
        Self {
            id: Id::new(),
            election_id,
            voter_id,
            candidate_id,
            cast_at: Utc::now(),
            ledger,
        }
    }
}
