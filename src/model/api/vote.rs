use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::election::{CandidateId, ElectionId},
    db::vote::{LedgerStatus, VoteRecord},
};

/// A vote the authenticated voter wishes to cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub candidate_id: CandidateId,
}

/// The voter's receipt for an accepted vote.
///
/// Ledger divergence is an internal audit concern, so the voter only learns
/// whether an on-chain transaction exists, never why one doesn't.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub vote_id: ApiId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    pub cast_at: DateTime<Utc>,
    pub tx_ref: Option<String>,
}

impl From<VoteRecord> for VoteReceipt {
    fn from(record: VoteRecord) -> Self {
        Self {
            vote_id: record.id.into(),
            election_id: record.election_id,
            candidate_id: record.candidate_id,
            cast_at: record.cast_at,
            tx_ref: record.ledger.tx_ref().map(str::to_string),
        }
    }
}

/// The full vote record, for administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecordDescription {
    pub id: ApiId,
    pub election_id: ElectionId,
    pub voter_id: ApiId,
    pub candidate_id: CandidateId,
    pub cast_at: DateTime<Utc>,
    pub ledger: LedgerStatus,
}

impl From<VoteRecord> for VoteRecordDescription {
    fn from(record: VoteRecord) -> Self {
        Self {
            id: record.id.into(),
            election_id: record.election_id,
            voter_id: record.voter_id.into(),
            candidate_id: record.candidate_id,
            cast_at: record.cast_at,
            ledger: record.ledger,
        }
    }
}
