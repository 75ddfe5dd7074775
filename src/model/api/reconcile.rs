use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::election::{CandidateId, ElectionId},
};

/// What a reconciliation pass found when comparing the off-chain record with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub election_id: ElectionId,
    pub checked_at: DateTime<Utc>,
    /// Number of candidates the ledger reports for this election.
    pub ledger_candidate_count: Option<u64>,
    pub candidates: Vec<CandidateReconciliation>,
    /// Vote records whose ledger submission failed.
    pub divergent_votes: Vec<ApiId>,
    /// Voters counted off-chain for whom no vote record exists, i.e. the
    /// vote was interrupted after the off-chain commit.
    pub unrecorded_voters: Vec<ApiId>,
    /// True iff nothing above needs attention.
    pub in_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateReconciliation {
    pub id: CandidateId,
    pub name: String,
    /// Authoritative off-chain count.
    pub votes: u64,
    /// Votes that were expected to reach the ledger (excludes off-chain-only votes).
    pub expected_ledger_votes: u64,
    /// Count read from the ledger, if it could be read.
    pub ledger_votes: Option<u64>,
    pub diverges: bool,
}
