use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, ElectionId, ElectionStatus};

/// How the winner was decided.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// Exactly one candidate holds the maximum vote count.
    Winner,
    /// Several candidates share the maximum vote count.
    Tie,
    /// The election has no candidates at all.
    NoCandidates,
}

/// Ranked standings for one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    pub election_id: ElectionId,
    pub title: String,
    pub election_status: ElectionStatus,
    /// Candidates ordered by descending vote count, then ballot order.
    pub candidates: Vec<CandidateResult>,
    pub total_votes: u64,
    /// The winner's name, or all tied names joined with `" & "`.
    pub winner: Option<String>,
    pub winning_votes: u64,
    pub status: ResultStatus,
    /// Did the last reconciliation find the ledger disagreeing with the off-chain tally?
    pub ledger_divergent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub id: CandidateId,
    pub name: String,
    /// Authoritative off-chain count.
    pub votes: u64,
    /// On-chain count as of the last reconciliation, for cross-checking only.
    pub ledger_votes: Option<u64>,
    /// 1-based competition rank: tied candidates share a rank.
    pub rank: usize,
}
