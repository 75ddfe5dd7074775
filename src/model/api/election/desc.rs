use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionStatus},
    db::election::{Candidate, Election},
};

/// An API-friendly election description, containing no weird formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionDescription {
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub candidates: Vec<CandidateDescription>,
    pub total_votes: u64,
    /// Number of voters who have voted. Voter identities are not exposed.
    pub voter_count: usize,
    pub ledger_divergent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDescription {
    pub id: CandidateId,
    pub name: String,
    pub votes: u64,
}

impl From<&Candidate> for CandidateDescription {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name.clone(),
            votes: candidate.votes,
        }
    }
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id,
            candidates: election.candidates.iter().map(Into::into).collect(),
            total_votes: election.total_votes,
            voter_count: election.voters.len(),
            ledger_divergent: election.ledger.divergent,
            title: election.metadata.title,
            description: election.metadata.description,
            status: election.metadata.status,
            start_time: election.metadata.start_time,
            end_time: election.metadata.end_time,
        }
    }
}
