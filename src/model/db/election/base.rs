use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionStatus},
    mongodb::Id,
};

use super::metadata::ElectionMetadata;

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: ElectionId,
    /// Optimistic concurrency version, bumped by every successful save.
    pub version: u64,
    /// Top-level metadata.
    #[serde(flatten)]
    pub metadata: ElectionMetadata,
    /// Candidates, in ballot order.
    pub candidates: Vec<Candidate>,
    /// Always equal to the sum of the candidates' off-chain vote counts.
    pub total_votes: u64,
    /// Voters who have already voted in this election.
    pub voters: HashSet<Id>,
    /// On-chain bookkeeping.
    #[serde(default)]
    pub ledger: ElectionLedgerState,
}

/// A single candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Position in the election, also used as the on-chain candidate ID.
    pub id: CandidateId,
    /// Display name.
    pub name: String,
    /// Authoritative off-chain vote count.
    pub votes: u64,
    /// Last on-chain vote count read during reconciliation.
    /// Tracked separately so divergence can be detected; never merged into `votes`.
    #[serde(default)]
    pub ledger_votes: Option<u64>,
    /// Has the candidate been registered on the ledger?
    #[serde(default)]
    pub ledger_registered: bool,
}

/// What we know about the election's on-chain counterpart.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionLedgerState {
    /// Has the ledger confirmed the election start? Votes are only relayed if so.
    #[serde(default)]
    pub started: bool,
    /// Transaction reference of the on-chain start, absent if the start was a replay.
    pub start_tx: Option<String>,
    /// Set when reconciliation last found the on-chain tallies disagreeing with ours.
    #[serde(default)]
    pub divergent: bool,
    /// When reconciliation last ran. Divergent votes cast after this are unreconciled.
    #[serde(default)]
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl ElectionLedgerState {
    /// Has `vote_cast_at` been looked at by a reconciliation pass?
    pub fn covers(&self, vote_cast_at: DateTime<Utc>) -> bool {
        self.reconciled_at.map_or(false, |at| vote_cast_at <= at)
    }
}

impl Election {
    /// Create a new draft election. Candidates are numbered from 1 in the given order.
    pub fn new(
        id: ElectionId,
        title: String,
        description: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        candidate_names: Vec<String>,
    ) -> Self {
        let candidates = candidate_names
            .into_iter()
            .zip(1..)
            .map(|(name, id)| Candidate {
                id,
                name,
                votes: 0,
                ledger_votes: None,
                ledger_registered: false,
            })
            .collect();

        Self {
            id,
            version: 0,
            metadata: ElectionMetadata {
                title,
                description,
                status: ElectionStatus::Draft,
                start_time,
                end_time,
            },
            candidates,
            total_votes: 0,
            voters: HashSet::new(),
            ledger: ElectionLedgerState::default(),
        }
    }

    /// Get the current status.
    pub fn status(&self) -> ElectionStatus {
        self.metadata.status
    }

    /// Get a candidate by ID.
    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Has the given voter already voted?
    pub fn has_voted(&self, voter: Id) -> bool {
        self.voters.contains(&voter)
    }

    /// Move to `next`, rejecting anything that is not a forward lifecycle step.
    pub fn transition_to(&mut self, next: ElectionStatus) -> Result<()> {
        let current = self.metadata.status;
        if !current.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                election: self.id,
                from: current,
                to: next,
            });
        }
        self.metadata.status = next;
        Ok(())
    }

    /// Complete the election if its end time has passed.
    /// Returns true iff this call changed the status.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.metadata.status != ElectionStatus::Completed && self.metadata.has_ended_at(now) {
            self.metadata.status = ElectionStatus::Completed;
            true
        } else {
            false
        }
    }

    /// Apply one vote to the off-chain tally.
    ///
    /// The voter set, candidate count and total are updated together so
    /// `total_votes` stays equal to the sum of candidate votes.
    pub fn record_vote(&mut self, candidate_id: CandidateId, voter: Id) -> Result<()> {
        if self.has_voted(voter) {
            return Err(Error::AlreadyVoted {
                election: self.id,
                voter,
            });
        }
        let election = self.id;
        let candidate = self
            .candidates
            .iter_mut()
            .find(|c| c.id == candidate_id)
            .ok_or(Error::CandidateNotFound {
                election,
                candidate: candidate_id,
            })?;
        candidate.votes += 1;
        self.total_votes += 1;
        self.voters.insert(voter);
        Ok(())
    }

    /// Does `total_votes` match the candidates' counts?
    pub fn tally_is_consistent(&self) -> bool {
        self.total_votes == self.candidates.iter().map(|c| c.votes).sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    impl Election {
        /// A draft election with two candidates, running for the next day.
        pub fn draft_example(id: ElectionId) -> Self {
            let now = Utc::now();
            Self::new(
                id,
                "Student council".to_string(),
                "Annual student council election".to_string(),
                now - Duration::hours(1),
                now + Duration::days(1),
                vec!["Alice".to_string(), "Bob".to_string()],
            )
        }
    }

    #[test]
    fn candidates_numbered_from_one() {
        let election = Election::draft_example(1);
        let ids: Vec<_> = election.candidates.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(election.status(), ElectionStatus::Draft);
    }

    #[test]
    fn record_vote_keeps_tally_consistent() {
        let mut election = Election::draft_example(1);
        election.record_vote(1, Id::new()).unwrap();
        election.record_vote(2, Id::new()).unwrap();
        election.record_vote(1, Id::new()).unwrap();
        assert_eq!(election.total_votes, 3);
        assert_eq!(election.candidate(1).unwrap().votes, 2);
        assert!(election.tally_is_consistent());
    }

    #[test]
    fn record_vote_rejects_repeat_voter() {
        let mut election = Election::draft_example(1);
        let voter = Id::new();
        election.record_vote(1, voter).unwrap();
        let err = election.record_vote(2, voter).unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted { .. }));
        assert_eq!(election.total_votes, 1);
    }

    #[test]
    fn record_vote_rejects_unknown_candidate_without_side_effects() {
        let mut election = Election::draft_example(1);
        let voter = Id::new();
        let err = election.record_vote(9, voter).unwrap_err();
        assert!(matches!(err, Error::CandidateNotFound { candidate: 9, .. }));
        assert!(!election.has_voted(voter));
        assert_eq!(election.total_votes, 0);
    }

    #[test]
    fn expiry_only_fires_once() {
        let mut election = Election::draft_example(1);
        election.transition_to(ElectionStatus::Active).unwrap();
        let later = election.metadata.end_time + Duration::seconds(1);
        assert!(!election.expire_if_due(election.metadata.end_time));
        assert!(election.expire_if_due(later));
        assert!(!election.expire_if_due(later));
        assert_eq!(election.status(), ElectionStatus::Completed);
    }

    #[test]
    fn completed_never_reopens() {
        let mut election = Election::draft_example(1);
        election.transition_to(ElectionStatus::Completed).unwrap();
        let err = election.transition_to(ElectionStatus::Active).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: ElectionStatus::Completed,
                to: ElectionStatus::Active,
                ..
            }
        ));
    }
}
