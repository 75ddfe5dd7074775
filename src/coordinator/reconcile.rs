use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::error::{Error, Result};
use crate::ledger::{LedgerError, LedgerOperation, LedgerOutput, RetryingLedgerClient};
use crate::model::{
    api::{
        id::ApiId,
        reconcile::{CandidateReconciliation, ReconciliationReport},
    },
    common::election::{CandidateId, ElectionId},
    db::{
        audit::{AuditAction, AuditEntry},
        election::Election,
    },
    mongodb::Id,
};

use super::Coordinator;

/// What the ledger holds for one election.
struct LedgerSnapshot {
    candidate_count: u64,
    tallies: HashMap<CandidateId, u64>,
}

impl Coordinator {
    /// Compare an election's off-chain record with the ledger.
    ///
    /// On-chain tallies are stored next to, never over, the off-chain counts,
    /// and nothing is replayed: the report says what needs attention.
    pub async fn reconcile(&self, id: ElectionId, actor: Id) -> Result<ReconciliationReport> {
        let _guard = self.locks.acquire(id).await;
        let mut election = self.load_election(id).await?;
        let votes = self.store.votes_for_election(id).await?;

        let snapshot = match &self.ledger {
            Some(ledger) if election.ledger.started => {
                Some(Self::read_ledger(ledger, &election).await?)
            }
            _ => None,
        };

        let mut expected: HashMap<CandidateId, u64> = HashMap::new();
        for vote in votes.iter().filter(|v| v.ledger.tx_ref().is_some()) {
            *expected.entry(vote.candidate_id).or_default() += 1;
        }

        let candidates: Vec<CandidateReconciliation> = election
            .candidates
            .iter()
            .map(|candidate| {
                let expected_ledger_votes = expected.get(&candidate.id).copied().unwrap_or(0);
                let ledger_votes = snapshot
                    .as_ref()
                    .and_then(|s| s.tallies.get(&candidate.id).copied());
                CandidateReconciliation {
                    id: candidate.id,
                    name: candidate.name.clone(),
                    votes: candidate.votes,
                    expected_ledger_votes,
                    ledger_votes,
                    diverges: ledger_votes.map_or(false, |l| l != expected_ledger_votes),
                }
            })
            .collect();

        let divergent_votes: Vec<ApiId> = votes
            .iter()
            .filter(|v| v.ledger.is_divergent())
            .map(|v| v.id.into())
            .collect();
        let recorded: HashSet<Id> = votes.iter().map(|v| v.voter_id).collect();
        let mut unrecorded_voters: Vec<ApiId> = election
            .voters
            .iter()
            .filter(|voter| !recorded.contains(voter))
            .map(|voter| ApiId::from(*voter))
            .collect();
        unrecorded_voters.sort();

        let ledger_candidate_count = snapshot.as_ref().map(|s| s.candidate_count);
        let count_mismatch =
            ledger_candidate_count.map_or(false, |n| n != election.candidates.len() as u64);
        let tallies_diverge = candidates.iter().any(|c| c.diverges);
        let in_sync = !tallies_diverge
            && !count_mismatch
            && divergent_votes.is_empty()
            && unrecorded_voters.is_empty();

        let checked_at = Utc::now();
        if let Some(snapshot) = &snapshot {
            for candidate in election.candidates.iter_mut() {
                candidate.ledger_votes = snapshot.tallies.get(&candidate.id).copied();
            }
            election.ledger.divergent = tallies_diverge || count_mismatch;
        }
        election.ledger.reconciled_at = Some(checked_at);
        self.store.save_election(&mut election).await?;

        let summary = format!(
            "{} divergent votes, {} unrecorded voters, tallies {}",
            divergent_votes.len(),
            unrecorded_voters.len(),
            match (&snapshot, tallies_diverge || count_mismatch) {
                (None, _) => "not read",
                (Some(_), true) => "diverge",
                (Some(_), false) => "agree",
            }
        );
        if in_sync {
            info!("Reconciled election {id}: {summary}");
        } else {
            warn!("Reconciled election {id}: {summary}");
        }
        self.audit(
            AuditEntry::new(AuditAction::Reconciled, summary)
                .election(id)
                .actor(actor),
        )
        .await;

        Ok(ReconciliationReport {
            election_id: id,
            checked_at,
            ledger_candidate_count,
            candidates,
            divergent_votes,
            unrecorded_voters,
            in_sync,
        })
    }

    async fn read_ledger(
        ledger: &RetryingLedgerClient,
        election: &Election,
    ) -> Result<LedgerSnapshot> {
        let read = LedgerOperation::ReadCandidateCount {
            election: election.id,
        };
        let candidate_count = match ledger.submit(&read).await?.output {
            LedgerOutput::CandidateCount(count) => count,
            _ => return Err(unexpected(&read)),
        };

        let mut tallies = HashMap::new();
        for candidate in election.candidates.iter().filter(|c| c.ledger_registered) {
            let read = LedgerOperation::ReadTally {
                election: election.id,
                candidate: candidate.id,
            };
            match ledger.submit(&read).await?.output {
                LedgerOutput::Tally { votes, .. } => {
                    tallies.insert(candidate.id, votes);
                }
                _ => return Err(unexpected(&read)),
            }
        }

        Ok(LedgerSnapshot {
            candidate_count,
            tallies,
        })
    }
}

fn unexpected(operation: &LedgerOperation) -> Error {
    LedgerError::UnexpectedOutput {
        operation: operation.kind(),
    }
    .into()
}
