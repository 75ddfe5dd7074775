use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::ledger::{Finality, LedgerOperation};
use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionStatus},
    db::{
        audit::{AuditAction, AuditEntry},
        election::Election,
        vote::{LedgerStatus, VoteRecord},
        voter::Voter,
    },
    mongodb::Id,
};

use super::Coordinator;

/// How many times a vote is re-applied to a freshly loaded election when
/// the save loses an optimistic version race with another process.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

impl Coordinator {
    /// Cast a vote.
    ///
    /// The off-chain commit is the point of record: once it has happened the
    /// vote counts, whatever the ledger does. Ledger failures are recorded on
    /// the vote record for reconciliation and never surface to the caller.
    ///
    /// The work runs on its own task, so a caller that goes away can't leave
    /// a vote half-applied.
    pub async fn cast_vote(
        &self,
        election_id: ElectionId,
        voter_id: Id,
        candidate_id: CandidateId,
    ) -> Result<VoteRecord> {
        let coordinator = self.clone();
        rocket::tokio::spawn(async move {
            coordinator
                .cast_vote_now(election_id, voter_id, candidate_id)
                .await
        })
        .await
        .map_err(|err| Error::Internal(format!("Vote task failed: {err}")))?
    }

    async fn cast_vote_now(
        &self,
        election_id: ElectionId,
        voter_id: Id,
        candidate_id: CandidateId,
    ) -> Result<VoteRecord> {
        let _guard = self.locks.acquire(election_id).await;

        let (election, voter) = self
            .commit_vote(election_id, voter_id, candidate_id, Utc::now())
            .await?;
        debug!("Vote by {voter_id} in election {election_id} committed off-chain");

        let ledger = self.relay_vote(&election, candidate_id, &voter).await;
        let record = VoteRecord::new(election_id, voter_id, candidate_id, ledger);
        if let Err(err) = self.store.insert_vote(&record).await {
            // The off-chain tally already counts this vote; reconciliation
            // reports the missing record.
            error!(
                "Failed to store vote record for voter {voter_id} in election {election_id}: {err}"
            );
        }

        self.audit(
            AuditEntry::new(
                AuditAction::VoteCast,
                format!("Vote for candidate {candidate_id}"),
            )
            .election(election_id)
            .actor(voter_id)
            .tx_ref(record.ledger.tx_ref()),
        )
        .await;
        Ok(record)
    }

    /// Apply the vote to the off-chain tally and persist it.
    async fn commit_vote(
        &self,
        election_id: ElectionId,
        voter_id: Id,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Result<(Election, Voter)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut election = self.load_election(election_id).await?;
            match self
                .apply_vote(&mut election, voter_id, candidate_id, now)
                .await
            {
                Ok(voter) => return Ok((election, voter)),
                Err(Error::ConcurrentModification(_)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!("Election {election_id} changed under a vote commit, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn apply_vote(
        &self,
        election: &mut Election,
        voter_id: Id,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Result<Voter> {
        if self.expire_if_due(election, now).await? {
            return Err(Error::ElectionEnded(election.id));
        }
        match election.status() {
            ElectionStatus::Active => {}
            ElectionStatus::Completed => return Err(Error::ElectionEnded(election.id)),
            ElectionStatus::Draft => return Err(Error::ElectionNotActive(election.id)),
        }

        let voter = self
            .store
            .load_voter(voter_id)
            .await?
            .ok_or(Error::VoterNotFound(voter_id))?;

        election.record_vote(candidate_id, voter_id)?;
        self.store.save_election(election).await?;
        Ok(voter)
    }

    /// Submit the vote to the ledger, if it belongs there.
    async fn relay_vote(
        &self,
        election: &Election,
        candidate_id: CandidateId,
        voter: &Voter,
    ) -> LedgerStatus {
        let (Some(ledger), Some(address)) = (&self.ledger, voter.ledger_address()) else {
            return LedgerStatus::OffChainOnly;
        };
        if !election.ledger.started {
            return LedgerStatus::OffChainOnly;
        }

        let operation = LedgerOperation::CastVote {
            election: election.id,
            candidate: candidate_id,
            voter_address: address.to_string(),
        };
        let reason = match ledger.submit(&operation).await {
            Ok(confirmation) => match (confirmation.tx_ref, confirmation.finality) {
                (Some(tx_ref), Finality::Finalized) => return LedgerStatus::Finalized { tx_ref },
                (Some(tx_ref), Finality::Accepted) => return LedgerStatus::Accepted { tx_ref },
                (None, _) => "ledger confirmed the vote without a transaction".to_string(),
            },
            Err(err) => err.to_string(),
        };

        warn!(
            "Vote by {} in election {} diverged from the ledger: {reason}",
            voter.id, election.id
        );
        self.audit(
            AuditEntry::new(
                AuditAction::LedgerDivergence,
                format!("Vote by {} not relayed: {reason}", voter.id),
            )
            .election(election.id)
            .failed(),
        )
        .await;
        LedgerStatus::Divergent { reason }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::futures::future::join_all;

    use crate::ledger::{Finality, LedgerFault, MemoryLedger, OperationKind};
    use crate::model::api::{election::ElectionSpec, voter::VoterSpec};
    use crate::store::{ElectionStore, MemoryStore};

    use super::*;

    const WALLET: &str = "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1";
    const OTHER_WALLET: &str = "0xffcf8fdee72ac11b5c542428b35eef5769c409f0";

    async fn new_voter(coordinator: &Coordinator, wallet: Option<&str>) -> Voter {
        coordinator
            .register_voter(VoterSpec::example(wallet), Id::new())
            .await
            .unwrap()
    }

    async fn active_election(coordinator: &Coordinator, candidates: &[&str]) -> Election {
        let election = coordinator
            .create_election(ElectionSpec::with_candidates(candidates), Id::new())
            .await
            .unwrap();
        coordinator
            .activate_election(election.id, Id::new())
            .await
            .unwrap()
    }

    #[backend_test]
    async fn two_voters_two_candidates(coordinator: Coordinator) {
        let alice_fan = new_voter(&coordinator, None).await;
        let bob_fan = new_voter(&coordinator, None).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;

        coordinator.cast_vote(election.id, alice_fan.id, 1).await.unwrap();
        coordinator.cast_vote(election.id, bob_fan.id, 2).await.unwrap();

        let election = coordinator.get_election(election.id).await.unwrap();
        assert_eq!(election.total_votes, 2);
        assert_eq!(election.candidate(1).unwrap().votes, 1);
        assert_eq!(election.candidate(2).unwrap().votes, 1);
        assert_eq!(election.status(), ElectionStatus::Active);
        assert!(election.tally_is_consistent());
    }

    #[backend_test]
    async fn registered_voters_vote_on_chain(coordinator: Coordinator, ledger: MemoryLedger) {
        let voter = new_voter(&coordinator, Some(WALLET)).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;

        let record = coordinator.cast_vote(election.id, voter.id, 2).await.unwrap();
        assert!(matches!(record.ledger, LedgerStatus::Finalized { .. }));
        assert_eq!(ledger.tally(election.id, 2).await, Some(1));

        let votes = coordinator.list_votes(election.id).await.unwrap();
        assert_eq!(votes, vec![record]);
    }

    #[backend_test]
    async fn accepted_votes_are_not_final(coordinator: Coordinator, ledger: MemoryLedger) {
        let voter = new_voter(&coordinator, Some(WALLET)).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;
        ledger.set_finality(Finality::Accepted).await;

        let record = coordinator.cast_vote(election.id, voter.id, 1).await.unwrap();
        assert!(matches!(record.ledger, LedgerStatus::Accepted { .. }));
        assert!(record.ledger.tx_ref().is_some());
    }

    #[backend_test]
    async fn unregistered_voters_vote_off_chain(coordinator: Coordinator, ledger: MemoryLedger) {
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;
        // Registered after activation, so never pushed to the ledger.
        let late = new_voter(&coordinator, Some(WALLET)).await;
        let walletless = new_voter(&coordinator, None).await;

        for voter in [&late, &walletless] {
            let record = coordinator.cast_vote(election.id, voter.id, 1).await.unwrap();
            assert_eq!(record.ledger, LedgerStatus::OffChainOnly);
        }
        assert_eq!(ledger.calls(OperationKind::CastVote).await, 0);
        let election = coordinator.get_election(election.id).await.unwrap();
        assert_eq!(election.total_votes, 2);
    }

    #[backend_test(offline)]
    async fn offline_votes_are_off_chain_only(coordinator: Coordinator, ledger: MemoryLedger) {
        let voter = new_voter(&coordinator, Some(WALLET)).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;
        let record = coordinator.cast_vote(election.id, voter.id, 1).await.unwrap();
        assert_eq!(record.ledger, LedgerStatus::OffChainOnly);
        assert_eq!(ledger.calls(OperationKind::CastVote).await, 0);
    }

    #[backend_test]
    async fn exhausted_ledger_still_accepts_vote(
        coordinator: Coordinator,
        store: MemoryStore,
        ledger: MemoryLedger,
    ) {
        let voter = new_voter(&coordinator, Some(WALLET)).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;
        ledger
            .fail_next(
                OperationKind::CastVote,
                LedgerFault::Transport("connection reset".to_string()),
                10,
            )
            .await;

        let record = coordinator.cast_vote(election.id, voter.id, 1).await.unwrap();
        assert!(record.ledger.is_divergent());
        assert_eq!(ledger.calls(OperationKind::CastVote).await, 3);

        let stored = store.load_election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.candidate(1).unwrap().votes, 1);
        assert!(stored.has_voted(voter.id));
        let votes = store.votes_for_election(election.id).await.unwrap();
        assert!(votes[0].ledger.is_divergent());

        let audit = coordinator.audit_log(Some(election.id)).await.unwrap();
        assert!(audit
            .iter()
            .any(|e| e.action == AuditAction::LedgerDivergence));
    }

    #[backend_test]
    async fn terminal_ledger_rejection_still_accepts_vote(
        coordinator: Coordinator,
        ledger: MemoryLedger,
    ) {
        let voter = new_voter(&coordinator, Some(WALLET)).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;
        ledger
            .fail_next(
                OperationKind::CastVote,
                LedgerFault::Rpc {
                    code: -32000,
                    message: "voter already voted".to_string(),
                },
                1,
            )
            .await;

        let record = coordinator.cast_vote(election.id, voter.id, 1).await.unwrap();
        assert!(record.ledger.is_divergent());
        assert_eq!(ledger.calls(OperationKind::CastVote).await, 1);
    }

    #[backend_test]
    async fn rejections(coordinator: Coordinator) {
        let voter = new_voter(&coordinator, None).await;

        let err = coordinator.cast_vote(42, voter.id, 1).await.unwrap_err();
        assert!(matches!(err, Error::ElectionNotFound(42)));

        let draft = coordinator
            .create_election(ElectionSpec::current_example(), Id::new())
            .await
            .unwrap();
        let err = coordinator.cast_vote(draft.id, voter.id, 1).await.unwrap_err();
        assert!(matches!(err, Error::ElectionNotActive(_)));

        let election = active_election(&coordinator, &["Alice", "Bob"]).await;
        let err = coordinator.cast_vote(election.id, voter.id, 3).await.unwrap_err();
        assert!(matches!(err, Error::CandidateNotFound { candidate: 3, .. }));

        let err = coordinator.cast_vote(election.id, Id::new(), 1).await.unwrap_err();
        assert!(matches!(err, Error::VoterNotFound(_)));

        coordinator.cast_vote(election.id, voter.id, 1).await.unwrap();
        let err = coordinator.cast_vote(election.id, voter.id, 2).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted { .. }));

        coordinator.close_election(election.id, Id::new()).await.unwrap();
        let other = new_voter(&coordinator, None).await;
        let err = coordinator.cast_vote(election.id, other.id, 1).await.unwrap_err();
        assert!(matches!(err, Error::ElectionEnded(_)));

        let election = coordinator.get_election(election.id).await.unwrap();
        assert_eq!(election.total_votes, 1);
    }

    #[backend_test]
    async fn expired_election_rejects_votes_without_a_sweep(
        coordinator: Coordinator,
        store: MemoryStore,
    ) {
        let voter = new_voter(&coordinator, None).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;

        let mut stored = store.load_election(election.id).await.unwrap().unwrap();
        stored.metadata.end_time = Utc::now() - Duration::seconds(1);
        store.save_election(&mut stored).await.unwrap();

        let err = coordinator.cast_vote(election.id, voter.id, 1).await.unwrap_err();
        assert!(matches!(err, Error::ElectionEnded(_)));

        let stored = store.load_election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), ElectionStatus::Completed);
        assert_eq!(stored.total_votes, 0);
    }

    #[backend_test]
    async fn concurrent_duplicate_votes_count_once(coordinator: Coordinator, store: MemoryStore) {
        let voter = new_voter(&coordinator, None).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;

        let (election_id, voter_id) = (election.id, voter.id);
        let attempts = (0..16).map(|i| {
            let coordinator = coordinator.clone();
            let candidate = 1 + i % 2;
            async move { coordinator.cast_vote(election_id, voter_id, candidate).await }
        });
        let results = join_all(attempts).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::AlreadyVoted { .. })));

        let stored = store.load_election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.total_votes, 1);
        assert_eq!(store.votes_for_election(election.id).await.unwrap().len(), 1);
    }

    #[backend_test]
    async fn concurrent_votes_lose_no_updates(coordinator: Coordinator, ledger: MemoryLedger) {
        let mut voters = Vec::new();
        for wallet in [Some(WALLET), Some(OTHER_WALLET)] {
            voters.push(new_voter(&coordinator, wallet).await);
        }
        for _ in 0..30 {
            voters.push(new_voter(&coordinator, None).await);
        }
        let election = active_election(&coordinator, &["Alice", "Bob", "Carol"]).await;

        let election_id = election.id;
        let casts = voters.iter().enumerate().map(|(i, voter)| {
            let coordinator = coordinator.clone();
            let voter_id = voter.id;
            async move {
                coordinator
                    .cast_vote(election_id, voter_id, 1 + (i as u32) % 3)
                    .await
            }
        });
        for result in join_all(casts).await {
            result.unwrap();
        }

        let election = coordinator.get_election(election.id).await.unwrap();
        assert_eq!(election.total_votes, voters.len() as u64);
        assert!(election.tally_is_consistent());
        assert_eq!(election.voters.len(), voters.len());
        assert_eq!(ledger.calls(OperationKind::CastVote).await, 2);
    }

    #[backend_test]
    async fn stalled_store_releases_the_election(coordinator: Coordinator, store: MemoryStore) {
        let voter = new_voter(&coordinator, None).await;
        let election = active_election(&coordinator, &["Alice", "Bob"]).await;

        store.set_latency(std::time::Duration::from_secs(3)).await;
        let err = coordinator
            .cast_vote(election.id, voter.id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreTimeout(_)));
        assert_eq!(err.code(), crate::error::ErrorCode::StoreUnavailable);

        // The next vote isn't stuck behind the stalled one.
        store.set_latency(std::time::Duration::ZERO).await;
        coordinator.cast_vote(election.id, voter.id, 1).await.unwrap();
        let election = coordinator.get_election(election.id).await.unwrap();
        assert_eq!(election.total_votes, 1);
    }
}
