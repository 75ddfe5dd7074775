use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rocket::tokio::{
    sync::{Mutex, MutexGuard},
    time::sleep,
};

use crate::error::{Error, Result};
use crate::model::{
    common::election::{ElectionId, ElectionStatus},
    db::{audit::AuditEntry, election::Election, vote::VoteRecord, voter::Voter},
    mongodb::Id,
};

use super::ElectionStore;

/// A store that lives in process memory, with the same guarantees as the
/// MongoDB store: version-checked saves, unique wallets and one vote record
/// per voter per election.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    last_election_id: ElectionId,
    elections: BTreeMap<ElectionId, Election>,
    voters: Vec<Voter>,
    votes: Vec<VoteRecord>,
    audit: Vec<AuditEntry>,
    latency: Duration,
}

impl MemoryState {
    fn wallet_taken(&self, voter: &Voter) -> bool {
        match &voter.wallet_address {
            Some(wallet) => self
                .voters
                .iter()
                .any(|v| v.id != voter.id && v.wallet_address.as_ref() == Some(wallet)),
            None => false,
        }
    }
}

fn wallet_in_use(voter: &Voter) -> Error {
    Error::WalletAlreadyBound(format!(
        "{} belongs to another voter",
        voter.wallet_address.as_deref().unwrap_or_default()
    ))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every subsequent call by `latency`, to simulate a stalled backend.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    async fn lock(&self) -> MutexGuard<'_, MemoryState> {
        let state = self.state.lock().await;
        if !state.latency.is_zero() {
            sleep(state.latency).await;
        }
        state
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn next_election_id(&self) -> Result<ElectionId> {
        let mut state = self.lock().await;
        state.last_election_id = state
            .last_election_id
            .checked_add(1)
            .ok_or_else(|| Error::Internal("Election ID counter overflowed".to_string()))?;
        Ok(state.last_election_id)
    }

    async fn insert_election(&self, election: &Election) -> Result<()> {
        let mut state = self.lock().await;
        if state.elections.contains_key(&election.id) {
            return Err(Error::Internal(format!(
                "Election {} already exists",
                election.id
            )));
        }
        state.elections.insert(election.id, election.clone());
        Ok(())
    }

    async fn load_election(&self, id: ElectionId) -> Result<Option<Election>> {
        Ok(self.lock().await.elections.get(&id).cloned())
    }

    async fn save_election(&self, election: &mut Election) -> Result<()> {
        let mut state = self.lock().await;
        let stored = state
            .elections
            .get_mut(&election.id)
            .ok_or(Error::ElectionNotFound(election.id))?;
        if stored.version != election.version {
            return Err(Error::ConcurrentModification(election.id));
        }
        election.version += 1;
        *stored = election.clone();
        Ok(())
    }

    async fn list_elections(&self) -> Result<Vec<Election>> {
        Ok(self.lock().await.elections.values().cloned().collect())
    }

    async fn list_expirable(&self, now: DateTime<Utc>) -> Result<Vec<Election>> {
        Ok(self
            .lock()
            .await
            .elections
            .values()
            .filter(|e| e.status() != ElectionStatus::Completed && e.metadata.has_ended_at(now))
            .cloned()
            .collect())
    }

    async fn delete_election(&self, id: ElectionId) -> Result<bool> {
        Ok(self.lock().await.elections.remove(&id).is_some())
    }

    async fn insert_voter(&self, voter: &Voter) -> Result<()> {
        let mut state = self.lock().await;
        if state.wallet_taken(voter) {
            return Err(wallet_in_use(voter));
        }
        state.voters.push(voter.clone());
        Ok(())
    }

    async fn load_voter(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self
            .lock()
            .await
            .voters
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn list_voters(&self) -> Result<Vec<Voter>> {
        Ok(self.lock().await.voters.clone())
    }

    async fn save_voter(&self, voter: &Voter) -> Result<()> {
        let mut state = self.lock().await;
        if state.wallet_taken(voter) {
            return Err(wallet_in_use(voter));
        }
        let stored = state
            .voters
            .iter_mut()
            .find(|v| v.id == voter.id)
            .ok_or(Error::VoterNotFound(voter.id))?;
        *stored = voter.clone();
        Ok(())
    }

    async fn insert_vote(&self, vote: &VoteRecord) -> Result<()> {
        let mut state = self.lock().await;
        let duplicate = state
            .votes
            .iter()
            .any(|v| v.election_id == vote.election_id && v.voter_id == vote.voter_id);
        if duplicate {
            return Err(Error::AlreadyVoted {
                election: vote.election_id,
                voter: vote.voter_id,
            });
        }
        state.votes.push(vote.clone());
        Ok(())
    }

    async fn votes_for_election(&self, election: ElectionId) -> Result<Vec<VoteRecord>> {
        Ok(self
            .lock()
            .await
            .votes
            .iter()
            .filter(|v| v.election_id == election)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.lock().await.audit.push(entry.clone());
        Ok(())
    }

    async fn audit_log(&self, election: Option<ElectionId>) -> Result<Vec<AuditEntry>> {
        Ok(self
            .lock()
            .await
            .audit
            .iter()
            .filter(|e| election.is_none() || e.election_id == election)
            .cloned()
            .collect())
    }
}
