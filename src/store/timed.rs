use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rocket::tokio::time::timeout;

use crate::error::{Error, Result};
use crate::model::{
    common::election::ElectionId,
    db::{audit::AuditEntry, election::Election, vote::VoteRecord, voter::Voter},
    mongodb::Id,
};

use super::ElectionStore;

/// Bounds every call to the wrapped store, so a stalled backend surfaces as
/// [`Error::StoreTimeout`] instead of holding an election lock forever.
pub struct TimedStore {
    inner: Arc<dyn ElectionStore>,
    limit: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn ElectionStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Store call {operation} timed out after {:?}", self.limit);
                Err(Error::StoreTimeout(operation))
            }
        }
    }
}

#[rocket::async_trait]
impl ElectionStore for TimedStore {
    async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.inner.ping()).await
    }

    async fn next_election_id(&self) -> Result<ElectionId> {
        self.bounded("next_election_id", self.inner.next_election_id())
            .await
    }

    async fn insert_election(&self, election: &Election) -> Result<()> {
        self.bounded("insert_election", self.inner.insert_election(election))
            .await
    }

    async fn load_election(&self, id: ElectionId) -> Result<Option<Election>> {
        self.bounded("load_election", self.inner.load_election(id))
            .await
    }

    async fn save_election(&self, election: &mut Election) -> Result<()> {
        self.bounded("save_election", self.inner.save_election(election))
            .await
    }

    async fn list_elections(&self) -> Result<Vec<Election>> {
        self.bounded("list_elections", self.inner.list_elections())
            .await
    }

    async fn list_expirable(&self, now: DateTime<Utc>) -> Result<Vec<Election>> {
        self.bounded("list_expirable", self.inner.list_expirable(now))
            .await
    }

    async fn delete_election(&self, id: ElectionId) -> Result<bool> {
        self.bounded("delete_election", self.inner.delete_election(id))
            .await
    }

    async fn insert_voter(&self, voter: &Voter) -> Result<()> {
        self.bounded("insert_voter", self.inner.insert_voter(voter))
            .await
    }

    async fn load_voter(&self, id: Id) -> Result<Option<Voter>> {
        self.bounded("load_voter", self.inner.load_voter(id)).await
    }

    async fn list_voters(&self) -> Result<Vec<Voter>> {
        self.bounded("list_voters", self.inner.list_voters()).await
    }

    async fn save_voter(&self, voter: &Voter) -> Result<()> {
        self.bounded("save_voter", self.inner.save_voter(voter)).await
    }

    async fn insert_vote(&self, vote: &VoteRecord) -> Result<()> {
        self.bounded("insert_vote", self.inner.insert_vote(vote)).await
    }

    async fn votes_for_election(&self, election: ElectionId) -> Result<Vec<VoteRecord>> {
        self.bounded(
            "votes_for_election",
            self.inner.votes_for_election(election),
        )
        .await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.bounded("append_audit", self.inner.append_audit(entry))
            .await
    }

    async fn audit_log(&self, election: Option<ElectionId>) -> Result<Vec<AuditEntry>> {
        self.bounded("audit_log", self.inner.audit_log(election))
            .await
    }
}
