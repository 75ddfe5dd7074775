//! The off-chain election store.
//!
//! The store is the authoritative record of elections, voters, vote records
//! and the audit log. Two backends implement [`ElectionStore`]: MongoDB for
//! deployments, and an in-memory map for development and tests. Whichever is
//! configured is wrapped in a [`TimedStore`] that bounds every call.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    common::election::ElectionId,
    db::{audit::AuditEntry, election::Election, vote::VoteRecord, voter::Voter},
    mongodb::Id,
};

mod memory;
mod mongo;
mod timed;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use timed::TimedStore;

#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    /// Check the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Allocate a fresh, never reused election ID.
    async fn next_election_id(&self) -> Result<ElectionId>;

    async fn insert_election(&self, election: &Election) -> Result<()>;

    async fn load_election(&self, id: ElectionId) -> Result<Option<Election>>;

    /// Persist `election` iff the stored copy is still at `election.version`.
    ///
    /// On success the version is bumped, both in the store and in `election`.
    /// A stale version yields `Error::ConcurrentModification` and leaves
    /// `election` untouched.
    async fn save_election(&self, election: &mut Election) -> Result<()>;

    /// All elections, by ascending ID.
    async fn list_elections(&self) -> Result<Vec<Election>>;

    /// Elections whose end time has passed but which are not yet completed.
    async fn list_expirable(&self, now: DateTime<Utc>) -> Result<Vec<Election>>;

    /// Returns true iff an election was deleted.
    async fn delete_election(&self, id: ElectionId) -> Result<bool>;

    /// Insert a new voter. Wallet addresses must be unique across voters.
    async fn insert_voter(&self, voter: &Voter) -> Result<()>;

    async fn load_voter(&self, id: Id) -> Result<Option<Voter>>;

    /// All voters, oldest first.
    async fn list_voters(&self) -> Result<Vec<Voter>>;

    /// Overwrite an existing voter.
    async fn save_voter(&self, voter: &Voter) -> Result<()>;

    /// Insert a vote record. At most one exists per voter per election.
    async fn insert_vote(&self, vote: &VoteRecord) -> Result<()>;

    async fn votes_for_election(&self, election: ElectionId) -> Result<Vec<VoteRecord>>;

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Audit entries in chronological order, optionally for a single election.
    async fn audit_log(&self, election: Option<ElectionId>) -> Result<Vec<AuditEntry>>;
}
