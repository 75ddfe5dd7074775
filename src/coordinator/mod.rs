//! The coordinator owns every state change: elections move through their
//! lifecycle, votes are committed off-chain and relayed to the ledger, and
//! the two records are reconciled, all from here.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::ledger::RetryingLedgerClient;
use crate::model::{
    api::election::ElectionSpec,
    common::election::{ElectionId, ElectionStatus},
    db::{
        audit::{AuditAction, AuditEntry},
        election::Election,
        vote::VoteRecord,
    },
    mongodb::Id,
};
use crate::store::ElectionStore;

mod lifecycle;
mod locks;
mod reconcile;
mod registry;
mod results;
mod vote;

pub use locks::ElectionLocks;
pub use results::compute_results;

/// Shared handle on the store, the ledger and the per-election locks.
/// Cheap to clone; lives in Rocket's managed state.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn ElectionStore>,
    ledger: Option<RetryingLedgerClient>,
    locks: ElectionLocks,
}

impl Coordinator {
    /// Create a coordinator. Without a ledger client, registry sync is skipped
    /// and every vote is recorded off-chain only.
    pub fn new(store: Arc<dyn ElectionStore>, ledger: Option<RetryingLedgerClient>) -> Self {
        Self {
            store,
            ledger,
            locks: ElectionLocks::default(),
        }
    }

    pub fn store(&self) -> &dyn ElectionStore {
        self.store.as_ref()
    }

    pub fn enforces_ledger(&self) -> bool {
        self.ledger.is_some()
    }

    /// Append to the audit log. Failures are logged, never propagated.
    pub(crate) async fn audit(&self, entry: AuditEntry) {
        if let Err(err) = self.store.append_audit(&entry).await {
            warn!("Failed to write {:?} audit entry: {err}", entry.action);
        }
    }

    async fn load_election(&self, id: ElectionId) -> Result<Election> {
        self.store
            .load_election(id)
            .await?
            .ok_or(Error::ElectionNotFound(id))
    }

    /// Validate and store a new draft election, activating it straight away if asked.
    pub async fn create_election(&self, spec: ElectionSpec, actor: Id) -> Result<Election> {
        spec.validate(Utc::now())?;
        let activate = spec.activate;

        let id = self.store.next_election_id().await?;
        let election = spec.into_election(id);
        self.store.insert_election(&election).await?;
        info!(
            "Created election {id} '{}' with {} candidates",
            election.metadata.title,
            election.candidates.len()
        );
        self.audit(
            AuditEntry::new(
                AuditAction::ElectionCreated,
                format!("Created '{}'", election.metadata.title),
            )
            .election(id)
            .actor(actor),
        )
        .await;

        if activate {
            self.activate_election(id, actor).await
        } else {
            Ok(election)
        }
    }

    /// List all elections, completing any whose end time has passed first.
    pub async fn list_elections(&self) -> Result<Vec<Election>> {
        self.sweep_expired(Utc::now()).await?;
        self.store.list_elections().await
    }

    /// Get one election, completing it first if its end time has passed.
    pub async fn get_election(&self, id: ElectionId) -> Result<Election> {
        let _guard = self.locks.acquire(id).await;
        let mut election = self.load_election(id).await?;
        self.expire_if_due(&mut election, Utc::now()).await?;
        Ok(election)
    }

    /// Delete an election outright, bypassing the state machine.
    ///
    /// Refused while the election is active and has divergent votes that no
    /// reconciliation pass has looked at yet. Vote records and audit entries
    /// are kept.
    pub async fn delete_election(&self, id: ElectionId, actor: Id) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let election = self.load_election(id).await?;

        if election.status() == ElectionStatus::Active {
            let unreconciled = self
                .store
                .votes_for_election(id)
                .await?
                .iter()
                .any(|v| v.ledger.is_divergent() && !election.ledger.covers(v.cast_at));
            if unreconciled {
                return Err(Error::UnreconciledVotes(id));
            }
        }

        if !self.store.delete_election(id).await? {
            return Err(Error::ElectionNotFound(id));
        }
        self.locks.forget(id).await;
        info!("Deleted election {id}");
        self.audit(
            AuditEntry::new(
                AuditAction::ElectionDeleted,
                format!(
                    "Deleted '{}' while {}",
                    election.metadata.title,
                    election.status()
                ),
            )
            .election(id)
            .actor(actor),
        )
        .await;
        Ok(())
    }

    /// The vote records of an election.
    pub async fn list_votes(&self, id: ElectionId) -> Result<Vec<VoteRecord>> {
        self.load_election(id).await?;
        self.store.votes_for_election(id).await
    }

    pub async fn audit_log(&self, election: Option<ElectionId>) -> Result<Vec<AuditEntry>> {
        self.store.audit_log(election).await
    }
}
