use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    common::election::{ElectionId, ElectionStatus},
    db::{
        audit::{AuditAction, AuditEntry},
        election::Election,
    },
    mongodb::Id,
};

use super::Coordinator;

impl Coordinator {
    /// Complete `election` if its end time has passed, persisting the change.
    /// Returns true iff the election was completed by this call.
    ///
    /// Must be called while holding the election's lock.
    pub(super) async fn expire_if_due(
        &self,
        election: &mut Election,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !election.expire_if_due(now) {
            return Ok(false);
        }
        self.store.save_election(election).await?;
        info!(
            "Election {} passed its end time and is now completed",
            election.id
        );
        self.audit(
            AuditEntry::new(AuditAction::ElectionCompleted, "End time passed")
                .election(election.id),
        )
        .await;
        Ok(true)
    }

    /// Complete every election whose end time has passed.
    /// Returns the number of elections completed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut completed = 0;
        for candidate in self.store.list_expirable(now).await? {
            let _guard = self.locks.acquire(candidate.id).await;
            // Reload under the lock; the listed copy may already be stale.
            let Some(mut election) = self.store.load_election(candidate.id).await? else {
                continue;
            };
            match self.expire_if_due(&mut election, now).await {
                Ok(true) => completed += 1,
                Ok(false) => {}
                Err(Error::ConcurrentModification(id)) => {
                    warn!("Election {id} changed during the expiry sweep, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        if completed > 0 {
            debug!("Expiry sweep completed {completed} elections");
        }
        Ok(completed)
    }

    /// Move a draft election to active.
    ///
    /// With ledger enforcement, every candidate and every known voter is
    /// pushed to the ledger and the on-chain start confirmed first. A
    /// candidate registration or start that fails leaves the election in
    /// draft; voter registration failures only flag the voter.
    pub async fn activate_election(&self, id: ElectionId, actor: Id) -> Result<Election> {
        let _guard = self.locks.acquire(id).await;
        let mut election = self.load_election(id).await?;
        if self.expire_if_due(&mut election, Utc::now()).await? {
            return Err(Error::ElectionEnded(id));
        }
        if election.status() != ElectionStatus::Draft {
            return Err(Error::InvalidTransition {
                election: id,
                from: election.status(),
                to: ElectionStatus::Active,
            });
        }
        if election.candidates.is_empty() {
            return Err(Error::validation(
                "An election with no candidates cannot be activated",
            ));
        }

        if let Some(ledger) = &self.ledger {
            if let Err(err) = self.push_to_ledger(ledger, &mut election).await {
                error!("Activation of election {id} failed: {err}");
                // Keep whichever candidate registrations did go through.
                if let Err(save_err) = self.store.save_election(&mut election).await {
                    warn!("Could not record partial ledger sync of election {id}: {save_err}");
                }
                self.audit(
                    AuditEntry::new(
                        AuditAction::ElectionActivated,
                        format!("Activation failed: {err}"),
                    )
                    .election(id)
                    .actor(actor)
                    .failed(),
                )
                .await;
                return Err(err);
            }
        }

        election.transition_to(ElectionStatus::Active)?;
        self.store.save_election(&mut election).await?;
        info!("Election {id} is now active");
        self.audit(
            AuditEntry::new(AuditAction::ElectionActivated, "Voting opened")
                .election(id)
                .actor(actor)
                .tx_ref(election.ledger.start_tx.as_deref()),
        )
        .await;
        Ok(election)
    }

    /// Close an election ahead of its end time. Draft elections may be
    /// closed directly; completed ones cannot be closed again.
    pub async fn close_election(&self, id: ElectionId, actor: Id) -> Result<Election> {
        let _guard = self.locks.acquire(id).await;
        let mut election = self.load_election(id).await?;
        if self.expire_if_due(&mut election, Utc::now()).await? {
            return Ok(election);
        }

        let from = election.status();
        election.transition_to(ElectionStatus::Completed)?;
        self.store.save_election(&mut election).await?;
        info!("Election {id} closed from {from}");
        self.audit(
            AuditEntry::new(AuditAction::ElectionCompleted, format!("Closed from {from}"))
                .election(id)
                .actor(actor),
        )
        .await;
        Ok(election)
    }
}
