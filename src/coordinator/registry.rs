use crate::error::{Error, Result};
use crate::ledger::{LedgerOperation, RetryingLedgerClient};
use crate::model::{
    api::voter::{normalize_wallet, VoterSpec},
    db::{
        audit::{AuditAction, AuditEntry},
        election::Election,
        voter::Voter,
    },
    mongodb::Id,
};

use super::Coordinator;

impl Coordinator {
    /// Create an off-chain voter account.
    ///
    /// The voter is not pushed to the ledger here; that happens when the next
    /// election is activated.
    pub async fn register_voter(&self, spec: VoterSpec, actor: Id) -> Result<Voter> {
        let voter = spec.into_voter()?;
        self.store.insert_voter(&voter).await?;
        info!("Registered voter {}", voter.id);
        self.audit(
            AuditEntry::new(
                AuditAction::VoterRegistered,
                format!("Registered voter {}", voter.id),
            )
            .actor(actor),
        )
        .await;
        Ok(voter)
    }

    /// Bind a wallet to a voter who doesn't have one yet.
    pub async fn bind_wallet(&self, voter_id: Id, address: String, actor: Id) -> Result<Voter> {
        let address = normalize_wallet(&address)?;
        let mut voter = self
            .store
            .load_voter(voter_id)
            .await?
            .ok_or(Error::VoterNotFound(voter_id))?;
        if let Some(existing) = &voter.wallet_address {
            return Err(Error::WalletAlreadyBound(format!(
                "voter {voter_id} already has {existing}"
            )));
        }

        voter.wallet_address = Some(address);
        self.store.save_voter(&voter).await?;
        info!("Bound wallet to voter {voter_id}");
        self.audit(
            AuditEntry::new(
                AuditAction::WalletBound,
                format!("Bound wallet to voter {voter_id}"),
            )
            .actor(actor),
        )
        .await;
        Ok(voter)
    }

    /// Register the election's candidates and all known voters on the ledger,
    /// then start the election there.
    ///
    /// Candidate and start failures abort; candidates registered before the
    /// failure stay marked so a later attempt skips them. Registrations are
    /// idempotent, so replaying any of this is harmless.
    pub(super) async fn push_to_ledger(
        &self,
        ledger: &RetryingLedgerClient,
        election: &mut Election,
    ) -> Result<()> {
        let election_id = election.id;
        for candidate in election
            .candidates
            .iter_mut()
            .filter(|c| !c.ledger_registered)
        {
            let operation = LedgerOperation::RegisterCandidate {
                election: election_id,
                candidate: candidate.id,
                name: candidate.name.clone(),
            };
            ledger.submit(&operation).await?;
            candidate.ledger_registered = true;
        }
        debug!(
            "Registered {} candidates of election {election_id} on the ledger",
            election.candidates.len()
        );

        self.register_known_voters(ledger).await?;

        let confirmation = ledger
            .submit(&LedgerOperation::StartElection {
                election: election_id,
            })
            .await?;
        election.ledger.started = true;
        election.ledger.start_tx = confirmation.tx_ref;
        Ok(())
    }

    /// Push every voter with a wallet who isn't yet registered on-chain.
    ///
    /// A voter whose registration fails is flagged divergent and left
    /// off-chain-only; it doesn't stop the others or the activation.
    async fn register_known_voters(&self, ledger: &RetryingLedgerClient) -> Result<()> {
        for mut voter in self.store.list_voters().await? {
            let Some(address) = voter.wallet_address.clone() else {
                continue;
            };
            if voter.ledger_registered {
                continue;
            }

            match ledger
                .submit(&LedgerOperation::RegisterVoter { address })
                .await
            {
                Ok(_) => {
                    voter.ledger_registered = true;
                    voter.ledger_divergent = false;
                }
                Err(err) => {
                    warn!("Voter {} could not be registered on the ledger: {err}", voter.id);
                    voter.ledger_divergent = true;
                    self.audit(
                        AuditEntry::new(
                            AuditAction::LedgerDivergence,
                            format!("Registration of voter {} failed: {err}", voter.id),
                        )
                        .failed(),
                    )
                    .await;
                }
            }

            if let Err(err) = self.store.save_voter(&voter).await {
                warn!("Could not record ledger registration of voter {}: {err}", voter.id);
            }
        }
        Ok(())
    }
}
