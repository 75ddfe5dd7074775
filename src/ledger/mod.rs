//! Access to the on-chain voting ledger.
//!
//! A [`LedgerNode`] executes single operations against some ledger, with no
//! retries. The [`RetryingLedgerClient`] wraps a node with error
//! classification, bounded exponential backoff and timeouts; everything else
//! in the crate talks to the ledger through it.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, ElectionId};

mod client;
mod error;
mod memory;
mod rpc;

pub use client::{RetryPolicy, RetryingLedgerClient, SubmissionAttempt};
pub use error::{classify, FaultClass, LedgerError, LedgerFault};
pub use memory::MemoryLedger;
pub use rpc::HttpLedgerNode;

/// The kinds of operation the ledger understands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    RegisterCandidate,
    RegisterVoter,
    StartElection,
    CastVote,
    ReadTally,
    ReadCandidateCount,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::RegisterCandidate => "register-candidate",
            OperationKind::RegisterVoter => "register-voter",
            OperationKind::StartElection => "start-election",
            OperationKind::CastVote => "cast-vote",
            OperationKind::ReadTally => "read-tally",
            OperationKind::ReadCandidateCount => "read-candidate-count",
        };
        f.write_str(name)
    }
}

/// A single operation to relay to the ledger, with all the parameters
/// needed to replay it safely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOperation {
    RegisterCandidate {
        election: ElectionId,
        candidate: CandidateId,
        name: String,
    },
    RegisterVoter {
        address: String,
    },
    StartElection {
        election: ElectionId,
    },
    CastVote {
        election: ElectionId,
        candidate: CandidateId,
        voter_address: String,
    },
    ReadTally {
        election: ElectionId,
        candidate: CandidateId,
    },
    ReadCandidateCount {
        election: ElectionId,
    },
}

impl LedgerOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            LedgerOperation::RegisterCandidate { .. } => OperationKind::RegisterCandidate,
            LedgerOperation::RegisterVoter { .. } => OperationKind::RegisterVoter,
            LedgerOperation::StartElection { .. } => OperationKind::StartElection,
            LedgerOperation::CastVote { .. } => OperationKind::CastVote,
            LedgerOperation::ReadTally { .. } => OperationKind::ReadTally,
            LedgerOperation::ReadCandidateCount { .. } => OperationKind::ReadCandidateCount,
        }
    }
}

/// How settled a ledger transaction is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    /// In the ledger's pool or an unconfirmed block; could still be reverted.
    Accepted,
    /// Guaranteed not to be reverted.
    Finalized,
}

/// What the ledger returned for an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutput {
    /// A write was applied.
    Applied,
    /// A replayed registration or start; the ledger already had it.
    AlreadyApplied,
    /// A candidate's on-chain record.
    Tally { name: String, votes: u64 },
    /// Number of candidates registered for an election.
    CandidateCount(u64),
}

/// A successful ledger outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Transaction reference; absent for reads and replays.
    pub tx_ref: Option<String>,
    pub finality: Finality,
    pub output: LedgerOutput,
}

impl Confirmation {
    /// A write that the ledger applied in transaction `tx_ref`.
    pub fn applied(tx_ref: String, finality: Finality) -> Self {
        Self {
            tx_ref: Some(tx_ref),
            finality,
            output: LedgerOutput::Applied,
        }
    }

    /// A replayed write the ledger already had.
    pub fn already_applied() -> Self {
        Self {
            tx_ref: None,
            finality: Finality::Finalized,
            output: LedgerOutput::AlreadyApplied,
        }
    }

    /// The answer to a read.
    pub fn read(output: LedgerOutput) -> Self {
        Self {
            tx_ref: None,
            finality: Finality::Finalized,
            output,
        }
    }

    /// Only finalized confirmations may feed authoritative state.
    pub fn is_final(&self) -> bool {
        self.finality == Finality::Finalized
    }
}

/// Something that can execute ledger operations, one attempt at a time.
#[rocket::async_trait]
pub trait LedgerNode: Send + Sync {
    /// Execute `operation` exactly once. Retrying is the caller's job.
    async fn execute(&self, operation: &LedgerOperation) -> Result<Confirmation, LedgerFault>;
}
