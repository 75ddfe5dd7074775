use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rocket::tokio::{sync::Mutex, time::sleep};

use crate::model::common::election::{CandidateId, ElectionId};

use super::{Confirmation, Finality, LedgerFault, LedgerNode, LedgerOperation, LedgerOutput, OperationKind};

/// An in-process ledger that behaves like the voting contract.
///
/// Used for development without a node, and by tests, which can inject
/// faults and latency per operation kind and inspect the on-chain state.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    candidates: BTreeMap<(ElectionId, CandidateId), OnChainCandidate>,
    voters: HashSet<String>,
    started: HashSet<ElectionId>,
    ballots: HashSet<(ElectionId, String)>,
    faults: HashMap<OperationKind, VecDeque<LedgerFault>>,
    calls: HashMap<OperationKind, usize>,
    finality: Option<Finality>,
    latency: Duration,
    transactions: u64,
}

struct OnChainCandidate {
    name: String,
    votes: u64,
}

fn rejected(message: &str) -> LedgerFault {
    LedgerFault::Rpc {
        code: -32000,
        message: format!("VM Exception while processing transaction: revert {message}"),
    }
}

impl LedgerState {
    fn next_tx(&mut self) -> Confirmation {
        self.transactions += 1;
        Confirmation::applied(
            format!("0x{:064x}", self.transactions),
            self.finality.unwrap_or(Finality::Finalized),
        )
    }

    fn apply(&mut self, operation: &LedgerOperation) -> Result<Confirmation, LedgerFault> {
        match operation {
            LedgerOperation::RegisterCandidate {
                election,
                candidate,
                name,
            } => {
                if self.candidates.contains_key(&(*election, *candidate)) {
                    return Err(rejected("candidate already registered"));
                }
                if self.started.contains(election) {
                    return Err(rejected("election already running"));
                }
                self.candidates.insert(
                    (*election, *candidate),
                    OnChainCandidate {
                        name: name.clone(),
                        votes: 0,
                    },
                );
                Ok(self.next_tx())
            }
            LedgerOperation::RegisterVoter { address } => {
                if !self.voters.insert(address.to_ascii_lowercase()) {
                    return Err(rejected("voter already registered"));
                }
                Ok(self.next_tx())
            }
            LedgerOperation::StartElection { election } => {
                if !self.started.insert(*election) {
                    return Err(rejected("election already started"));
                }
                Ok(self.next_tx())
            }
            LedgerOperation::CastVote {
                election,
                candidate,
                voter_address,
            } => {
                let address = voter_address.to_ascii_lowercase();
                if !self.started.contains(election) {
                    return Err(rejected("election not started"));
                }
                if !self.voters.contains(&address) {
                    return Err(rejected("voter not registered"));
                }
                if self.ballots.contains(&(*election, address.clone())) {
                    return Err(rejected("voter already voted"));
                }
                let Some(record) = self.candidates.get_mut(&(*election, *candidate)) else {
                    return Err(rejected("invalid candidate"));
                };
                record.votes += 1;
                self.ballots.insert((*election, address));
                Ok(self.next_tx())
            }
            LedgerOperation::ReadTally {
                election,
                candidate,
            } => match self.candidates.get(&(*election, *candidate)) {
                Some(record) => Ok(Confirmation::read(LedgerOutput::Tally {
                    name: record.name.clone(),
                    votes: record.votes,
                })),
                None => Err(rejected("invalid candidate")),
            },
            LedgerOperation::ReadCandidateCount { election } => {
                Ok(Confirmation::read(LedgerOutput::CandidateCount(
                    self.candidate_count(*election),
                )))
            }
        }
    }

    fn candidate_count(&self, election: ElectionId) -> u64 {
        self.candidates
            .range((election, CandidateId::MIN)..=(election, CandidateId::MAX))
            .count() as u64
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `kind` fail with `fault` before touching state.
    pub async fn fail_next(&self, kind: OperationKind, fault: LedgerFault, times: usize) {
        let mut state = self.state.lock().await;
        let queue = state.faults.entry(kind).or_default();
        queue.extend(std::iter::repeat(fault).take(times));
    }

    /// Finality reported for subsequent writes.
    pub async fn set_finality(&self, finality: Finality) {
        self.state.lock().await.finality = Some(finality);
    }

    /// Delay applied to every call before it takes effect.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    /// Number of times `kind` has been executed, failed attempts included.
    pub async fn calls(&self, kind: OperationKind) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub async fn tally(&self, election: ElectionId, candidate: CandidateId) -> Option<u64> {
        self.state
            .lock()
            .await
            .candidates
            .get(&(election, candidate))
            .map(|c| c.votes)
    }

    pub async fn candidate_count(&self, election: ElectionId) -> u64 {
        self.state.lock().await.candidate_count(election)
    }

    pub async fn is_registered(&self, address: &str) -> bool {
        self.state
            .lock()
            .await
            .voters
            .contains(&address.to_ascii_lowercase())
    }

    pub async fn is_started(&self, election: ElectionId) -> bool {
        self.state.lock().await.started.contains(&election)
    }
}

#[rocket::async_trait]
impl LedgerNode for MemoryLedger {
    async fn execute(&self, operation: &LedgerOperation) -> Result<Confirmation, LedgerFault> {
        let kind = operation.kind();
        let latency = {
            let mut state = self.state.lock().await;
            *state.calls.entry(kind).or_default() += 1;
            if let Some(fault) = state.faults.get_mut(&kind).and_then(VecDeque::pop_front) {
                return Err(fault);
            }
            state.latency
        };

        if !latency.is_zero() {
            sleep(latency).await;
        }

        self.state.lock().await.apply(operation)
    }
}
