mod state;

pub use state::ElectionStatus;

/// Our election IDs are sequential integers.
pub type ElectionId = u32;
/// Candidate IDs are positions within their election, starting at 1.
/// The same ID addresses the candidate on the ledger.
pub type CandidateId = u32;
