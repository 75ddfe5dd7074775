mod base;
mod metadata;

pub use base::{Candidate, Election, ElectionLedgerState};
pub use metadata::ElectionMetadata;
