use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
///
/// Transitions only ever move forwards: `Draft -> Active -> Completed`, plus the
/// administrative `Draft -> Completed` override for elections that never opened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Under construction; candidates may not yet be on the ledger.
    Draft,
    /// Open for votes until its end time passes or it is closed.
    Active,
    /// Closed. Rejects every vote regardless of ledger state.
    Completed,
}

impl ElectionStatus {
    /// Is moving from `self` to `next` a legal lifecycle transition?
    pub fn can_transition_to(self, next: ElectionStatus) -> bool {
        use ElectionStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Active, Completed) | (Draft, Completed)
        )
    }
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElectionStatus::Draft => "draft",
            ElectionStatus::Active => "active",
            ElectionStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
