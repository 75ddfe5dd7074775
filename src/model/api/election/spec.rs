use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{common::election::ElectionId, db::election::Election};

/// An election specification, as submitted by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSpec {
    /// Election title.
    pub title: String,
    /// Election description.
    #[serde(default)]
    pub description: String,
    /// Election start time.
    pub start_time: DateTime<Utc>,
    /// Election end time.
    pub end_time: DateTime<Utc>,
    /// Candidate names, in ballot order.
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Activate the election straight after creating it.
    #[serde(default)]
    pub activate: bool,
}

impl ElectionSpec {
    /// Check the spec describes a sensible election.
    ///
    /// An empty candidate list is allowed: such an election can be created
    /// and closed, but never activated.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("Election title must not be empty"));
        }
        if self.end_time <= self.start_time {
            return Err(Error::validation("Election must end after it starts"));
        }
        if self.end_time <= now {
            return Err(Error::validation("Election end time must be in the future"));
        }
        let mut seen = HashSet::new();
        for name in &self.candidates {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::validation("Candidate names must not be empty"));
            }
            if !seen.insert(name) {
                return Err(Error::validation(format!(
                    "Duplicate candidate name '{name}'"
                )));
            }
        }
        Ok(())
    }

    /// Convert this spec into a draft election with the given ID.
    pub fn into_election(self, election_id: ElectionId) -> Election {
        Election::new(
            election_id,
            self.title.trim().to_string(),
            self.description,
            self.start_time,
            self.end_time,
            self.candidates
                .into_iter()
                .map(|name| name.trim().to_string())
                .collect(),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    #[test]
    fn accepts_example() {
        ElectionSpec::current_example().validate(Utc::now()).unwrap();
    }

    #[test]
    fn accepts_zero_candidates() {
        ElectionSpec::with_candidates(&[]).validate(Utc::now()).unwrap();
    }

    #[test]
    fn rejects_bad_specs() {
        let now = Utc::now();

        let mut spec = ElectionSpec::current_example();
        spec.title = "   ".to_string();
        assert!(matches!(spec.validate(now), Err(Error::Validation(_))));

        let mut spec = ElectionSpec::current_example();
        spec.end_time = spec.start_time;
        assert!(matches!(spec.validate(now), Err(Error::Validation(_))));

        let mut spec = ElectionSpec::current_example();
        spec.start_time = now - Duration::days(2);
        spec.end_time = now - Duration::days(1);
        assert!(matches!(spec.validate(now), Err(Error::Validation(_))));

        let spec = ElectionSpec::with_candidates(&["Alice", " Alice "]);
        assert!(matches!(spec.validate(now), Err(Error::Validation(_))));

        let spec = ElectionSpec::with_candidates(&["Alice", ""]);
        assert!(matches!(spec.validate(now), Err(Error::Validation(_))));
    }

    #[test]
    fn into_election_trims_names() {
        let election = ElectionSpec::with_candidates(&[" Alice", "Bob "]).into_election(7);
        assert_eq!(election.id, 7);
        assert_eq!(election.candidates[0].name, "Alice");
        assert_eq!(election.candidates[1].name, "Bob");
    }
}
