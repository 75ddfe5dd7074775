use crate::error::Result;
use crate::model::{
    api::election::{CandidateResult, ElectionResults, ResultStatus},
    common::election::ElectionId,
    db::election::{Candidate, Election},
};

use super::Coordinator;

/// Rank an election's candidates by their off-chain tallies and decide the winner.
///
/// On-chain counts from the last reconciliation are reported alongside but
/// never change the ranking.
pub fn compute_results(election: &Election) -> ElectionResults {
    let mut ranked: Vec<&Candidate> = election.candidates.iter().collect();
    // Stable, so equal counts keep ballot order.
    ranked.sort_by(|a, b| b.votes.cmp(&a.votes));

    let mut candidates: Vec<CandidateResult> = Vec::with_capacity(ranked.len());
    for (position, candidate) in ranked.iter().enumerate() {
        let rank = match candidates.last() {
            Some(CandidateResult { votes, rank, .. }) if *votes == candidate.votes => *rank,
            _ => position + 1,
        };
        candidates.push(CandidateResult {
            id: candidate.id,
            name: candidate.name.clone(),
            votes: candidate.votes,
            ledger_votes: candidate.ledger_votes,
            rank,
        });
    }

    let winning_votes = ranked.first().map_or(0, |c| c.votes);
    let leaders: Vec<&str> = election
        .candidates
        .iter()
        .filter(|c| c.votes == winning_votes)
        .map(|c| c.name.as_str())
        .collect();
    let status = match leaders.len() {
        0 => ResultStatus::NoCandidates,
        1 => ResultStatus::Winner,
        _ => ResultStatus::Tie,
    };
    let winner = (!leaders.is_empty()).then(|| leaders.join(" & "));

    ElectionResults {
        election_id: election.id,
        title: election.metadata.title.clone(),
        election_status: election.status(),
        candidates,
        total_votes: election.total_votes,
        winner,
        winning_votes,
        status,
        ledger_divergent: election.ledger.divergent,
    }
}

impl Coordinator {
    pub async fn results(&self, id: ElectionId) -> Result<ElectionResults> {
        let election = self.get_election(id).await?;
        Ok(compute_results(&election))
    }

    pub async fn all_results(&self) -> Result<Vec<ElectionResults>> {
        Ok(self
            .list_elections()
            .await?
            .iter()
            .map(compute_results)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::model::mongodb::Id;

    use super::*;

    fn election_with(votes: &[(&str, u64)]) -> Election {
        let mut election = Election::draft_example(1);
        election.candidates = votes
            .iter()
            .zip(1..)
            .map(|(&(name, votes), id)| Candidate {
                id,
                name: name.to_string(),
                votes,
                ledger_votes: None,
                ledger_registered: true,
            })
            .collect();
        election.total_votes = votes.iter().map(|(_, v)| v).sum();
        election
    }

    #[test]
    fn clear_winner() {
        let results = compute_results(&election_with(&[("A", 7), ("B", 3)]));
        assert_eq!(results.status, ResultStatus::Winner);
        assert_eq!(results.winner.as_deref(), Some("A"));
        assert_eq!(results.winning_votes, 7);
        assert_eq!(results.total_votes, 10);
    }

    #[test]
    fn tied_leaders_are_joined() {
        let results = compute_results(&election_with(&[("A", 5), ("B", 5), ("C", 3)]));
        assert_eq!(results.status, ResultStatus::Tie);
        assert_eq!(results.winner.as_deref(), Some("A & B"));
        assert_eq!(results.winning_votes, 5);
    }

    #[test]
    fn tie_names_follow_ballot_order() {
        let results = compute_results(&election_with(&[("C", 1), ("B", 4), ("A", 4)]));
        assert_eq!(results.winner.as_deref(), Some("B & A"));
    }

    #[test]
    fn ranking_uses_competition_ranks() {
        let results = compute_results(&election_with(&[("A", 2), ("B", 9), ("C", 2), ("D", 1)]));
        let ranked: Vec<_> = results
            .candidates
            .iter()
            .map(|c| (c.name.as_str(), c.rank))
            .collect();
        assert_eq!(ranked, vec![("B", 1), ("A", 2), ("C", 2), ("D", 4)]);
    }

    #[test]
    fn no_candidates_is_not_an_error() {
        let results = compute_results(&election_with(&[]));
        assert_eq!(results.status, ResultStatus::NoCandidates);
        assert_eq!(results.winner, None);
        assert_eq!(results.winning_votes, 0);
        assert!(results.candidates.is_empty());
    }

    #[test]
    fn ledger_counts_never_override() {
        let mut election = election_with(&[("A", 4), ("B", 2)]);
        election.candidates[1].ledger_votes = Some(10);
        election.ledger.divergent = true;
        let results = compute_results(&election);
        assert_eq!(results.winner.as_deref(), Some("A"));
        assert_eq!(results.candidates[1].ledger_votes, Some(10));
        assert!(results.ledger_divergent);
    }

    #[backend_test]
    async fn results_follow_votes(coordinator: Coordinator) {
        use crate::model::api::{election::ElectionSpec, voter::VoterSpec};

        let mut spec = ElectionSpec::with_candidates(&["Alice", "Bob"]);
        spec.activate = true;
        let election = coordinator.create_election(spec, Id::new()).await.unwrap();
        let voter = coordinator
            .register_voter(VoterSpec::example(None), Id::new())
            .await
            .unwrap();
        coordinator.cast_vote(election.id, voter.id, 2).await.unwrap();

        let results = coordinator.results(election.id).await.unwrap();
        assert_eq!(results.winner.as_deref(), Some("Bob"));
        assert_eq!(results.status, ResultStatus::Winner);

        let all = coordinator.all_results().await.unwrap();
        assert_eq!(all, vec![results]);
    }
}
