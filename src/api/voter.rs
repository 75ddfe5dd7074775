use rocket::{serde::json::Json, Route, State};

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{
    api::{
        auth::AuthToken,
        response::{ApiResponse, Envelope},
        vote::{VoteReceipt, VoteRequest},
    },
    common::election::ElectionId,
    db::voter::Voter,
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote]
}

/// Cast the authenticated voter's vote.
///
/// The answer is a definitive accept or reject of the off-chain vote; ledger
/// trouble after the commit never turns an accepted vote into an error.
#[post("/elections/<election_id>/votes", data = "<vote>", format = "json")]
async fn cast_vote(
    token: AuthToken<Voter>,
    election_id: ElectionId,
    vote: Json<VoteRequest>,
    coordinator: &State<Coordinator>,
    request_id: &RequestId,
) -> Result<Envelope<VoteReceipt>> {
    let record = coordinator
        .cast_vote(election_id, token.id, vote.candidate_id)
        .await?;
    debug!(
        "req{request_id}: vote {} accepted in election {election_id}",
        record.id
    );
    Ok(ApiResponse::json(record.into()))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json,
    };

    use crate::api::testing::*;
    use crate::ledger::{LedgerFault, MemoryLedger, OperationKind};
    use crate::model::{
        api::{election::ElectionSpec, voter::VoterSpec},
        db::election::Election,
        mongodb::Id,
    };

    use super::*;

    const WALLET: &str = "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1";

    async fn setup(coordinator: &Coordinator, wallet: Option<&str>) -> (Election, Voter) {
        let voter = coordinator
            .register_voter(VoterSpec::example(wallet), Id::new())
            .await
            .unwrap();
        let mut spec = ElectionSpec::current_example();
        spec.activate = true;
        let election = coordinator.create_election(spec, Id::new()).await.unwrap();
        (election, voter)
    }

    fn ballot(candidate_id: u32) -> String {
        serde_json::to_string(&VoteRequest { candidate_id }).unwrap()
    }

    #[backend_test]
    async fn vote_is_relayed(client: Client, coordinator: Coordinator, ledger: MemoryLedger) {
        let (election, voter) = setup(&coordinator, Some(WALLET)).await;

        let response = client
            .post(uri!(cast_vote(election.id)))
            .header(ContentType::JSON)
            .header(voter_auth(&client, &voter))
            .body(ballot(2))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let receipt: VoteReceipt = data(response).await;
        assert_eq!(receipt.candidate_id, 2);
        assert!(receipt.tx_ref.is_some());
        assert_eq!(ledger.tally(election.id, 2).await, Some(1));

        let response = client
            .post(uri!(cast_vote(election.id)))
            .header(ContentType::JSON)
            .header(voter_auth(&client, &voter))
            .body(ballot(1))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_code(response).await, "ALREADY_VOTED");
    }

    #[backend_test]
    async fn ledger_outage_is_invisible_to_voter(
        client: Client,
        coordinator: Coordinator,
        ledger: MemoryLedger,
    ) {
        let (election, voter) = setup(&coordinator, Some(WALLET)).await;
        ledger
            .fail_next(OperationKind::CastVote, LedgerFault::Timeout, 10)
            .await;

        let response = client
            .post(uri!(cast_vote(election.id)))
            .header(ContentType::JSON)
            .header(voter_auth(&client, &voter))
            .body(ballot(1))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let receipt: VoteReceipt = data(response).await;
        assert_eq!(receipt.tx_ref, None);

        let election = coordinator.get_election(election.id).await.unwrap();
        assert_eq!(election.total_votes, 1);
    }

    #[backend_test]
    async fn unknown_candidate(client: Client, coordinator: Coordinator) {
        let (election, voter) = setup(&coordinator, None).await;
        let response = client
            .post(uri!(cast_vote(election.id)))
            .header(ContentType::JSON)
            .header(voter_auth(&client, &voter))
            .body(ballot(9))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(error_code(response).await, "CANDIDATE_NOT_FOUND");
    }

    #[backend_test]
    async fn draft_election_rejects_votes(client: Client, coordinator: Coordinator) {
        let voter = coordinator
            .register_voter(VoterSpec::example(None), Id::new())
            .await
            .unwrap();
        let election = coordinator
            .create_election(ElectionSpec::current_example(), Id::new())
            .await
            .unwrap();
        let response = client
            .post(uri!(cast_vote(election.id)))
            .header(ContentType::JSON)
            .header(voter_auth(&client, &voter))
            .body(ballot(1))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_code(response).await, "ELECTION_NOT_ACTIVE");
    }

    #[backend_test]
    async fn unknown_voter_is_unauthorized(client: Client, coordinator: Coordinator) {
        let (election, _) = setup(&coordinator, None).await;
        let stranger = Voter::new("Mallory".to_string(), None);
        let response = client
            .post(uri!(cast_vote(election.id)))
            .header(ContentType::JSON)
            .header(voter_auth(&client, &stranger))
            .body(ballot(1))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }
}
