use rocket::{serde::json::Json, Route, State};

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::model::{
    api::{
        audit::AuditEntryDescription,
        auth::{Admin, AuthToken},
        election::{ElectionDescription, ElectionSpec},
        reconcile::ReconciliationReport,
        response::{ApiResponse, Envelope},
        vote::VoteRecordDescription,
        voter::{VoterDescription, VoterSpec, WalletBinding},
    },
    common::election::ElectionId,
    mongodb::Id,
};

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        activate_election,
        close_election,
        delete_election,
        list_votes,
        reconcile,
        register_voter,
        bind_wallet,
        audit_log,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<ElectionDescription>> {
    let election = coordinator.create_election(spec.0, token.id).await?;
    Ok(ApiResponse::json(election.into()))
}

#[post("/elections/<election_id>/activate")]
async fn activate_election(
    token: AuthToken<Admin>,
    election_id: ElectionId,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<ElectionDescription>> {
    let election = coordinator.activate_election(election_id, token.id).await?;
    Ok(ApiResponse::json(election.into()))
}

#[post("/elections/<election_id>/close")]
async fn close_election(
    token: AuthToken<Admin>,
    election_id: ElectionId,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<ElectionDescription>> {
    let election = coordinator.close_election(election_id, token.id).await?;
    Ok(ApiResponse::json(election.into()))
}

#[delete("/elections/<election_id>")]
async fn delete_election(
    token: AuthToken<Admin>,
    election_id: ElectionId,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<()>> {
    coordinator.delete_election(election_id, token.id).await?;
    Ok(ApiResponse::json(()))
}

#[get("/elections/<election_id>/votes")]
async fn list_votes(
    _token: AuthToken<Admin>,
    election_id: ElectionId,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<Vec<VoteRecordDescription>>> {
    let votes = coordinator.list_votes(election_id).await?;
    Ok(ApiResponse::json(votes.into_iter().map(Into::into).collect()))
}

#[post("/elections/<election_id>/reconcile")]
async fn reconcile(
    token: AuthToken<Admin>,
    election_id: ElectionId,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<ReconciliationReport>> {
    let report = coordinator.reconcile(election_id, token.id).await?;
    Ok(ApiResponse::json(report))
}

#[post("/voters", data = "<spec>", format = "json")]
async fn register_voter(
    token: AuthToken<Admin>,
    spec: Json<VoterSpec>,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<VoterDescription>> {
    let voter = coordinator.register_voter(spec.0, token.id).await?;
    Ok(ApiResponse::json(voter.into()))
}

#[put("/voters/<voter_id>/wallet", data = "<binding>", format = "json")]
async fn bind_wallet(
    token: AuthToken<Admin>,
    voter_id: Id,
    binding: Json<WalletBinding>,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<VoterDescription>> {
    let voter = coordinator
        .bind_wallet(voter_id, binding.0.wallet_address, token.id)
        .await?;
    Ok(ApiResponse::json(voter.into()))
}

#[get("/audit?<election>")]
async fn audit_log(
    _token: AuthToken<Admin>,
    election: Option<ElectionId>,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<Vec<AuditEntryDescription>>> {
    let entries = coordinator.audit_log(election).await?;
    Ok(ApiResponse::json(entries.into_iter().map(Into::into).collect()))
}
