use rocket::{Route, State};
use serde::{Deserialize, Serialize};

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::model::{
    api::{
        election::{ElectionDescription, ElectionResults},
        response::{ApiResponse, Envelope},
    },
    common::election::ElectionId,
};
use crate::store::ElectionStore;

pub fn routes() -> Vec<Route> {
    routes![
        list_elections,
        get_election,
        election_results,
        all_results,
        health
    ]
}

/// Get every election. Elections whose end time has passed are completed first.
#[get("/elections")]
async fn list_elections(
    coordinator: &State<Coordinator>,
) -> Result<Envelope<Vec<ElectionDescription>>> {
    let elections = coordinator.list_elections().await?;
    Ok(ApiResponse::json(
        elections.into_iter().map(Into::into).collect(),
    ))
}

#[get("/elections/<election_id>")]
async fn get_election(
    election_id: ElectionId,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<ElectionDescription>> {
    let election = coordinator.get_election(election_id).await?;
    Ok(ApiResponse::json(election.into()))
}

#[get("/elections/<election_id>/results")]
async fn election_results(
    election_id: ElectionId,
    coordinator: &State<Coordinator>,
) -> Result<Envelope<ElectionResults>> {
    Ok(ApiResponse::json(coordinator.results(election_id).await?))
}

#[get("/results")]
async fn all_results(coordinator: &State<Coordinator>) -> Result<Envelope<Vec<ElectionResults>>> {
    Ok(ApiResponse::json(coordinator.all_results().await?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub store_online: bool,
    pub ledger_enforced: bool,
}

/// Liveness. Answers even when the store is down, so the failure is visible.
#[get("/health")]
async fn health(coordinator: &State<Coordinator>) -> Envelope<Health> {
    let store_online = match coordinator.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            error!("Health check: election store is not responding: {e}");
            false
        }
    };
    ApiResponse::json(Health {
        store_online,
        ledger_enforced: coordinator.enforces_ledger(),
    })
}
