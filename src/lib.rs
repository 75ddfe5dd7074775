#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, CoordinatorFairing, LedgerFairing, StoreFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod store;

pub use crate::config::Config;
pub use crate::coordinator::Coordinator;

/// Assemble the server. Configuration is read, and the store and ledger
/// connected, when the instance is ignited.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .attach(LedgerFairing)
        .attach(CoordinatorFairing)
        .attach(LoggerFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// A server around an already-assembled coordinator, skipping the
/// connection fairings.
pub fn rocket_for_coordinator(config: Config, coordinator: Coordinator) -> Rocket<Build> {
    rocket::build()
        .manage(config)
        .manage(coordinator)
        .attach(LoggerFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// A server over in-memory collaborators, which stay reachable through
/// managed state so tests can inspect and steer them.
#[cfg(test)]
pub(crate) fn rocket_for_test(
    store: store::MemoryStore,
    ledger: ledger::MemoryLedger,
    enforce_ledger: bool,
) -> Rocket<Build> {
    use std::sync::Arc;

    let config = Config::test_example(enforce_ledger);
    let client = enforce_ledger.then(|| {
        ledger::RetryingLedgerClient::new(Arc::new(ledger.clone()), config.retry_policy())
    });
    let timed = store::TimedStore::new(Arc::new(store.clone()), config.store_timeout());
    let coordinator = Coordinator::new(Arc::new(timed), client);
    rocket_for_coordinator(config, coordinator)
        .manage(store)
        .manage(ledger)
}
