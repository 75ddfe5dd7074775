use std::sync::Arc;
use std::time::Duration;

use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::coordinator::Coordinator;
use crate::ledger::{HttpLedgerNode, LedgerNode, MemoryLedger, RetryPolicy, RetryingLedgerClient};
use crate::store::{ElectionStore, MemoryStore, MongoStore, TimedStore};

/// Where the off-chain election record lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Mongodb,
    Memory,
}

/// How, if at all, votes reach the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// JSON-RPC over HTTP to a real ledger node.
    #[default]
    Rpc,
    /// An in-process simulated ledger.
    Memory,
    /// No ledger enforcement; everything is recorded off-chain only.
    Disabled,
}

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default)]
    store: StoreKind,
    #[serde(default = "default_db_name")]
    db_name: String,
    #[serde(default)]
    ledger_mode: LedgerMode,
    #[serde(default)]
    ledger_url: Option<String>,
    #[serde(default = "default_max_attempts")]
    ledger_max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    ledger_base_delay_ms: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    ledger_rpc_timeout_ms: u64,
    #[serde(default = "default_submission_timeout_ms")]
    ledger_submission_timeout_ms: u64,
    #[serde(default = "default_store_timeout_ms")]
    store_timeout_ms: u64,
    // secrets
    jwt_secret: String,
    #[serde(default)]
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "dualvote".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_submission_timeout_ms() -> u64 {
    60_000
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Secret key used to verify identity tokens.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    pub fn store(&self) -> StoreKind {
        self.store
    }

    pub fn ledger_mode(&self) -> LedgerMode {
        self.ledger_mode
    }

    /// Is every vote and registration relayed to a ledger?
    pub fn enforce_ledger(&self) -> bool {
        self.ledger_mode != LedgerMode::Disabled
    }

    /// Retry and timeout bounds for ledger submissions.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.ledger_max_attempts,
            base_delay: Duration::from_millis(self.ledger_base_delay_ms),
            rpc_timeout: Duration::from_millis(self.ledger_rpc_timeout_ms),
            submission_timeout: Duration::from_millis(self.ledger_submission_timeout_ms),
        }
    }

    /// Upper bound on any single store read or write.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Check the settings that can't be checked by deserialization alone.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.is_empty() {
            return Err("jwt_secret must not be empty".to_string());
        }
        if self.store_timeout_ms == 0 {
            return Err("store_timeout_ms must be positive".to_string());
        }
        if self.store == StoreKind::Mongodb && self.db_uri.is_none() {
            return Err("db_uri is required when store = \"mongodb\"".to_string());
        }
        if self.ledger_mode == LedgerMode::Rpc && self.ledger_url.is_none() {
            return Err("ledger_url is required when ledger_mode = \"rpc\"".to_string());
        }
        if self.enforce_ledger() {
            self.retry_policy().validate()?;
        }
        Ok(())
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if let Err(e) = config.validate() {
            error!("Invalid application config: {e}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// The off-chain store, as managed state.
#[derive(Clone)]
pub struct StoreHandle(pub Arc<dyn ElectionStore>);

/// A fairing that connects to the configured off-chain store, performs any
/// setup necessary, and places a [`StoreHandle`] into managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>().cloned() else {
            error!("Election store requires the application config");
            return Err(rocket);
        };

        let store: Arc<dyn ElectionStore> = match config.store {
            StoreKind::Memory => {
                warn!("Using the in-memory election store; nothing will survive a restart");
                Arc::new(MemoryStore::new())
            }
            StoreKind::Mongodb => {
                let Some(db_uri) = config.db_uri.as_deref() else {
                    error!("Failed to load database config: db_uri not set");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                match MongoStore::connect(db_uri, &get_database_name(&config)).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
        };
        let store: Arc<dyn ElectionStore> = Arc::new(TimedStore::new(store, config.store_timeout()));
        if let Err(e) = store.ping().await {
            error!("Election store is not responding: {e}");
            return Err(rocket);
        }
        info!("...election store online!");

        // Manage the state.
        rocket = rocket.manage(StoreHandle(store));
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name(config: &Config) -> String {
    config.db_name.clone()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name(config: &Config) -> String {
    let random: u32 = rand::random();
    let db = format!("{}_test{random}", config.db_name);
    info!("Using database {db}");
    db
}

/// The ledger client, as managed state. Empty when enforcement is disabled.
#[derive(Clone)]
pub struct LedgerHandle(pub Option<RetryingLedgerClient>);

/// A fairing that builds the configured ledger node and places a
/// [`LedgerHandle`] into managed state.
pub struct LedgerFairing;

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>().cloned() else {
            error!("Ledger requires the application config");
            return Err(rocket);
        };

        let node: Option<Arc<dyn LedgerNode>> = match config.ledger_mode {
            LedgerMode::Disabled => {
                warn!("Ledger enforcement is disabled; votes are recorded off-chain only");
                None
            }
            LedgerMode::Memory => {
                warn!("Using the simulated in-memory ledger");
                Some(Arc::new(MemoryLedger::new()))
            }
            LedgerMode::Rpc => match config.ledger_url.as_deref() {
                Some(url) => {
                    info!("Relaying ledger operations to {url}");
                    Some(Arc::new(HttpLedgerNode::new(url)))
                }
                None => {
                    error!("Failed to load ledger config: ledger_url not set");
                    return Err(rocket);
                }
            },
        };
        let client = node.map(|node| RetryingLedgerClient::new(node, config.retry_policy()));

        // Manage the state.
        rocket = rocket.manage(LedgerHandle(client));
        Ok(rocket)
    }
}

/// A fairing that assembles the [`Coordinator`] from the store and ledger
/// and places it into managed state. Must be attached after
/// [`StoreFairing`] and [`LedgerFairing`].
pub struct CoordinatorFairing;

#[rocket::async_trait]
impl Fairing for CoordinatorFairing {
    fn info(&self) -> Info {
        Info {
            name: "Coordinator",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let store = rocket.state::<StoreHandle>().cloned();
        let ledger = rocket.state::<LedgerHandle>().cloned();
        let (Some(StoreHandle(store)), Some(LedgerHandle(ledger))) = (store, ledger) else {
            error!("Coordinator requires both the election store and the ledger");
            return Err(rocket);
        };

        let coordinator = Coordinator::new(store, ledger);
        // Catch up on anything that ended while we were down.
        match coordinator.sweep_expired(chrono::Utc::now()).await {
            Ok(0) => {}
            Ok(n) => info!("Completed {n} elections that ended while offline"),
            Err(e) => warn!("Startup expiry sweep failed: {e}"),
        }

        // Manage the state.
        rocket = rocket.manage(coordinator);
        Ok(rocket)
    }
}


#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;

    fn figment(pairs: &[(&str, &str)]) -> Figment {
        pairs.iter().fold(Figment::new(), |figment, (key, value)| {
            figment.merge(Serialized::default(key, value))
        })
    }

    #[test]
    fn defaults_apply() {
        let config: Config = figment(&[
            ("jwt_secret", "secret"),
            ("db_uri", "mongodb://localhost:27017"),
            ("ledger_url", "http://localhost:8545"),
        ])
        .extract()
        .unwrap();
        assert_eq!(config.store(), StoreKind::Mongodb);
        assert_eq!(config.ledger_mode(), LedgerMode::Rpc);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        config.validate().unwrap();
    }

    #[test]
    fn modes_are_lowercase() {
        let config: Config = figment(&[
            ("jwt_secret", "secret"),
            ("store", "memory"),
            ("ledger_mode", "disabled"),
        ])
        .extract()
        .unwrap();
        assert_eq!(config.store(), StoreKind::Memory);
        assert!(!config.enforce_ledger());
        config.validate().unwrap();
    }

    #[test]
    fn missing_connection_details_are_rejected() {
        let mut config = Config::test_example(true);
        config.store = StoreKind::Mongodb;
        assert!(config.validate().is_err());

        let mut config = Config::test_example(true);
        config.ledger_mode = LedgerMode::Rpc;
        assert!(config.validate().is_err());
    }

    #[test]
    fn store_timeout_must_be_positive() {
        let mut config = Config::test_example(false);
        config.store_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn submission_timeout_must_cover_backoff() {
        let mut config = Config::test_example(true);
        config.ledger_base_delay_ms = 2_000;
        config.ledger_submission_timeout_ms = 16_000;
        assert!(config.validate().is_err());
        config.ledger_submission_timeout_ms = 16_001;
        config.validate().unwrap();

        // Irrelevant without a ledger.
        config.ledger_mode = LedgerMode::Disabled;
        config.ledger_submission_timeout_ms = 1;
        config.validate().unwrap();
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let mut config = Config::test_example(true);
        config.ledger_max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
