use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// A voter account, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    /// Voter unique ID.
    #[serde(rename = "_id")]
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Wallet address, once bound. Absent rather than null so the sparse unique index applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    /// Has the wallet been registered on the ledger?
    #[serde(default)]
    pub ledger_registered: bool,
    /// Set when on-chain registration failed after retries.
    #[serde(default)]
    pub ledger_divergent: bool,
    /// When the voter registered off-chain.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub registered_at: DateTime<Utc>,
}

impl Voter {
    /// Create a new voter with a fresh ID.
    pub fn new(name: String, wallet_address: Option<String>) -> Self {
        Self {
            id: Id::new(),
            name,
            wallet_address,
            ledger_registered: false,
            ledger_divergent: false,
            registered_at: Utc::now(),
        }
    }

    /// The address to vote from on-chain, if this voter can vote on-chain at all.
    pub fn ledger_address(&self) -> Option<&str> {
        if self.ledger_registered {
            self.wallet_address.as_deref()
        } else {
            None
        }
    }
}

/// Is `address` a well-formed wallet address (`0x` followed by 40 hex digits)?
pub fn is_wallet_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
