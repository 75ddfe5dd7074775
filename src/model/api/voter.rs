use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    db::voter::{is_wallet_address, Voter},
};

/// A new voter, as provisioned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterSpec {
    pub name: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

impl VoterSpec {
    /// Check the spec and build the voter it describes.
    pub fn into_voter(self) -> Result<Voter> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::validation("Voter name must not be empty"));
        }
        let wallet = self.wallet_address.as_deref().map(normalize_wallet).transpose()?;
        Ok(Voter::new(name.to_string(), wallet))
    }
}

#[cfg(test)]
impl VoterSpec {
    pub fn example(wallet: Option<&str>) -> Self {
        Self {
            name: "Ada Lovelace".to_string(),
            wallet_address: wallet.map(str::to_string),
        }
    }
}

/// A wallet to bind to an existing voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBinding {
    pub wallet_address: String,
}

/// Reject anything that isn't `0x` followed by 40 hex digits, and lowercase
/// the rest. The ledger ignores case, so the off-chain record must too.
pub fn normalize_wallet(address: &str) -> Result<String> {
    let address = address.trim();
    if is_wallet_address(address) {
        Ok(address.to_ascii_lowercase())
    } else {
        Err(Error::validation(format!(
            "'{address}' is not a valid wallet address"
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterDescription {
    pub id: ApiId,
    pub name: String,
    pub wallet_address: Option<String>,
    pub ledger_registered: bool,
    pub ledger_divergent: bool,
    pub registered_at: DateTime<Utc>,
}

impl From<Voter> for VoterDescription {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id.into(),
            name: voter.name,
            wallet_address: voter.wallet_address,
            ledger_registered: voter.ledger_registered,
            ledger_divergent: voter.ledger_divergent,
            registered_at: voter.registered_at,
        }
    }
}
