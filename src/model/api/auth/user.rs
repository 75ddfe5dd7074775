use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::model::{db::voter::Voter, mongodb::Id};

/// A principal of our application, having defined rights.
pub trait User {
    /// The rights of this user type.
    const RIGHTS: Rights;
}

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rights {
    Voter,
    Admin,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

/// An election administrator. Administrators are provisioned by the identity
/// service and have no off-chain record of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admin {
    pub id: Id,
}

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;
}

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;
}
