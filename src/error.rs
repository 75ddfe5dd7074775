use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, status::Custom, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::model::{
    api::response::ErrorBody,
    common::election::{CandidateId, ElectionId, ElectionStatus},
    mongodb::Id,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Election {0} not found")]
    ElectionNotFound(ElectionId),
    #[error("Candidate {candidate} not found in election {election}")]
    CandidateNotFound {
        election: ElectionId,
        candidate: CandidateId,
    },
    #[error("Voter {0} not found")]
    VoterNotFound(Id),
    #[error("Voter {voter} has already voted in election {election}")]
    AlreadyVoted { election: ElectionId, voter: Id },
    #[error("Election {0} has ended")]
    ElectionEnded(ElectionId),
    #[error("Election {0} is not open for voting")]
    ElectionNotActive(ElectionId),
    #[error("Election {election} cannot move from {from} to {to}")]
    InvalidTransition {
        election: ElectionId,
        from: ElectionStatus,
        to: ElectionStatus,
    },
    #[error("Wallet already bound: {0}")]
    WalletAlreadyBound(String),
    #[error("Election {0} is active and has votes awaiting reconciliation")]
    UnreconciledVotes(ElectionId),
    #[error("Election {0} was modified concurrently")]
    ConcurrentModification(ElectionId),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Store did not answer {0} in time")]
    StoreTimeout(&'static str),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error taxonomy exposed to callers, deciding the HTTP status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Transient,
    Validation,
    Unauthorized,
    Internal,
}

/// Machine-readable error codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ElectionNotFound,
    CandidateNotFound,
    VoterNotFound,
    AlreadyVoted,
    ElectionEnded,
    ElectionNotActive,
    InvalidTransition,
    WalletAlreadyBound,
    UnreconciledVotes,
    ConcurrentModification,
    ValidationError,
    LedgerUnavailable,
    LedgerRejected,
    StoreUnavailable,
    Unauthorized,
    /// No route matched the request.
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn kind(self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            ElectionNotFound | CandidateNotFound | VoterNotFound | NotFound => ErrorKind::NotFound,
            AlreadyVoted
            | ElectionEnded
            | ElectionNotActive
            | InvalidTransition
            | WalletAlreadyBound
            | UnreconciledVotes
            | ConcurrentModification
            | LedgerRejected => ErrorKind::Conflict,
            LedgerUnavailable | StoreUnavailable => ErrorKind::Transient,
            ValidationError => ErrorKind::Validation,
            Unauthorized => ErrorKind::Unauthorized,
            InternalError => ErrorKind::Internal,
        }
    }
}

impl ErrorKind {
    pub fn status(self) -> Status {
        match self {
            ErrorKind::NotFound => Status::NotFound,
            ErrorKind::Conflict => Status::Conflict,
            ErrorKind::Transient => Status::ServiceUnavailable,
            ErrorKind::Validation => Status::BadRequest,
            ErrorKind::Unauthorized => Status::Unauthorized,
            ErrorKind::Internal => Status::InternalServerError,
        }
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ElectionNotFound(_) => ErrorCode::ElectionNotFound,
            Self::CandidateNotFound { .. } => ErrorCode::CandidateNotFound,
            Self::VoterNotFound(_) => ErrorCode::VoterNotFound,
            Self::AlreadyVoted { .. } => ErrorCode::AlreadyVoted,
            Self::ElectionEnded(_) => ErrorCode::ElectionEnded,
            Self::ElectionNotActive(_) => ErrorCode::ElectionNotActive,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::WalletAlreadyBound(_) => ErrorCode::WalletAlreadyBound,
            Self::UnreconciledVotes(_) => ErrorCode::UnreconciledVotes,
            Self::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Ledger(err) if err.is_terminal() => ErrorCode::LedgerRejected,
            Self::Ledger(_) => ErrorCode::LedgerUnavailable,
            Self::StoreTimeout(_) => ErrorCode::StoreUnavailable,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature
                | JwtErrorKind::ImmatureSignature
                | JwtErrorKind::InvalidSignature => ErrorCode::Unauthorized,
                _ => ErrorCode::ValidationError,
            },
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Db(_) | Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let code = self.code();
        let kind = code.kind();
        if kind == ErrorKind::Internal {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        // Don't leak driver internals to callers.
        let message = match kind {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        };
        let body = ErrorBody::new(code, message);
        Custom(kind.status(), Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_taxonomy() {
        let voter = Id::new();
        assert_eq!(Error::ElectionNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::AlreadyVoted { election: 1, voter }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(Error::ElectionEnded(1).code(), ErrorCode::ElectionEnded);
        assert_eq!(Error::validation("bad").kind(), ErrorKind::Validation);
        assert_eq!(
            Error::Internal("boom".to_string()).kind().status(),
            Status::InternalServerError
        );
        assert_eq!(
            Error::StoreTimeout("load_election").kind().status(),
            Status::ServiceUnavailable
        );
    }
}
