use std::time::Duration;

use thiserror::Error;

use super::OperationKind;

/// A raw failure reported by a ledger node for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerFault {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited")]
    RateLimited,
    #[error("timed out")]
    Timeout,
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// How a fault should be handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultClass {
    /// Worth retrying after a backoff.
    Transient,
    /// Retrying cannot help.
    Terminal,
    /// A replayed idempotent operation; treat as success.
    AlreadyApplied,
}

/// JSON-RPC "limit exceeded".
const RPC_LIMIT_EXCEEDED: i64 = -32005;

const ALREADY_APPLIED_MARKERS: &[&str] = &["already registered", "already started"];

const TRANSIENT_MARKERS: &[&str] = &[
    "nonce too low",
    "rate limit",
    "too many requests",
    "congest",
    "econnreset",
    "connection reset",
    "timed out",
    "timeout",
    "txpool is full",
    "replacement transaction underpriced",
    "try again",
];

/// Decide whether a fault is transient, terminal, or an idempotent replay.
///
/// Anything unrecognised is terminal: retrying an operation we don't
/// understand the failure of is not safe.
pub fn classify(fault: &LedgerFault) -> FaultClass {
    match fault {
        LedgerFault::Transport(_) | LedgerFault::RateLimited | LedgerFault::Timeout => {
            FaultClass::Transient
        }
        LedgerFault::Rpc { code, message } => {
            let message = message.to_ascii_lowercase();
            if ALREADY_APPLIED_MARKERS.iter().any(|m| message.contains(m)) {
                FaultClass::AlreadyApplied
            } else if *code == RPC_LIMIT_EXCEEDED
                || TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
            {
                FaultClass::Transient
            } else {
                FaultClass::Terminal
            }
        }
    }
}

/// A ledger submission that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Ledger rejected {operation}: {reason}")]
    Rejected {
        operation: OperationKind,
        reason: String,
    },
    #[error("Ledger unavailable for {operation} after {attempts} attempts: {last}")]
    Exhausted {
        operation: OperationKind,
        attempts: u32,
        last: LedgerFault,
    },
    #[error("Ledger submission for {operation} exceeded its {timeout:?} deadline")]
    DeadlineExceeded {
        operation: OperationKind,
        timeout: Duration,
    },
    #[error("Ledger gave an unexpected answer to {operation}")]
    UnexpectedOutput { operation: OperationKind },
}

impl LedgerError {
    /// Did the ledger itself refuse the operation, as opposed to being unreachable?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LedgerError::Rejected { .. } | LedgerError::UnexpectedOutput { .. }
        )
    }
}
