use std::sync::Arc;
use std::time::Duration;

use rocket::tokio::time::{sleep, timeout, Instant};

use super::{classify, Confirmation, FaultClass, LedgerError, LedgerFault, LedgerNode, LedgerOperation, OperationKind};

/// Bounds on how hard the client tries before giving up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Deadline for a single attempt.
    pub rpc_timeout: Duration,
    /// Deadline for the whole submission, backoff included.
    pub submission_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            rpc_timeout: Duration::from_millis(10_000),
            submission_timeout: Duration::from_millis(60_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Upper bound on the time spent sleeping between attempts.
    pub fn backoff_budget(&self) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(self.max_attempts))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("ledger_max_attempts must be at least 1".to_string());
        }
        if self.rpc_timeout.is_zero() {
            return Err("ledger_rpc_timeout_ms must be positive".to_string());
        }
        if self.submission_timeout <= self.backoff_budget() {
            return Err(format!(
                "ledger_submission_timeout_ms ({}) must exceed the backoff budget ({})",
                self.submission_timeout.as_millis(),
                self.backoff_budget().as_millis()
            ));
        }
        Ok(())
    }
}

/// Bookkeeping for one in-flight submission. Lives only as long as the call.
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    pub operation: OperationKind,
    pub attempts: u32,
    pub last_fault: Option<(FaultClass, LedgerFault)>,
    pub next_attempt_at: Option<Instant>,
}

impl SubmissionAttempt {
    fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            attempts: 0,
            last_fault: None,
            next_attempt_at: None,
        }
    }

    fn record(&mut self, class: FaultClass, fault: LedgerFault, delay: Duration) {
        self.last_fault = Some((class, fault));
        self.next_attempt_at = Some(Instant::now() + delay);
    }
}

/// Relays operations to a [`LedgerNode`], absorbing transient failures.
#[derive(Clone)]
pub struct RetryingLedgerClient {
    node: Arc<dyn LedgerNode>,
    policy: RetryPolicy,
}

impl RetryingLedgerClient {
    pub fn new(node: Arc<dyn LedgerNode>, policy: RetryPolicy) -> Self {
        Self { node, policy }
    }

    /// Submit an operation, retrying transient failures with exponential
    /// backoff until it succeeds, is rejected, or runs out of attempts or time.
    ///
    /// "Already registered"/"already started" answers count as success.
    pub async fn submit(&self, operation: &LedgerOperation) -> Result<Confirmation, LedgerError> {
        let kind = operation.kind();
        match timeout(self.policy.submission_timeout, self.submit_with_retries(operation)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Ledger submission for {kind} abandoned after {:?}",
                    self.policy.submission_timeout
                );
                Err(LedgerError::DeadlineExceeded {
                    operation: kind,
                    timeout: self.policy.submission_timeout,
                })
            }
        }
    }

    async fn submit_with_retries(
        &self,
        operation: &LedgerOperation,
    ) -> Result<Confirmation, LedgerError> {
        let mut attempt = SubmissionAttempt::new(operation.kind());
        loop {
            attempt.attempts += 1;
            debug!(
                "Submitting {} to ledger (attempt {}/{})",
                attempt.operation, attempt.attempts, self.policy.max_attempts
            );

            let fault = match timeout(self.policy.rpc_timeout, self.node.execute(operation)).await {
                Ok(Ok(confirmation)) => {
                    if attempt.attempts > 1 {
                        info!(
                            "Ledger accepted {} on attempt {}",
                            attempt.operation, attempt.attempts
                        );
                    }
                    return Ok(confirmation);
                }
                Ok(Err(fault)) => fault,
                Err(_) => LedgerFault::Timeout,
            };

            match classify(&fault) {
                FaultClass::AlreadyApplied => {
                    debug!("Ledger already had {}: {fault}", attempt.operation);
                    return Ok(Confirmation::already_applied());
                }
                FaultClass::Terminal => {
                    warn!("Ledger rejected {}: {fault}", attempt.operation);
                    return Err(LedgerError::Rejected {
                        operation: attempt.operation,
                        reason: fault.to_string(),
                    });
                }
                FaultClass::Transient if attempt.attempts >= self.policy.max_attempts => {
                    error!(
                        "Giving up on {} after {} attempts: {fault}",
                        attempt.operation, attempt.attempts
                    );
                    return Err(LedgerError::Exhausted {
                        operation: attempt.operation,
                        attempts: attempt.attempts,
                        last: fault,
                    });
                }
                FaultClass::Transient => {
                    let delay = self.policy.delay_after(attempt.attempts);
                    warn!(
                        "Transient ledger failure on {} (attempt {}): {fault}; retrying in {delay:?}",
                        attempt.operation, attempt.attempts
                    );
                    attempt.record(FaultClass::Transient, fault, delay);
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::{LedgerOutput, MemoryLedger};

    use super::*;

    const WALLET: &str = "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1";

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            rpc_timeout: Duration::from_millis(500),
            submission_timeout: Duration::from_secs(5),
        }
    }

    fn register_voter() -> LedgerOperation {
        LedgerOperation::RegisterVoter {
            address: WALLET.to_string(),
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_budget(), Duration::from_secs(16));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn submission_timeout_must_cover_backoff() {
        let policy = RetryPolicy {
            submission_timeout: Duration::from_secs(16),
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());

        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[rocket::async_test]
    async fn transient_failures_are_absorbed() {
        let ledger = MemoryLedger::new();
        ledger
            .fail_next(OperationKind::RegisterVoter, LedgerFault::RateLimited, 2)
            .await;
        let client = RetryingLedgerClient::new(Arc::new(ledger.clone()), fast_policy());

        let confirmation = client.submit(&register_voter()).await.unwrap();
        assert_eq!(confirmation.output, LedgerOutput::Applied);
        assert!(confirmation.tx_ref.is_some());
        assert_eq!(ledger.calls(OperationKind::RegisterVoter).await, 3);
        assert!(ledger.is_registered(WALLET).await);
    }

    #[rocket::async_test]
    async fn retries_are_bounded() {
        let ledger = MemoryLedger::new();
        ledger
            .fail_next(
                OperationKind::RegisterVoter,
                LedgerFault::Transport("connection reset".to_string()),
                10,
            )
            .await;
        let client = RetryingLedgerClient::new(Arc::new(ledger.clone()), fast_policy());

        let err = client.submit(&register_voter()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Exhausted { attempts: 3, .. }));
        assert!(!err.is_terminal());
        assert_eq!(ledger.calls(OperationKind::RegisterVoter).await, 3);
        assert!(!ledger.is_registered(WALLET).await);
    }

    #[rocket::async_test]
    async fn terminal_failures_are_not_retried() {
        let ledger = MemoryLedger::new();
        ledger
            .fail_next(
                OperationKind::RegisterVoter,
                LedgerFault::Rpc {
                    code: -32000,
                    message: "insufficient funds for gas * price + value".to_string(),
                },
                1,
            )
            .await;
        let client = RetryingLedgerClient::new(Arc::new(ledger.clone()), fast_policy());

        let err = client.submit(&register_voter()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { .. }));
        assert!(err.is_terminal());
        assert_eq!(ledger.calls(OperationKind::RegisterVoter).await, 1);
    }

    #[rocket::async_test]
    async fn replayed_registration_succeeds() {
        let ledger = MemoryLedger::new();
        let client = RetryingLedgerClient::new(Arc::new(ledger.clone()), fast_policy());

        let first = client.submit(&register_voter()).await.unwrap();
        let second = client.submit(&register_voter()).await.unwrap();
        assert_eq!(first.output, LedgerOutput::Applied);
        assert_eq!(second.output, LedgerOutput::AlreadyApplied);
        assert_eq!(second.tx_ref, None);
    }

    #[rocket::async_test]
    async fn slow_attempts_time_out_and_retry() {
        let ledger = MemoryLedger::new();
        ledger.set_latency(Duration::from_millis(200)).await;
        let policy = RetryPolicy {
            rpc_timeout: Duration::from_millis(20),
            ..fast_policy()
        };
        let client = RetryingLedgerClient::new(Arc::new(ledger.clone()), policy);

        let err = client.submit(&register_voter()).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Exhausted {
                last: LedgerFault::Timeout,
                ..
            }
        ));
        assert_eq!(ledger.calls(OperationKind::RegisterVoter).await, 3);
        assert!(!ledger.is_registered(WALLET).await);
    }

    #[rocket::async_test]
    async fn whole_submission_has_a_deadline() {
        let ledger = MemoryLedger::new();
        ledger.set_latency(Duration::from_millis(500)).await;
        let policy = RetryPolicy {
            rpc_timeout: Duration::from_secs(2),
            submission_timeout: Duration::from_millis(50),
            ..fast_policy()
        };
        let client = RetryingLedgerClient::new(Arc::new(ledger.clone()), policy);

        let err = client.submit(&register_voter()).await.unwrap_err();
        assert!(matches!(err, LedgerError::DeadlineExceeded { .. }));
        assert!(!ledger.is_registered(WALLET).await);
    }
}
