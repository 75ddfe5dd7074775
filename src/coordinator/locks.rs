use std::collections::HashMap;
use std::sync::Arc;

use rocket::tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::common::election::ElectionId;

/// One mutex per election, created on first use.
///
/// Every read-modify-write of an election happens while holding its guard,
/// so operations on one election are linearised while different elections
/// proceed in parallel.
#[derive(Clone, Default)]
pub struct ElectionLocks {
    locks: Arc<Mutex<HashMap<ElectionId, Arc<Mutex<()>>>>>,
}

impl ElectionLocks {
    /// Wait for exclusive access to `election`.
    pub async fn acquire(&self, election: ElectionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(election).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the mutex of a deleted election. Election IDs are never reused,
    /// so anyone still holding a clone only ever sees the election missing.
    pub async fn forget(&self, election: ElectionId) {
        self.locks.lock().await.remove(&election);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rocket::tokio::time::timeout;

    use super::*;

    #[rocket::async_test]
    async fn same_election_is_exclusive() {
        let locks = ElectionLocks::default();
        let guard = locks.acquire(1).await;
        assert!(timeout(Duration::from_millis(20), locks.acquire(1))
            .await
            .is_err());
        drop(guard);
        assert!(timeout(Duration::from_millis(20), locks.acquire(1))
            .await
            .is_ok());
    }

    #[rocket::async_test]
    async fn different_elections_are_independent() {
        let locks = ElectionLocks::default();
        let _first = locks.acquire(1).await;
        assert!(timeout(Duration::from_millis(20), locks.acquire(2))
            .await
            .is_ok());
    }
}
