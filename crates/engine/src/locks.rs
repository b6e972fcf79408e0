//! Per-user mutual exclusion for balance-changing sequences.
//!
//! Every compound wallet mutation (debit, credit, ride completion, tips,
//! webhook credit) holds the user's lock for its whole database transaction.
//! The conditional updates in the ledger still guard the balance at the
//! storage level; the lock keeps read-check-write sequences on one user
//! strictly ordered inside this process.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s wallet.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Forget the lock of a deleted user.
    pub fn forget(&self, user_id: &str) {
        self.locks.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let guard = locks.acquire("alice").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("alice").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let locks = UserLocks::new();
        let _alice = locks.acquire("alice").await;
        let bob = tokio::time::timeout(Duration::from_millis(100), locks.acquire("bob")).await;
        assert!(bob.is_ok());
    }
}
