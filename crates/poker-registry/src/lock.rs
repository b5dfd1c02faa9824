//! Per-team mutual exclusion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use poker_domain::ScrumTeam;

use crate::{RegistryError, Result};

/// Exclusive lock guarding all mutation of one team.
///
/// Any read-then-write of a team, whether a local API call or an inbound
/// replication apply, must go through [`lock`](ScrumTeamLock::lock) for
/// the duration of the operation. Locks are scoped per team name, so
/// operations on different teams never contend. The guard releases on all
/// exit paths.
#[derive(Debug, Clone)]
pub struct ScrumTeamLock {
    name: Arc<str>,
    inner: Arc<Mutex<ScrumTeam>>,
}

impl ScrumTeamLock {
    /// Wraps a team in its lock.
    pub fn new(team: ScrumTeam) -> Self {
        Self {
            name: Arc::from(team.name()),
            inner: Arc::new(Mutex::new(team)),
        }
    }

    /// The guarded team's name.
    pub fn team_name(&self) -> &str {
        &self.name
    }

    /// Acquires the lock, waiting at most `wait`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockTimeout`] when the bound elapses before
    /// the lock frees up.
    pub async fn lock(&self, wait: Duration) -> Result<OwnedMutexGuard<ScrumTeam>> {
        tokio::time::timeout(wait, self.inner.clone().lock_owned())
            .await
            .map_err(|_| RegistryError::LockTimeout {
                team: self.name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poker_domain::SystemClock;

    fn lock() -> ScrumTeamLock {
        ScrumTeamLock::new(ScrumTeam::new("web", Arc::new(SystemClock)).unwrap())
    }

    #[tokio::test]
    async fn test_lock_grants_exclusive_access() {
        let lock = lock();
        let mut guard = lock.lock(Duration::from_secs(1)).await.unwrap();
        guard.set_scrum_master("alice").unwrap();
        drop(guard);

        let guard = lock.lock(Duration::from_secs(1)).await.unwrap();
        assert_eq!(guard.scrum_master().unwrap().name(), "alice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_times_out_while_held() {
        let lock = lock();
        let _held = lock.lock(Duration::from_secs(1)).await.unwrap();

        let result = lock.lock(Duration::from_millis(10)).await;
        assert!(matches!(
            result,
            Err(RegistryError::LockTimeout { ref team }) if team == "web"
        ));
    }

    #[tokio::test]
    async fn test_different_teams_never_contend() {
        let a = lock();
        let b = ScrumTeamLock::new(
            ScrumTeam::new("mobile", Arc::new(SystemClock)).unwrap(),
        );

        let _guard_a = a.lock(Duration::from_secs(1)).await.unwrap();
        // holding "web" does not block "mobile"
        let guard_b = b.lock(Duration::from_millis(10)).await.unwrap();
        assert_eq!(guard_b.name(), "mobile");
    }
}
