//! Best-effort snapshot persistence contract.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use poker_domain::TeamSnapshot;

/// Error raised by a snapshot store.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RepositoryError(pub String);

/// A specialized Result type for repository operations.
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Best-effort snapshot store for teams.
///
/// The registry treats every failure here as "team absent"; persistence
/// is an optimization, never a source of truth. Implementations must not
/// assume a call order.
pub trait TeamRepository: Send + Sync {
    /// Stores or replaces a team snapshot.
    fn save(&self, snapshot: &TeamSnapshot) -> RepositoryResult<()>;

    /// Loads a snapshot by team name, case-insensitively.
    fn load(&self, name: &str) -> RepositoryResult<Option<TeamSnapshot>>;

    /// Removes a snapshot. Unknown names are not an error.
    fn delete(&self, name: &str) -> RepositoryResult<()>;

    /// Lists the names of all stored snapshots.
    fn list_names(&self) -> RepositoryResult<Vec<String>>;

    /// Removes every snapshot whose most recent participant activity is
    /// older than `threshold` (unix seconds).
    fn delete_expired(&self, threshold: u64) -> RepositoryResult<()>;
}

/// Store that keeps nothing. The default when no persistence is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTeamRepository;

impl TeamRepository for NullTeamRepository {
    fn save(&self, _snapshot: &TeamSnapshot) -> RepositoryResult<()> {
        Ok(())
    }

    fn load(&self, _name: &str) -> RepositoryResult<Option<TeamSnapshot>> {
        Ok(None)
    }

    fn delete(&self, _name: &str) -> RepositoryResult<()> {
        Ok(())
    }

    fn list_names(&self) -> RepositoryResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn delete_expired(&self, _threshold: u64) -> RepositoryResult<()> {
        Ok(())
    }
}

/// In-memory store, mainly for tests.
#[derive(Default)]
pub struct MemoryTeamRepository {
    snapshots: RwLock<HashMap<String, TeamSnapshot>>,
}

impl MemoryTeamRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

impl TeamRepository for MemoryTeamRepository {
    fn save(&self, snapshot: &TeamSnapshot) -> RepositoryResult<()> {
        self.snapshots
            .write()
            .insert(snapshot.name.to_lowercase(), snapshot.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> RepositoryResult<Option<TeamSnapshot>> {
        Ok(self.snapshots.read().get(&name.to_lowercase()).cloned())
    }

    fn delete(&self, name: &str) -> RepositoryResult<()> {
        self.snapshots.write().remove(&name.to_lowercase());
        Ok(())
    }

    fn list_names(&self) -> RepositoryResult<Vec<String>> {
        Ok(self
            .snapshots
            .read()
            .values()
            .map(|s| s.name.clone())
            .collect())
    }

    fn delete_expired(&self, threshold: u64) -> RepositoryResult<()> {
        self.snapshots.write().retain(|_, snapshot| {
            let last_activity = snapshot
                .participants
                .iter()
                .map(|p| p.last_activity)
                .max()
                .unwrap_or(0);
            last_activity >= threshold
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poker_domain::{ManualClock, ScrumTeam};
    use std::sync::Arc;

    fn snapshot(name: &str, last_activity: u64) -> TeamSnapshot {
        let clock = Arc::new(ManualClock::new(last_activity));
        let mut team = ScrumTeam::new(name, clock).unwrap();
        team.set_scrum_master("alice").unwrap();
        team.snapshot()
    }

    #[test]
    fn test_save_load_delete() {
        let repo = MemoryTeamRepository::new();
        repo.save(&snapshot("Web", 100)).unwrap();

        let loaded = repo.load("web").unwrap().unwrap();
        assert_eq!(loaded.name, "Web");

        repo.delete("WEB").unwrap();
        assert!(repo.load("web").unwrap().is_none());
        // deleting again is fine
        repo.delete("web").unwrap();
    }

    #[test]
    fn test_list_names() {
        let repo = MemoryTeamRepository::new();
        repo.save(&snapshot("a", 0)).unwrap();
        repo.save(&snapshot("b", 0)).unwrap();

        let mut names = repo.list_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_delete_expired() {
        let repo = MemoryTeamRepository::new();
        repo.save(&snapshot("old", 100)).unwrap();
        repo.save(&snapshot("fresh", 900)).unwrap();

        repo.delete_expired(500).unwrap();
        assert!(repo.load("old").unwrap().is_none());
        assert!(repo.load("fresh").unwrap().is_some());
    }

    #[test]
    fn test_null_repository_stores_nothing() {
        let repo = NullTeamRepository;
        repo.save(&snapshot("web", 0)).unwrap();
        assert!(repo.load("web").unwrap().is_none());
        assert!(repo.list_names().unwrap().is_empty());
    }
}
