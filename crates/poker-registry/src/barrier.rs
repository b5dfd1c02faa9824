//! Startup bootstrap barrier.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{RegistryError, Result};

#[derive(Debug)]
enum Phase {
    /// No setup yet: every name counts as pending.
    Uninitialized,
    /// Concrete set of names still owned by peers.
    Pending(HashSet<String>),
    /// Bootstrap finished; every name is resolved.
    Cleared,
}

/// Tracks which team names are still being fetched from peers during
/// startup.
///
/// Three phases: *uninitialized* (nothing known, every name pending),
/// *pending* with a concrete name set (the first successful [`setup`] wins,
/// later calls are ignored), and *cleared*. Callers that need a name park
/// on [`wait_resolved`]; every state change bumps a watch channel so
/// waiters re-check instead of polling.
///
/// [`setup`]: InitializationList::setup
/// [`wait_resolved`]: InitializationList::wait_resolved
#[derive(Debug)]
pub struct InitializationList {
    phase: Mutex<Phase>,
    changed_tx: watch::Sender<u64>,
}

impl Default for InitializationList {
    fn default() -> Self {
        Self::new()
    }
}

impl InitializationList {
    /// Creates a barrier in the uninitialized phase.
    pub fn new() -> Self {
        let (changed_tx, _) = watch::channel(0);
        Self {
            phase: Mutex::new(Phase::Uninitialized),
            changed_tx,
        }
    }

    /// One-time setup with the names owned elsewhere in the cluster.
    ///
    /// An empty list clears the barrier immediately. Returns false when a
    /// previous setup already won.
    pub fn setup<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut phase = self.phase.lock();
        if !matches!(*phase, Phase::Uninitialized) {
            return false;
        }
        let pending: HashSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();
        *phase = if pending.is_empty() {
            Phase::Cleared
        } else {
            Phase::Pending(pending)
        };
        drop(phase);
        self.bump();
        true
    }

    /// Resolves one pending name. Clears the barrier once the set empties.
    ///
    /// Returns true when the name was in the pending set.
    pub fn remove(&self, name: &str) -> bool {
        let mut phase = self.phase.lock();
        let removed = match &mut *phase {
            Phase::Pending(pending) => {
                let removed = pending.remove(&name.to_lowercase());
                if pending.is_empty() {
                    *phase = Phase::Cleared;
                }
                removed
            }
            _ => false,
        };
        drop(phase);
        self.bump();
        removed
    }

    /// Ends the bootstrap unconditionally; every name is resolved.
    pub fn clear(&self) {
        *self.phase.lock() = Phase::Cleared;
        self.bump();
    }

    /// True while the barrier would hold back an operation on `name`:
    /// before any setup, or while the name sits in the pending set.
    pub fn contains_or_not_init(&self, name: &str) -> bool {
        match &*self.phase.lock() {
            Phase::Uninitialized => true,
            Phase::Pending(pending) => pending.contains(&name.to_lowercase()),
            Phase::Cleared => false,
        }
    }

    /// True only when a concrete pending set names `name`, meaning a peer
    /// is known to own it.
    pub fn is_known_pending(&self, name: &str) -> bool {
        match &*self.phase.lock() {
            Phase::Pending(pending) => pending.contains(&name.to_lowercase()),
            _ => false,
        }
    }

    /// True once a setup (or clear) happened.
    pub fn is_set_up(&self) -> bool {
        !matches!(*self.phase.lock(), Phase::Uninitialized)
    }

    /// True once the barrier is cleared and the node is live.
    pub fn is_cleared(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Cleared)
    }

    /// Suspends until `name` is resolved (or the whole barrier clears),
    /// bounded by `wait`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InitializationTimeout`] when the bound
    /// elapses first.
    pub async fn wait_resolved(&self, name: &str, wait: Duration) -> Result<()> {
        let mut changed_rx = self.changed_tx.subscribe();
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if !self.contains_or_not_init(name) {
                return Ok(());
            }
            let changed = changed_rx.changed();
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return Err(RegistryError::InitializationTimeout);
            }
        }
    }

    fn bump(&self) {
        self.changed_tx.send_modify(|version| *version += 1);
    }
}
