//! Per-round aggregate views.

use serde::{Deserialize, Serialize};

use crate::{names_match, Estimate, Result, TeamError};

/// Mapping of round participants to their submitted estimates.
///
/// Built with exactly the voting participants present when the round
/// started: members who join mid-round never enter it, members who leave
/// mid-round remain with no estimate. Read-only once finalized.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EstimateResult {
    items: Vec<(String, Option<Estimate>)>,
    read_only: bool,
}

impl EstimateResult {
    /// Creates a result skeleton for the given round participants.
    ///
    /// # Errors
    ///
    /// Returns an error when the same name (case-insensitive) appears twice.
    pub fn new<I>(participants: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut items: Vec<(String, Option<Estimate>)> = Vec::new();
        for name in participants {
            if items.iter().any(|(n, _)| names_match(n, &name)) {
                return Err(TeamError::DuplicateParticipant { name });
            }
            items.push((name, None));
        }
        Ok(Self {
            items,
            read_only: false,
        })
    }

    /// Rebuilds a result from snapshot data.
    pub fn from_items(items: Vec<(String, Option<Estimate>)>, read_only: bool) -> Result<Self> {
        let mut result = Self::new(items.iter().map(|(n, _)| n.clone()))?;
        for (name, estimate) in items {
            if let Some(estimate) = estimate {
                result.set(&name, estimate)?;
            }
        }
        result.read_only = read_only;
        Ok(result)
    }

    /// Records a participant's estimate.
    ///
    /// # Errors
    ///
    /// Fails once the result is finalized or when the name is not part of
    /// the round.
    pub fn set(&mut self, name: &str, estimate: Estimate) -> Result<()> {
        if self.read_only {
            return Err(TeamError::ResultReadOnly);
        }
        let slot = self
            .items
            .iter_mut()
            .find(|(n, _)| names_match(n, name))
            .ok_or_else(|| TeamError::MemberNotFound {
                name: name.to_string(),
            })?;
        slot.1 = Some(estimate);
        Ok(())
    }

    /// Returns the recorded estimate for a round participant, or `None` if
    /// the name is not part of the round.
    pub fn get(&self, name: &str) -> Option<Option<Estimate>> {
        self.items
            .iter()
            .find(|(n, _)| names_match(n, name))
            .map(|(_, e)| *e)
    }

    /// Returns true if the name belongs to this round.
    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|(n, _)| names_match(n, name))
    }

    /// Freezes the result; all later mutation fails.
    pub fn finalize(&mut self) {
        self.read_only = true;
    }

    /// Returns true once the result is frozen.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of round participants.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true when the round has no participants.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over `(name, estimate)` pairs in round-start order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<Estimate>)> {
        self.items.iter().map(|(n, e)| (n.as_str(), *e))
    }
}

/// Round progress for one participant, without exposing the vote value.
///
/// Lets a late joiner see how far the round is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateParticipantStatus {
    /// Name of the round participant.
    pub member_name: String,
    /// True once the participant has voted.
    pub estimated: bool,
}

impl EstimateParticipantStatus {
    /// Creates a status entry for a participant that has not voted yet.
    pub fn new(member_name: impl Into<String>) -> Self {
        Self {
            member_name: member_name.into(),
            estimated: false,
        }
    }
}
