//! Error types for team operations.

use thiserror::Error;

/// Errors that can occur while operating on a scrum team.
#[derive(Debug, Error)]
pub enum TeamError {
    /// The name is already taken by the scrum master, a member, or an observer.
    #[error("name already taken in team: {name}")]
    NameCollision { name: String },

    /// The team already has a scrum master.
    #[error("scrum master already set: {name}")]
    ScrumMasterAlreadySet { name: String },

    /// No participant with the given name.
    #[error("member not found: {name}")]
    MemberNotFound { name: String },

    /// The submitted estimate is not one of the available cards.
    #[error("estimate is not in the available deck: {estimate}")]
    EstimateNotAvailable { estimate: String },

    /// A cast vote cannot be changed for the rest of the round.
    #[error("member has already estimated this round: {name}")]
    AlreadyEstimated { name: String },

    /// Observers watch; they do not vote.
    #[error("observer cannot estimate: {name}")]
    ObserverCannotEstimate { name: String },

    /// Operation not valid in the current team state.
    #[error("invalid state transition: cannot {action} when state is {current_state}")]
    InvalidStateTransition {
        action: String,
        current_state: String,
    },

    /// An estimate result was handed duplicate participants at construction.
    #[error("duplicate result participant: {name}")]
    DuplicateParticipant { name: String },

    /// An estimate result is read-only once the round finished.
    #[error("estimate result is read-only after finalization")]
    ResultReadOnly,

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}

/// A specialized Result type for team operations.
pub type Result<T> = std::result::Result<T, TeamError>;
