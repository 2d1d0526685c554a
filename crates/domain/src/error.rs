//! Unified error types for the domain layer
//!
//! Provides a common error type used across all domain operations, enabling
//! consistent error handling without forcing adapters to use String or anyhow.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, rejected before any state mutation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found or not visible to the caller
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// A second action submission for the same (event, character) pair
    #[error("Action already submitted for character {character_id} on event {event_id}")]
    DuplicateAction {
        event_id: String,
        character_id: String,
    },

    /// A second loot roll from the same character for the same drop
    #[error("Roll already submitted for character {character_id} on loot {loot_id}")]
    DuplicateRoll {
        loot_id: String,
        character_id: String,
    },

    /// Loot drop already has an assignee
    #[error("Loot {0} is already assigned")]
    AlreadyAssigned(String),

    /// A character is already committed to another active session
    #[error("Character {0} is already in an active session")]
    AlreadyActive(String),

    /// Operation preconditions on aggregate state are violated
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller lacks the role the operation requires
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Mission/event configuration is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DomainError {
    /// Creates a validation error for malformed input.
    ///
    /// Use this when input fails before touching aggregate state:
    /// unknown action types, roll kinds outside NEED/GREED, empty
    /// party lists, weights below 1.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a permission error
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for the state-conflict family (duplicate submissions,
    /// double assignment, invalid transitions). These are surfaced to the
    /// caller as no-op failures and never retried automatically.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateAction { .. }
                | Self::DuplicateRoll { .. }
                | Self::AlreadyAssigned(_)
                | Self::AlreadyActive(_)
                | Self::InvalidState(_)
        )
    }
}
