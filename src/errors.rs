//! Unified error type for the workflow engine.
//!
//! Every condition the core can hit is an expected, caller-recoverable outcome and is
//! returned as a variant of [`Error`]. The API layer maps these to user-facing messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Scope item {scope_item_id}: received at site ({received_at_site}) exceeds total ({total})")]
    ReceivedExceedsTotal {
        scope_item_id: i64,
        received_at_site: i64,
        total: i64,
    },

    #[error("Scope item {scope_item_id}: completed ({completed}) exceeds received at site ({received_at_site})")]
    CompletedExceedsReceived {
        scope_item_id: i64,
        completed: i64,
        received_at_site: i64,
    },

    #[error("Scope item {scope_item_id}: {field} cannot be negative ({value})")]
    NegativeQuantity {
        scope_item_id: i64,
        field: &'static str,
        value: i64,
    },

    #[error("Actor {actor_id} may not {operation} on project {project_id}")]
    AuthorizationDenied {
        actor_id: String,
        project_id: i64,
        operation: String,
    },

    #[error("Supervisor {actor_id} must complete the project {project_id} confirmation first")]
    ConfirmationRequired { actor_id: String, project_id: i64 },

    #[error("Confirmation incomplete, outstanding: {}", missing.join(", "))]
    ConfirmationIncomplete { missing: Vec<String> },

    #[error("Invalid transition for {entity} {id}: cannot {action} from {from} ({reason})")]
    InvalidTransition {
        entity: &'static str,
        id: i64,
        from: String,
        action: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Concurrent modification: {message}")]
    Conflict { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// True for the quantity-ledger invariant family; the caller should resubmit corrected values.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::ReceivedExceedsTotal { .. }
                | Self::CompletedExceedsReceived { .. }
                | Self::NegativeQuantity { .. }
        )
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
