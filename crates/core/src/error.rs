use crate::types::EntityId;

/// Domain-level error type shared across the workspace.
///
/// Synchronous failures (validation, not-found, queue-full) surface directly
/// to the API caller; asynchronous failures are never carried by this type —
/// they are recorded on the affected record instead.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The requested record does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound {
        entity: &'static str,
        id: EntityId,
    },

    /// A malformed create request; no record was created.
    #[error("{0}")]
    Validation(String),

    /// A state transition conflicted with the record's current status.
    #[error("{0}")]
    Conflict(String),

    /// The requested value is not available yet; the caller should retry.
    #[error("{0}")]
    NotReady(String),

    /// The pending-work queue for a resource kind is at capacity.
    #[error("{0}")]
    ResourceExhausted(String),

    /// An unexpected internal failure.
    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] with the given entity name.
    pub fn not_found(entity: &'static str, id: impl Into<EntityId>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
