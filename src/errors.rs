use sea_orm::error::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy for the reservation engine.
///
/// Business-rule failures (insufficient stock, over-release, invalid status
/// transitions) are distinct variants so callers can render them to users;
/// they are returned, never panicked. `DatabaseError` and
/// `ConcurrencyConflict` are retryable with backoff; the engine already
/// performs one internal retry on `ConcurrencyConflict` before surfacing it.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Over-release: {0}")]
    OverRelease(String),

    #[error("Reservation {0} is already cancelled or expired")]
    AlreadyCancelled(Uuid),

    #[error("Reservation {0} is already fulfilled")]
    AlreadyFulfilled(Uuid),

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Order item {0} has no reservation")]
    NoReservation(Uuid),

    #[error("Concurrent modification: {0}")]
    ConcurrencyConflict(Uuid),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Helper used at call sites that map a `DbErr` explicitly.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Whether a caller may retry the failed operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::DatabaseError(_) | ServiceError::ConcurrencyConflict(_)
        )
    }

    /// Whether the error is an expected business outcome rather than a fault.
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InsufficientStock(_)
                | ServiceError::OverRelease(_)
                | ServiceError::AlreadyCancelled(_)
                | ServiceError::AlreadyFulfilled(_)
                | ServiceError::InvalidTransition { .. }
                | ServiceError::NoReservation(_)
                | ServiceError::ValidationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ServiceError::ConcurrencyConflict(Uuid::new_v4()).is_retryable());
        assert!(ServiceError::DatabaseError(DbErr::Custom("boom".into())).is_retryable());
        assert!(!ServiceError::InsufficientStock("short".into()).is_retryable());
        assert!(!ServiceError::NotFound("missing".into()).is_retryable());
    }

    #[test]
    fn business_error_classification() {
        assert!(ServiceError::OverRelease("too much".into()).is_business_error());
        assert!(ServiceError::InvalidTransition {
            from: "fulfilled".into(),
            to: "pending".into()
        }
        .is_business_error());
        assert!(!ServiceError::ConcurrencyConflict(Uuid::new_v4()).is_business_error());
    }
}
