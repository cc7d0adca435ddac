//! Error type shared by the domain services

use async_graphql::ErrorExtensions;
use thiserror::Error;

/// Result type alias for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Failure of a domain operation, with a stable machine code per variant.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Referenced entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// Caller is authenticated but not allowed to do this
    #[error("{0}")]
    Forbidden(String),

    /// Input failed validation
    #[error("{0}")]
    Validation(String),

    /// Would violate a uniqueness or exclusivity rule
    #[error("{0}")]
    Conflict(String),

    /// Entity is not in a state that allows the operation
    #[error("{0}")]
    InvalidState(String),

    /// Missing, invalid or revoked credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Storage failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Stable code exposed to API clients
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Validation(_) => "VALIDATION",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::InvalidState(_) => "INVALID_STATE",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::Database(_) | ServiceError::Internal(_) => "INTERNAL",
        }
    }
}

/// Repositories return `anyhow`; unique-constraint failures surface as conflicts.
impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<sqlx::Error>() {
            Ok(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                ServiceError::Conflict("A record with the same unique value already exists".into())
            }
            Ok(sqlx_err) => ServiceError::Database(sqlx_err),
            Err(err) => ServiceError::Internal(err),
        }
    }
}

impl From<ServiceError> for async_graphql::Error {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        if matches!(err, ServiceError::Database(_) | ServiceError::Internal(_)) {
            tracing::error!(error = %err, "Service failure");
        }
        async_graphql::Error::new(err.to_string()).extend_with(|_, e| e.set("code", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ServiceError::not_found("x").code(), "NOT_FOUND");
        assert_eq!(ServiceError::conflict("x").code(), "CONFLICT");
        assert_eq!(ServiceError::invalid_state("x").code(), "INVALID_STATE");
        assert_eq!(
            ServiceError::Internal(anyhow::anyhow!("boom")).code(),
            "INTERNAL"
        );
    }

    #[test]
    fn test_plain_anyhow_becomes_internal() {
        let err: ServiceError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    #[tokio::test]
    async fn test_unique_violation_becomes_conflict() {
        let db = crate::db::Database::connect_in_memory().await.unwrap();
        let catalog = db.catalog();
        catalog.create_genre("Poetry", "").await.unwrap();

        let err: ServiceError = catalog.create_genre("Poetry", "").await.unwrap_err().into();
        assert_eq!(err.code(), "CONFLICT");
    }
}
