//! Domain error types

use mediadesk_auth::AuthError;
use thiserror::Error;

use crate::request_number::{AllocationError, StoreError};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("This username is already taken. Please choose another one.")]
    UsernameTaken,

    #[error("Invalid username/phone or password")]
    InvalidCredentials,

    #[error("Not found")]
    NotFound,

    #[error("You do not have access to this resource")]
    Forbidden,

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Password error: {0}")]
    Password(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        CoreError::Allocation(AllocationError::Store(e))
    }
}

impl From<AuthError> for CoreError {
    fn from(e: AuthError) -> Self {
        CoreError::Password(e.to_string())
    }
}

impl CoreError {
    /// Returns true if this error should be logged as a warning vs error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_)
                | CoreError::UsernameTaken
                | CoreError::InvalidCredentials
                | CoreError::NotFound
                | CoreError::Forbidden
                | CoreError::Allocation(AllocationError::Store(StoreError::SlotTaken))
        )
    }

    /// Worth retrying the same call later
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Allocation(e) => e.is_transient(),
            CoreError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// Get status code for HTTP response
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::InvalidCredentials => 401,
            CoreError::Forbidden => 403,
            CoreError::NotFound => 404,
            CoreError::UsernameTaken => 409,
            CoreError::Allocation(e) => match e {
                AllocationError::Conflict { .. } | AllocationError::PrefixExhausted { .. } => 503,
                AllocationError::Store(StoreError::Unavailable(_)) => 503,
                AllocationError::Store(StoreError::SlotTaken) => 409,
                AllocationError::Store(StoreError::Backend(_)) => 500,
            },
            CoreError::UploadFailed(_) => 502,
            CoreError::Database(sqlx::Error::PoolTimedOut) => 503,
            CoreError::Password(_) | CoreError::Database(_) => 500,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::UsernameTaken => "username_taken",
            CoreError::InvalidCredentials => "invalid_credentials",
            CoreError::NotFound => "not_found",
            CoreError::Forbidden => "forbidden",
            CoreError::Allocation(e) => match e {
                AllocationError::Conflict { .. } => "allocation_conflict",
                AllocationError::PrefixExhausted { .. } => "prefix_exhausted",
                AllocationError::Store(StoreError::Unavailable(_)) => "store_unavailable",
                AllocationError::Store(StoreError::SlotTaken) => "slot_taken",
                AllocationError::Store(StoreError::Backend(_)) => "internal_error",
            },
            CoreError::UploadFailed(_) => "upload_failed",
            CoreError::Database(sqlx::Error::PoolTimedOut) => "store_unavailable",
            CoreError::Password(_) | CoreError::Database(_) => "internal_error",
        }
    }

    /// Text that is safe to show to the caller
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Allocation(AllocationError::Conflict { .. }) => {
                "Too many requests were submitted at the same moment. Please try again.".to_string()
            }
            CoreError::Allocation(AllocationError::PrefixExhausted { .. }) => {
                "Request numbers for this minute are used up. Please try again in a minute.".to_string()
            }
            CoreError::Allocation(AllocationError::Store(StoreError::Unavailable(_)))
            | CoreError::Database(sqlx::Error::PoolTimedOut) => {
                "Service temporarily unavailable. Please try again.".to_string()
            }
            CoreError::UploadFailed(_) => "The file could not be uploaded. Please try again.".to_string(),
            CoreError::Password(_)
            | CoreError::Database(_)
            | CoreError::Allocation(AllocationError::Store(StoreError::Backend(_))) => {
                "Unable to process request. Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_taken_maps_to_conflict_with_message() {
        let err = CoreError::from(StoreError::SlotTaken);
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.code(), "slot_taken");
        assert!(err.is_user_error());
        assert_eq!(
            err.public_message(),
            "You already have a request for the same date, time and location."
        );
    }

    #[test]
    fn test_allocation_failures_are_transient_503() {
        let conflict = CoreError::from(AllocationError::Conflict {
            prefix: "20250314_0915".into(),
            attempts: 5,
        });
        assert_eq!(conflict.status_code(), 503);
        assert!(conflict.is_transient());
        assert!(!conflict.is_user_error());

        let unavailable = CoreError::from(StoreError::Unavailable("pool timed out".into()));
        assert_eq!(unavailable.status_code(), 503);
        assert_eq!(unavailable.code(), "store_unavailable");
        assert!(!unavailable.public_message().contains("pool"));
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = CoreError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.code(), "internal_error");
        assert!(!err.public_message().contains("RowNotFound"));
    }

    #[test]
    fn test_user_facing_statuses() {
        assert_eq!(CoreError::Validation("x".into()).status_code(), 400);
        assert_eq!(CoreError::InvalidCredentials.status_code(), 401);
        assert_eq!(CoreError::Forbidden.status_code(), 403);
        assert_eq!(CoreError::NotFound.status_code(), 404);
        assert_eq!(CoreError::UsernameTaken.status_code(), 409);
        assert_eq!(CoreError::UploadFailed("x".into()).status_code(), 502);
    }
}
