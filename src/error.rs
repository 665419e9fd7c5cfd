//! Error types for devswipe-feed

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Interaction already recorded: user {user_id} {interaction_type} item {item_id}")]
    DuplicateInteraction {
        user_id: i64,
        item_id: i64,
        interaction_type: String,
    },

    #[error("User {follower_id} already follows user {followee_id}")]
    AlreadyFollowing { follower_id: i64, followee_id: i64 },

    #[error("User {follower_id} does not follow user {followee_id}")]
    NotFollowing { follower_id: i64, followee_id: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Store unavailable: {0}")]
    TransientStore(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FeedError {
    /// Whether the error is a legitimate business outcome rather than a failure
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            FeedError::NotFound(_)
                | FeedError::DuplicateInteraction { .. }
                | FeedError::AlreadyFollowing { .. }
                | FeedError::NotFollowing { .. }
                | FeedError::Validation(_)
                | FeedError::Unauthorized(_)
                | FeedError::Unauthenticated
        )
    }
}

impl From<DieselError> for FeedError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => FeedError::NotFound("record not found".into()),
            other => FeedError::TransientStore(format!("Query failed: {}", other)),
        }
    }
}

impl From<diesel::r2d2::PoolError> for FeedError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        FeedError::TransientStore(format!("Failed to get connection: {}", e))
    }
}

/// True when a diesel error is a unique / primary key violation
pub fn is_unique_violation(e: &DieselError) -> bool {
    matches!(
        e,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_outcomes() {
        assert!(FeedError::NotFound("item 1".into()).is_business_outcome());
        assert!(FeedError::AlreadyFollowing { follower_id: 1, followee_id: 2 }.is_business_outcome());
        assert!(!FeedError::TransientStore("down".into()).is_business_outcome());
        assert!(!FeedError::Cancelled.is_business_outcome());
    }

    #[test]
    fn test_diesel_not_found_maps_to_not_found() {
        let err: FeedError = DieselError::NotFound.into();
        assert!(matches!(err, FeedError::NotFound(_)));
    }

    #[test]
    fn test_other_diesel_errors_are_transient() {
        let err: FeedError = DieselError::RollbackTransaction.into();
        assert!(matches!(err, FeedError::TransientStore(_)));
    }
}
