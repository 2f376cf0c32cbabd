use thiserror::Error;

use crate::tagged_id::TaggedIdError;

/// Errors a [`UserService`](crate::UserService) adapter may return.
///
/// [`ServiceError::CannotInferUserIdFromOtherUser`] is the one kind the
/// reconciliation algorithms treat specially: it means "no link from here",
/// never a failure of the whole operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The foreign user lacks what this service needs to compute its id.
    #[error("cannot infer user id from other user")]
    CannotInferUserIdFromOtherUser,

    /// More than one user matched a lookup that must be unique.
    #[error("too many users returned by service '{service}': {}", .ids.join(", "))]
    TooManyUsersFromApi { service: String, ids: Vec<String> },

    #[error("invalid user id '{value}' for service '{service}': {reason}")]
    InvalidUserId {
        service: String,
        value: String,
        reason: String,
    },

    /// A user of another concrete type was handed to this service.
    #[error("user does not belong to service '{service}'")]
    UserTypeMismatch { service: String },

    #[error("service '{service}' does not support persistent ids")]
    NoPersistentId { service: String },

    #[error(transparent)]
    TaggedId(#[from] TaggedIdError),

    /// Backend / network failure. Opaque to the core.
    #[error("service '{service}' transport error: {source}")]
    Transport {
        service: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    pub fn is_cannot_infer_user_id(&self) -> bool {
        matches!(self, ServiceError::CannotInferUserIdFromOtherUser)
    }

    pub fn is_too_many_users(&self) -> bool {
        matches!(self, ServiceError::TooManyUsersFromApi { .. })
    }

    pub fn transport(service: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ServiceError::Transport {
            service: service.into(),
            source: source.into(),
        }
    }
}
