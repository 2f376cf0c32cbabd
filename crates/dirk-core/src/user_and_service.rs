//! A user bound to the service that produced it.

use std::fmt;

use crate::error::ServiceError;
use crate::service::ServiceHandle;
use crate::tagged_id::TaggedId;
use crate::user::{AnyUser, PropertySet, User, UserWrapper};

/// One concrete user value plus the service it came from.
///
/// The tagged id is computed once, at construction; construction fails if the
/// user is not of the service's user type.
#[derive(Clone)]
pub struct UserAndService {
    user: AnyUser,
    service: ServiceHandle,
    tagged_id: TaggedId,
}

impl UserAndService {
    pub fn new(user: AnyUser, service: ServiceHandle) -> Result<Self, ServiceError> {
        let tagged_id = service.tagged_id(&user)?;
        Ok(Self {
            user,
            service,
            tagged_id,
        })
    }

    /// Convenience for adapters holding a concrete user.
    pub fn from_user<U: User>(user: U, service: ServiceHandle) -> Result<Self, ServiceError> {
        Self::new(AnyUser::new(user), service)
    }

    pub fn user(&self) -> &AnyUser {
        &self.user
    }

    pub fn service(&self) -> &ServiceHandle {
        &self.service
    }

    pub fn service_tag(&self) -> &str {
        self.tagged_id.tag()
    }

    pub fn tagged_id(&self) -> &TaggedId {
        &self.tagged_id
    }

    pub fn tagged_persistent_id(&self) -> Result<Option<TaggedId>, ServiceError> {
        self.service.tagged_persistent_id(&self.user)
    }

    pub fn wrapped_user(&self) -> Result<UserWrapper, ServiceError> {
        self.service.wrapped_user(&self.user)
    }

    /// Looks up, in `service`, the user this one logically corresponds to.
    ///
    /// Inference errors (notably
    /// [`ServiceError::CannotInferUserIdFromOtherUser`]) are returned as is so
    /// callers can tell them apart from lookup failures.
    pub async fn fetch_in(
        &self,
        service: &ServiceHandle,
        properties: Option<&PropertySet>,
    ) -> Result<Option<AnyUser>, ServiceError> {
        let wrapped = self.wrapped_user()?;
        service.existing_user_from_wrapped(&wrapped, properties).await
    }
}

impl fmt::Debug for UserAndService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAndService")
            .field("tagged_id", &self.tagged_id)
            .field("user", &self.user)
            .finish()
    }
}

impl fmt::Display for UserAndService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tagged_id, f)
    }
}
