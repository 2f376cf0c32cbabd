//! Directory service capability.
//!
//! [`UserService`] is what a backend adapter implements, with its own user
//! and id types. [`DynUserService`] is the object-safe view the
//! reconciliation core works with; it is implemented for every
//! `UserService`, and this blanket impl is the only place erased users are
//! downcast back to concrete ones.
//!
//! `logical_user_id` and everything built on it are synchronous and must not
//! do I/O: they run inside concurrent fan-outs and for every node of a merge.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ServiceError;
use crate::tagged_id::TaggedId;
use crate::user::{AnyUser, PropertySet, User, UserWrapper};

/// Id type of a service's users.
pub type UserIdOf<S> = <<S as UserService>::User as User>::Id;
/// Persistent id type of a service's users.
pub type PersistentIdOf<S> = <<S as UserService>::User as User>::PersistentId;

/// A canonical id plus equivalent ids denoting the same person in one
/// service (e.g. the same mailbox on an alias domain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateIds<Id: Eq + Hash> {
    pub regular: Id,
    pub other: HashSet<Id>,
}

impl<Id: Eq + Hash> AlternateIds<Id> {
    pub fn only(regular: Id) -> Self {
        Self {
            regular,
            other: HashSet::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed capability
// ---------------------------------------------------------------------------

#[async_trait]
pub trait UserService: fmt::Debug + Send + Sync + 'static {
    type User: User;

    /// Tag of this service instance. Unique across a deployment, must not
    /// contain `:`.
    fn id(&self) -> &str;

    /// Printable form of a user, mostly for logs.
    fn short_description(&self, user: &Self::User) -> String {
        self.string_from_user_id(user.id())
    }

    /// Must round-trip with [`UserService::user_id_from_string`].
    fn string_from_user_id(&self, id: &UserIdOf<Self>) -> String;
    fn user_id_from_string(&self, s: &str) -> Result<UserIdOf<Self>, ServiceError>;

    fn string_from_persistent_id(&self, id: &PersistentIdOf<Self>) -> String;
    fn persistent_id_from_string(&self, s: &str) -> Result<PersistentIdOf<Self>, ServiceError>;

    /// Service-specific rendering stored as the wrapped user's payload.
    fn json_from_user(&self, user: &Self::User) -> Result<Value, ServiceError>;

    /// Only return alternates the backend does not resolve natively.
    fn alternate_ids(&self, id: &UserIdOf<Self>) -> AlternateIds<UserIdOf<Self>> {
        AlternateIds::only(id.clone())
    }

    /// The id this service would give to the person described by `user`.
    ///
    /// Pure inference: no I/O. Fails with
    /// [`ServiceError::CannotInferUserIdFromOtherUser`] when `user` lacks the
    /// needed data. A user wrapped by this very service should map back to
    /// its own id.
    fn logical_user_id(&self, user: &UserWrapper) -> Result<UserIdOf<Self>, ServiceError>;

    /// `Ok(None)` when nothing matches; [`ServiceError::TooManyUsersFromApi`]
    /// when several do. Alternate ids must be searched too.
    async fn existing_user_from_id(
        &self,
        id: &UserIdOf<Self>,
        properties: Option<&PropertySet>,
    ) -> Result<Option<Self::User>, ServiceError>;

    async fn existing_user_from_persistent_id(
        &self,
        id: &PersistentIdOf<Self>,
        properties: Option<&PropertySet>,
    ) -> Result<Option<Self::User>, ServiceError>;

    async fn list_all_users(
        &self,
        include_suspended: bool,
        properties: Option<&PropertySet>,
    ) -> Result<Vec<Self::User>, ServiceError>;

    // -----------------------------------------------------------------------
    // Derived helpers
    // -----------------------------------------------------------------------

    fn tagged_id_from_user_id(&self, id: &UserIdOf<Self>) -> Result<TaggedId, ServiceError> {
        Ok(TaggedId::new(self.id(), self.string_from_user_id(id))?)
    }

    fn tagged_id_from_persistent_id(
        &self,
        id: &PersistentIdOf<Self>,
    ) -> Result<TaggedId, ServiceError> {
        Ok(TaggedId::new(self.id(), self.string_from_persistent_id(id))?)
    }

    fn wrapped_user_from_user(&self, user: &Self::User) -> Result<UserWrapper, ServiceError> {
        let mut wrapped = UserWrapper::new(self.tagged_id_from_user_id(user.id())?);
        wrapped.persistent_id = user
            .persistent_id()
            .map(|p| self.tagged_id_from_persistent_id(p))
            .transpose()?;
        wrapped.copy_standard_non_id_properties(user);
        wrapped.underlying_user = Some(self.json_from_user(user)?);
        Ok(wrapped)
    }

    /// Every tagged id this service could hold for the person behind `other`:
    /// the inferred regular id and all its alternates.
    fn all_logical_tagged_ids(&self, other: &UserWrapper) -> Result<BTreeSet<TaggedId>, ServiceError> {
        let ids = self.alternate_ids(&self.logical_user_id(other)?);
        std::iter::once(&ids.regular)
            .chain(ids.other.iter())
            .map(|id| self.tagged_id_from_user_id(id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Erased capability
// ---------------------------------------------------------------------------

/// Object-safe view of a [`UserService`].
#[async_trait]
pub trait DynUserService: fmt::Debug + Send + Sync {
    /// Same as [`UserService::id`].
    fn tag(&self) -> &str;

    /// Errors with [`ServiceError::UserTypeMismatch`] for a foreign user.
    fn tagged_id(&self, user: &AnyUser) -> Result<TaggedId, ServiceError>;
    fn tagged_persistent_id(&self, user: &AnyUser) -> Result<Option<TaggedId>, ServiceError>;
    fn wrapped_user(&self, user: &AnyUser) -> Result<UserWrapper, ServiceError>;
    fn describe(&self, user: &AnyUser) -> String;

    /// See [`UserService::all_logical_tagged_ids`].
    fn logical_tagged_ids(&self, other: &UserWrapper) -> Result<BTreeSet<TaggedId>, ServiceError>;

    /// Infers this service's id for `other`, then fetches it.
    async fn existing_user_from_wrapped(
        &self,
        other: &UserWrapper,
        properties: Option<&PropertySet>,
    ) -> Result<Option<AnyUser>, ServiceError>;

    /// Fetches by the string form of one of this service's ids.
    async fn existing_user_from_id_string(
        &self,
        id: &str,
        properties: Option<&PropertySet>,
    ) -> Result<Option<AnyUser>, ServiceError>;

    async fn list_users(
        &self,
        include_suspended: bool,
        properties: Option<&PropertySet>,
    ) -> Result<Vec<AnyUser>, ServiceError>;
}

fn downcast<'a, S: UserService>(service: &S, user: &'a AnyUser) -> Result<&'a S::User, ServiceError> {
    user.downcast_ref::<S::User>()
        .ok_or_else(|| ServiceError::UserTypeMismatch {
            service: UserService::id(service).to_string(),
        })
}

#[async_trait]
impl<S: UserService> DynUserService for S {
    fn tag(&self) -> &str {
        UserService::id(self)
    }

    fn tagged_id(&self, user: &AnyUser) -> Result<TaggedId, ServiceError> {
        self.tagged_id_from_user_id(downcast(self, user)?.id())
    }

    fn tagged_persistent_id(&self, user: &AnyUser) -> Result<Option<TaggedId>, ServiceError> {
        downcast(self, user)?
            .persistent_id()
            .map(|p| self.tagged_id_from_persistent_id(p))
            .transpose()
    }

    fn wrapped_user(&self, user: &AnyUser) -> Result<UserWrapper, ServiceError> {
        self.wrapped_user_from_user(downcast(self, user)?)
    }

    fn describe(&self, user: &AnyUser) -> String {
        match downcast(self, user) {
            Ok(u) => format!("{}:{}", UserService::id(self), self.short_description(u)),
            Err(_) => format!("{}:<foreign user {user:?}>", UserService::id(self)),
        }
    }

    fn logical_tagged_ids(&self, other: &UserWrapper) -> Result<BTreeSet<TaggedId>, ServiceError> {
        UserService::all_logical_tagged_ids(self, other)
    }

    async fn existing_user_from_wrapped(
        &self,
        other: &UserWrapper,
        properties: Option<&PropertySet>,
    ) -> Result<Option<AnyUser>, ServiceError> {
        let id = self.logical_user_id(other)?;
        Ok(self
            .existing_user_from_id(&id, properties)
            .await?
            .map(AnyUser::new))
    }

    async fn existing_user_from_id_string(
        &self,
        id: &str,
        properties: Option<&PropertySet>,
    ) -> Result<Option<AnyUser>, ServiceError> {
        let id = self.user_id_from_string(id)?;
        Ok(self
            .existing_user_from_id(&id, properties)
            .await?
            .map(AnyUser::new))
    }

    async fn list_users(
        &self,
        include_suspended: bool,
        properties: Option<&PropertySet>,
    ) -> Result<Vec<AnyUser>, ServiceError> {
        Ok(UserService::list_all_users(self, include_suspended, properties)
            .await?
            .into_iter()
            .map(AnyUser::new)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Service handle
// ---------------------------------------------------------------------------

/// Shared, hashable reference to a service. Equality, ordering and hashing
/// go through the service tag only.
#[derive(Clone)]
pub struct ServiceHandle(Arc<dyn DynUserService>);

impl ServiceHandle {
    pub fn new<S: UserService>(service: S) -> Self {
        Self(Arc::new(service))
    }

    pub fn tag(&self) -> &str {
        self.0.tag()
    }
}

impl<S: UserService> From<Arc<S>> for ServiceHandle {
    fn from(service: Arc<S>) -> Self {
        Self(service)
    }
}

impl Deref for ServiceHandle {
    type Target = dyn DynUserService;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceHandle({})", self.tag())
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl PartialEq for ServiceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag()
    }
}

impl Eq for ServiceHandle {}

impl PartialOrd for ServiceHandle {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceHandle {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tag().cmp(other.tag())
    }
}

impl Hash for ServiceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
    }
}
