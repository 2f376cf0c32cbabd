use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use dirk_core::{AnyUser, ServiceError, ServiceHandle, TaggedId, UserAndService};

/// Why a service slot of a [`MultiServicesUser`] holds no definitive answer.
#[derive(Debug, Clone, Error)]
pub enum SlotError {
    /// Several users of the same service belong to this identity. Sorted by
    /// tagged id.
    #[error("{} users of the same service match this identity: {}", .users.len(), join_ids(.users))]
    TooManyUsers { users: Vec<UserAndService> },

    /// Every error collected for this slot, oldest first. Never empty.
    #[error("{}", join_errors(.0))]
    Fetch(Vec<Arc<ServiceError>>),
}

fn join_ids(users: &[UserAndService]) -> String {
    users
        .iter()
        .map(|u| u.tagged_id().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_errors(errors: &[Arc<ServiceError>]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl SlotError {
    pub fn candidates(&self) -> Vec<TaggedId> {
        match self {
            SlotError::TooManyUsers { users } => users.iter().map(|u| u.tagged_id().clone()).collect(),
            SlotError::Fetch(_) => Vec::new(),
        }
    }

    /// Most recent underlying service error, if any.
    pub fn last_error(&self) -> Option<&ServiceError> {
        match self {
            SlotError::TooManyUsers { .. } => None,
            SlotError::Fetch(errors) => errors.last().map(Arc::as_ref),
        }
    }

    pub fn is_too_many_users(&self) -> bool {
        match self {
            SlotError::TooManyUsers { .. } => true,
            SlotError::Fetch(errors) => errors.last().is_some_and(|e| e.is_too_many_users()),
        }
    }
}

/// Per-service outcome: `Ok(Some)` found, `Ok(None)` definitively absent.
pub type SlotResult = Result<Option<AnyUser>, SlotError>;

/// Errors that abort a whole reconciliation call.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The link graph reached a state its invariants rule out.
    #[error("internal reconciliation error: {message}")]
    Internal { message: String },

    #[error("probe task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ReconcileError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        ReconcileError::Internal {
            message: message.into(),
        }
    }
}

/// One reconciled identity: one result per service.
#[derive(Clone, Default)]
pub struct MultiServicesUser {
    slots: BTreeMap<ServiceHandle, SlotResult>,
}

impl MultiServicesUser {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_slots(slots: BTreeMap<ServiceHandle, SlotResult>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, service: &ServiceHandle) -> Option<&SlotResult> {
        self.slots.get(service)
    }

    pub fn get_by_tag(&self, tag: &str) -> Option<&SlotResult> {
        self.slots
            .iter()
            .find(|(service, _)| service.tag() == tag)
            .map(|(_, slot)| slot)
    }

    pub fn contains_service(&self, service: &ServiceHandle) -> bool {
        self.slots.contains_key(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceHandle> {
        self.slots.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServiceHandle, &SlotResult)> {
        self.slots.iter()
    }

    /// Tagged id of the user found for `tag`, if that slot holds one.
    pub fn found_tagged_id(&self, tag: &str) -> Option<TaggedId> {
        self.slots.iter().find_map(|(service, slot)| match slot {
            Ok(Some(user)) if service.tag() == tag => service.tagged_id(user).ok(),
            _ => None,
        })
    }
}

impl fmt::Debug for MultiServicesUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (service, slot) in &self.slots {
            match slot {
                Ok(Some(user)) => map.entry(&service.tag(), &service.describe(user)),
                Ok(None) => map.entry(&service.tag(), &"<absent>"),
                Err(e) => map.entry(&service.tag(), &format!("<error: {e}>")),
            };
        }
        map.finish()
    }
}
