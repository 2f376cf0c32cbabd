//! dirk-core
//!
//! Identity model shared by every directory adapter and by the
//! reconciliation engine.
//!
//! - [`TaggedId`]: `(service tag, service-local id)` join key
//! - [`User`] / [`UserWrapper`] / [`AnyUser`]: typed, generic and erased users
//! - [`UserService`] / [`DynUserService`] / [`ServiceHandle`]: the adapter capability
//! - [`UserAndService`]: a user bound to the service that produced it
//! - [`UserIdBuilder`]: template based id inference
//!
//! Pure types and traits. No IO of its own; adapters own their clients.

pub mod dn;
pub mod email;
mod error;
pub mod id_builder;
mod service;
mod tagged_id;
pub mod user;
mod user_and_service;

pub use dn::{DistinguishedName, DnError};
pub use email::{Email, EmailError};
pub use error::ServiceError;
pub use id_builder::{IdBuilderError, UserIdBuilder};
pub use service::{AlternateIds, DynUserService, PersistentIdOf, ServiceHandle, UserIdOf, UserService};
pub use tagged_id::{TaggedId, TaggedIdError, TAGGED_ID_SEPARATOR};
pub use user::{AnyUser, PropertySet, PropertyValue, User, UserProperty, UserWrapper};
pub use user_and_service::UserAndService;
