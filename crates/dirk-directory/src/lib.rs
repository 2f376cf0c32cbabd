//! dirk-directory
//!
//! Deterministic in-memory directory backed by a user snapshot (inline
//! config records or a JSON users file). Implements
//! [`dirk_core::UserService`] so the reconciliation algorithms can run
//! against exported directory data without any network access.
//!
//! - ids are validated and canonicalised per [`dirk_config::IdKind`]
//! - foreign users are mapped through the configured id builders, in order
//! - email ids on alias domains are alternates of the main-domain form

mod id;
mod snapshot;
mod user;

pub use id::canonical_id;
pub use snapshot::SnapshotDirectory;
pub use user::DirectoryUser;
