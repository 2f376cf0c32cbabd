//! dirk-testkit
//!
//! Test doubles for the reconciliation engine: a scriptable directory
//! ([`ScriptedService`]) plus small helpers. Cross-crate scenarios live under
//! `tests/`.

mod scripted;

pub use scripted::{user_and_service, ScriptedService, ScriptedUser};

use std::collections::BTreeSet;

use dirk_core::ServiceHandle;

/// Collects handles into the ordered set the engine entry points take.
pub fn service_set<'a>(handles: impl IntoIterator<Item = &'a ServiceHandle>) -> BTreeSet<ServiceHandle> {
    handles.into_iter().cloned().collect()
}
