//! dirk-reconcile
//!
//! Multi-service user reconciliation.
//!
//! - [`fetch`]: start from one known user, discover its counterparts service
//!   by service, rotating the probing origin through every user found
//! - [`fetch_all`]: list every service concurrently, then [`merge`]
//! - [`merge`]: partition a flat list of users into one
//!   [`MultiServicesUser`] per identity, through logical id inference only
//!
//! Merge is synchronous, deterministic and does no IO. Fetch fans out one
//! task per target service per round; dropping the returned future aborts
//! every in-flight probe.

mod fetch;
mod linked;
mod merge;
pub mod report;
mod types;

pub use fetch::{fetch, fetch_all, list_all, FetchAllOutcome, Listing};
pub use merge::merge;
pub use report::{FetchAllReport, MultiServicesUserReport, SlotReport};
pub use types::*;
