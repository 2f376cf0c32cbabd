use anyhow::Result;
use tracing::info;

use dirk_reconcile::{list_all, merge, FetchAllOutcome, FetchAllReport};

use super::{print_json, Session};

/// Lists every configured service, merges the listing and prints a
/// [`FetchAllReport`].
///
/// Valid services are the configured ones (all services when unset) minus
/// those whose listing failed.
pub async fn run(config_paths: &[String], allow_non_valid: bool) -> Result<()> {
    let session = Session::load(config_paths)?;
    let properties = session.properties();
    let allow_non_valid = allow_non_valid || session.config.reconcile.allow_non_valid_services;

    let listing = list_all(
        &session.services,
        properties.as_ref(),
        session.config.reconcile.include_suspended,
    )
    .await?;
    let valid = session.valid_services(listing.listed_services(&session.services));
    let users = merge(listing.users, Some(valid), allow_non_valid)?;
    info!(
        identities = users.len(),
        failed_services = listing.fetch_errors.len(),
        "merge complete"
    );

    let outcome = FetchAllOutcome {
        users,
        fetch_errors: listing.fetch_errors,
    };
    print_json(&FetchAllReport::from_outcome(&outcome))
}
