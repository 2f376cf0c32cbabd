use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use dirk_core::{AnyUser, PropertySet, ServiceError, ServiceHandle, UserAndService};

use crate::{merge, MultiServicesUser, ReconcileError, SlotError};

type Probe = Result<Option<AnyUser>, ServiceError>;
type Accumulated = Result<Option<AnyUser>, Vec<Arc<ServiceError>>>;

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

/// Single-seed discovery.
///
/// Each round probes every target service concurrently from the current
/// source user. Services whose last failure was an inability to infer an id
/// are retried in the next round, from a user found in a service not yet used
/// as a source (first in tag order). Other failures are not retried. Stops
/// when nothing is left to retry or no new source exists; at most one round
/// per target service.
///
/// Every target service gets a slot. A found result is never replaced; errors
/// for a slot accumulate across rounds.
pub async fn fetch(
    seed: &UserAndService,
    services: &BTreeSet<ServiceHandle>,
    properties: Option<&PropertySet>,
) -> Result<MultiServicesUser, ReconcileError> {
    let properties = properties.cloned().map(Arc::new);
    let mut results: BTreeMap<ServiceHandle, Accumulated> = BTreeMap::new();
    let mut tried: BTreeSet<ServiceHandle> = BTreeSet::new();
    let mut source = seed.clone();
    let mut targets = services.clone();
    let mut round = 0usize;

    while !targets.is_empty() {
        round += 1;
        debug!(round, source = %source, targets = targets.len(), "fetch round");

        for (service, probe) in probe_round(&source, &targets, properties.as_ref()).await? {
            accumulate(&mut results, service, probe);
        }

        // 1) Services to retry: no success yet, and the last failure says
        //    the previous source lacked the data to infer an id.
        let to_fetch: BTreeSet<ServiceHandle> = targets
            .iter()
            .filter(|service| match results.get(*service) {
                Some(Ok(_)) => false,
                Some(Err(errors)) => errors
                    .last()
                    .is_some_and(|e| e.is_cannot_infer_user_id()),
                None => {
                    error!(service = %service, "no result for a probed service");
                    true
                }
            })
            .cloned()
            .collect();

        // 2) Next source: a found user whose service has not been a source yet.
        let next = results.iter().find_map(|(service, result)| match result {
            Ok(Some(user)) if !tried.contains(service) => Some((service.clone(), user.clone())),
            _ => None,
        });

        let Some((service, user)) = next else {
            break;
        };
        if to_fetch.is_empty() {
            break;
        }
        tried.insert(service.clone());
        source = UserAndService::new(user, service).map_err(|e| {
            ReconcileError::internal(format!("found user does not belong to its service: {e}"))
        })?;
        targets = to_fetch;
    }

    info!(seed = %seed, rounds = round, services = services.len(), "fetch done");
    Ok(MultiServicesUser::from_slots(
        results
            .into_iter()
            .map(|(service, result)| (service, result.map_err(SlotError::Fetch)))
            .collect(),
    ))
}

async fn probe_round(
    source: &UserAndService,
    targets: &BTreeSet<ServiceHandle>,
    properties: Option<&Arc<PropertySet>>,
) -> Result<BTreeMap<ServiceHandle, Probe>, ReconcileError> {
    let mut set = JoinSet::new();
    for service in targets {
        let source = source.clone();
        let service = service.clone();
        let properties = properties.cloned();
        set.spawn(async move {
            let probe = source.fetch_in(&service, properties.as_deref()).await;
            (service, probe)
        });
    }

    let mut out = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        let (service, probe) = joined?;
        if out.insert(service.clone(), probe).is_some() {
            return Err(ReconcileError::internal(format!(
                "service '{service}' probed twice in one round"
            )));
        }
    }
    Ok(out)
}

fn accumulate(results: &mut BTreeMap<ServiceHandle, Accumulated>, service: ServiceHandle, probe: Probe) {
    let merged = match (results.remove(&service), probe) {
        (None, probe) => probe.map_err(|e| vec![Arc::new(e)]),
        (Some(Ok(current)), Ok(_)) => {
            warn!(service = %service, "user fetched twice for one service; keeping the first");
            Ok(current)
        }
        (Some(Ok(current)), Err(e)) => {
            error!(service = %service, error = %e, "new failure for an already fetched service; keeping the success");
            Ok(current)
        }
        (Some(Err(_)), Ok(found)) => Ok(found),
        (Some(Err(mut errors)), Err(e)) => {
            errors.push(Arc::new(e));
            Err(errors)
        }
    };
    results.insert(service, merged);
}

// ---------------------------------------------------------------------------
// fetch_all
// ---------------------------------------------------------------------------

/// Result of [`fetch_all`].
#[derive(Debug, Default)]
pub struct FetchAllOutcome {
    pub users: Vec<MultiServicesUser>,
    /// Services whose listing failed. They are excluded from the valid
    /// services of the merge.
    pub fetch_errors: BTreeMap<ServiceHandle, ServiceError>,
}

/// Every user listed by a set of services, bound to its service.
#[derive(Debug, Default)]
pub struct Listing {
    pub users: Vec<UserAndService>,
    pub fetch_errors: BTreeMap<ServiceHandle, ServiceError>,
}

impl Listing {
    /// Services that listed successfully.
    pub fn listed_services<'a>(
        &'a self,
        services: &'a BTreeSet<ServiceHandle>,
    ) -> impl Iterator<Item = &'a ServiceHandle> + 'a {
        services.iter().filter(|s| !self.fetch_errors.contains_key(*s))
    }
}

/// Lists every service concurrently. A listing failure, or a listed user
/// that cannot be bound to its service, is a fetch error for that service.
pub async fn list_all(
    services: &BTreeSet<ServiceHandle>,
    properties: Option<&PropertySet>,
    include_suspended: bool,
) -> Result<Listing, ReconcileError> {
    let properties = properties.cloned().map(Arc::new);
    let mut set = JoinSet::new();
    for service in services {
        let service = service.clone();
        let properties = properties.clone();
        set.spawn(async move {
            let listed = service
                .list_users(include_suspended, properties.as_deref())
                .await;
            (service, listed)
        });
    }

    let mut listing = Listing::default();
    while let Some(joined) = set.join_next().await {
        let (service, listed) = joined?;
        let bound = listed.and_then(|users| {
            users
                .into_iter()
                .map(|user| UserAndService::new(user, service.clone()))
                .collect::<Result<Vec<_>, _>>()
        });
        match bound {
            Ok(bound) => {
                debug!(service = %service, users = bound.len(), "listed");
                listing.users.extend(bound);
            }
            Err(e) => {
                warn!(service = %service, error = %e, "listing failed");
                listing.fetch_errors.insert(service, e);
            }
        }
    }
    Ok(listing)
}

/// Lists every service, then merges everything listed. Services whose listing
/// failed are not valid services of the merge.
pub async fn fetch_all(
    services: &BTreeSet<ServiceHandle>,
    properties: Option<&PropertySet>,
    include_suspended: bool,
) -> Result<FetchAllOutcome, ReconcileError> {
    let listing = list_all(services, properties, include_suspended).await?;
    let valid: BTreeSet<ServiceHandle> = listing.listed_services(services).cloned().collect();
    let users = merge(listing.users, Some(valid), false)?;
    Ok(FetchAllOutcome {
        users,
        fetch_errors: listing.fetch_errors,
    })
}
