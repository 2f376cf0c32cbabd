use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use dirk_core::{ServiceHandle, UserAndService};

use crate::linked::{LinkedUser, LinkedUsers};
use crate::{MultiServicesUser, ReconcileError, SlotError, SlotResult};

/// Batch reconciliation.
///
/// Partitions `users_and_services` into one [`MultiServicesUser`] per
/// identity. Two users belong to the same identity iff a chain of logical id
/// inferences connects them, in either direction.
///
/// - duplicate tagged ids in the input are logged and ignored
/// - a service failing to infer an id for a user only means "no link"
/// - several users of one service in one identity give
///   [`SlotError::TooManyUsers`] for that slot
/// - every valid service gets a slot (`Ok(None)` when it has no user)
///
/// `valid_services` defaults to the services present in the input. Unless
/// `allow_non_valid_services` is set, identities without any user of a valid
/// service are dropped and slots of non-valid services are left out; those
/// users still take part in linking.
///
/// Output is sorted by each identity's smallest tagged id and does not depend
/// on input order.
pub fn merge(
    users_and_services: impl IntoIterator<Item = UserAndService>,
    valid_services: Option<BTreeSet<ServiceHandle>>,
    allow_non_valid_services: bool,
) -> Result<Vec<MultiServicesUser>, ReconcileError> {
    // 1) Nodes
    let mut graph = LinkedUsers::new();
    let mut services: BTreeSet<ServiceHandle> = BTreeSet::new();
    for user_and_service in users_and_services {
        let wrapped = match user_and_service.wrapped_user() {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(user = %user_and_service, error = %e, "cannot wrap user; it will only be linked to");
                None
            }
        };
        let service = user_and_service.service().clone();
        let tagged_id = user_and_service.tagged_id().clone();
        if !graph.insert(LinkedUser {
            user_and_service,
            wrapped,
        }) {
            warn!(%tagged_id, "user found more than once in merge input; ignoring duplicate");
            continue;
        }
        services.insert(service);
    }
    let valid_services = valid_services.unwrap_or_else(|| services.clone());

    // 2) Edges: every node against every service, its own included
    let mut links = 0usize;
    for index in 0..graph.len() {
        let Some(wrapped) = graph.node(index).wrapped.clone() else {
            continue;
        };
        for service in &services {
            let inferred = match service.logical_tagged_ids(&wrapped) {
                Ok(ids) => ids,
                Err(e) => {
                    debug!(user = %wrapped.id, service = %service, error = %e, "no logical id");
                    continue;
                }
            };
            for tagged_id in inferred {
                if let Some(other) = graph.index_of(&tagged_id) {
                    if graph.link(index, other) {
                        links += 1;
                    }
                }
            }
        }
    }
    debug!(nodes = graph.len(), links, "link graph built");

    // 3) Identities
    let mut out = Vec::new();
    for cluster in graph.clusters() {
        let mut by_service: BTreeMap<ServiceHandle, Vec<UserAndService>> = BTreeMap::new();
        for index in cluster {
            let user_and_service = graph.node(index).user_and_service.clone();
            by_service
                .entry(user_and_service.service().clone())
                .or_default()
                .push(user_and_service);
        }

        if !allow_non_valid_services && !by_service.keys().any(|s| valid_services.contains(s)) {
            info!(
                users = ?by_service.values().flatten().map(|u| u.tagged_id().to_string()).collect::<Vec<_>>(),
                "dropping identity without any user of a valid service"
            );
            continue;
        }

        let mut slots: BTreeMap<ServiceHandle, SlotResult> = BTreeMap::new();
        for (service, mut users) in by_service {
            if !allow_non_valid_services && !valid_services.contains(&service) {
                continue;
            }
            let slot = if users.len() == 1 {
                let only = users.remove(0);
                Ok(Some(only.user().clone()))
            } else {
                // members come in tagged-id order already
                Err(SlotError::TooManyUsers { users })
            };
            if slots.insert(service.clone(), slot).is_some() {
                return Err(ReconcileError::internal(format!(
                    "two results for service '{service}' in one identity"
                )));
            }
        }
        for service in &valid_services {
            slots.entry(service.clone()).or_insert(Ok(None));
        }
        out.push(MultiServicesUser::from_slots(slots));
    }

    info!(identities = out.len(), services = services.len(), "merge done");
    Ok(out)
}
