//! Serializable views of reconciliation results, for the CLI and for logs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dirk_core::{TaggedId, UserWrapper};

use crate::{FetchAllOutcome, MultiServicesUser};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotReport {
    Found {
        user: UserWrapper,
    },
    Absent,
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        candidates: Vec<TaggedId>,
    },
}

/// One identity, keyed by service tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiServicesUserReport {
    pub services: BTreeMap<String, SlotReport>,
}

impl MultiServicesUserReport {
    pub fn from_user(user: &MultiServicesUser) -> Self {
        let services = user
            .iter()
            .map(|(service, slot)| {
                let report = match slot {
                    Ok(Some(found)) => match service.wrapped_user(found) {
                        Ok(user) => SlotReport::Found { user },
                        Err(e) => SlotReport::Error {
                            error: e.to_string(),
                            candidates: Vec::new(),
                        },
                    },
                    Ok(None) => SlotReport::Absent,
                    Err(e) => SlotReport::Error {
                        error: e.to_string(),
                        candidates: e.candidates(),
                    },
                };
                (service.tag().to_string(), report)
            })
            .collect();
        Self { services }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAllReport {
    pub users: Vec<MultiServicesUserReport>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fetch_errors: BTreeMap<String, String>,
}

impl FetchAllReport {
    pub fn from_outcome(outcome: &FetchAllOutcome) -> Self {
        Self {
            users: outcome.users.iter().map(MultiServicesUserReport::from_user).collect(),
            fetch_errors: outcome
                .fetch_errors
                .iter()
                .map(|(service, e)| (service.tag().to_string(), e.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge;
    use dirk_testkit::{user_and_service, ScriptedService, ScriptedUser};
    use serde_json::json;

    #[test]
    fn renders_found_absent_and_ambiguous_slots() {
        // a infers u1 for both v1 and v2, nothing for w
        let (a, _) = ScriptedService::new("a")
            .with_user(ScriptedUser::new("u1"))
            .infer_with(|w| w.id.id().starts_with('v').then(|| "u1".to_string()))
            .into_handle();
        let (b, _) = ScriptedService::new("b")
            .with_users([ScriptedUser::new("v1"), ScriptedUser::new("v2"), ScriptedUser::new("w")])
            .into_handle();

        let groups = merge(
            vec![
                user_and_service(&a, "u1"),
                user_and_service(&b, "v1"),
                user_and_service(&b, "v2"),
                user_and_service(&b, "w"),
            ],
            None,
            false,
        )
        .unwrap();
        assert_eq!(groups.len(), 2);

        let first = serde_json::to_value(MultiServicesUserReport::from_user(&groups[0])).unwrap();
        assert_eq!(first["a"]["status"], "found");
        assert_eq!(first["a"]["user"]["id"], "a:u1");
        assert_eq!(first["b"]["status"], "error");
        assert_eq!(first["b"]["candidates"], json!(["b:v1", "b:v2"]));

        let second = serde_json::to_value(MultiServicesUserReport::from_user(&groups[1])).unwrap();
        assert_eq!(second["a"], json!({"status": "absent"}));
        assert_eq!(second["b"]["status"], "found");
    }
}
