use serde_json::Value;

use dirk_config::UserRecord;
use dirk_core::{Email, PropertySet, User, UserProperty};

/// User of a [`SnapshotDirectory`](crate::SnapshotDirectory).
///
/// The record's id is canonical for the owning directory's id kind.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryUser {
    record: UserRecord,
}

impl DirectoryUser {
    pub(crate) fn new(record: UserRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &UserRecord {
        &self.record
    }

    /// Copy holding only the requested properties. The id is always kept.
    pub(crate) fn restricted_to(&self, properties: Option<&PropertySet>) -> Self {
        let Some(wanted) = properties else {
            return self.clone();
        };
        let keep = |p: UserProperty| wanted.contains(&p);
        let r = &self.record;
        Self::new(UserRecord {
            id: r.id.clone(),
            persistent_id: r.persistent_id.clone().filter(|_| keep(UserProperty::PersistentId)),
            first_name: r.first_name.clone().filter(|_| keep(UserProperty::FirstName)),
            last_name: r.last_name.clone().filter(|_| keep(UserProperty::LastName)),
            nickname: r.nickname.clone().filter(|_| keep(UserProperty::Nickname)),
            emails: if keep(UserProperty::Emails) {
                r.emails.clone()
            } else {
                Vec::new()
            },
            suspended: r.suspended,
            attributes: r
                .attributes
                .iter()
                .filter(|(name, _)| keep(UserProperty::Custom((*name).clone())))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Flat JSON object: standard fields plus every attribute at top level
    /// (standard fields win on a name clash).
    pub(crate) fn to_json(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(&self.record)?;
        if let Value::Object(map) = &mut value {
            if let Some(Value::Object(attributes)) = map.remove("attributes") {
                for (name, attr) in attributes {
                    map.entry(name).or_insert(attr);
                }
            }
        }
        Ok(value)
    }
}

impl User for DirectoryUser {
    type Id = String;
    type PersistentId = String;

    fn id(&self) -> &String {
        &self.record.id
    }

    fn persistent_id(&self) -> Option<&String> {
        self.record.persistent_id.as_ref()
    }

    fn is_suspended(&self) -> Option<bool> {
        Some(self.record.suspended)
    }

    fn first_name(&self) -> Option<&str> {
        self.record.first_name.as_deref()
    }

    fn last_name(&self) -> Option<&str> {
        self.record.last_name.as_deref()
    }

    fn nickname(&self) -> Option<&str> {
        self.record.nickname.as_deref()
    }

    fn emails(&self) -> Option<&[Email]> {
        (!self.record.emails.is_empty()).then_some(self.record.emails.as_slice())
    }
}
