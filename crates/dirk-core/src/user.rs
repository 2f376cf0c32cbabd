//! User capability and the service-agnostic wrapped user.
//!
//! Every backend has its own concrete user type. The reconciliation core
//! only touches users through the [`User`] trait, through [`UserWrapper`]
//! (when a user must be shown to *another* service for id inference), or as
//! an erased [`AnyUser`] handle.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::email::Email;
use crate::tagged_id::TaggedId;

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Names of user properties. Standard ones have dedicated variants, anything
/// else is service specific.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserProperty {
    Id,
    PersistentId,
    IsSuspended,
    FirstName,
    LastName,
    Nickname,
    Emails,
    Custom(String),
}

impl UserProperty {
    pub fn as_str(&self) -> &str {
        match self {
            UserProperty::Id => "id",
            UserProperty::PersistentId => "persistent_id",
            UserProperty::IsSuspended => "is_suspended",
            UserProperty::FirstName => "first_name",
            UserProperty::LastName => "last_name",
            UserProperty::Nickname => "nickname",
            UserProperty::Emails => "emails",
            UserProperty::Custom(name) => name,
        }
    }

    pub fn is_standard(&self) -> bool {
        !matches!(self, UserProperty::Custom(_))
    }
}

impl fmt::Display for UserProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for UserProperty {
    fn from(s: &str) -> Self {
        match s {
            "id" => UserProperty::Id,
            "persistent_id" => UserProperty::PersistentId,
            "is_suspended" => UserProperty::IsSuspended,
            "first_name" => UserProperty::FirstName,
            "last_name" => UserProperty::LastName,
            "nickname" => UserProperty::Nickname,
            "emails" => UserProperty::Emails,
            other => UserProperty::Custom(other.to_string()),
        }
    }
}

impl From<String> for UserProperty {
    fn from(s: String) -> Self {
        UserProperty::from(s.as_str())
    }
}

impl From<UserProperty> for String {
    fn from(p: UserProperty) -> Self {
        p.as_str().to_string()
    }
}

impl FromStr for UserProperty {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(UserProperty::from(s))
    }
}

/// Set of properties a fetch should retrieve. `None` at call sites means all
/// supported properties.
pub type PropertySet = BTreeSet<UserProperty>;

/// Loosely typed property value, as consumed by id builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Bool(bool),
    Emails(Vec<Email>),
}

impl PropertyValue {
    /// Textual rendering. Emails render as the first address.
    pub fn as_text(&self) -> Option<String> {
        match self {
            PropertyValue::Text(s) => Some(s.clone()),
            PropertyValue::Bool(b) => Some(b.to_string()),
            PropertyValue::Emails(e) => e.first().map(Email::to_string),
        }
    }

    /// Reads a JSON member of a service's user payload. Numbers become text;
    /// arrays keep their parseable email items. Anything else is `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PropertyValue::Text(s.clone())),
            Value::Bool(b) => Some(PropertyValue::Bool(*b)),
            Value::Number(n) => Some(PropertyValue::Text(n.to_string())),
            Value::Array(items) => {
                let emails = items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| s.parse().ok())
                    .collect::<Vec<Email>>();
                (!emails.is_empty()).then_some(PropertyValue::Emails(emails))
            }
            Value::Null | Value::Object(_) => None,
        }
    }

    pub fn as_email(&self) -> Option<Email> {
        match self {
            PropertyValue::Emails(e) => e.first().cloned(),
            PropertyValue::Text(s) => s.parse().ok(),
            PropertyValue::Bool(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// User capability
// ---------------------------------------------------------------------------

/// Capability every concrete backend user type provides.
///
/// The id is never optional: even a locally built user has a *decided* id
/// (for LDAP, the distinguished name). A database primary key, when the
/// backend has one, is the persistent id.
pub trait User: fmt::Debug + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    /// Use [`std::convert::Infallible`] when the backend has no persistent ids.
    type PersistentId: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;

    fn persistent_id(&self) -> Option<&Self::PersistentId> {
        None
    }

    fn is_suspended(&self) -> Option<bool> {
        None
    }

    fn first_name(&self) -> Option<&str> {
        None
    }

    fn last_name(&self) -> Option<&str> {
        None
    }

    fn nickname(&self) -> Option<&str> {
        None
    }

    fn emails(&self) -> Option<&[Email]> {
        None
    }
}

// ---------------------------------------------------------------------------
// Wrapped user
// ---------------------------------------------------------------------------

/// Generic, service-agnostic user.
///
/// Carries enough to let any service infer its own id for the person, plus
/// the originating service's own JSON rendering in `underlying_user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWrapper {
    pub id: TaggedId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_id: Option<TaggedId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_suspended: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<Email>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying_user: Option<Value>,
}

impl UserWrapper {
    pub fn new(id: TaggedId) -> Self {
        Self {
            id,
            persistent_id: None,
            is_suspended: None,
            first_name: None,
            last_name: None,
            nickname: None,
            emails: None,
            underlying_user: None,
        }
    }

    /// Tag of the service this user was wrapped by.
    pub fn source_service_id(&self) -> &str {
        self.id.tag()
    }

    pub fn copy_standard_non_id_properties<U: User>(&mut self, user: &U) {
        self.is_suspended = user.is_suspended();
        self.first_name = user.first_name().map(str::to_string);
        self.last_name = user.last_name().map(str::to_string);
        self.nickname = user.nickname().map(str::to_string);
        self.emails = user.emails().map(<[Email]>::to_vec);
    }

    /// Property lookup used by id builders.
    ///
    /// `id` and `persistent_id` resolve to the service-local part of the
    /// tagged id. Custom properties are members of an object-shaped
    /// `underlying_user`, read with [`PropertyValue::from_json`].
    pub fn value_for_property(&self, property: &UserProperty) -> Option<PropertyValue> {
        match property {
            UserProperty::Id => Some(PropertyValue::Text(self.id.id().to_string())),
            UserProperty::PersistentId => self
                .persistent_id
                .as_ref()
                .map(|p| PropertyValue::Text(p.id().to_string())),
            UserProperty::IsSuspended => self.is_suspended.map(PropertyValue::Bool),
            UserProperty::FirstName => self.first_name.clone().map(PropertyValue::Text),
            UserProperty::LastName => self.last_name.clone().map(PropertyValue::Text),
            UserProperty::Nickname => self.nickname.clone().map(PropertyValue::Text),
            UserProperty::Emails => self
                .emails
                .as_ref()
                .filter(|e| !e.is_empty())
                .map(|e| PropertyValue::Emails(e.clone())),
            UserProperty::Custom(name) => {
                PropertyValue::from_json(self.underlying_user.as_ref()?.get(name)?)
            }
        }
    }
}

impl User for UserWrapper {
    type Id = TaggedId;
    type PersistentId = TaggedId;

    fn id(&self) -> &TaggedId {
        &self.id
    }

    fn persistent_id(&self) -> Option<&TaggedId> {
        self.persistent_id.as_ref()
    }

    fn is_suspended(&self) -> Option<bool> {
        self.is_suspended
    }

    fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    fn emails(&self) -> Option<&[Email]> {
        self.emails.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Erased user
// ---------------------------------------------------------------------------

trait ErasedUser: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn first_name(&self) -> Option<&str>;
    fn last_name(&self) -> Option<&str>;
    fn emails(&self) -> Option<&[Email]>;
    fn is_suspended(&self) -> Option<bool>;
}

impl<U: User> ErasedUser for U {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn first_name(&self) -> Option<&str> {
        User::first_name(self)
    }

    fn last_name(&self) -> Option<&str> {
        User::last_name(self)
    }

    fn emails(&self) -> Option<&[Email]> {
        User::emails(self)
    }

    fn is_suspended(&self) -> Option<bool> {
        User::is_suspended(self)
    }
}

/// Cheaply cloneable handle on a user of any backend.
///
/// Only the service that produced the user downcasts it back to its concrete
/// type; everything else goes through the accessors here or through the
/// service.
#[derive(Clone)]
pub struct AnyUser(Arc<dyn ErasedUser>);

impl AnyUser {
    pub fn new<U: User>(user: U) -> Self {
        Self(Arc::new(user))
    }

    pub fn downcast_ref<U: User>(&self) -> Option<&U> {
        self.0.as_any().downcast_ref::<U>()
    }

    pub fn first_name(&self) -> Option<&str> {
        self.0.first_name()
    }

    pub fn last_name(&self) -> Option<&str> {
        self.0.last_name()
    }

    pub fn emails(&self) -> Option<&[Email]> {
        self.0.emails()
    }

    pub fn is_suspended(&self) -> Option<bool> {
        self.0.is_suspended()
    }
}

impl fmt::Debug for AnyUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrapper() -> UserWrapper {
        let mut w = UserWrapper::new(TaggedId::new("ldap", "uid=alice,dc=x").unwrap());
        w.first_name = Some("Alice".to_string());
        w.emails = Some(vec!["alice@x.com".parse().unwrap()]);
        w.underlying_user = Some(json!({
            "department": "ops",
            "admin": true,
            "count": 3,
            "manager": {"id": "bob"},
            "aliases": ["a@x.com", "not an email"]
        }));
        w
    }

    #[test]
    fn property_names_round_trip() {
        for p in [
            UserProperty::Id,
            UserProperty::PersistentId,
            UserProperty::IsSuspended,
            UserProperty::FirstName,
            UserProperty::LastName,
            UserProperty::Nickname,
            UserProperty::Emails,
            UserProperty::Custom("department".to_string()),
        ] {
            assert_eq!(UserProperty::from(p.as_str()), p);
        }
        assert!(!UserProperty::Custom("x".into()).is_standard());
    }

    #[test]
    fn value_for_property_reads_standard_and_custom() {
        let w = wrapper();
        assert_eq!(
            w.value_for_property(&UserProperty::Id),
            Some(PropertyValue::Text("uid=alice,dc=x".to_string()))
        );
        assert_eq!(
            w.value_for_property(&"department".into()),
            Some(PropertyValue::Text("ops".to_string()))
        );
        assert_eq!(
            w.value_for_property(&"admin".into()),
            Some(PropertyValue::Bool(true))
        );
        assert_eq!(
            w.value_for_property(&"count".into()),
            Some(PropertyValue::Text("3".to_string()))
        );
        assert_eq!(w.value_for_property(&"manager".into()), None);
        assert_eq!(
            w.value_for_property(&"aliases".into()),
            Some(PropertyValue::Emails(vec!["a@x.com".parse().unwrap()]))
        );
        assert_eq!(w.value_for_property(&"missing".into()), None);
        assert_eq!(w.value_for_property(&UserProperty::LastName), None);
        assert_eq!(
            w.value_for_property(&UserProperty::Emails)
                .and_then(|v| v.as_email())
                .map(|e| e.to_string()),
            Some("alice@x.com".to_string())
        );
    }

    #[test]
    fn wrapper_serde_omits_absent_fields() {
        let w = UserWrapper::new(TaggedId::new("gh", "42").unwrap());
        assert_eq!(serde_json::to_value(&w).unwrap(), json!({"id": "gh:42"}));
    }

    #[test]
    fn any_user_downcasts_to_concrete_type_only() {
        let user = AnyUser::new(wrapper());
        assert_eq!(user.first_name(), Some("Alice"));
        assert!(user.downcast_ref::<UserWrapper>().is_some());

        #[derive(Debug)]
        struct Other(u8);
        impl User for Other {
            type Id = u8;
            type PersistentId = std::convert::Infallible;
            fn id(&self) -> &u8 {
                &self.0
            }
        }
        assert!(user.downcast_ref::<Other>().is_none());
        assert_eq!(AnyUser::new(Other(1)).downcast_ref::<Other>().map(|o| o.0), Some(1));
    }
}
