//! Scriptable in-memory directory.
//!
//! Deterministic, no network. Inference, alternates and failures are all
//! injected by the test; every lookup and listing is counted.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dirk_core::{
    AlternateIds, Email, PropertySet, ServiceError, ServiceHandle, User, UserAndService,
    UserIdBuilder, UserService, UserWrapper,
};

/// User of a [`ScriptedService`]. Ids are plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<Email>,
    #[serde(default)]
    pub suspended: bool,
    #[serde(flatten)]
    pub attrs: BTreeMap<String, String>,
}

impl ScriptedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            persistent_id: None,
            first_name: None,
            last_name: None,
            emails: Vec::new(),
            suspended: false,
            attrs: BTreeMap::new(),
        }
    }

    /// Panics on a malformed address; test input only.
    pub fn email(mut self, email: &str) -> Self {
        self.emails.push(email.parse().expect("valid test email"));
        self
    }

    pub fn names(mut self, first: &str, last: &str) -> Self {
        self.first_name = Some(first.to_string());
        self.last_name = Some(last.to_string());
        self
    }

    pub fn persistent(mut self, id: &str) -> Self {
        self.persistent_id = Some(id.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn suspended(mut self) -> Self {
        self.suspended = true;
        self
    }
}

impl User for ScriptedUser {
    type Id = String;
    type PersistentId = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn persistent_id(&self) -> Option<&String> {
        self.persistent_id.as_ref()
    }

    fn is_suspended(&self) -> Option<bool> {
        Some(self.suspended)
    }

    fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    fn emails(&self) -> Option<&[Email]> {
        (!self.emails.is_empty()).then_some(self.emails.as_slice())
    }
}

type InferFn = dyn Fn(&UserWrapper) -> Option<String> + Send + Sync;
type AlternatesFn = dyn Fn(&str) -> Vec<String> + Send + Sync;

/// Scriptable [`UserService`].
///
/// A wrapped user from this same service always maps back to its own id;
/// foreign users go through the inference closure (none by default, so every
/// foreign user yields `CannotInferUserIdFromOtherUser`).
pub struct ScriptedService {
    tag: String,
    users: Vec<ScriptedUser>,
    infer: Option<Arc<InferFn>>,
    alternates: Option<Arc<AlternatesFn>>,
    fail_lookups: bool,
    fail_listing: bool,
    latency: Option<Duration>,
    lookups: AtomicUsize,
    listings: AtomicUsize,
}

impl ScriptedService {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            users: Vec::new(),
            infer: None,
            alternates: None,
            fail_lookups: false,
            fail_listing: false,
            latency: None,
            lookups: AtomicUsize::new(0),
            listings: AtomicUsize::new(0),
        }
    }

    pub fn with_user(mut self, user: ScriptedUser) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_users(mut self, users: impl IntoIterator<Item = ScriptedUser>) -> Self {
        self.users.extend(users);
        self
    }

    pub fn infer_with(
        mut self,
        f: impl Fn(&UserWrapper) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.infer = Some(Arc::new(f));
        self
    }

    /// Foreign users map to their first email address.
    pub fn infer_by_email(self) -> Self {
        self.infer_with(|w| {
            w.emails
                .as_ref()
                .and_then(|e| e.first())
                .map(Email::to_string)
        })
    }

    /// Foreign users map through an id template.
    pub fn infer_by_template(self, builder: UserIdBuilder) -> Self {
        self.infer_with(move |w| builder.infer_id(w, &BTreeMap::new()))
    }

    pub fn with_alternates(mut self, f: impl Fn(&str) -> Vec<String> + Send + Sync + 'static) -> Self {
        self.alternates = Some(Arc::new(f));
        self
    }

    /// Every id lookup fails with a transport error.
    pub fn failing_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    /// Listing all users fails with a transport error.
    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn into_handle(self) -> (Arc<Self>, ServiceHandle) {
        let shared = Arc::new(self);
        (shared.clone(), ServiceHandle::from(shared))
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn listing_calls(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn users(&self) -> &[ScriptedUser] {
        &self.users
    }

    fn alternates_of(&self, id: &str) -> Vec<String> {
        self.alternates.as_ref().map(|f| f(id)).unwrap_or_default()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl fmt::Debug for ScriptedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedService")
            .field("tag", &self.tag)
            .field("users", &self.users.len())
            .field("fail_lookups", &self.fail_lookups)
            .field("fail_listing", &self.fail_listing)
            .finish()
    }
}

#[async_trait]
impl UserService for ScriptedService {
    type User = ScriptedUser;

    fn id(&self) -> &str {
        &self.tag
    }

    fn string_from_user_id(&self, id: &String) -> String {
        id.clone()
    }

    fn user_id_from_string(&self, s: &str) -> Result<String, ServiceError> {
        Ok(s.to_string())
    }

    fn string_from_persistent_id(&self, id: &String) -> String {
        id.clone()
    }

    fn persistent_id_from_string(&self, s: &str) -> Result<String, ServiceError> {
        Ok(s.to_string())
    }

    fn json_from_user(&self, user: &ScriptedUser) -> Result<Value, ServiceError> {
        serde_json::to_value(user).map_err(|e| ServiceError::transport(&self.tag, e))
    }

    fn alternate_ids(&self, id: &String) -> AlternateIds<String> {
        AlternateIds {
            regular: id.clone(),
            other: self.alternates_of(id).into_iter().collect::<HashSet<_>>(),
        }
    }

    fn logical_user_id(&self, user: &UserWrapper) -> Result<String, ServiceError> {
        if user.source_service_id() == self.tag {
            return Ok(user.id.id().to_string());
        }
        self.infer
            .as_ref()
            .and_then(|f| f(user))
            .ok_or(ServiceError::CannotInferUserIdFromOtherUser)
    }

    async fn existing_user_from_id(
        &self,
        id: &String,
        _properties: Option<&PropertySet>,
    ) -> Result<Option<ScriptedUser>, ServiceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_lookups {
            return Err(ServiceError::transport(
                &self.tag,
                anyhow::anyhow!("scripted lookup failure for '{id}'"),
            ));
        }
        let mut wanted = self.alternates_of(id);
        wanted.push(id.clone());
        let matches: Vec<&ScriptedUser> = self
            .users
            .iter()
            .filter(|u| wanted.contains(&u.id))
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some((*only).clone())),
            many => Err(ServiceError::TooManyUsersFromApi {
                service: self.tag.clone(),
                ids: many.iter().map(|u| u.id.clone()).collect(),
            }),
        }
    }

    async fn existing_user_from_persistent_id(
        &self,
        id: &String,
        _properties: Option<&PropertySet>,
    ) -> Result<Option<ScriptedUser>, ServiceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self
            .users
            .iter()
            .find(|u| u.persistent_id.as_ref() == Some(id))
            .cloned())
    }

    async fn list_all_users(
        &self,
        include_suspended: bool,
        _properties: Option<&PropertySet>,
    ) -> Result<Vec<ScriptedUser>, ServiceError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_listing {
            return Err(ServiceError::transport(
                &self.tag,
                anyhow::anyhow!("scripted listing failure"),
            ));
        }
        Ok(self
            .users
            .iter()
            .filter(|u| include_suspended || !u.suspended)
            .cloned()
            .collect())
    }
}

/// Binds the scripted user with the given id to its service.
///
/// Panics if the id is unknown; test input only.
pub fn user_and_service(service: &Arc<ScriptedService>, id: &str) -> UserAndService {
    let user = service
        .users()
        .iter()
        .find(|u| u.id == id)
        .cloned()
        .unwrap_or_else(|| panic!("no scripted user '{id}' in '{}'", service.tag));
    UserAndService::from_user(user, ServiceHandle::from(service.clone()))
        .expect("scripted user belongs to its service")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirk_core::{DynUserService, TaggedId};

    #[tokio::test]
    async fn lookups_honour_alternates_and_count_calls() {
        let (svc, handle) = ScriptedService::new("mail")
            .with_user(ScriptedUser::new("paul@alias.domain"))
            .with_alternates(|id| vec![id.replace("@main.domain", "@alias.domain")])
            .into_handle();

        let found = handle
            .existing_user_from_id_string("paul@main.domain", None)
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(svc.lookup_calls(), 1);
    }

    #[tokio::test]
    async fn duplicate_matches_are_an_error() {
        let (_, handle) = ScriptedService::new("mail")
            .with_user(ScriptedUser::new("a"))
            .with_user(ScriptedUser::new("b"))
            .with_alternates(|id| if id == "a" { vec!["b".to_string()] } else { vec![] })
            .into_handle();
        let err = handle.existing_user_from_id_string("a", None).await.unwrap_err();
        assert!(err.is_too_many_users());
    }

    #[test]
    fn own_users_infer_their_own_id_and_foreign_ones_need_a_script() {
        let (_, plain) = ScriptedService::new("gh").into_handle();
        let (_, by_mail) = ScriptedService::new("google").infer_by_email().into_handle();

        let mut own = UserWrapper::new(TaggedId::new("gh", "42").unwrap());
        own.emails = Some(vec!["x@y.com".parse().unwrap()]);
        assert_eq!(
            plain.logical_tagged_ids(&own).unwrap().into_iter().next().unwrap().to_string(),
            "gh:42"
        );
        assert_eq!(
            by_mail.logical_tagged_ids(&own).unwrap().into_iter().next().unwrap().to_string(),
            "google:x@y.com"
        );

        let foreign = UserWrapper::new(TaggedId::new("ldap", "uid=a").unwrap());
        assert!(plain.logical_tagged_ids(&foreign).unwrap_err().is_cannot_infer_user_id());
    }

    #[tokio::test]
    async fn listing_skips_suspended_unless_asked() {
        let (svc, handle) = ScriptedService::new("gh")
            .with_user(ScriptedUser::new("1"))
            .with_user(ScriptedUser::new("2").suspended())
            .into_handle();
        assert_eq!(handle.list_users(false, None).await.unwrap().len(), 1);
        assert_eq!(handle.list_users(true, None).await.unwrap().len(), 2);
        assert_eq!(svc.listing_calls(), 2);
    }
}
