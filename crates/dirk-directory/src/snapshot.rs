use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use dirk_config::{IdKind, ServiceConfig, UserRecord};
use dirk_core::{
    AlternateIds, Email, PropertySet, ServiceError, UserIdBuilder, UserService, UserWrapper,
};

use crate::id::canonical_id;
use crate::user::DirectoryUser;

/// In-memory directory over a user snapshot.
///
/// Users are kept in insertion order; lookups scan the whole snapshot so that
/// ambiguous ids are always detected.
#[derive(Debug)]
pub struct SnapshotDirectory {
    tag: String,
    id_kind: IdKind,
    builders: Vec<UserIdBuilder>,
    /// main domain -> alias domains
    domain_aliases: BTreeMap<String, Vec<String>>,
    /// alias domain -> main domain
    main_domains: BTreeMap<String, String>,
    users: RwLock<Vec<DirectoryUser>>,
}

impl SnapshotDirectory {
    pub fn new(tag: impl Into<String>, id_kind: IdKind) -> Self {
        Self {
            tag: tag.into(),
            id_kind,
            builders: Vec::new(),
            domain_aliases: BTreeMap::new(),
            main_domains: BTreeMap::new(),
            users: RwLock::new(Vec::new()),
        }
    }

    pub fn with_builders(mut self, builders: impl IntoIterator<Item = UserIdBuilder>) -> Self {
        self.builders.extend(builders);
        self
    }

    pub fn with_domain_alias(mut self, main: &str, alias: &str) -> Self {
        let (main, alias) = (main.to_ascii_lowercase(), alias.to_ascii_lowercase());
        self.main_domains.insert(alias.clone(), main.clone());
        self.domain_aliases.entry(main).or_default().push(alias);
        self
    }

    /// Builds the directory for one configured service, loading its inline
    /// users then its users file.
    pub fn from_config(service: &ServiceConfig) -> Result<Self> {
        let mut directory = Self::new(&service.id, service.id_kind)
            .with_builders(service.user_id_builders.iter().cloned());
        for (main, aliases) in &service.domain_aliases {
            for alias in aliases {
                directory = directory.with_domain_alias(main, alias);
            }
        }

        let mut records = service.users.clone();
        if let Some(path) = &service.users_file {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read users file: {}", path.display()))?;
            let from_file: Vec<UserRecord> = serde_json::from_str(&raw)
                .with_context(|| format!("invalid users file: {}", path.display()))?;
            records.extend(from_file);
        }

        let users = records
            .into_iter()
            .map(|r| directory.checked(r))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid user in service '{}'", service.id))?;
        info!(service = %service.id, users = users.len(), "snapshot directory loaded");
        directory.users = RwLock::new(users);
        Ok(directory)
    }

    /// Adds a user; a user with the same canonical id is replaced.
    pub async fn upsert(&self, record: UserRecord) -> Result<(), ServiceError> {
        let user = self.checked(record)?;
        let mut users = self.users.write().await;
        match users.iter_mut().find(|u| u.record().id == user.record().id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    fn checked(&self, mut record: UserRecord) -> Result<DirectoryUser, ServiceError> {
        record.id = canonical_id(&self.tag, self.id_kind, &record.id)?;
        Ok(DirectoryUser::new(record))
    }

    fn main_domain_of<'a>(&'a self, domain: &'a str) -> &'a str {
        self.main_domains.get(domain).map(String::as_str).unwrap_or(domain)
    }

    fn too_many(&self, matches: &[&DirectoryUser]) -> ServiceError {
        ServiceError::TooManyUsersFromApi {
            service: self.tag.clone(),
            ids: matches.iter().map(|u| u.record().id.clone()).collect(),
        }
    }
}

#[async_trait]
impl UserService for SnapshotDirectory {
    type User = DirectoryUser;

    fn id(&self) -> &str {
        &self.tag
    }

    fn string_from_user_id(&self, id: &String) -> String {
        id.clone()
    }

    fn user_id_from_string(&self, s: &str) -> Result<String, ServiceError> {
        canonical_id(&self.tag, self.id_kind, s)
    }

    fn string_from_persistent_id(&self, id: &String) -> String {
        id.clone()
    }

    fn persistent_id_from_string(&self, s: &str) -> Result<String, ServiceError> {
        Ok(s.to_string())
    }

    fn json_from_user(&self, user: &DirectoryUser) -> Result<Value, ServiceError> {
        user.to_json()
            .map_err(|e| ServiceError::transport(&self.tag, e))
    }

    fn alternate_ids(&self, id: &String) -> AlternateIds<String> {
        let Some(email) = (self.id_kind == IdKind::Email)
            .then(|| id.parse::<Email>().ok())
            .flatten()
        else {
            return AlternateIds::only(id.clone());
        };
        let main = self.main_domain_of(email.domain());
        let Some(aliases) = self.domain_aliases.get(main) else {
            return AlternateIds::only(id.clone());
        };
        let regular = email.with_domain(main).to_string();
        let other: HashSet<String> = aliases
            .iter()
            .map(|alias| email.with_domain(alias).to_string())
            .collect();
        AlternateIds { regular, other }
    }

    fn logical_user_id(&self, user: &UserWrapper) -> Result<String, ServiceError> {
        if user.source_service_id() == self.tag {
            return self.user_id_from_string(user.id.id());
        }
        let extra = BTreeMap::new();
        self.builders
            .iter()
            .filter_map(|b| b.infer_id(user, &extra))
            .find_map(|rendered| self.user_id_from_string(&rendered).ok())
            .ok_or(ServiceError::CannotInferUserIdFromOtherUser)
    }

    async fn existing_user_from_id(
        &self,
        id: &String,
        properties: Option<&PropertySet>,
    ) -> Result<Option<DirectoryUser>, ServiceError> {
        let ids = self.alternate_ids(id);
        let wanted: BTreeSet<&String> = std::iter::once(&ids.regular).chain(ids.other.iter()).collect();
        let users = self.users.read().await;
        let matches: Vec<&DirectoryUser> = users
            .iter()
            .filter(|u| wanted.contains(&u.record().id))
            .collect();
        debug!(service = %self.tag, id = %id, matches = matches.len(), "lookup by id");
        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only.restricted_to(properties))),
            many => Err(self.too_many(many)),
        }
    }

    async fn existing_user_from_persistent_id(
        &self,
        id: &String,
        properties: Option<&PropertySet>,
    ) -> Result<Option<DirectoryUser>, ServiceError> {
        let users = self.users.read().await;
        let matches: Vec<&DirectoryUser> = users
            .iter()
            .filter(|u| u.record().persistent_id.as_ref() == Some(id))
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only.restricted_to(properties))),
            many => Err(self.too_many(many)),
        }
    }

    async fn list_all_users(
        &self,
        include_suspended: bool,
        properties: Option<&PropertySet>,
    ) -> Result<Vec<DirectoryUser>, ServiceError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .filter(|u| include_suspended || !u.record().suspended)
            .map(|u| u.restricted_to(properties))
            .collect())
    }
}
