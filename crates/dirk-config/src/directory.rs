//! Typed view of the merged configuration.
//!
//! ```yaml
//! reconcile:
//!   valid_services: [ldap, google]
//!   allow_non_valid_services: false
//!   include_suspended: true
//!   properties_to_fetch: [emails, first_name, last_name]
//! services:
//!   - id: ldap
//!     id_kind: dn
//!     user_id_builders: ["uid=|id|,ou=people,dc=example,dc=org"]
//!     users_file: ldap.json
//!   - id: google
//!     id_kind: email
//!     user_id_builders: ["#emails#@example.org"]
//!     domain_aliases:
//!       example.org: [example.net]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dirk_core::{Email, PropertySet, UserIdBuilder, UserProperty, TAGGED_ID_SEPARATOR};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Services whose identities are kept by a merge. Unset means every
    /// configured service.
    #[serde(default)]
    pub valid_services: Option<Vec<String>>,
    #[serde(default)]
    pub allow_non_valid_services: bool,
    #[serde(default = "default_true")]
    pub include_suspended: bool,
    /// Unset means every property the services support.
    #[serde(default)]
    pub properties_to_fetch: Option<Vec<UserProperty>>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            valid_services: None,
            allow_non_valid_services: false,
            include_suspended: true,
            properties_to_fetch: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// How a service's user ids are validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Email,
    Dn,
    #[default]
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service tag.
    pub id: String,
    #[serde(default)]
    pub id_kind: IdKind,
    /// Tried in order to infer this service's id for a foreign user.
    #[serde(default)]
    pub user_id_builders: Vec<UserIdBuilder>,
    /// Main domain -> alias domains. Email ids only.
    #[serde(default)]
    pub domain_aliases: BTreeMap<String, Vec<String>>,
    /// JSON array of [`UserRecord`], relative to the config directory.
    #[serde(default)]
    pub users_file: Option<PathBuf>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

impl ServiceConfig {
    pub fn new(id: impl Into<String>, id_kind: IdKind) -> Self {
        Self {
            id: id.into(),
            id_kind,
            user_id_builders: Vec::new(),
            domain_aliases: BTreeMap::new(),
            users_file: None,
            users: Vec::new(),
        }
    }
}

/// One user of a snapshot directory, as stored in config or a users file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<Email>,
    #[serde(default)]
    pub suspended: bool,
    /// Service specific attributes, visible to id builders as custom
    /// properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl DirectoryConfig {
    pub fn service(&self, tag: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.id == tag)
    }

    /// Configured valid services, or every service when unset.
    pub fn valid_service_tags(&self) -> BTreeSet<&str> {
        match &self.reconcile.valid_services {
            Some(tags) => tags.iter().map(String::as_str).collect(),
            None => self.services.iter().map(|s| s.id.as_str()).collect(),
        }
    }

    pub fn properties_to_fetch(&self) -> Option<PropertySet> {
        self.reconcile
            .properties_to_fetch
            .as_ref()
            .map(|p| p.iter().cloned().collect())
    }

    /// Structural checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for service in &self.services {
            if service.id.is_empty() || service.id.contains(TAGGED_ID_SEPARATOR) {
                bail!(
                    "CONFIG_INVALID_SERVICE_ID '{}': must be non-empty and must not contain '{}'",
                    service.id,
                    TAGGED_ID_SEPARATOR
                );
            }
            if !seen.insert(service.id.as_str()) {
                bail!("CONFIG_DUPLICATE_SERVICE '{}'", service.id);
            }
            if !service.domain_aliases.is_empty() && service.id_kind != IdKind::Email {
                bail!(
                    "CONFIG_DOMAIN_ALIASES_ON_NON_EMAIL_SERVICE '{}'",
                    service.id
                );
            }
        }
        if let Some(valid) = &self.reconcile.valid_services {
            for tag in valid {
                if !seen.contains(tag.as_str()) {
                    bail!("CONFIG_UNKNOWN_VALID_SERVICE '{tag}'");
                }
            }
        }
        Ok(())
    }
}
