//! Service-scoped user identifier.
//!
//! A [`TaggedId`] is the join key used everywhere users from different
//! directories are compared: the tag names the owning service, the id is the
//! service-local user identifier (opaque to everybody but that service).
//!
//! Canonical string form is `tag:id`. The tag may not contain `:`, the id may,
//! so parsing splits on the *first* separator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between tag and id in the canonical string form.
pub const TAGGED_ID_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaggedIdError {
    #[error("tagged id has an empty tag")]
    EmptyTag,
    #[error("tag '{0}' contains the reserved separator ':'")]
    SeparatorInTag(String),
    #[error("'{0}' is not a tagged id (missing ':' separator)")]
    MissingSeparator(String),
}

/// `(tag, id)` pair. Equality, ordering and hashing are structural.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaggedId {
    tag: String,
    id: String,
}

impl TaggedId {
    /// Build a tagged id. An empty id is accepted (some services use one), an
    /// empty tag is not.
    pub fn new(tag: impl Into<String>, id: impl Into<String>) -> Result<Self, TaggedIdError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(TaggedIdError::EmptyTag);
        }
        if tag.contains(TAGGED_ID_SEPARATOR) {
            return Err(TaggedIdError::SeparatorInTag(tag));
        }
        Ok(Self { tag, id: id.into() })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for TaggedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.tag, TAGGED_ID_SEPARATOR, self.id)
    }
}

impl FromStr for TaggedId {
    type Err = TaggedIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, id) = s
            .split_once(TAGGED_ID_SEPARATOR)
            .ok_or_else(|| TaggedIdError::MissingSeparator(s.to_string()))?;
        Self::new(tag, id)
    }
}

impl TryFrom<String> for TaggedId {
    type Error = TaggedIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaggedId> for String {
    fn from(value: TaggedId) -> Self {
        value.to_string()
    }
}
