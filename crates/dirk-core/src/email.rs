//! Minimal email address type.
//!
//! Only what the reconciliation model needs: split into local part and
//! domain, case-insensitive domain, and domain substitution for alias
//! expansion. This is not an RFC 5322 validator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("'{0}' is not an email address (expected local@domain)")]
    Malformed(String),
    #[error("'{0}' contains whitespace")]
    Whitespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email {
    local_part: String,
    domain: String,
}

impl Email {
    pub fn new(local_part: &str, domain: &str) -> Result<Self, EmailError> {
        format!("{local_part}@{domain}").parse()
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Same mailbox on another domain (used for domain aliases).
    pub fn with_domain(&self, domain: &str) -> Self {
        Self {
            local_part: self.local_part.clone(),
            domain: domain.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().any(char::is_whitespace) {
            return Err(EmailError::Whitespace(s.to_string()));
        }
        let (local, domain) = s
            .split_once('@')
            .ok_or_else(|| EmailError::Malformed(s.to_string()))?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(EmailError::Malformed(s.to_string()));
        }
        Ok(Self {
            local_part: local.to_string(),
            domain: domain.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_lowercases_domain_only() {
        let e: Email = "Paul.Smith@Main.Domain".parse().unwrap();
        assert_eq!(e.local_part(), "Paul.Smith");
        assert_eq!(e.domain(), "main.domain");
        assert_eq!(e.to_string(), "Paul.Smith@main.domain");
    }

    #[test]
    fn rejects_malformed() {
        for raw in ["", "paul", "@main.domain", "paul@", "pa ul@x.com"] {
            assert!(raw.parse::<Email>().is_err(), "{raw} must be rejected");
        }
    }

    #[test]
    fn with_domain_keeps_local_part() {
        let e: Email = "paul@main.domain".parse().unwrap();
        assert_eq!(e.with_domain("Alias.Domain").to_string(), "paul@alias.domain");
    }
}
