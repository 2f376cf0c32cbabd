//! LDAP distinguished names, reduced to what id inference needs.
//!
//! Supports the plain `attr=value,attr=value` form. Escaped separators
//! (`\,`) are kept verbatim inside values; multi-valued RDNs (`+`) are not
//! split.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    #[error("distinguished name is empty")]
    Empty,
    #[error("relative distinguished name '{0}' is not attr=value")]
    MalformedRdn(String),
}

/// One `attr=value` component. Attribute names are lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rdn {
    pub attr: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DistinguishedName {
    rdns: Vec<Rdn>,
}

impl DistinguishedName {
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// All values of the given attribute, most specific first.
    pub fn values_for(&self, attr: &str) -> Vec<&str> {
        let attr = attr.to_ascii_lowercase();
        self.rdns
            .iter()
            .filter(|r| r.attr == attr)
            .map(|r| r.value.as_str())
            .collect()
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", rdn.attr, rdn.value)?;
        }
        Ok(())
    }
}

impl FromStr for DistinguishedName {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DnError::Empty);
        }
        let rdns = split_unescaped(s, ',')
            .into_iter()
            .map(|raw| {
                let (attr, value) = raw
                    .split_once('=')
                    .ok_or_else(|| DnError::MalformedRdn(raw.to_string()))?;
                let attr = attr.trim();
                if attr.is_empty() {
                    return Err(DnError::MalformedRdn(raw.to_string()));
                }
                Ok(Rdn {
                    attr: attr.to_ascii_lowercase(),
                    value: trim_value(value).to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rdns })
    }
}

/// Trims surrounding whitespace except a trailing space escaped as `\ `.
fn trim_value(value: &str) -> &str {
    let value = value.trim_start();
    let trimmed = value.trim_end();
    let backslashes = trimmed.chars().rev().take_while(|&c| c == '\\').count();
    if backslashes % 2 == 0 {
        return trimmed;
    }
    let escaped = value[trimmed.len()..].chars().next().map_or(0, char::len_utf8);
    &value[..trimmed.len() + escaped]
}

fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep {
            out.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    out.push(&s[start..]);
    out
}
