//! Template-driven user id inference.
//!
//! Services use a [`UserIdBuilder`] to implement `logical_user_id` for
//! foreign users. Template tokens:
//!
//! - `|var|`       property value as text
//! - `#var#`       local part of an email-valued property
//! - `?var:attr?`  the single value of RDN `attr` in a DN-valued property
//! - `*...*`       lowercase, strip diacritics, spaces to `-` (may wrap other tokens)
//! - `\c`          literal `c`
//!
//! Variables resolve against the user's properties first, then against the
//! caller-supplied extra variables.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dn::DistinguishedName;
use crate::user::{PropertyValue, UserProperty, UserWrapper};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdBuilderError {
    #[error("unterminated '{token}' token in id template '{format}'")]
    Unterminated { token: char, format: String },
    #[error("empty variable name in '{token}' token of id template '{format}'")]
    EmptyVariable { token: char, format: String },
    #[error("'{0}' is not a var:attr pair")]
    InvalidDnToken(String),
    #[error("id template '{0}' ends with a dangling escape")]
    DanglingEscape(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
    EmailLocalPart(String),
    DnValue { var: String, attr: String },
    Normalize(Vec<Segment>),
}

/// Compiled id template. Serialises as its source string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserIdBuilder {
    format: String,
    segments: Vec<Segment>,
}

impl UserIdBuilder {
    pub fn new(format: impl Into<String>) -> Result<Self, IdBuilderError> {
        let format = format.into();
        let mut parser = Parser {
            format: &format,
            chars: format.chars().peekable(),
        };
        let segments = parser.segments(false)?;
        Ok(Self { format, segments })
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Renders the template for `user`. `None` when a variable cannot be
    /// resolved or has the wrong shape.
    pub fn infer_id(&self, user: &UserWrapper, extra: &BTreeMap<String, String>) -> Option<String> {
        let mut out = String::new();
        render(&self.segments, user, extra, &mut out)?;
        Some(out)
    }
}

impl fmt::Display for UserIdBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format)
    }
}

impl TryFrom<String> for UserIdBuilder {
    type Error = IdBuilderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserIdBuilder> for String {
    fn from(value: UserIdBuilder) -> Self {
        value.format
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Parser<'a> {
    format: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl Parser<'_> {
    fn segments(&mut self, in_normalize: bool) -> Result<Vec<Segment>, IdBuilderError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        while let Some(c) = self.chars.next() {
            let token = match c {
                '\\' => {
                    let escaped = self
                        .chars
                        .next()
                        .ok_or_else(|| IdBuilderError::DanglingEscape(self.format.to_string()))?;
                    literal.push(escaped);
                    continue;
                }
                '|' => Segment::Var(self.name(c)?),
                '#' => Segment::EmailLocalPart(self.name(c)?),
                '?' => {
                    let raw = self.name(c)?;
                    match raw.split_once(':') {
                        Some((var, attr)) if !var.is_empty() && !attr.is_empty() => Segment::DnValue {
                            var: var.to_string(),
                            attr: attr.to_string(),
                        },
                        _ => return Err(IdBuilderError::InvalidDnToken(raw)),
                    }
                }
                '*' if in_normalize => {
                    flush(&mut literal, &mut segments);
                    return Ok(segments);
                }
                '*' => Segment::Normalize(self.segments(true)?),
                other => {
                    literal.push(other);
                    continue;
                }
            };
            flush(&mut literal, &mut segments);
            segments.push(token);
        }
        if in_normalize {
            return Err(IdBuilderError::Unterminated {
                token: '*',
                format: self.format.to_string(),
            });
        }
        flush(&mut literal, &mut segments);
        Ok(segments)
    }

    fn name(&mut self, delim: char) -> Result<String, IdBuilderError> {
        let mut name = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == delim => break,
                Some(c) => name.push(c),
                None => {
                    return Err(IdBuilderError::Unterminated {
                        token: delim,
                        format: self.format.to_string(),
                    })
                }
            }
        }
        if name.is_empty() {
            return Err(IdBuilderError::EmptyVariable {
                token: delim,
                format: self.format.to_string(),
            });
        }
        Ok(name)
    }
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn lookup(name: &str, user: &UserWrapper, extra: &BTreeMap<String, String>) -> Option<PropertyValue> {
    user.value_for_property(&UserProperty::from(name))
        .or_else(|| extra.get(name).cloned().map(PropertyValue::Text))
}

fn render(
    segments: &[Segment],
    user: &UserWrapper,
    extra: &BTreeMap<String, String>,
    out: &mut String,
) -> Option<()> {
    for segment in segments {
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Var(name) => out.push_str(&lookup(name, user, extra)?.as_text()?),
            Segment::EmailLocalPart(name) => {
                out.push_str(lookup(name, user, extra)?.as_email()?.local_part())
            }
            Segment::DnValue { var, attr } => {
                let dn: DistinguishedName = lookup(var, user, extra)?.as_text()?.parse().ok()?;
                match dn.values_for(attr).as_slice() {
                    [only] => out.push_str(only),
                    _ => return None,
                }
            }
            Segment::Normalize(inner) => {
                let mut rendered = String::new();
                render(inner, user, extra, &mut rendered)?;
                out.push_str(&normalize(&rendered));
            }
        }
    }
    Some(())
}

/// Lowercase, drop diacritics, spaces to dashes.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.to_lowercase().chars() {
        // combining marks (e.g. the dot left by lowercasing 'İ')
        if ('\u{0300}'..='\u{036f}').contains(&c) {
            continue;
        }
        match c {
            ' ' => out.push('-'),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'ß' => out.push_str("ss"),
            other => out.push(fold_diacritic(other)),
        }
    }
    out
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' | 'ħ' => 'h',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ĵ' => 'j',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' | 'ș' => 's',
        'ţ' | 'ť' | 'ŧ' | 'ț' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagged_id::TaggedId;

    fn person(id: &str, first: &str, last: &str) -> UserWrapper {
        let mut u = UserWrapper::new(TaggedId::new("src", id).unwrap());
        u.first_name = Some(first.to_string());
        u.last_name = Some(last.to_string());
        u
    }

    fn no_extra() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn missing_variable_yields_none_until_supplied() {
        let user = person("francois.lamboley@happn.fr", "François", "Lamboley");
        let b = UserIdBuilder::new("*|first_name|*.*|last_name|*@|domain|").unwrap();
        assert_eq!(b.infer_id(&user, &no_extra()), None);

        let extra = BTreeMap::from([("domain".to_string(), "happn.fr".to_string())]);
        assert_eq!(
            b.infer_id(&user, &extra).as_deref(),
            Some("francois.lamboley@happn.fr")
        );
    }

    #[test]
    fn normalizes_turkish_and_spaces() {
        let b = UserIdBuilder::new("*|first_name|.|last_name|*@happn.fr").unwrap();
        assert_eq!(
            b.infer_id(&person("x", "İpek", "Küçük"), &no_extra()).as_deref(),
            Some("ipek.kucuk@happn.fr")
        );
        assert_eq!(
            b.infer_id(&person("x", "Thibault", "Le Cornec"), &no_extra()).as_deref(),
            Some("thibault.le-cornec@happn.fr")
        );
    }

    #[test]
    fn extracts_rdn_value_from_dn_id() {
        let user = person("uid=francois.lamboley,ou=people,dc=happn,dc=com", "François", "Lamboley");
        let b = UserIdBuilder::new("?id:uid?@happn.fr").unwrap();
        assert_eq!(
            b.infer_id(&user, &no_extra()).as_deref(),
            Some("francois.lamboley@happn.fr")
        );
        // dc has two values
        let ambiguous = UserIdBuilder::new("?id:dc?").unwrap();
        assert_eq!(ambiguous.infer_id(&user, &no_extra()), None);
    }

    #[test]
    fn email_local_part_token() {
        let mut user = person("1", "A", "B");
        user.emails = Some(vec!["paul.smith@main.domain".parse().unwrap()]);
        let b = UserIdBuilder::new("uid=#emails#,ou=people,dc=x").unwrap();
        assert_eq!(
            b.infer_id(&user, &no_extra()).as_deref(),
            Some("uid=paul.smith,ou=people,dc=x")
        );
        assert_eq!(b.infer_id(&person("1", "A", "B"), &no_extra()), None);
    }

    #[test]
    fn escapes_and_syntax_errors() {
        let b = UserIdBuilder::new(r"\|lit\|").unwrap();
        assert_eq!(b.infer_id(&person("1", "A", "B"), &no_extra()).as_deref(), Some("|lit|"));

        assert!(matches!(
            UserIdBuilder::new("|first_name"),
            Err(IdBuilderError::Unterminated { token: '|', .. })
        ));
        assert!(matches!(
            UserIdBuilder::new("*|first_name|"),
            Err(IdBuilderError::Unterminated { token: '*', .. })
        ));
        assert!(matches!(UserIdBuilder::new("||"), Err(IdBuilderError::EmptyVariable { .. })));
        assert!(matches!(UserIdBuilder::new("?id?"), Err(IdBuilderError::InvalidDnToken(_))));
        assert!(matches!(UserIdBuilder::new("abc\\"), Err(IdBuilderError::DanglingEscape(_))));
    }

    #[test]
    fn deserializes_from_template_string() {
        let b: UserIdBuilder = serde_json::from_str("\"|first_name|@x.com\"").unwrap();
        assert_eq!(b.format(), "|first_name|@x.com");
        assert!(serde_json::from_str::<UserIdBuilder>("\"|oops\"").is_err());
    }
}
