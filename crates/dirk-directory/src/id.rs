use dirk_config::IdKind;
use dirk_core::{DistinguishedName, Email, ServiceError};

/// Validates `raw` for `kind` and returns its canonical string form.
///
/// Canonical forms are fixed points: canonicalising one again returns it
/// unchanged.
pub fn canonical_id(service: &str, kind: IdKind, raw: &str) -> Result<String, ServiceError> {
    let invalid = |reason: String| ServiceError::InvalidUserId {
        service: service.to_string(),
        value: raw.to_string(),
        reason,
    };
    match kind {
        IdKind::Email => raw
            .parse::<Email>()
            .map(|e| e.to_string())
            .map_err(|e| invalid(e.to_string())),
        IdKind::Dn => raw
            .parse::<DistinguishedName>()
            .map(|dn| dn.to_string())
            .map_err(|e| invalid(e.to_string())),
        IdKind::Opaque if raw.is_empty() => Err(invalid("empty id".to_string())),
        IdKind::Opaque => Ok(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms_are_fixed_points() {
        for (kind, raw, canonical) in [
            (IdKind::Email, "Alice@X.COM", "Alice@x.com"),
            (IdKind::Dn, "UID=alice, DC=x", "uid=alice,dc=x"),
            (IdKind::Opaque, "12345", "12345"),
        ] {
            let once = canonical_id("s", kind, raw).unwrap();
            assert_eq!(once, canonical);
            assert_eq!(canonical_id("s", kind, &once).unwrap(), once);
        }
    }

    #[test]
    fn malformed_ids_name_the_service() {
        let err = canonical_id("google", IdKind::Email, "not-an-email").unwrap_err();
        assert!(err.to_string().contains("google"));
        assert!(canonical_id("ldap", IdKind::Dn, "garbage").is_err());
        assert!(canonical_id("gh", IdKind::Opaque, "").is_err());
    }
}
