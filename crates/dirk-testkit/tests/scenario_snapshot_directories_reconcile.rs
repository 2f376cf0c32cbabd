//! Scenario: Snapshot Directories Reconcile
//!
//! End to end: layered YAML config -> snapshot directories -> fetch_all and
//! fetch, with inference driven only by configured id templates.
//!
//! # Invariants under test
//!
//! 1. Names with diacritics map to the expected email id through a
//!    normalising template.
//! 2. A user stored under an alias domain is linked through alternates.
//! 3. Custom attributes of one directory feed another directory's template.
//! 4. Identities come out ordered and complete over every configured service.
//! 5. Suspended users follow `include_suspended`.
//! 6. Single-seed fetch reaches the same identity as the batch merge.
//! 7. Numeric attributes feed templates as their decimal text.

use std::collections::BTreeSet;
use std::fs;

use dirk_config::{load_layered_yaml, load_layered_yaml_from_strings, LoadedConfig};
use dirk_core::{DynUserService, ServiceHandle, UserAndService};
use dirk_directory::SnapshotDirectory;
use dirk_reconcile::{fetch, fetch_all, MultiServicesUser};

const CONFIG_YAML: &str = r#"
reconcile:
  include_suspended: true
services:
  - id: ldap
    id_kind: dn
    users:
      - id: "uid=alice,ou=people,dc=happn,dc=fr"
        first_name: Alice
        last_name: Martin
        emails: ["alice.martin@happn.fr"]
        attributes:
          github_login: alice-gh
      - id: "uid=ipek,ou=people,dc=happn,dc=fr"
        first_name: "İpek"
        last_name: "Küçük"
      - id: "uid=bob,ou=people,dc=happn,dc=fr"
        suspended: true
  - id: google
    id_kind: email
    user_id_builders: ["*|first_name|*.*|last_name|*@happn.fr"]
    domain_aliases:
      happn.fr: [happn.com]
    users:
      - id: alice.martin@happn.fr
      - id: ipek.kucuk@happn.com
      - id: carl@happn.fr
  - id: github
    id_kind: opaque
    user_id_builders: ["|github_login|"]
    users:
      - id: alice-gh
"#;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn directories(loaded: &LoadedConfig) -> BTreeSet<ServiceHandle> {
    let config = loaded.directory_config().unwrap();
    config
        .services
        .iter()
        .map(|s| ServiceHandle::new(SnapshotDirectory::from_config(s).unwrap()))
        .collect()
}

fn handle<'a>(services: &'a BTreeSet<ServiceHandle>, tag: &str) -> &'a ServiceHandle {
    services.iter().find(|s| s.tag() == tag).unwrap()
}

fn found(user: &MultiServicesUser, tag: &str) -> Option<String> {
    user.found_tagged_id(tag).map(|t| t.to_string())
}

// ---------------------------------------------------------------------------
// 1. Batch reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_all_links_through_templates_and_aliases() {
    let loaded = load_layered_yaml_from_strings(&[CONFIG_YAML]).unwrap();
    let services = directories(&loaded);

    let outcome = fetch_all(&services, None, true).await.unwrap();
    assert!(outcome.fetch_errors.is_empty());

    // alice, carl, ipek, bob (ordered by smallest tagged id)
    assert_eq!(outcome.users.len(), 4);
    for user in &outcome.users {
        assert_eq!(user.len(), 3);
    }

    let alice = &outcome.users[0];
    assert_eq!(found(alice, "github").as_deref(), Some("github:alice-gh"));
    assert_eq!(
        found(alice, "google").as_deref(),
        Some("google:alice.martin@happn.fr")
    );
    assert_eq!(
        found(alice, "ldap").as_deref(),
        Some("ldap:uid=alice,ou=people,dc=happn,dc=fr")
    );

    let carl = &outcome.users[1];
    assert_eq!(found(carl, "google").as_deref(), Some("google:carl@happn.fr"));
    assert!(matches!(carl.get_by_tag("ldap"), Some(Ok(None))));

    let ipek = &outcome.users[2];
    assert_eq!(
        found(ipek, "google").as_deref(),
        Some("google:ipek.kucuk@happn.com")
    );
    assert_eq!(
        found(ipek, "ldap").as_deref(),
        Some("ldap:uid=ipek,ou=people,dc=happn,dc=fr")
    );
    assert!(matches!(ipek.get_by_tag("github"), Some(Ok(None))));

    let bob = &outcome.users[3];
    assert_eq!(
        found(bob, "ldap").as_deref(),
        Some("ldap:uid=bob,ou=people,dc=happn,dc=fr")
    );
}

#[tokio::test]
async fn suspended_users_are_left_out_on_request() {
    let loaded = load_layered_yaml_from_strings(&[
        CONFIG_YAML,
        "reconcile:\n  include_suspended: false\n",
    ])
    .unwrap();
    let include_suspended = loaded.directory_config().unwrap().reconcile.include_suspended;
    let services = directories(&loaded);

    let outcome = fetch_all(&services, None, include_suspended).await.unwrap();
    assert_eq!(outcome.users.len(), 3);
    assert!(outcome
        .users
        .iter()
        .all(|u| found(u, "ldap").as_deref() != Some("ldap:uid=bob,ou=people,dc=happn,dc=fr")));
}

#[tokio::test]
async fn numeric_attribute_links_through_a_template() {
    let loaded = load_layered_yaml_from_strings(&[r#"
services:
  - id: ldap
    id_kind: dn
    users:
      - id: "uid=alice,dc=x"
        attributes:
          github_id: 42
  - id: github
    user_id_builders: ["|github_id|"]
    users:
      - id: "42"
"#])
    .unwrap();
    let services = directories(&loaded);

    let outcome = fetch_all(&services, None, true).await.unwrap();
    assert_eq!(outcome.users.len(), 1);
    assert_eq!(found(&outcome.users[0], "github").as_deref(), Some("github:42"));
    assert_eq!(
        found(&outcome.users[0], "ldap").as_deref(),
        Some("ldap:uid=alice,dc=x")
    );
}

// ---------------------------------------------------------------------------
// 2. Single-seed discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_from_ldap_matches_the_batch_identity() {
    let loaded = load_layered_yaml_from_strings(&[CONFIG_YAML]).unwrap();
    let services = directories(&loaded);
    let ldap = handle(&services, "ldap");

    let user = ldap
        .existing_user_from_id_string("uid=ipek,ou=people,dc=happn,dc=fr", None)
        .await
        .unwrap()
        .unwrap();
    let seed = UserAndService::new(user, ldap.clone()).unwrap();

    let fetched = fetch(&seed, &services, None).await.unwrap();
    let batch = fetch_all(&services, None, true).await.unwrap();

    assert_eq!(found(&fetched, "google"), found(&batch.users[2], "google"));
    assert_eq!(found(&fetched, "ldap"), found(&batch.users[2], "ldap"));

    // nobody can infer a github login for ipek
    let github = fetched.get_by_tag("github").unwrap().as_ref().unwrap_err();
    assert!(github.last_error().unwrap().is_cannot_infer_user_id());
}

// ---------------------------------------------------------------------------
// 3. Users file next to the config
// ---------------------------------------------------------------------------

#[tokio::test]
async fn users_file_is_read_relative_to_the_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("github.json"),
        r#"[{"id": "alice-gh", "first_name": "Alice"}, {"id": "bot"}]"#,
    )
    .unwrap();
    let config = dir.path().join("dirk.yaml");
    fs::write(
        &config,
        "services:\n  - id: github\n    users_file: github.json\n",
    )
    .unwrap();

    let loaded = load_layered_yaml(&[&config]).unwrap();
    let services = directories(&loaded);
    let outcome = fetch_all(&services, None, true).await.unwrap();

    assert_eq!(outcome.users.len(), 2);
    assert_eq!(
        found(&outcome.users[0], "github").as_deref(),
        Some("github:alice-gh")
    );
}
