//! Scenario: CLI Reconciles Sample Directories
//!
//! Runs the `dirk` binary against the sample config shipped under
//! `config/` (users files resolved next to it).
//!
//! # Invariants under test
//!
//! 1. `config-hash` prints a 64-hex hash and the canonical JSON.
//! 2. `merge` prints one identity per person, complete over every service.
//! 3. `valid_services` restricts the output; `--allow-non-valid` lifts it.
//! 4. `fetch` resolves a seed's counterparts in every service.
//! 5. Unknown services, unknown users and literal secrets fail with a
//!    readable error on stderr and nothing on stdout.

use std::fs;
use std::path::PathBuf;

use predicates::prelude::*;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sample_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("dirk.yaml")
}

fn dirk() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("dirk").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn stdout_json(cmd: &mut assert_cmd::Command) -> Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

// ---------------------------------------------------------------------------
// config-hash
// ---------------------------------------------------------------------------

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let out = dirk()
        .arg("config-hash")
        .arg(sample_config())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let out = String::from_utf8(out).unwrap();
    let mut lines = out.lines();

    let hash = lines.next().unwrap().strip_prefix("config_hash=").unwrap();
    assert_eq!(hash.len(), 64);
    let canonical: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(canonical["services"][0]["id"], "ldap");
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

#[test]
fn merge_prints_complete_identities() {
    let report = stdout_json(dirk().arg("merge").arg("--config").arg(sample_config()));

    let users = report["users"].as_array().unwrap();
    assert_eq!(users.len(), 4);
    for user in users {
        let slots = user.as_object().unwrap();
        assert_eq!(
            slots.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["github", "google", "ldap"]
        );
    }
    assert_eq!(users[0]["github"]["user"]["id"], "github:alice-gh");
    assert_eq!(users[0]["google"]["user"]["id"], "google:alice.martin@happn.fr");
    assert_eq!(users[2]["google"]["user"]["id"], "google:ipek.kucuk@happn.com");
    assert_eq!(users[2]["github"]["status"], "absent");
    assert!(report.get("fetch_errors").is_none());
}

#[test]
fn valid_services_restrict_merge_output_unless_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let overlay = dir.path().join("only-github.yaml");
    fs::write(&overlay, "reconcile:\n  valid_services: [github]\n").unwrap();

    let restricted = stdout_json(
        dirk()
            .arg("merge")
            .arg("--config")
            .arg(sample_config())
            .arg(&overlay),
    );
    let users = restricted["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["github"]["status"], "found");
    assert!(users[0].get("ldap").is_none());

    let lenient = stdout_json(
        dirk()
            .arg("merge")
            .arg("--config")
            .arg(sample_config())
            .arg(&overlay)
            .arg("--allow-non-valid"),
    );
    assert_eq!(lenient["users"].as_array().unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

#[test]
fn fetch_resolves_seed_counterparts() {
    let report = stdout_json(dirk().args([
        "fetch",
        "--config",
        sample_config().to_str().unwrap(),
        "--service",
        "ldap",
        "--user-id",
        "uid=alice,ou=people,dc=happn,dc=fr",
    ]));

    assert_eq!(report["ldap"]["user"]["id"], "ldap:uid=alice,ou=people,dc=happn,dc=fr");
    assert_eq!(report["google"]["user"]["id"], "google:alice.martin@happn.fr");
    assert_eq!(report["github"]["user"]["id"], "github:alice-gh");
}

#[test]
fn fetch_unknown_service_or_user_fails() {
    dirk()
        .args([
            "fetch",
            "--config",
            sample_config().to_str().unwrap(),
            "--service",
            "slack",
            "--user-id",
            "U123",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("UNKNOWN_SERVICE 'slack'"));

    dirk()
        .args([
            "fetch",
            "--config",
            sample_config().to_str().unwrap(),
            "--service",
            "google",
            "--user-id",
            "nobody@happn.fr",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("USER_NOT_FOUND"));
}

// ---------------------------------------------------------------------------
// Config guards
// ---------------------------------------------------------------------------

#[test]
fn literal_secret_in_config_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("dirk.yaml");
    fs::write(
        &config,
        "services:\n  - id: github\n    token: \"ghp_0123456789abcdef\"\n",
    )
    .unwrap();

    dirk()
        .arg("merge")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("ghp_0123456789abcdef").not());
}
