//! dirk-config
//!
//! Layered YAML configuration for the reconciliation tools.
//!
//! Documents are merged in order (later layers override earlier ones,
//! objects are merged key by key), converted to JSON, checked for literal
//! secrets, and hashed over their canonical JSON form. The typed view lives
//! in [`directory`].

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub mod directory;

pub use directory::{DirectoryConfig, IdKind, ReconcileConfig, ServiceConfig, UserRecord};

/// Leaf string values starting with one of these abort loading with
/// CONFIG_SECRET_DETECTED. Credentials are referenced by env var name only.
const SECRET_PREFIXES: &[&str] = &[
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "github_pat_",
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
    "ya29.",      // Google OAuth access token
    "AKIA",       // AWS access key ID
    "sk-",
    "-----BEGIN", // PEM private keys
];

/// JSON-pointer prefixes read by [`DirectoryConfig`]. Anything outside is
/// reported by [`report_unused_keys`].
const CONSUMED_POINTERS: &[&str] = &["/reconcile", "/services"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document.
    pub fn directory_config(&self) -> Result<DirectoryConfig> {
        let config: DirectoryConfig = serde_json::from_value(self.config_json.clone())
            .context("config does not match the directory schema")?;
        config.validate()?;
        Ok(config)
    }
}

/// Loads file layers in merge order. A relative `users_file` is anchored to
/// the directory of the layer that declares it before layers are merged.
pub fn load_layered_yaml<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig> {
    let mut layers: Vec<Value> = Vec::new();
    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p)
            .with_context(|| format!("failed to read yaml path: {}", p.display()))?;
        let mut layer = parse_layer(&raw, layers.len())?;
        if let Some(dir) = p.parent() {
            anchor_users_files(&mut layer, dir);
        }
        layers.push(layer);
    }
    merge_layers(layers)
}

/// String layers carry no location; relative paths stay as written.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let layers = yaml_docs
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_layer(raw, i))
        .collect::<Result<Vec<_>>>()?;
    merge_layers(layers)
}

fn parse_layer(raw: &str, i: usize) -> Result<Value> {
    let v_yaml: serde_yaml::Value =
        serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
    serde_json::to_value(v_yaml).context("yaml->json conversion failed")
}

fn merge_layers(layers: Vec<Value>) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for layer in layers {
        // an empty layer parses as null and must not wipe the base
        if layer.is_null() {
            continue;
        }
        merged = deep_merge(merged, layer);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Rewrites relative `/services/*/users_file` values to `dir.join(value)`.
fn anchor_users_files(layer: &mut Value, dir: &Path) {
    let Some(services) = layer.get_mut("services").and_then(Value::as_array_mut) else {
        return;
    };
    for service in services {
        let Some(file) = service.get_mut("users_file") else {
            continue;
        };
        let anchored = match file.as_str() {
            Some(s) if Path::new(s).is_relative() => dir.join(s),
            _ => continue,
        };
        *file = Value::String(anchored.to_string_lossy().into_owned());
    }
}

/// Objects merge key by key; anything else in `b` replaces `a`, arrays
/// included.
pub fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json::Map is key-sorted, so compact output is canonical.
    serde_json::to_string(v).context("canonical json serialize failed")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Sorted, unique.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Leaves of `config_json` not under any key the directory schema reads.
///
/// With [`UnusedKeyPolicy::Fail`], a non-empty report is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let unused: BTreeSet<String> = leaves
        .into_iter()
        .filter(|leaf| !CONSUMED_POINTERS.iter().any(|p| is_prefix_pointer(p, leaf)))
        .collect();
    let report = UnusedKeyReport {
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. First few: {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }
    Ok(report)
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but not "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    match leaf.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{prefix}/{i}"), out);
            }
        }
        _ => out.push(if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }),
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}
