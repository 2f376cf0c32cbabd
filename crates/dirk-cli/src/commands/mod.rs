//! Command handler modules for the `dirk` binary.
//!
//! Shared setup (config loading, directory construction, JSON output) lives
//! here; command-specific logic lives in the submodules.

pub mod fetch;
pub mod merge;

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use dirk_config::{report_unused_keys, DirectoryConfig, UnusedKeyPolicy};
use dirk_core::{PropertySet, ServiceHandle};
use dirk_directory::SnapshotDirectory;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Everything a reconciliation command needs, built once from the config.
pub struct Session {
    pub config: DirectoryConfig,
    pub services: BTreeSet<ServiceHandle>,
}

impl Session {
    pub fn load(config_paths: &[String]) -> Result<Self> {
        let loaded = dirk_config::load_layered_yaml(config_paths)?;
        let config = loaded.directory_config()?;

        let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
        if !unused.is_clean() {
            warn!(keys = ?unused.unused_leaf_pointers, "config keys not read by dirk");
        }

        let services = config
            .services
            .iter()
            .map(|service| {
                SnapshotDirectory::from_config(service)
                    .map(ServiceHandle::new)
                    .with_context(|| format!("failed to build service '{}'", service.id))
            })
            .collect::<Result<BTreeSet<_>>>()?;
        info!(
            config_hash = %loaded.config_hash,
            services = services.len(),
            "session ready"
        );

        Ok(Self { config, services })
    }

    pub fn service(&self, tag: &str) -> Result<&ServiceHandle> {
        self.services
            .iter()
            .find(|s| s.tag() == tag)
            .with_context(|| {
                let known: Vec<&str> = self.services.iter().map(ServiceHandle::tag).collect();
                format!("UNKNOWN_SERVICE '{tag}' (configured: {})", known.join(", "))
            })
    }

    /// Configured valid services that are also in `among`.
    pub fn valid_services<'a>(
        &self,
        among: impl IntoIterator<Item = &'a ServiceHandle>,
    ) -> BTreeSet<ServiceHandle> {
        let tags = self.config.valid_service_tags();
        among
            .into_iter()
            .filter(|s| tags.contains(s.tag()))
            .cloned()
            .collect()
    }

    pub fn properties(&self) -> Option<PropertySet> {
        self.config.properties_to_fetch()
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize output failed")?;
    println!("{out}");
    Ok(())
}
