//! Per-cycle discovery settings providers.
//!
//! Settings are re-read at the start of every cycle so operator changes take
//! effect without a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use ipam_graph::GraphStore;

use crate::config::{DiscoverySettings, DEFAULT_INTERVAL_MINUTES};
use crate::error::{DiscoverError, Result};

/// Source of [`DiscoverySettings`].
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn load(&self) -> Result<DiscoverySettings>;
}

/// Reads the `[settings]` section of the config file plus `IPAM_SETTINGS__*`
/// environment variables. The sources are rebuilt on every call.
pub struct FileSettings {
    file_prefix: String,
}

impl FileSettings {
    pub fn new(file_prefix: &str) -> Self {
        Self {
            file_prefix: file_prefix.to_string(),
        }
    }
}

#[async_trait]
impl SettingsProvider for FileSettings {
    async fn load(&self) -> Result<DiscoverySettings> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(&self.file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("IPAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match cfg.get::<DiscoverySettings>("settings") {
            Ok(s) => Ok(s),
            Err(config::ConfigError::NotFound(_)) => Ok(DiscoverySettings::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads `(:Setting {key, value})` nodes from Neo4j.
pub struct GraphSettings {
    store: GraphStore,
}

impl GraphSettings {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SettingsProvider for GraphSettings {
    async fn load(&self) -> Result<DiscoverySettings> {
        let raw = self.store.read_settings().await?;
        parse_settings(&raw)
    }
}

/// Build settings from string key/value pairs.
///
/// Booleans are true only for a case-insensitive `"true"`. Missing keys take
/// their defaults; an unparseable interval is an error.
pub fn parse_settings(raw: &HashMap<String, String>) -> Result<DiscoverySettings> {
    let flag = |key: &str, default: bool| {
        raw.get(key)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    };

    let discovery_interval = match raw.get("discovery_interval") {
        Some(v) => v.trim().parse::<u64>().map_err(|e| {
            DiscoverError::Config(format!("Invalid discovery_interval {v:?}: {e}"))
        })?,
        None => DEFAULT_INTERVAL_MINUTES,
    };

    Ok(DiscoverySettings {
        discovery_interval,
        arp_enabled: flag("arp_enabled", true),
        icmp_enabled: flag("icmp_enabled", true),
        dns_enabled: flag("dns_enabled", false),
        dns_server: raw
            .get("dns_server")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

/// A fixed settings value.
pub struct StaticSettings(pub DiscoverySettings);

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn load(&self) -> Result<DiscoverySettings> {
        Ok(self.0.clone())
    }
}
