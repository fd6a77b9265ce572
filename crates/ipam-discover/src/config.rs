//! Configuration for the ipam-discover daemon.
//!
//! Two layers: [`DiscoverConfig`] is read once at startup and describes the
//! process itself; [`DiscoverySettings`] are the operator-tunable knobs the
//! scheduler re-reads at the start of every cycle.

use serde::Deserialize;

/// Default cycle interval in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;

/// Top-level process configuration.
///
/// Loaded from `ipam.toml` `[discover]` section or
/// `IPAM_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Where per-cycle settings are read from.
    #[serde(default)]
    pub settings_source: SettingsSource,

    /// Which inventory store backs the daemon.
    #[serde(default)]
    pub store: StoreBackend,

    /// Hard wall-clock limit for a single nmap invocation, in seconds.
    #[serde(default = "default_probe_deadline")]
    pub probe_deadline_secs: u64,
}

/// Source of the per-cycle [`DiscoverySettings`].
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettingsSource {
    /// The `[settings]` section of the config file and `IPAM_SETTINGS__` variables.
    #[default]
    File,
    /// `(:Setting {key, value})` nodes in Neo4j.
    Graph,
}

/// Inventory store implementation.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Graph,
    /// Process-local store; inventory is lost on exit.
    Memory,
}

/// Operator settings consumed once per discovery cycle.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Minutes to sleep between cycles.
    #[serde(default = "default_interval")]
    pub discovery_interval: u64,

    /// Run the link-layer (ARP) broadcast probe.
    #[serde(default = "default_true")]
    pub arp_enabled: bool,

    /// Run the routed (ICMP echo) probe.
    #[serde(default = "default_true")]
    pub icmp_enabled: bool,

    /// Resolve hostnames of responding addresses.
    #[serde(default)]
    pub dns_enabled: bool,

    /// Custom DNS server for reverse lookups; empty means the system default.
    #[serde(default)]
    pub dns_server: Option<String>,
}

impl DiscoverySettings {
    /// The custom DNS server, treating an empty string as unset.
    pub fn custom_server(&self) -> Option<&str> {
        self.dns_server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Sleep between cycles, never shorter than one minute.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.discovery_interval.max(1) * 60)
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            discovery_interval: default_interval(),
            arp_enabled: true,
            icmp_enabled: true,
            dns_enabled: false,
            dns_server: None,
        }
    }
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_probe_deadline() -> u64 {
    300
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            settings_source: SettingsSource::default(),
            store: StoreBackend::default(),
            probe_deadline_secs: default_probe_deadline(),
        }
    }
}
