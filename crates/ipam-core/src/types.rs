//! Core domain types for the address inventory.
//!
//! These types are shared by the discovery engine and every inventory
//! store implementation.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters of an error message kept in a range's scan status.
pub const ERROR_MESSAGE_LIMIT: usize = 50;

// ── Address Ranges ────────────────────────────────────────────────

/// Unique identifier for a configured address range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeId(pub Uuid);

impl RangeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configured block of addresses under periodic scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddressRange {
    pub id: RangeId,
    pub name: String,
    pub prefix: IpNet,
    pub scan_status: ScanStatus,
    pub last_scan: Option<DateTime<Utc>>,
}

impl AddressRange {
    /// A freshly configured range that has never been scanned.
    pub fn new(name: impl Into<String>, prefix: IpNet) -> Self {
        Self {
            id: RangeId::new(),
            name: name.into(),
            prefix,
            scan_status: ScanStatus::Idle,
            last_scan: None,
        }
    }
}

/// Scan state of an address range.
///
/// Persisted as `Idle`, `Scanning` or `Error: <message>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ScanStatus {
    #[default]
    Idle,
    Scanning,
    Error(String),
}

impl ScanStatus {
    /// Build an error status, keeping at most [`ERROR_MESSAGE_LIMIT`] characters.
    pub fn error(message: impl AsRef<str>) -> Self {
        let truncated: String = message.as_ref().chars().take(ERROR_MESSAGE_LIMIT).collect();
        Self::Error(truncated)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Scanning => f.write_str("Scanning"),
            Self::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl FromStr for ScanStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" | "" => Ok(Self::Idle),
            "Scanning" => Ok(Self::Scanning),
            other => match other.strip_prefix("Error:") {
                Some(msg) => Ok(Self::Error(msg.trim_start().to_string())),
                None => Err(ParseEnumError::new("scan status", other)),
            },
        }
    }
}

impl From<ScanStatus> for String {
    fn from(status: ScanStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for ScanStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, ParseEnumError> {
        value.parse()
    }
}

// ── Host Records ──────────────────────────────────────────────────

/// Assignment status of an inventory entry.
///
/// Everything except `Discovered` is set by an operator and is never
/// touched by the discovery engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostStatus {
    Allocated,
    Reserved,
    Available,
    DhcpPool,
    Discovered,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocated => "ALLOCATED",
            Self::Reserved => "RESERVED",
            Self::Available => "AVAILABLE",
            Self::DhcpPool => "DHCP_POOL",
            Self::Discovered => "DISCOVERED",
        }
    }

    /// Whether this status was assigned by an operator rather than discovery.
    pub fn is_operator_assigned(&self) -> bool {
        matches!(self, Self::Allocated | Self::Reserved | Self::DhcpPool)
    }
}

impl FromStr for HostStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOCATED" => Ok(Self::Allocated),
            "RESERVED" => Ok(Self::Reserved),
            "AVAILABLE" => Ok(Self::Available),
            "DHCP_POOL" => Ok(Self::DhcpPool),
            "DISCOVERED" => Ok(Self::Discovered),
            other => Err(ParseEnumError::new("host status", other)),
        }
    }
}

/// Liveness of a host as last observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Health {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl Health {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Offline => "Offline",
            Self::Unknown => "Unknown",
        }
    }
}

impl FromStr for Health {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Online" => Ok(Self::Online),
            "Offline" => Ok(Self::Offline),
            "Unknown" | "" => Ok(Self::Unknown),
            other => Err(ParseEnumError::new("health", other)),
        }
    }
}

/// A persisted inventory entry for one address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostRecord {
    pub address: IpAddr,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub status: HostStatus,
    pub health: Health,
    pub last_seen: Option<DateTime<Utc>>,
    pub range_id: RangeId,
}

impl HostRecord {
    /// A record created by discovery on first sighting of an unknown address.
    pub fn discovered(
        address: IpAddr,
        range_id: RangeId,
        mac_address: Option<String>,
        hostname: Option<String>,
        seen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            address,
            hostname,
            mac_address,
            status: HostStatus::Discovered,
            health: Health::Online,
            last_seen: Some(seen_at),
            range_id,
        }
    }

    /// Apply a patch in place using the same rules every store follows.
    pub fn apply(&mut self, update: &HostUpdate) {
        if let Some(seen) = update.last_seen {
            self.last_seen = Some(self.last_seen.map_or(seen, |prev| prev.max(seen)));
        }
        if let Some(mac) = &update.mac_address {
            self.mac_address = Some(mac.clone());
        }
        if let Some(name) = &update.hostname {
            self.hostname = Some(name.clone());
        }
        if let Some(health) = update.health {
            self.health = health;
        }
    }
}

/// Field-scoped patch for an existing host record.
///
/// There is no status field: discovery and health sweeps can never change
/// a record's assignment status. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostUpdate {
    /// Applied as `max(stored, new)`.
    pub last_seen: Option<DateTime<Utc>>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub health: Option<Health>,
}

impl HostUpdate {
    pub fn health(health: Health) -> Self {
        Self {
            health: Some(health),
            ..Default::default()
        }
    }

    pub fn seen(mut self, at: DateTime<Utc>) -> Self {
        self.last_seen = Some(at);
        self
    }
}

// ── Range Statistics ──────────────────────────────────────────────

/// Occupancy summary of one address range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RangeStats {
    pub total: u128,
    pub assigned: u64,
    pub discovered: u64,
    pub free: u128,
}

impl RangeStats {
    /// Summarize the records belonging to `prefix`.
    pub fn compute<'a>(prefix: &IpNet, hosts: impl IntoIterator<Item = &'a HostRecord>) -> Self {
        let host_bits = u32::from(prefix.max_prefix_len() - prefix.prefix_len());
        let total = 1u128.checked_shl(host_bits).unwrap_or(u128::MAX);

        let (mut assigned, mut discovered) = (0u64, 0u64);
        for host in hosts {
            match host.status {
                HostStatus::Discovered => discovered += 1,
                _ => assigned += 1,
            }
        }

        let used = u128::from(assigned) + u128::from(discovered);
        Self {
            total,
            assigned,
            discovered,
            free: total.saturating_sub(used),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────

/// A stored enum value that does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
