//! Nmap XML output deserialization.
//!
//! Nmap's `-oX -` flag outputs structured XML to stdout.
//! This module provides typed Rust structs that deserialize from that XML
//! using `quick-xml` with serde. Only the parts host discovery and list
//! scans produce are modelled.

use std::net::IpAddr;

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
    pub runstats: Option<RunStats>,
}

/// A single host from scan results.
#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub hostnames: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub hostname_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStats {
    pub finished: Option<Finished>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Finished {
    #[serde(rename = "@exit")]
    pub exit: Option<String>,
    #[serde(rename = "@errormsg")]
    pub error_msg: Option<String>,
}

impl NmapRun {
    /// The error message nmap reported when it aborted the run, if any.
    pub fn error_message(&self) -> Option<&str> {
        let finished = self.runstats.as_ref()?.finished.as_ref()?;
        match finished.exit.as_deref() {
            Some("error") => Some(finished.error_msg.as_deref().unwrap_or("nmap reported an error")),
            _ => None,
        }
    }
}

impl NmapHost {
    /// Extract the IP address (v4 preferred, then v6), if present and valid.
    pub fn ip(&self) -> Option<IpAddr> {
        ["ipv4", "ipv6"].iter().find_map(|kind| {
            self.addresses
                .iter()
                .find(|a| a.addr_type == *kind)
                .and_then(|a| a.addr.parse().ok())
        })
    }

    /// Extract the MAC address, if present.
    pub fn mac(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == "mac")
            .map(|a| a.addr.as_str())
    }

    /// Extract the reverse-DNS hostname, if present.
    ///
    /// Prefers `PTR` entries; falls back to the first listed name.
    pub fn hostname(&self) -> Option<&str> {
        let names = &self.hostnames.as_ref()?.hostnames;
        names
            .iter()
            .find(|h| h.hostname_type.as_deref() == Some("PTR"))
            .or_else(|| names.first())
            .map(|h| h.name.as_str())
    }

    /// Check if the host is up.
    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}
