//! Probe primitives and the nmap process wrapper that provides them.
//!
//! The discovery engine talks to the network only through the [`Prober`] and
//! [`ReverseLookup`] traits. [`NmapScanner`] implements both by executing
//! nmap as a child process via `tokio::process::Command` and parsing its XML
//! output.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ipnet::IpNet;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{self, NmapRun};

/// Which resolver a reverse lookup goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupVia<'a> {
    /// An operator-chosen DNS server.
    Server(&'a str),
    /// The scanner's own resolver, reading the host's resolver configuration.
    Default,
    /// The platform resolver (`getnameinfo`).
    System,
}

/// Network probing capability.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Link-layer broadcast probe: addresses and hardware addresses of hosts
    /// on the local segment that answered within `timeout`.
    async fn broadcast_probe(
        &self,
        prefix: &IpNet,
        timeout: Duration,
    ) -> Result<Vec<(IpAddr, String)>>;

    /// Routed echo probe: addresses in `target` that answered within `timeout`.
    async fn routed_probe(&self, target: &IpNet, timeout: Duration) -> Result<Vec<IpAddr>>;
}

/// Reverse name lookup capability.
#[async_trait]
pub trait ReverseLookup: Send + Sync {
    /// The name registered for `address`, or `None` if there is no answer.
    async fn reverse_lookup(
        &self,
        address: IpAddr,
        via: LookupVia<'_>,
        timeout: Duration,
    ) -> Result<Option<String>>;
}

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
    deadline: Duration,
}

impl NmapScanner {
    /// `deadline` bounds the wall-clock time of any single nmap run.
    pub fn new(nmap_path: &str, deadline: Duration) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
            deadline,
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        String::from_utf8(output.stdout).map_err(|e| DiscoverError::XmlParse(e.to_string()))
    }

    /// Run nmap with `args` against `target` and parse the XML it writes to stdout.
    ///
    /// The child is killed if `limit` elapses first.
    async fn run(
        &self,
        args: &[String],
        target: &str,
        ipv6: bool,
        limit: Duration,
    ) -> Result<NmapRun> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();

        tracing::debug!(run_id = %run_id, target = %target, args = ?args, "Starting nmap");

        let child = Command::new(&self.nmap_path)
            .args(command_line(args, target, ipv6))
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(limit, child)
            .await
            .map_err(|_| DiscoverError::Timeout {
                secs: limit.as_secs(),
            })?
            .map_err(|e| DiscoverError::NmapNotFound {
                path: format!("{}: {e}", self.nmap_path),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DiscoverError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let nmap_run = nmap_xml::parse_nmap_xml(&output.stdout)?;
        if let Some(msg) = nmap_run.error_message() {
            return Err(DiscoverError::NmapFailed {
                code: 0,
                stderr: msg.to_string(),
            });
        }

        tracing::debug!(
            run_id = %run_id,
            target = %target,
            hosts = nmap_run.hosts.len(),
            duration_ms = start.elapsed().as_millis(),
            "Nmap run complete"
        );

        Ok(nmap_run)
    }
}

#[async_trait]
impl Prober for NmapScanner {
    async fn broadcast_probe(
        &self,
        prefix: &IpNet,
        timeout: Duration,
    ) -> Result<Vec<(IpAddr, String)>> {
        let run = self
            .run(
                &broadcast_args(timeout),
                &prefix.to_string(),
                prefix.addr().is_ipv6(),
                self.deadline,
            )
            .await?;
        Ok(link_layer_replies(&run))
    }

    async fn routed_probe(&self, target: &IpNet, timeout: Duration) -> Result<Vec<IpAddr>> {
        let run = self
            .run(
                &routed_args(timeout),
                &probe_target(target),
                target.addr().is_ipv6(),
                self.deadline,
            )
            .await?;
        Ok(echo_replies(&run))
    }
}

#[async_trait]
impl ReverseLookup for NmapScanner {
    async fn reverse_lookup(
        &self,
        address: IpAddr,
        via: LookupVia<'_>,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let run = self
            .run(&lookup_args(via), &address.to_string(), address.is_ipv6(), timeout)
            .await?;
        Ok(run
            .hosts
            .iter()
            .find(|h| h.ip() == Some(address))
            .and_then(|h| h.hostname())
            .map(String::from))
    }
}

// ── Argument builders ────────────────────────────────────────────

/// ARP ping sweep: no port scan, no DNS, raw ethernet frames, no retries.
fn broadcast_args(timeout: Duration) -> Vec<String> {
    let mut args: Vec<String> = ["-sn", "-n", "-PR", "--send-eth", "--max-retries", "0"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push("--max-rtt-timeout".to_string());
    args.push(format!("{}ms", timeout.as_millis()));
    args
}

/// ICMP echo sweep sent at the IP layer so it crosses routers.
fn routed_args(timeout: Duration) -> Vec<String> {
    let mut args: Vec<String> = [
        "-sn",
        "-n",
        "-PE",
        "--disable-arp-ping",
        "--send-ip",
        "--max-retries",
        "0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push("--max-rtt-timeout".to_string());
    args.push(format!("{}ms", timeout.as_millis()));
    args
}

/// List scan with forced reverse resolution.
fn lookup_args(via: LookupVia<'_>) -> Vec<String> {
    let mut args = vec!["-sL".to_string(), "-R".to_string()];
    match via {
        LookupVia::Server(server) => {
            args.push("--dns-servers".to_string());
            args.push(server.to_string());
        }
        LookupVia::Default => {}
        LookupVia::System => args.push("--system-dns".to_string()),
    }
    args
}

/// Full argument list: technique args, XML to stdout, then the target.
/// nmap only scans IPv6 targets when told to with `-6`.
fn command_line(args: &[String], target: &str, ipv6: bool) -> Vec<String> {
    let mut line = Vec::with_capacity(args.len() + 5);
    if ipv6 {
        line.push("-6".to_string());
    }
    line.extend(args.iter().cloned());
    line.extend(["-oX", "-", "--noninteractive", target].map(String::from));
    line
}

/// Single hosts are passed as bare addresses, networks in CIDR form.
fn probe_target(target: &IpNet) -> String {
    if target.prefix_len() == target.max_prefix_len() {
        target.addr().to_string()
    } else {
        target.to_string()
    }
}

// ── Result extraction ────────────────────────────────────────────

/// Hosts that answered at the link layer; a reply without a MAC does not count.
fn link_layer_replies(run: &NmapRun) -> Vec<(IpAddr, String)> {
    run.hosts
        .iter()
        .filter(|h| h.is_up())
        .filter_map(|h| Some((h.ip()?, h.mac()?.to_uppercase())))
        .collect()
}

/// Hosts that answered the echo probe. Any MAC nmap reports is ignored.
fn echo_replies(run: &NmapRun) -> Vec<IpAddr> {
    run.hosts
        .iter()
        .filter(|h| h.is_up())
        .filter_map(|h| h.ip())
        .collect()
}
