//! Range scanning with both discovery techniques.
//!
//! The link-layer probe sees hardware addresses but only on the local
//! segment; the routed probe crosses routers but never learns a hardware
//! address. Results are merged so each responding address appears once.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use ipam_core::AddressRange;

use crate::error::DiscoverError;
use crate::scanner::Prober;

/// Reply timeout for both range-wide probe techniques.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One responding address from a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub address: IpAddr,
    pub mac_address: Option<String>,
}

/// A discovery technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Technique {
    /// ARP broadcast on the local segment.
    LinkLayer,
    /// ICMP echo at the IP layer.
    Routed,
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkLayer => f.write_str("arp"),
            Self::Routed => f.write_str("icmp"),
        }
    }
}

/// A technique that raised an error and contributed nothing to the scan.
#[derive(Debug)]
pub struct TechniqueFailure {
    pub technique: Technique,
    pub error: DiscoverError,
}

/// Everything one range scan produced.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// At most one entry per address, sorted by address.
    pub results: Vec<ScanResult>,
    pub failures: Vec<TechniqueFailure>,
}

impl ScanOutcome {
    pub fn technique_failed(&self, technique: Technique) -> bool {
        self.failures.iter().any(|f| f.technique == technique)
    }
}

/// Runs the enabled techniques against a range and merges their replies.
#[derive(Clone)]
pub struct ProbeEngine {
    prober: Arc<dyn Prober>,
    timeout: Duration,
}

impl ProbeEngine {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self {
            prober,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Scan `range` with the enabled techniques.
    ///
    /// A technique that errors is logged and recorded in the outcome; it
    /// never prevents the other technique from running. There are no retries.
    pub async fn scan(
        &self,
        range: &AddressRange,
        use_link_layer: bool,
        use_routed: bool,
    ) -> ScanOutcome {
        let mut seen: BTreeMap<IpAddr, Option<String>> = BTreeMap::new();
        let mut failures = Vec::new();

        if use_link_layer {
            tracing::info!(range = %range.id, prefix = %range.prefix, "Starting ARP scan");
            match self.prober.broadcast_probe(&range.prefix, self.timeout).await {
                Ok(replies) => {
                    for (address, mac) in replies {
                        seen.insert(address, Some(mac));
                    }
                }
                Err(error) => {
                    tracing::error!(
                        range = %range.id,
                        prefix = %range.prefix,
                        error = %error,
                        "ARP scan failed"
                    );
                    failures.push(TechniqueFailure {
                        technique: Technique::LinkLayer,
                        error,
                    });
                }
            }
        }

        if use_routed {
            tracing::info!(range = %range.id, prefix = %range.prefix, "Starting ICMP scan");
            match self.prober.routed_probe(&range.prefix, self.timeout).await {
                Ok(replies) => {
                    for address in replies {
                        // A link-layer hardware address is authoritative; keep it.
                        seen.entry(address).or_insert(None);
                    }
                }
                Err(error) => {
                    tracing::error!(
                        range = %range.id,
                        prefix = %range.prefix,
                        error = %error,
                        "ICMP scan failed"
                    );
                    failures.push(TechniqueFailure {
                        technique: Technique::Routed,
                        error,
                    });
                }
            }
        }

        let results: Vec<ScanResult> = seen
            .into_iter()
            .map(|(address, mac_address)| ScanResult {
                address,
                mac_address,
            })
            .collect();

        tracing::info!(
            range = %range.id,
            responding = results.len(),
            failed_techniques = failures.len(),
            "Range probe complete"
        );

        ScanOutcome { results, failures }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use ipnet::IpNet;
    use std::sync::Mutex;

    /// Scripted prober: fixed replies per technique, optional failures,
    /// and a log of every call.
    #[derive(Default)]
    pub(crate) struct FakeProber {
        pub broadcast: Vec<(IpAddr, String)>,
        pub routed: Vec<IpAddr>,
        pub fail_broadcast: bool,
        pub fail_routed: bool,
        /// Prefixes whose probes raise, regardless of technique.
        pub failing_prefixes: Vec<IpNet>,
        pub calls: Mutex<Vec<(Technique, IpNet)>>,
    }

    impl FakeProber {
        fn fails(&self, target: &IpNet) -> bool {
            self.failing_prefixes.contains(target)
        }
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn broadcast_probe(
            &self,
            prefix: &IpNet,
            _timeout: Duration,
        ) -> Result<Vec<(IpAddr, String)>> {
            self.calls.lock().unwrap().push((Technique::LinkLayer, *prefix));
            if self.fail_broadcast || self.fails(prefix) {
                return Err(DiscoverError::NmapFailed {
                    code: 1,
                    stderr: "dnet: Failed to open device eth0".to_string(),
                });
            }
            Ok(self
                .broadcast
                .iter()
                .filter(|(ip, _)| prefix.contains(ip))
                .cloned()
                .collect())
        }

        async fn routed_probe(&self, target: &IpNet, _timeout: Duration) -> Result<Vec<IpAddr>> {
            self.calls.lock().unwrap().push((Technique::Routed, *target));
            if self.fail_routed || self.fails(target) {
                return Err(DiscoverError::Timeout { secs: 2 });
            }
            Ok(self
                .routed
                .iter()
                .filter(|ip| target.contains(*ip))
                .copied()
                .collect())
        }
    }

    pub(crate) fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn lab_range() -> AddressRange {
        AddressRange::new("lab", "10.0.0.0/24".parse().unwrap())
    }

    #[tokio::test]
    async fn test_link_layer_mac_wins_when_both_techniques_see_host() {
        let prober = FakeProber {
            broadcast: vec![(ip("10.0.0.5"), "AA:BB:CC:DD:EE:FF".to_string())],
            routed: vec![ip("10.0.0.5"), ip("10.0.0.7")],
            ..Default::default()
        };
        let engine = ProbeEngine::new(Arc::new(prober));

        let outcome = engine.scan(&lab_range(), true, true).await;

        assert_eq!(
            outcome.results,
            vec![
                ScanResult {
                    address: ip("10.0.0.5"),
                    mac_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
                },
                ScanResult {
                    address: ip("10.0.0.7"),
                    mac_address: None,
                },
            ]
        );
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_techniques_are_not_run() {
        let prober = Arc::new(FakeProber {
            broadcast: vec![(ip("10.0.0.5"), "AA:BB:CC:DD:EE:FF".to_string())],
            routed: vec![ip("10.0.0.7")],
            ..Default::default()
        });
        let engine = ProbeEngine::new(prober.clone());

        let outcome = engine.scan(&lab_range(), true, false).await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].address, ip("10.0.0.5"));

        let calls = prober.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Technique::LinkLayer);
    }

    #[tokio::test]
    async fn test_link_layer_failure_does_not_block_routed_probe() {
        let prober = FakeProber {
            routed: vec![ip("10.0.0.7")],
            fail_broadcast: true,
            ..Default::default()
        };
        let engine = ProbeEngine::new(Arc::new(prober));

        let outcome = engine.scan(&lab_range(), true, true).await;

        assert_eq!(
            outcome.results,
            vec![ScanResult {
                address: ip("10.0.0.7"),
                mac_address: None,
            }]
        );
        assert!(outcome.technique_failed(Technique::LinkLayer));
        assert!(!outcome.technique_failed(Technique::Routed));
    }

    #[tokio::test]
    async fn test_both_techniques_failing_yields_empty_outcome() {
        let prober = FakeProber {
            fail_broadcast: true,
            fail_routed: true,
            ..Default::default()
        };
        let engine = ProbeEngine::new(Arc::new(prober));

        let outcome = engine.scan(&lab_range(), true, true).await;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_enabled_probes_nothing() {
        let prober = Arc::new(FakeProber::default());
        let engine = ProbeEngine::new(prober.clone());

        let outcome = engine.scan(&lab_range(), false, false).await;
        assert!(outcome.results.is_empty());
        assert!(prober.calls.lock().unwrap().is_empty());
    }
}
