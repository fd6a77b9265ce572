//! Liveness sweep over every host record in the inventory.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ipam_core::{Health, HostUpdate, InventoryStore};
use ipnet::IpNet;

use crate::error::Result;
use crate::scanner::Prober;

/// Echo reply timeout for a single-host health probe.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub online: usize,
    pub offline: usize,
    /// Hosts whose new health could not be written.
    pub failed_writes: usize,
}

/// Probes each known host and records whether it answered.
#[derive(Clone)]
pub struct HealthMonitor {
    store: Arc<dyn InventoryStore>,
    prober: Arc<dyn Prober>,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn InventoryStore>, prober: Arc<dyn Prober>) -> Self {
        Self {
            store,
            prober,
            timeout: HEALTH_TIMEOUT,
        }
    }

    /// Probe every host record once.
    ///
    /// Only listing the hosts can fail the sweep; a probe error counts as
    /// offline and a failed write is logged and counted. Records are never
    /// created or deleted here.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let hosts = self.store.list_hosts().await?;
        tracing::info!(hosts = hosts.len(), "Starting health sweep");

        let mut report = SweepReport::default();
        for host in &hosts {
            let target = IpNet::from(host.address);
            let alive = match self.prober.routed_probe(&target, self.timeout).await {
                Ok(replies) => replies.contains(&host.address),
                Err(e) => {
                    tracing::debug!(address = %host.address, error = %e, "Health probe failed");
                    false
                }
            };

            let update = if alive {
                HostUpdate::health(Health::Online).seen(Utc::now())
            } else {
                HostUpdate::health(Health::Offline)
            };

            match self.store.update_host(host.address, &update).await {
                Ok(()) if alive => report.online += 1,
                Ok(()) => report.offline += 1,
                Err(e) => {
                    tracing::warn!(address = %host.address, error = %e, "Failed to record host health");
                    report.failed_writes += 1;
                }
            }
        }

        tracing::info!(
            online = report.online,
            offline = report.offline,
            failed_writes = report.failed_writes,
            "Health sweep complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::{ip, FakeProber};
    use crate::testing::FlakyStore;
    use chrono::TimeDelta;
    use ipam_core::{AddressRange, HostRecord, HostStatus, MemoryStore};

    fn seeded(addrs: &[&str]) -> (AddressRange, Vec<HostRecord>) {
        let range = AddressRange::new("lab", "10.0.0.0/24".parse().unwrap());
        let earlier = Utc::now() - TimeDelta::hours(2);
        let hosts = addrs
            .iter()
            .map(|a| {
                let mut h = HostRecord::discovered(ip(a), range.id, None, None, earlier);
                h.status = HostStatus::Allocated;
                h.health = Health::Unknown;
                h
            })
            .collect();
        (range, hosts)
    }

    #[tokio::test]
    async fn test_sweep_marks_online_and_offline() {
        let (range, hosts) = seeded(&["10.0.0.1", "10.0.0.2"]);
        let earlier = hosts[1].last_seen;
        let store = Arc::new(MemoryStore::with_inventory([range], hosts));
        let prober = Arc::new(FakeProber {
            routed: vec![ip("10.0.0.1")],
            ..Default::default()
        });
        let monitor = HealthMonitor::new(store.clone(), prober.clone());

        let report = monitor.sweep().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                online: 1,
                offline: 1,
                failed_writes: 0
            }
        );

        let up = store.get_host(ip("10.0.0.1")).await.unwrap().unwrap();
        assert_eq!(up.health, Health::Online);
        assert!(up.last_seen > earlier);
        assert_eq!(up.status, HostStatus::Allocated);

        let down = store.get_host(ip("10.0.0.2")).await.unwrap().unwrap();
        assert_eq!(down.health, Health::Offline);
        assert_eq!(down.last_seen, earlier);

        // One single-address probe per host.
        let calls = prober.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(_, net)| net.prefix_len() == 32));
    }

    #[tokio::test]
    async fn test_probe_error_counts_as_offline() {
        let (range, hosts) = seeded(&["10.0.0.1", "10.0.0.2"]);
        let store = Arc::new(MemoryStore::with_inventory([range], hosts));
        let prober = Arc::new(FakeProber {
            routed: vec![ip("10.0.0.1"), ip("10.0.0.2")],
            failing_prefixes: vec!["10.0.0.1/32".parse().unwrap()],
            ..Default::default()
        });
        let monitor = HealthMonitor::new(store.clone(), prober);

        let report = monitor.sweep().await.unwrap();
        assert_eq!(report.online, 1);
        assert_eq!(report.offline, 1);

        let host = store.get_host(ip("10.0.0.1")).await.unwrap().unwrap();
        assert_eq!(host.health, Health::Offline);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_abort_sweep() {
        let (range, hosts) = seeded(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let store = Arc::new(
            FlakyStore::new(MemoryStore::with_inventory([range], hosts))
                .fail_writes_for(ip("10.0.0.2")),
        );
        let prober = Arc::new(FakeProber {
            routed: vec![ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.3")],
            ..Default::default()
        });
        let monitor = HealthMonitor::new(store.clone(), prober);

        let report = monitor.sweep().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                online: 2,
                offline: 0,
                failed_writes: 1
            }
        );
        let last = store.inner().get_host(ip("10.0.0.3")).await.unwrap().unwrap();
        assert_eq!(last.health, Health::Online);
    }

    #[tokio::test]
    async fn test_listing_failure_fails_sweep() {
        let store = Arc::new(FlakyStore::new(MemoryStore::new()).fail_list_hosts());
        let monitor = HealthMonitor::new(store, Arc::new(FakeProber::default()));
        assert!(monitor.sweep().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_inventory_sweeps_nothing() {
        let prober = Arc::new(FakeProber::default());
        let monitor = HealthMonitor::new(Arc::new(MemoryStore::new()), prober.clone());
        assert_eq!(monitor.sweep().await.unwrap(), SweepReport::default());
        assert!(prober.calls.lock().unwrap().is_empty());
    }
}
