//! Discovery cycle scheduling.
//!
//! One long-lived loop: load settings, sweep host health, then probe and
//! reconcile each address range in turn, then sleep. Nothing that happens
//! inside a cycle stops the loop.

use std::sync::Arc;

use ipam_core::{AddressRange, InventoryStore, RangeId};
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::DiscoverySettings;
use crate::error::{DiscoverError, Result};
use crate::health::{HealthMonitor, SweepReport};
use crate::probe::ProbeEngine;
use crate::reconcile::{InventoryReconciler, RangeOutcome};
use crate::settings::SettingsProvider;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
}

/// A cycle-level failure. Range failures are reported per range instead.
#[derive(Debug)]
pub enum CycleFailure {
    /// Settings could not be loaded; defaults were used.
    Settings(DiscoverError),
    /// The range list could not be read; no range was scanned.
    ListRanges(DiscoverError),
    /// The health sweep could not list hosts.
    Sweep(DiscoverError),
}

/// Everything one discovery cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub settings: DiscoverySettings,
    pub sweep: Option<SweepReport>,
    pub ranges: Vec<(RangeId, RangeOutcome)>,
    pub failures: Vec<CycleFailure>,
}

impl CycleReport {
    pub fn failed_ranges(&self) -> usize {
        self.ranges
            .iter()
            .filter(|(_, outcome)| !outcome.is_completed())
            .count()
    }
}

/// Drives discovery cycles against an inventory store.
pub struct Scheduler {
    settings: Arc<dyn SettingsProvider>,
    store: Arc<dyn InventoryStore>,
    probe: ProbeEngine,
    reconciler: InventoryReconciler,
    health: HealthMonitor,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        store: Arc<dyn InventoryStore>,
        probe: ProbeEngine,
        reconciler: InventoryReconciler,
        health: HealthMonitor,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            settings,
            store,
            probe,
            reconciler,
            health,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Run cycles forever, sleeping the configured interval between them.
    ///
    /// Each cycle runs in its own task, so a panic inside one cycle is
    /// logged and the loop carries on with the default interval.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Scheduler started");
        loop {
            let this = Arc::clone(&self);
            let pause = match tokio::spawn(async move { this.run_cycle().await }).await {
                Ok(report) => report.settings.interval(),
                Err(e) => {
                    tracing::error!(error = %e, "Discovery cycle panicked");
                    DiscoverySettings::default().interval()
                }
            };

            self.state.send_replace(SchedulerState::Sleeping);
            tracing::info!(sleep_secs = pause.as_secs(), "Sleeping until next cycle");
            tokio::time::sleep(pause).await;
            self.state.send_replace(SchedulerState::Idle);
        }
    }

    /// Run exactly one cycle and return to idle.
    pub async fn run_once(&self) -> CycleReport {
        let report = self.run_cycle().await;
        self.state.send_replace(SchedulerState::Idle);
        report
    }

    /// One full cycle. Never fails; problems are collected in the report.
    pub async fn run_cycle(&self) -> CycleReport {
        self.state.send_replace(SchedulerState::Running);
        let cycle_id = Uuid::new_v4();
        let mut failures = Vec::new();

        let settings = self.load_settings(cycle_id, &mut failures).await;
        tracing::info!(
            cycle_id = %cycle_id,
            arp = settings.arp_enabled,
            icmp = settings.icmp_enabled,
            dns = settings.dns_enabled,
            "Discovery cycle started"
        );

        let sweep = match self.health.sweep().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(cycle_id = %cycle_id, error = %e, "Health sweep failed");
                failures.push(CycleFailure::Sweep(e));
                None
            }
        };

        let mut ranges = Vec::new();
        match self.store.list_ranges().await {
            Ok(all) => {
                for range in &all {
                    let outcome = self.discover_range(range, &settings).await;
                    ranges.push((range.id, outcome));
                }
            }
            Err(e) => {
                tracing::error!(cycle_id = %cycle_id, error = %e, "Failed to list address ranges");
                failures.push(CycleFailure::ListRanges(e.into()));
            }
        }

        let report = CycleReport {
            cycle_id,
            settings,
            sweep,
            ranges,
            failures,
        };
        tracing::info!(
            cycle_id = %cycle_id,
            ranges = report.ranges.len(),
            failed_ranges = report.failed_ranges(),
            cycle_failures = report.failures.len(),
            "Discovery cycle complete"
        );
        report
    }

    /// Probe and reconcile a single range immediately, with current settings.
    pub async fn scan_range(&self, id: &RangeId) -> Result<RangeOutcome> {
        let range = self
            .store
            .get_range(id)
            .await?
            .ok_or_else(|| ipam_core::StoreError::RangeNotFound(id.to_string()))?;

        let settings = match self.settings.load().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load settings, using defaults");
                DiscoverySettings::default()
            }
        };
        Ok(self.discover_range(&range, &settings).await)
    }

    async fn discover_range(
        &self,
        range: &AddressRange,
        settings: &DiscoverySettings,
    ) -> RangeOutcome {
        if let Err(outcome) = self.reconciler.begin(range).await {
            return outcome;
        }
        let outcome = self
            .probe
            .scan(range, settings.arp_enabled, settings.icmp_enabled)
            .await;
        self.reconciler
            .reconcile(
                range,
                &outcome.results,
                settings.dns_enabled,
                settings.custom_server(),
            )
            .await
    }

    async fn load_settings(
        &self,
        cycle_id: Uuid,
        failures: &mut Vec<CycleFailure>,
    ) -> DiscoverySettings {
        match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(cycle_id = %cycle_id, error = %e, "Failed to load settings, using defaults");
                failures.push(CycleFailure::Settings(e));
                DiscoverySettings::default()
            }
        }
    }
}
