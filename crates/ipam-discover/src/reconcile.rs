//! Merge one range's scan results into the inventory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ipam_core::{
    AddressRange, CreateOutcome, Health, HostRecord, HostUpdate, InventoryStore, RangeStats,
    ScanStatus,
};

use crate::error::{DiscoverError, Result};
use crate::probe::ScanResult;
use crate::resolver::NameResolver;

/// How reconciling one range ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    Completed {
        created: usize,
        updated: usize,
        /// Absent when the post-scan host listing failed.
        stats: Option<RangeStats>,
    },
    /// The range was left in [`ScanStatus::Error`] with this message.
    Failed { error: String },
}

impl RangeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Writes scan sightings into the inventory store.
#[derive(Clone)]
pub struct InventoryReconciler {
    store: Arc<dyn InventoryStore>,
    resolver: NameResolver,
}

impl InventoryReconciler {
    pub fn new(store: Arc<dyn InventoryStore>, resolver: NameResolver) -> Self {
        Self { store, resolver }
    }

    /// Reconcile `results` for `range`.
    ///
    /// Never returns an error: a failure at any step is persisted on the
    /// range as its scan status and reported as [`RangeOutcome::Failed`].
    pub async fn reconcile(
        &self,
        range: &AddressRange,
        results: &[ScanResult],
        resolve_hostnames: bool,
        custom_server: Option<&str>,
    ) -> RangeOutcome {
        match self
            .apply(range, results, resolve_hostnames, custom_server)
            .await
        {
            Ok((created, updated)) => {
                let stats = self.stats(range).await;
                tracing::info!(
                    range = %range.id,
                    prefix = %range.prefix,
                    created,
                    updated,
                    stats = ?stats,
                    "Range reconciled"
                );
                RangeOutcome::Completed {
                    created,
                    updated,
                    stats,
                }
            }
            Err(e) => self.fail(range, e).await,
        }
    }

    /// Mark `range` as `Scanning` before it is probed.
    ///
    /// On failure the range is put in the error state and the outcome to
    /// report is returned; the caller must not probe it.
    pub async fn begin(&self, range: &AddressRange) -> std::result::Result<(), RangeOutcome> {
        match self
            .store
            .set_scan_status(&range.id, &ScanStatus::Scanning)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(range, e.into()).await),
        }
    }

    async fn fail(&self, range: &AddressRange, e: DiscoverError) -> RangeOutcome {
        let status = ScanStatus::error(e.to_string());
        tracing::error!(range = %range.id, prefix = %range.prefix, error = %e, "Range scan failed");
        if let Err(write_err) = self.store.set_scan_status(&range.id, &status).await {
            tracing::error!(
                range = %range.id,
                error = %write_err,
                "Failed to record range scan error"
            );
        }
        RangeOutcome::Failed {
            error: e.to_string(),
        }
    }

    async fn apply(
        &self,
        range: &AddressRange,
        results: &[ScanResult],
        resolve_hostnames: bool,
        custom_server: Option<&str>,
    ) -> Result<(usize, usize)> {
        self.store
            .set_scan_status(&range.id, &ScanStatus::Scanning)
            .await?;

        let (mut created, mut updated) = (0, 0);
        for result in results {
            let hostname = if resolve_hostnames {
                self.resolver.resolve(result.address, custom_server).await
            } else {
                None
            };

            let now = Utc::now();
            match self.store.get_host(result.address).await? {
                Some(_) => {
                    self.touch(result, hostname, now).await?;
                    updated += 1;
                }
                None => {
                    let record = HostRecord::discovered(
                        result.address,
                        range.id,
                        result.mac_address.clone(),
                        hostname.clone(),
                        now,
                    );
                    match self.store.create_host(&record).await? {
                        CreateOutcome::Created => {
                            tracing::debug!(address = %result.address, range = %range.id, "Host discovered");
                            created += 1;
                        }
                        CreateOutcome::AlreadyExists => {
                            // Lost an insert race; treat as a sighting of the winner's record.
                            self.touch(result, hostname, now).await?;
                            updated += 1;
                        }
                    }
                }
            }
        }

        self.store.complete_scan(&range.id, Utc::now()).await?;
        Ok((created, updated))
    }

    /// Record a sighting of an existing host. Status is never written.
    async fn touch(
        &self,
        result: &ScanResult,
        hostname: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = HostUpdate {
            last_seen: Some(now),
            mac_address: result.mac_address.clone(),
            hostname,
            health: Some(Health::Online),
        };
        self.store.update_host(result.address, &update).await?;
        Ok(())
    }

    async fn stats(&self, range: &AddressRange) -> Option<RangeStats> {
        match self.store.list_hosts_in_range(&range.id).await {
            Ok(hosts) => Some(RangeStats::compute(&range.prefix, &hosts)),
            Err(e) => {
                tracing::warn!(range = %range.id, error = %e, "Failed to compute range stats");
                None
            }
        }
    }
}
