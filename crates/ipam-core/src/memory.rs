//! In-memory inventory store.
//!
//! Holds ranges and hosts behind a single `RwLock`; every trait method takes
//! the lock once, which makes each call atomic with respect to the others.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::{CreateOutcome, InventoryStore};
use crate::types::{AddressRange, HostRecord, HostStatus, HostUpdate, RangeId, ScanStatus};

#[derive(Debug, Default)]
struct Inventory {
    ranges: BTreeMap<RangeId, AddressRange>,
    hosts: HashMap<IpAddr, HostRecord>,
}

/// An `InventoryStore` that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inventory>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing ranges and hosts.
    pub fn with_inventory(
        ranges: impl IntoIterator<Item = AddressRange>,
        hosts: impl IntoIterator<Item = HostRecord>,
    ) -> Self {
        let inventory = Inventory {
            ranges: ranges.into_iter().map(|r| (r.id, r)).collect(),
            hosts: hosts.into_iter().map(|h| (h.address, h)).collect(),
        };
        Self {
            inner: RwLock::new(inventory),
        }
    }

    /// Add or replace an address range, as the CRUD layer would.
    pub async fn insert_range(&self, range: AddressRange) {
        self.inner.write().await.ranges.insert(range.id, range);
    }

    /// Add or replace a host record, as the CRUD layer would.
    pub async fn insert_host(&self, host: HostRecord) {
        self.inner.write().await.hosts.insert(host.address, host);
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn list_ranges(&self) -> Result<Vec<AddressRange>> {
        Ok(self.inner.read().await.ranges.values().cloned().collect())
    }

    async fn get_range(&self, id: &RangeId) -> Result<Option<AddressRange>> {
        Ok(self.inner.read().await.ranges.get(id).cloned())
    }

    async fn list_hosts(&self) -> Result<Vec<HostRecord>> {
        let inv = self.inner.read().await;
        let mut hosts: Vec<_> = inv.hosts.values().cloned().collect();
        hosts.sort_by_key(|h| h.address);
        Ok(hosts)
    }

    async fn list_hosts_in_range(&self, id: &RangeId) -> Result<Vec<HostRecord>> {
        let inv = self.inner.read().await;
        let mut hosts: Vec<_> = inv
            .hosts
            .values()
            .filter(|h| h.range_id == *id)
            .cloned()
            .collect();
        hosts.sort_by_key(|h| h.address);
        Ok(hosts)
    }

    async fn get_host(&self, address: IpAddr) -> Result<Option<HostRecord>> {
        Ok(self.inner.read().await.hosts.get(&address).cloned())
    }

    async fn create_host(&self, host: &HostRecord) -> Result<CreateOutcome> {
        let mut inv = self.inner.write().await;
        if inv.hosts.contains_key(&host.address) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        inv.hosts.insert(host.address, host.clone());
        Ok(CreateOutcome::Created)
    }

    async fn update_host(&self, address: IpAddr, update: &HostUpdate) -> Result<()> {
        let mut inv = self.inner.write().await;
        let host = inv
            .hosts
            .get_mut(&address)
            .ok_or_else(|| StoreError::HostNotFound(address.to_string()))?;
        host.apply(update);
        Ok(())
    }

    async fn set_scan_status(&self, id: &RangeId, status: &ScanStatus) -> Result<()> {
        let mut inv = self.inner.write().await;
        let range = inv
            .ranges
            .get_mut(id)
            .ok_or_else(|| StoreError::RangeNotFound(id.to_string()))?;
        range.scan_status = status.clone();
        Ok(())
    }

    async fn complete_scan(&self, id: &RangeId, at: DateTime<Utc>) -> Result<()> {
        let mut inv = self.inner.write().await;
        let range = inv
            .ranges
            .get_mut(id)
            .ok_or_else(|| StoreError::RangeNotFound(id.to_string()))?;
        range.last_scan = Some(at);
        range.scan_status = ScanStatus::Idle;
        Ok(())
    }

    async fn purge_discovered(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inv = self.inner.write().await;
        let before = inv.hosts.len();
        inv.hosts.retain(|_, h| {
            let stale = h.last_seen.is_some_and(|seen| seen < cutoff);
            !(h.status == HostStatus::Discovered && stale)
        });
        Ok((before - inv.hosts.len()) as u64)
    }
}
