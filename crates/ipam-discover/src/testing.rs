//! Store wrapper that injects failures into a [`MemoryStore`].

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipam_core::error::Result;
use ipam_core::{
    AddressRange, CreateOutcome, HostRecord, HostUpdate, InventoryStore, MemoryStore, RangeId,
    ScanStatus, StoreError,
};

pub(crate) struct FlakyStore {
    inner: MemoryStore,
    hidden: Vec<IpAddr>,
    failing_writes: Vec<IpAddr>,
    fail_list_ranges: bool,
    fail_list_hosts: bool,
    fail_scan_start: bool,
}

impl FlakyStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            hidden: Vec::new(),
            failing_writes: Vec::new(),
            fail_list_ranges: false,
            fail_list_hosts: false,
            fail_scan_start: false,
        }
    }

    /// `get_host` reports `address` as absent even when it is stored.
    pub(crate) fn hide_host(mut self, address: IpAddr) -> Self {
        self.hidden.push(address);
        self
    }

    /// Creating or updating `address` fails.
    pub(crate) fn fail_writes_for(mut self, address: IpAddr) -> Self {
        self.failing_writes.push(address);
        self
    }

    pub(crate) fn fail_list_ranges(mut self) -> Self {
        self.fail_list_ranges = true;
        self
    }

    pub(crate) fn fail_list_hosts(mut self) -> Self {
        self.fail_list_hosts = true;
        self
    }

    /// Setting any range to `Scanning` fails; other statuses still write.
    pub(crate) fn fail_scan_start(mut self) -> Self {
        self.fail_scan_start = true;
        self
    }

    pub(crate) fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check_write(&self, address: IpAddr) -> Result<()> {
        if self.failing_writes.contains(&address) {
            return Err(StoreError::Connection(format!(
                "connection reset by peer while writing host record {address}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for FlakyStore {
    async fn list_ranges(&self) -> Result<Vec<AddressRange>> {
        if self.fail_list_ranges {
            return Err(StoreError::Connection("inventory unavailable".to_string()));
        }
        self.inner.list_ranges().await
    }

    async fn get_range(&self, id: &RangeId) -> Result<Option<AddressRange>> {
        self.inner.get_range(id).await
    }

    async fn list_hosts(&self) -> Result<Vec<HostRecord>> {
        if self.fail_list_hosts {
            return Err(StoreError::Connection("inventory unavailable".to_string()));
        }
        self.inner.list_hosts().await
    }

    async fn list_hosts_in_range(&self, id: &RangeId) -> Result<Vec<HostRecord>> {
        self.inner.list_hosts_in_range(id).await
    }

    async fn get_host(&self, address: IpAddr) -> Result<Option<HostRecord>> {
        if self.hidden.contains(&address) {
            return Ok(None);
        }
        self.inner.get_host(address).await
    }

    async fn create_host(&self, host: &HostRecord) -> Result<CreateOutcome> {
        self.check_write(host.address)?;
        self.inner.create_host(host).await
    }

    async fn update_host(&self, address: IpAddr, update: &HostUpdate) -> Result<()> {
        self.check_write(address)?;
        self.inner.update_host(address, update).await
    }

    async fn set_scan_status(&self, id: &RangeId, status: &ScanStatus) -> Result<()> {
        if self.fail_scan_start && *status == ScanStatus::Scanning {
            return Err(StoreError::Connection("write timed out".to_string()));
        }
        self.inner.set_scan_status(id, status).await
    }

    async fn complete_scan(&self, id: &RangeId, at: DateTime<Utc>) -> Result<()> {
        self.inner.complete_scan(id, at).await
    }

    async fn purge_discovered(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.purge_discovered(cutoff).await
    }
}
