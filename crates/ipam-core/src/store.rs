//! The inventory store contract.
//!
//! Every method is one atomic write or read scoped to a single record, so a
//! concurrent reader never observes a half-applied reconciliation.

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{AddressRange, HostRecord, HostUpdate, RangeId, ScanStatus};

/// Result of an insert-if-absent host creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Another writer created the address first; nothing was written.
    AlreadyExists,
}

/// Persistence capability consumed by the discovery engine.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// List every configured address range.
    async fn list_ranges(&self) -> Result<Vec<AddressRange>>;

    /// Fetch one address range.
    async fn get_range(&self, id: &RangeId) -> Result<Option<AddressRange>>;

    /// List every host record regardless of owning range.
    async fn list_hosts(&self) -> Result<Vec<HostRecord>>;

    /// List the host records owned by one range.
    async fn list_hosts_in_range(&self, id: &RangeId) -> Result<Vec<HostRecord>>;

    /// Look up a host record by its unique address.
    async fn get_host(&self, address: IpAddr) -> Result<Option<HostRecord>>;

    /// Insert a host record unless one already exists for its address.
    async fn create_host(&self, host: &HostRecord) -> Result<CreateOutcome>;

    /// Apply a field-scoped patch to the record for `address`.
    async fn update_host(&self, address: IpAddr, update: &HostUpdate) -> Result<()>;

    /// Persist a range's scan status.
    async fn set_scan_status(&self, id: &RangeId, status: &ScanStatus) -> Result<()>;

    /// Mark a range scan finished: `last_scan = at` and status `Idle` in one write.
    async fn complete_scan(&self, id: &RangeId, at: DateTime<Utc>) -> Result<()>;

    /// Delete `Discovered` records whose `last_seen` is older than `cutoff`.
    ///
    /// Operator-initiated only; returns the number of deleted records.
    async fn purge_discovered(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
