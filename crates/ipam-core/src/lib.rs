//! ipam-core: Shared types and the inventory store contract for the IPAM platform.
//!
//! This crate provides the foundational pieces used across all IPAM components:
//! - Address ranges and host records with their status enums
//! - The field-scoped `HostUpdate` patch applied by discovery
//! - The `InventoryStore` trait every persistence backend implements
//! - An in-memory store for one-shot runs and tests

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{CreateOutcome, InventoryStore};
pub use types::{
    AddressRange, Health, HostRecord, HostStatus, HostUpdate, RangeId, RangeStats, ScanStatus,
};
