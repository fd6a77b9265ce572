//! ipam-graph: Neo4j persistence for the address inventory.
//!
//! This crate implements the `InventoryStore` contract from `ipam-core` on
//! Neo4j, and exposes the `(:Setting)` key/value nodes the discovery
//! scheduler can read its per-cycle settings from.

pub mod client;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use store::GraphStore;
