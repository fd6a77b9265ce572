//! ipam-discover: Network discovery engine for the IPAM inventory.
//!
//! Probes every configured address range with nmap (ARP broadcast and ICMP
//! echo), reconciles the replies into the inventory store, optionally
//! resolves hostnames, and sweeps the health of every known host.

pub mod config;
pub mod error;
pub mod health;
pub mod nmap_xml;
pub mod probe;
pub mod reconcile;
pub mod resolver;
pub mod scanner;
pub mod scheduler;
pub mod settings;

#[cfg(test)]
mod testing;
