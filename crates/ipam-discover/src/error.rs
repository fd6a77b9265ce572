//! Error types for the ipam-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("Probe timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Store error: {0}")]
    Store(#[from] ipam_core::StoreError),

    #[error("Graph error: {0}")]
    Graph(#[from] ipam_graph::GraphError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DiscoverError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
