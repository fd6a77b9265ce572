use thiserror::Error;

/// Errors raised by an inventory store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store query error: {0}")]
    Query(String),

    #[error("Address range not found: {0}")]
    RangeNotFound(String),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Corrupt stored record: {0}")]
    Corrupt(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(#[from] crate::types::ParseEnumError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
