//! Reverse name resolution with operator-controlled fallback.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::scanner::{LookupVia, ReverseLookup};

/// Bound on every individual reverse lookup.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

/// How a resolution attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved { name: String, via: &'static str },
    Unresolved,
}

impl Resolution {
    pub fn into_name(self) -> Option<String> {
        match self {
            Self::Resolved { name, .. } => Some(name),
            Self::Unresolved => None,
        }
    }
}

#[derive(Clone)]
pub struct NameResolver {
    lookup: Arc<dyn ReverseLookup>,
    timeout: Duration,
}

impl NameResolver {
    pub fn new(lookup: Arc<dyn ReverseLookup>) -> Self {
        Self {
            lookup,
            timeout: LOOKUP_TIMEOUT,
        }
    }

    /// Resolve `address` to a hostname, if it has one.
    pub async fn resolve(&self, address: IpAddr, custom_server: Option<&str>) -> Option<String> {
        self.resolve_detailed(address, custom_server)
            .await
            .into_name()
    }

    /// Resolve `address`, reporting which resolver answered.
    ///
    /// A custom server is authoritative: when it fails the answer is
    /// "unresolved", never whatever the system resolver might say. Without a
    /// custom server the default lookup falls back to the platform resolver.
    pub async fn resolve_detailed(
        &self,
        address: IpAddr,
        custom_server: Option<&str>,
    ) -> Resolution {
        if let Some(server) = custom_server {
            return match self.attempt(address, LookupVia::Server(server)).await {
                Some(name) => Resolution::Resolved {
                    name,
                    via: "custom",
                },
                None => Resolution::Unresolved,
            };
        }

        if let Some(name) = self.attempt(address, LookupVia::Default).await {
            return Resolution::Resolved {
                name,
                via: "default",
            };
        }

        match self.attempt(address, LookupVia::System).await {
            Some(name) => Resolution::Resolved {
                name,
                via: "system",
            },
            None => Resolution::Unresolved,
        }
    }

    async fn attempt(&self, address: IpAddr, via: LookupVia<'_>) -> Option<String> {
        match self.lookup.reverse_lookup(address, via, self.timeout).await {
            Ok(name) => name.and_then(clean_name),
            Err(e) => {
                tracing::debug!(address = %address, via = ?via, error = %e, "Reverse lookup failed");
                None
            }
        }
    }
}

/// Strip the trailing root label; an empty name counts as no answer.
fn clean_name(name: String) -> Option<String> {
    let trimmed = name.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
