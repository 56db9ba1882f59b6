//! Hosts known to reject or mishandle `Range` requests.
//!
//! A host is added only after a confirmed ranged-request failure and is then
//! fetched in full directly. Domains on the exemption list are never added;
//! entries that match it (for example after the list was extended) are
//! dropped at load time.

mod host;
mod persist;

use std::collections::BTreeSet;

pub use host::host_of;
pub use persist::RegistrySnapshot;

#[derive(Debug, Clone, Default)]
pub struct RangeCapabilityRegistry {
    hosts: BTreeSet<String>,
    exempt: Vec<String>,
}

impl RangeCapabilityRegistry {
    pub fn new(exempt_domains: Vec<String>) -> Self {
        Self {
            hosts: BTreeSet::new(),
            exempt: exempt_domains,
        }
    }

    pub fn is_exempt(&self, host: &str) -> bool {
        self.exempt.iter().any(|d| host::domain_matches(host, d))
    }

    /// Should requests to `host` skip straight to a full fetch?
    pub fn is_range_incapable(&self, host: &str) -> bool {
        !self.is_exempt(host) && self.hosts.contains(host)
    }

    /// Record a failed ranged request. Returns true when the host was newly added.
    pub fn record_range_failure(&mut self, host: &str) -> bool {
        if self.is_exempt(host) {
            tracing::debug!(%host, "range failure on exempt host, not recorded");
            return false;
        }
        let added = self.hosts.insert(host.to_string());
        if added {
            tracing::info!(%host, "host marked range-incapable");
        }
        added
    }

    /// Drop entries covered by the exemption list. Returns how many were removed.
    pub fn reconcile(&mut self) -> usize {
        let before = self.hosts.len();
        let exempt = std::mem::take(&mut self.exempt);
        self.hosts
            .retain(|h| !exempt.iter().any(|d| host::domain_matches(h, d)));
        self.exempt = exempt;
        before - self.hosts.len()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    pub fn remove(&mut self, host: &str) -> bool {
        self.hosts.remove(host)
    }

    pub fn clear(&mut self) {
        self.hosts.clear();
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
