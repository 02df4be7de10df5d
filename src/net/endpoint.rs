//! The single discovered device endpoint
//!
//! Shared between the health client and the delivery pipeline; all
//! reads take one consistent snapshot and all writes replace the health
//! flag and timestamp together under the lock.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Network address plus last known health of the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub address: Ipv4Addr,
    pub healthy: bool,
    pub last_checked_at: DateTime<Utc>,
}

impl DeviceEndpoint {
    pub fn new(address: Ipv4Addr) -> Self {
        Self {
            address,
            healthy: true,
            last_checked_at: Utc::now(),
        }
    }
}

/// Process-wide handle to the one active endpoint
#[derive(Clone)]
pub struct SharedEndpoint {
    inner: Arc<RwLock<DeviceEndpoint>>,
}

impl SharedEndpoint {
    pub fn new(endpoint: DeviceEndpoint) -> Self {
        Self {
            inner: Arc::new(RwLock::new(endpoint)),
        }
    }

    /// One consistent snapshot of address + health
    pub fn snapshot(&self) -> DeviceEndpoint {
        self.inner.read().clone()
    }

    pub fn address(&self) -> Ipv4Addr {
        self.inner.read().address
    }

    /// Record a health observation
    pub fn mark(&self, healthy: bool) {
        let mut endpoint = self.inner.write();
        endpoint.healthy = healthy;
        endpoint.last_checked_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_updates_health_and_timestamp_together() {
        let shared = SharedEndpoint::new(DeviceEndpoint::new(Ipv4Addr::new(192, 168, 1, 77)));
        let before = shared.snapshot();
        assert!(before.healthy);

        shared.mark(false);
        let after = shared.snapshot();
        assert!(!after.healthy);
        assert!(after.last_checked_at >= before.last_checked_at);
        assert_eq!(after.address, before.address);
    }
}
