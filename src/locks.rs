//! Keyed async mutexes.
//!
//! Shipment guards cover a shipment's read-load, decide, write unit and are
//! shared by the planner and request handlers; they are never held across calls
//! to the office service. Application guards cover "write the shadow, notify the
//! office" so one application's notifications leave in transition order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

/// Guards keyed by shipment id.
pub type ShipmentLocks = KeyedLocks;

/// Guards keyed by external application id.
pub type ApplicationLocks = KeyedLocks;

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: i64) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            // Drop slots nobody holds or waits on so the map stays small.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry(key).or_default().clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_shipment_is_serialized() {
        let locks = ShipmentLocks::new();
        let guard = locks.lock(1).await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock(1).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_shipments_do_not_block() {
        let locks = ShipmentLocks::new();
        let _a = locks.lock(1).await;
        tokio::time::timeout(Duration::from_secs(1), locks.lock(2))
            .await
            .unwrap();
    }
}
