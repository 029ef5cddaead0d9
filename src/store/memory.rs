//! In-memory device store.
//!
//! Backs tests, simulations, and deployments small enough to provision
//! devices at startup. Lookups clone the stored [`Device`], so concurrent
//! readers never contend beyond the lock itself.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{Device, DeviceStore, StoreError};

/// Thread-safe `HashMap`-backed [`DeviceStore`].
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<u32, Device>>,
}

impl MemoryDeviceStore {
    /// Create an empty store. Every lookup reports not-found until devices
    /// are provisioned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a device, replacing any previous key for the same ID.
    pub fn insert(&self, device: Device) {
        self.devices
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(device.id, device);
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn device_with_key(&self, device_id: u32) -> Result<Device, StoreError> {
        self.devices
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&device_id)
            .cloned()
            .ok_or(StoreError::NotFound(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_returns_provisioned_device() {
        let store = MemoryDeviceStore::new();
        store.insert(Device::new(1, &b"secret"[..]));

        let device = store.device_with_key(1).await.unwrap();
        assert_eq!(device.id, 1);
        assert_eq!(&device.key[..], b"secret");
    }

    #[tokio::test]
    async fn test_lookup_unknown_device_is_not_found() {
        let store = MemoryDeviceStore::new();
        let result = store.device_with_key(99).await;
        assert!(matches!(result, Err(StoreError::NotFound(99))));
    }

    #[tokio::test]
    async fn test_insert_replaces_existing_key() {
        let store = MemoryDeviceStore::new();
        store.insert(Device::new(1, &b"old"[..]));
        store.insert(Device::new(1, &b"new"[..]));

        let device = store.device_with_key(1).await.unwrap();
        assert_eq!(&device.key[..], b"new");
        assert_eq!(store.len(), 1);
    }
}
