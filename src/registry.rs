use std::sync::RwLock;

use crate::error::RegistryError;
use crate::models::Device;

/// A device together with the sequence number of the `add` that registered it.
///
/// Removing and re-adding the same id yields a new sequence number, which lets
/// readers tell a re-registration apart from the earlier one.
#[derive(Debug, Clone)]
pub struct Registration {
    pub seq: u64,
    pub device: Device,
}

/// The set of devices being polled, in registration order.
///
/// Shared between the control API (add/remove) and the poll loop (snapshot).
/// All three operations take the same lock, so a snapshot always reflects a
/// state between two complete mutations.
#[derive(Default)]
pub struct DeviceRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    entries: Vec<Registration>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an initial roster, rejecting duplicate ids.
    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for device in devices {
            registry.add(device)?;
        }
        Ok(registry)
    }

    pub fn add(&self, device: Device) -> Result<(), RegistryError> {
        if device.id.trim().is_empty() {
            return Err(RegistryError::EmptyId);
        }

        let mut inner = self.inner.write().unwrap();
        if inner.entries.iter().any(|r| r.device.id == device.id) {
            return Err(RegistryError::DuplicateDevice(device.id));
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.entries.push(Registration { seq, device });
        Ok(())
    }

    /// Remove a device. Returns false if it was not registered.
    pub fn remove(&self, device_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let before = inner.entries.len();
        inner.entries.retain(|r| r.device.id != device_id);
        inner.entries.len() != before
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.inner
            .read()
            .unwrap()
            .entries
            .iter()
            .map(|r| r.device.clone())
            .collect()
    }

    /// Like [`snapshot`](Self::snapshot), with registration sequence numbers.
    pub fn registrations(&self) -> Vec<Registration> {
        self.inner.read().unwrap().entries.clone()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .entries
            .iter()
            .any(|r| r.device.id == device_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
