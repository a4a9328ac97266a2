//! Driver descriptors and the process-wide driver registry.
//!
//! A driver is matched either by its transport [`MatchKey`] (standalone attach) or,
//! behind a receiver, by the device code a logon notification carries.

use crate::device::{Device, DeviceContext, DeviceState};
use crate::error::{DriverError, RegistryError};
use crate::protocol::{MatchKey, Report};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Lifecycle and receive hooks of one device kind.
pub trait DeviceDriver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn match_key(&self) -> MatchKey;

    /// Code announced in logon notifications; `None` means the driver never runs
    /// behind a receiver.
    fn device_code(&self) -> Option<u8> {
        None
    }

    /// Device number used in commands when attached directly to a transport.
    fn standalone_device_number(&self) -> u8 {
        0x01
    }

    /// Fresh per-kind state for a new device.
    fn new_state(&self, ctx: &DeviceContext) -> DeviceState;

    /// Runs once a standalone device's transport is started.
    fn init(&self, device: &Arc<Device>) -> Result<(), DriverError>;

    /// Runs when a receiver attaches this driver to a slot. `logon` is the
    /// notification that announced the device.
    fn init_on_receiver(&self, device: &Arc<Device>, logon: Report<'_>) -> Result<(), DriverError> {
        let _ = (device, logon);
        Err(DriverError::NoReceiverSupport(self.name()))
    }

    /// Tears down driver state. Waiting requesters must be released here.
    fn exit(&self, device: &Device);

    /// Handles one inbound extended report (already header-checked).
    fn receive(&self, device: &Arc<Device>, report: Report<'_>);

    /// Composite drivers (receivers) return the sub-device matching `key`.
    fn find_device(&self, device: &Device, key: MatchKey) -> Option<Arc<Device>> {
        let _ = (device, key);
        None
    }
}

/// Registered drivers, in registration order.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<Vec<Arc<dyn DeviceDriver>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in driver.
    pub fn with_default_drivers() -> Self {
        let registry = Self::new();
        for driver in crate::kinds::default_drivers() {
            if let Err(e) = registry.register(driver) {
                tracing::error!(error = %e, "built-in driver rejected");
            }
        }
        registry
    }

    /// Adds `driver`; a second driver for the same match key is rejected.
    pub fn register(&self, driver: Arc<dyn DeviceDriver>) -> Result<(), RegistryError> {
        let key = driver.match_key();
        let mut drivers = self.drivers.write();
        if let Some(existing) = drivers.iter().find(|d| d.match_key() == key) {
            return Err(RegistryError::DuplicateMatchKey {
                key,
                existing: existing.name(),
            });
        }
        debug!(driver = driver.name(), key = %key, "driver registered");
        drivers.push(driver);
        Ok(())
    }

    pub fn unregister(&self, key: MatchKey) -> Result<Arc<dyn DeviceDriver>, RegistryError> {
        let mut drivers = self.drivers.write();
        let index = drivers
            .iter()
            .position(|d| d.match_key() == key)
            .ok_or(RegistryError::NotRegistered(key))?;
        let driver = drivers.remove(index);
        debug!(driver = driver.name(), key = %key, "driver unregistered");
        Ok(driver)
    }

    pub fn find_by_match_key(&self, key: MatchKey) -> Option<Arc<dyn DeviceDriver>> {
        self.drivers
            .read()
            .iter()
            .find(|d| d.match_key() == key)
            .cloned()
    }

    /// First driver announcing `code` in logon notifications.
    pub fn find_by_device_code(&self, code: u8) -> Option<Arc<dyn DeviceDriver>> {
        self.drivers
            .read()
            .iter()
            .find(|d| d.device_code() == Some(code))
            .cloned()
    }

    pub fn drivers(&self) -> Vec<Arc<dyn DeviceDriver>> {
        self.drivers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.drivers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
