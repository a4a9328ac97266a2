//! Attach/detach of transports and lookup of the resulting devices.

#[cfg(feature = "hid")]
use crate::backends::hid::probe_transports;
use crate::config::Config;
use crate::device::{Device, DeviceContext};
use crate::driver::DriverRegistry;
use crate::error::AttachError;
use crate::executor::{Spawn, TaskPool};
use crate::protocol::MatchKey;
use crate::snapshot::{DeviceStatus, Snapshot};
use crate::transport::{InboundCallback, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns every attached standalone device, keyed by transport id.
pub struct DeviceManager {
    ctx: DeviceContext,
    devices: Mutex<HashMap<String, Arc<Device>>>,
}

impl DeviceManager {
    pub fn new(config: Config, registry: Arc<DriverRegistry>, spawner: Arc<dyn Spawn>) -> Self {
        Self {
            ctx: DeviceContext {
                registry,
                config: Arc::new(config),
                spawner,
            },
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Manager with the built-in drivers and a [`TaskPool`] sized from `config`.
    pub fn with_pool(config: Config) -> std::io::Result<Self> {
        let pool = TaskPool::new(config.pool.workers)?;
        Ok(Self::new(
            config,
            Arc::new(DriverRegistry::with_default_drivers()),
            Arc::new(pool),
        ))
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.ctx.registry
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Binds `transport` to its driver, starts it and runs the driver's init.
    /// Every failure unwinds completely: nothing stays registered or running.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> Result<Arc<Device>, AttachError> {
        let id = transport.id().to_string();
        let key = transport.match_key();
        let driver = self
            .ctx
            .registry
            .find_by_match_key(key)
            .ok_or(AttachError::NoMatchingDriver(key))?;
        if self.devices.lock().contains_key(&id) {
            return Err(AttachError::AlreadyAttached(id));
        }

        let device = Device::standalone(Arc::clone(&transport), Arc::clone(&driver), self.ctx.clone())?;

        let target = Arc::downgrade(&device);
        let inbound: InboundCallback = Arc::new(move |report: &[u8]| {
            if let Some(device) = target.upgrade() {
                device.raw_event(report);
            }
        });
        if let Err(e) = transport.start(inbound) {
            device.release();
            return Err(AttachError::TransportStart(e));
        }

        if let Err(source) = driver.init(&device) {
            transport.stop();
            device.interrupt_requests();
            device.release();
            return Err(AttachError::DriverInit {
                driver: driver.name(),
                source,
            });
        }

        {
            let mut devices = self.devices.lock();
            if devices.contains_key(&id) {
                drop(devices);
                teardown(&device);
                return Err(AttachError::AlreadyAttached(id));
            }
            devices.insert(id.clone(), Arc::clone(&device));
        }
        info!(device = %device.name(), key = %key, "attached");
        Ok(device)
    }

    /// Tears down the device on transport `id`. Returns `false` if nothing was
    /// attached there.
    pub fn detach(&self, id: &str) -> bool {
        let Some(device) = self.devices.lock().remove(id) else {
            return false;
        };
        teardown(&device);
        true
    }

    pub fn detach_all(&self) {
        let devices: Vec<_> = self.devices.lock().drain().map(|(_, d)| d).collect();
        for device in devices {
            teardown(&device);
        }
    }

    pub fn device(&self, id: &str) -> Option<Arc<Device>> {
        self.devices.lock().get(id).cloned()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.lock().values().cloned().collect()
    }

    /// The device on transport `id` if its driver matches `key`, otherwise whatever
    /// its driver finds behind it (slot devices of a receiver).
    pub fn find_device(&self, id: &str, key: MatchKey) -> Option<Arc<Device>> {
        let device = self.device(id)?;
        if device.driver().match_key() == key {
            return Some(device);
        }
        device.driver().find_device(&device, key)
    }

    pub fn snapshot(&self) -> Snapshot {
        let devices: Vec<_> = self
            .devices
            .lock()
            .iter()
            .map(|(id, d)| (id.clone(), Arc::clone(d)))
            .collect();
        Snapshot(
            devices
                .into_iter()
                .map(|(id, device)| (id, DeviceStatus::of(&device)))
                .collect(),
        )
    }

    /// Opens and attaches every hidapi device with a registered driver. Failures are
    /// logged and skipped.
    #[cfg(feature = "hid")]
    pub fn attach_hid(&self, api: &hidapi::HidApi) -> Vec<Arc<Device>> {
        let transports = probe_transports(api, &self.ctx.registry);
        info!(count = transports.len(), "discovered matching hid device(s)");
        transports
            .into_iter()
            .filter_map(|transport| match self.attach(transport) {
                Ok(device) => Some(device),
                Err(e) => {
                    warn!(error = %e, "attach failed");
                    None
                }
            })
            .collect()
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.detach_all();
    }
}

/// Stop the transport, wait out the inbound drain, let the driver release its
/// state (slot devices included), then close the outbound queue, discarding
/// whatever is still buffered.
fn teardown(device: &Arc<Device>) {
    if let Some(transport) = device.transport() {
        transport.stop();
    }
    device.close_inbound();
    device.driver().exit(device);
    device.release();
    info!(device = %device.name(), "detached");
}
