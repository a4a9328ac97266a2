//! hidapi-backed transport.
//!
//! [`HidTransport`] holds two handles to the same hidraw node: one owned by a reader
//! thread that forwards input reports to the registered callback, and one used for
//! writes. Opening twice keeps writes from waiting on a blocking read.

use crate::driver::DriverRegistry;
use crate::error::TransportError;
use crate::metadata::DeviceMeta;
use crate::protocol::{Bus, MatchKey};
use crate::transport::{InboundCallback, Transport};
use hidapi::{BusType, DeviceInfo, HidApi, HidDevice};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// Read timeout of the reader thread; bounds how long `stop` waits.
const READ_TIMEOUT_MS: i32 = 100;

/// Large enough for any long HID++ report.
const READ_BUF_LEN: usize = 64;

fn bus_of(info: &DeviceInfo) -> Bus {
    match info.bus_type() {
        BusType::Usb => Bus::Usb,
        BusType::Bluetooth => Bus::Bluetooth,
        _ => Bus::Unknown,
    }
}

fn meta_of(info: &DeviceInfo) -> DeviceMeta {
    DeviceMeta {
        bus: Some(bus_of(info)),
        vid: Some(info.vendor_id()),
        pid: Some(info.product_id()),
        product_string: info.product_string().map(str::to_string),
        serial_number: info.serial_number().map(str::to_string),
        interface_number: Some(info.interface_number()),
        usage_page: Some(info.usage_page()),
        usage: Some(info.usage()),
        path: Some(info.path().to_string_lossy().into_owned()),
    }
}

/// Match key of a hidapi entry.
pub fn match_key_of(info: &DeviceInfo) -> MatchKey {
    MatchKey::new(bus_of(info), info.vendor_id(), info.product_id())
}

/// Extended reports travel on the vendor-defined collection. Backends that cannot
/// report usage pages give `0`; those entries are kept.
fn carries_extended_reports(info: &DeviceInfo) -> bool {
    let up = info.usage_page();
    up == 0 || (up & 0xFF00) == 0xFF00
}

/// hidapi entries with a registered driver, one per path.
pub fn matching_devices<'a>(
    api: &'a HidApi,
    registry: &'a DriverRegistry,
) -> impl Iterator<Item = &'a DeviceInfo> + 'a {
    let mut seen = std::collections::HashSet::new();
    api.device_list().filter(move |info| {
        carries_extended_reports(info)
            && registry.find_by_match_key(match_key_of(info)).is_some()
            && seen.insert(info.path().to_owned())
    })
}

/// Opens every matching device. Entries that fail to open are logged and skipped.
pub fn probe_transports(api: &HidApi, registry: &DriverRegistry) -> Vec<Arc<HidTransport>> {
    let mut found = Vec::new();
    for info in matching_devices(api, registry) {
        match HidTransport::open(api, info) {
            Ok(transport) => found.push(Arc::new(transport)),
            Err(e) => warn!(
                path = %info.path().to_string_lossy(),
                error = %e,
                "failed to open hid device"
            ),
        }
    }
    found
}

/// Opens the matching device at `path`.
pub fn open_path(
    api: &HidApi,
    registry: &DriverRegistry,
    path: &str,
) -> Option<Result<HidTransport, TransportError>> {
    matching_devices(api, registry)
        .find(|info| info.path().to_string_lossy() == path)
        .map(|info| HidTransport::open(api, info))
}

pub struct HidTransport {
    id: String,
    key: MatchKey,
    meta: DeviceMeta,
    writer: Mutex<HidDevice>,
    reader: Mutex<Option<HidDevice>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<HidDevice>>>,
}

impl HidTransport {
    pub fn open(api: &HidApi, info: &DeviceInfo) -> Result<Self, TransportError> {
        let writer = info.open_device(api)?;
        let reader = info.open_device(api)?;
        let meta = meta_of(info);

        #[cfg(feature = "debug-log")]
        debug!(
            vid = format_args!("{:04x}", info.vendor_id()),
            pid = format_args!("{:04x}", info.product_id()),
            product = info.product_string().unwrap_or(""),
            path = %info.path().to_string_lossy(),
            usage_page = format_args!("{:04x}", info.usage_page()),
            "opened hid device"
        );

        Ok(Self {
            id: info.path().to_string_lossy().into_owned(),
            key: match_key_of(info),
            meta,
            writer: Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        })
    }
}

fn read_loop(
    id: String,
    device: HidDevice,
    running: Arc<AtomicBool>,
    inbound: InboundCallback,
) -> HidDevice {
    let mut buf = [0u8; READ_BUF_LEN];
    while running.load(Ordering::Acquire) {
        match device.read_timeout(&mut buf, READ_TIMEOUT_MS) {
            Ok(0) => {}
            Ok(n) => {
                let report = &buf[..n];
                #[cfg(feature = "debug-log")]
                tracing::trace!(dev = %id, bytes = %crate::protocol::Hex(report), "hid read");
                inbound(report);
            }
            Err(e) => {
                error!(dev = %id, error = %e, "hid read failed, stopping reader");
                running.store(false, Ordering::Release);
                break;
            }
        }
    }
    debug!(dev = %id, "hid reader stopped");
    device
}

impl Transport for HidTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn match_key(&self) -> MatchKey {
        self.key
    }

    fn metadata(&self) -> DeviceMeta {
        self.meta.clone()
    }

    fn start(&self, inbound: InboundCallback) -> Result<(), TransportError> {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return Err(TransportError::AlreadyStarted(self.id.clone()));
        }
        let device = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| TransportError::Disconnected(self.id.clone()))?;

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let id = self.id.clone();
        let handle = std::thread::Builder::new()
            .name(format!("lgmux-hid-{}", self.key.product))
            .spawn(move || read_loop(id, device, running, inbound));

        match handle {
            Ok(handle) => {
                *thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                // The device moved into the closure is lost with it; reopen is needed.
                self.running.store(false, Ordering::Release);
                Err(TransportError::Spawn(e))
            }
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            match handle.join() {
                Ok(device) => *self.reader.lock() = Some(device),
                Err(_) => error!(dev = %self.id, "hid reader thread panicked"),
            }
        }
    }

    fn write(&self, report: &[u8]) -> Result<usize, TransportError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(TransportError::NotStarted(self.id.clone()));
        }
        Ok(self.writer.lock().write(report)?)
    }
}

impl Drop for HidTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
