#![allow(dead_code)]

use lgmux::device::{Device, DeviceContext, DeviceState};
use lgmux::kinds::mouse::{MouseModel, MouseState};
use lgmux::protocol::product_ids;
use lgmux::{
    Config, DeviceDriver, DeviceManager, DriverError, DriverRegistry, InlineSpawn, MatchKey,
    Report, VirtualTransport,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const RECEIVER_PATH: &str = "/dev/hidraw-test0";

pub fn inline_manager(config: Config) -> DeviceManager {
    DeviceManager::new(
        config,
        Arc::new(DriverRegistry::with_default_drivers()),
        Arc::new(InlineSpawn),
    )
}

pub fn receiver_transport() -> Arc<VirtualTransport> {
    Arc::new(VirtualTransport::new(
        RECEIVER_PATH,
        MatchKey::usb(product_ids::MX5500_RECEIVER),
    ))
}

/// Attaches a receiver and walks it through negotiation to `Ready`.
pub fn ready_receiver(manager: &DeviceManager) -> (Arc<VirtualTransport>, Arc<Device>) {
    let transport = receiver_transport();
    let device = manager.attach(transport.clone()).unwrap();
    assert!(transport.inject(&[0x10, 0xff, 0x81, 0x00, 0x00, 0x03, 0x00]));
    assert!(device.as_receiver().unwrap().is_ready());
    transport.take_writes();
    (transport, device)
}

pub fn logon(slot: u8, code: u8) -> [u8; 7] {
    [0x10, slot, 0x83, 0x41, 0x00, 0x00, code]
}

pub fn logoff(slot: u8) -> [u8; 7] {
    [0x10, slot, 0x83, 0x40, 0x00, 0x00, 0x00]
}

/// Replies to GET battery with `level`, addressed to the asking device.
pub fn battery_responder(level: u8) -> impl Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync {
    move |w: &[u8]| (w[2] == 0x81 && w[3] == 0x0d).then(|| vec![0x10, w[1], 0x81, 0x0d, level, 0x00, 0x00])
}

/// Driver that counts lifecycle calls.
pub struct CountingDriver {
    pub key: MatchKey,
    pub code: Option<u8>,
    pub fail_init: AtomicBool,
    pub inits: AtomicUsize,
    pub exits: AtomicUsize,
    pub received: AtomicUsize,
    /// Runs inside `exit`, before the device is interrupted.
    pub on_exit: Mutex<Option<Box<dyn Fn(&Device) + Send + Sync>>>,
}

impl CountingDriver {
    pub fn new(product: u16, code: Option<u8>) -> Arc<Self> {
        Arc::new(Self {
            key: MatchKey::usb(product),
            code,
            fail_init: AtomicBool::new(false),
            inits: AtomicUsize::new(0),
            exits: AtomicUsize::new(0),
            received: AtomicUsize::new(0),
            on_exit: Mutex::new(None),
        })
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    fn try_init(&self) -> Result<(), DriverError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(DriverError::StateMismatch("counting"));
        }
        Ok(())
    }
}

impl DeviceDriver for CountingDriver {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn match_key(&self) -> MatchKey {
        self.key
    }

    fn device_code(&self) -> Option<u8> {
        self.code
    }

    fn new_state(&self, _ctx: &DeviceContext) -> DeviceState {
        DeviceState::Mouse(MouseState::new(MouseModel::VxRevolution))
    }

    fn init(&self, _device: &Arc<Device>) -> Result<(), DriverError> {
        self.try_init()
    }

    fn init_on_receiver(&self, _device: &Arc<Device>, _logon: Report<'_>) -> Result<(), DriverError> {
        self.try_init()
    }

    fn exit(&self, device: &Device) {
        self.exits.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &*self.on_exit.lock() {
            hook(device);
        }
        device.interrupt_requests();
    }

    fn receive(&self, _device: &Arc<Device>, _report: Report<'_>) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }
}
