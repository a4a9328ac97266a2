//! Wireless receiver: device-count negotiation and slot multiplexing.
//!
//! After attach the receiver is asked for its max-device-count register. If the
//! reply differs from the configured count it is corrected with a SET; once the
//! value is confirmed the receiver is asked to announce every reachable device and
//! the state becomes [`ReceiverPhase::Ready`].
//!
//! Logon notifications create a [`Device`] for the announced slot; logoff
//! notifications tear it down. Everything else addressed to a slot is forwarded to
//! that slot's driver unchanged.

use crate::device::{Device, DeviceContext, DeviceState};
use crate::dispatch::{self, Handler};
use crate::driver::DeviceDriver;
use crate::error::{DriverError, ProtocolError};
use crate::protocol::{
    self, actions, product_ids, sub_commands, Hex, MatchKey, Report, LOGOFF, LOGON,
    LOGON_DEVICE_CODE_OFFSET, RECEIVER_MAX_SLOTS,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverPhase {
    /// Attached; device count unknown.
    Unconfigured,
    /// A GET or SET of the device count is outstanding.
    Negotiating,
    /// Device count confirmed and logon broadcast issued.
    Ready,
}

/// Where an inbound receiver report goes, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Receiver control traffic (device number `0xFF`).
    Control,
    Logon(u8),
    Logoff(u8),
    Forward(u8),
}

/// Classifies `report`. Control traffic wins over logon/logoff, which win over
/// forwarding.
pub fn route(report: &Report<'_>) -> Route {
    let device_number = report.device_number();
    if report.is_receiver_control() {
        Route::Control
    } else if report.opcode() == LOGON {
        Route::Logon(device_number)
    } else if report.opcode() == LOGOFF {
        Route::Logoff(device_number)
    } else {
        Route::Forward(device_number)
    }
}

/// 1-based wire slot number to table index. `0` and `0xFF` are never slots.
fn slot_index(device_number: u8) -> Option<usize> {
    let n = device_number as usize;
    (1..=RECEIVER_MAX_SLOTS).contains(&n).then(|| n - 1)
}

struct Negotiation {
    phase: ReceiverPhase,
    max_devices: Option<u8>,
}

pub struct ReceiverState {
    desired_max_devices: u8,
    negotiation: Mutex<Negotiation>,
    slots: Mutex<[Option<Arc<Device>>; RECEIVER_MAX_SLOTS]>,
}

impl ReceiverState {
    pub fn new(desired_max_devices: u8) -> Self {
        Self {
            desired_max_devices,
            negotiation: Mutex::new(Negotiation {
                phase: ReceiverPhase::Unconfigured,
                max_devices: None,
            }),
            slots: Mutex::new(Default::default()),
        }
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.negotiation.lock().phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == ReceiverPhase::Ready
    }

    /// Device count last reported by the receiver.
    pub fn max_devices(&self) -> Option<u8> {
        self.negotiation.lock().max_devices
    }

    pub fn desired_max_devices(&self) -> u8 {
        self.desired_max_devices
    }

    /// Device attached at wire slot `device_number`.
    pub fn slot(&self, device_number: u8) -> Option<Arc<Device>> {
        let index = slot_index(device_number)?;
        self.slots.lock()[index].clone()
    }

    /// Occupied slots as `(device number, device)`.
    pub fn attached(&self) -> Vec<(u8, Arc<Device>)> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|d| (i as u8 + 1, Arc::clone(d))))
            .collect()
    }

    fn set_phase(&self, phase: ReceiverPhase) {
        self.negotiation.lock().phase = phase;
    }

    /// Takes the occupant of `index`, leaving the slot empty.
    fn take_slot(&self, index: usize) -> Option<Arc<Device>> {
        self.slots.lock()[index].take()
    }

    fn take_all(&self) -> Vec<Arc<Device>> {
        self.slots.lock().iter_mut().filter_map(Option::take).collect()
    }
}

fn device_count(report: &Report<'_>) -> Result<u8, ProtocolError> {
    report.require(6)?;
    Ok(report.byte(5).unwrap_or_default())
}

fn broadcast_logon(device: &Device, state: &ReceiverState) {
    device.send(&protocol::logon_broadcast());
    state.set_phase(ReceiverPhase::Ready);
    info!(device = %device.name(), "receiver ready, logon broadcast sent");
}

fn handle_get_max_devices(
    device: &Device,
    state: &ReceiverState,
    report: Report<'_>,
) -> Result<(), ProtocolError> {
    let count = device_count(&report)?;
    let mut negotiation = state.negotiation.lock();
    negotiation.max_devices = Some(count);
    debug!(device = %device.name(), count, "max devices reported");
    if negotiation.phase == ReceiverPhase::Ready {
        return Ok(());
    }

    if count != state.desired_max_devices {
        negotiation.phase = ReceiverPhase::Negotiating;
        drop(negotiation);
        debug!(device = %device.name(), from = count, to = state.desired_max_devices, "correcting max devices");
        device.send(&protocol::set_max_devices(state.desired_max_devices));
    } else {
        drop(negotiation);
        broadcast_logon(device, state);
    }
    Ok(())
}

fn handle_set_max_devices(
    device: &Device,
    state: &ReceiverState,
    report: Report<'_>,
) -> Result<(), ProtocolError> {
    let count = device_count(&report)?;
    let mut negotiation = state.negotiation.lock();
    negotiation.max_devices = Some(count);
    debug!(device = %device.name(), count, "max devices acknowledged");
    if negotiation.phase == ReceiverPhase::Ready {
        return Ok(());
    }
    drop(negotiation);
    broadcast_logon(device, state);
    Ok(())
}

static RECEIVER_HANDLERS: &[Handler<ReceiverState>] = &[
    Handler::call(actions::GET, sub_commands::MAX_DEVICES, handle_get_max_devices),
    Handler::call(actions::SET, sub_commands::MAX_DEVICES, handle_set_max_devices),
    Handler::ignore(actions::SET, sub_commands::LOGON_BROADCAST),
];

fn logon(receiver: &Arc<Device>, state: &ReceiverState, report: Report<'_>) {
    let device_number = report.device_number();
    let Some(index) = slot_index(device_number) else {
        warn!(device = %receiver.name(), slot = device_number, "logon for invalid slot dropped");
        return;
    };
    let Some(code) = report.byte(LOGON_DEVICE_CODE_OFFSET) else {
        error!(
            device = %receiver.name(),
            bytes = %Hex(report.as_bytes()),
            "logon without device code dropped"
        );
        return;
    };

    let device = match receiver.context().registry.find_by_device_code(code) {
        Some(driver) => {
            let device = Device::on_receiver(receiver, Arc::clone(&driver), device_number);
            match driver.init_on_receiver(&device, report) {
                Ok(()) => Some(device),
                Err(e) => {
                    warn!(device = %device.name(), error = %e, "init on receiver failed, slot left empty");
                    None
                }
            }
        }
        None => {
            warn!(
                device = %receiver.name(),
                slot = device_number,
                code = format_args!("{code:02x}"),
                "no driver for device code, slot left empty"
            );
            None
        }
    };

    if let Some(device) = &device {
        info!(device = %device.name(), slot = device_number, "device logged on");
    }
    // Old occupant out and new one in under a single lock.
    let previous = std::mem::replace(&mut state.slots.lock()[index], device);
    if let Some(previous) = previous {
        info!(device = %previous.name(), "slot reused, logging off previous device");
        previous.driver().exit(&previous);
    }
}

fn logoff(receiver: &Device, state: &ReceiverState, device_number: u8) {
    let Some(index) = slot_index(device_number) else {
        warn!(device = %receiver.name(), slot = device_number, "logoff for invalid slot dropped");
        return;
    };
    match state.take_slot(index) {
        Some(device) => {
            info!(device = %device.name(), slot = device_number, "device logged off");
            device.driver().exit(&device);
        }
        None => debug!(device = %receiver.name(), slot = device_number, "logoff for empty slot"),
    }
}

fn forward(receiver: &Device, state: &ReceiverState, report: Report<'_>) {
    match state.slot(report.device_number()) {
        Some(device) => device.driver().receive(&device, report),
        None => warn!(
            device = %receiver.name(),
            slot = report.device_number(),
            bytes = %Hex(report.as_bytes()),
            "report for empty or invalid slot dropped"
        ),
    }
}

pub struct ReceiverDriver;

impl ReceiverDriver {
    fn state<'a>(&self, device: &'a Device) -> Result<&'a ReceiverState, DriverError> {
        device
            .as_receiver()
            .ok_or(DriverError::StateMismatch(self.name()))
    }
}

impl DeviceDriver for ReceiverDriver {
    fn name(&self) -> &'static str {
        "Logitech MX5500 Receiver"
    }

    fn match_key(&self) -> MatchKey {
        MatchKey::usb(product_ids::MX5500_RECEIVER)
    }

    fn standalone_device_number(&self) -> u8 {
        protocol::RECEIVER_DEVICE_NUMBER
    }

    fn new_state(&self, ctx: &DeviceContext) -> DeviceState {
        DeviceState::Receiver(ReceiverState::new(ctx.config.receiver.max_devices))
    }

    fn init(&self, device: &Arc<Device>) -> Result<(), DriverError> {
        let state = self.state(device)?;
        state.set_phase(ReceiverPhase::Negotiating);
        device.send(&protocol::get_max_devices());
        Ok(())
    }

    fn exit(&self, device: &Device) {
        let Ok(state) = self.state(device) else {
            return;
        };
        for slot_device in state.take_all() {
            slot_device.driver().exit(&slot_device);
        }
    }

    fn receive(&self, device: &Arc<Device>, report: Report<'_>) {
        let Ok(state) = self.state(device) else {
            return;
        };
        match route(&report) {
            Route::Control => {
                dispatch::dispatch(RECEIVER_HANDLERS, device, state, report);
            }
            Route::Logon(_) => logon(device, state, report),
            Route::Logoff(n) => logoff(device, state, n),
            Route::Forward(_) => forward(device, state, report),
        }
    }

    fn find_device(&self, device: &Device, key: MatchKey) -> Option<Arc<Device>> {
        let state = self.state(device).ok()?;
        state
            .attached()
            .into_iter()
            .map(|(_, d)| d)
            .find(|d| d.driver().match_key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(bytes: &[u8]) -> Report<'_> {
        Report::parse(bytes).unwrap()
    }

    #[test]
    fn control_traffic_wins_over_logon_opcode() {
        // Receiver-addressed DO/0x41 is control traffic, never a slot logon.
        let bytes = [0x10, 0xff, 0x83, 0x41, 0x00, 0x00, 0xb0];
        assert_eq!(route(&report(&bytes)), Route::Control);
    }

    #[test]
    fn routes_by_opcode_then_slot() {
        assert_eq!(
            route(&report(&[0x10, 0x01, 0x83, 0x41, 0x00, 0x00, 0xb0])),
            Route::Logon(1)
        );
        assert_eq!(
            route(&report(&[0x10, 0x02, 0x83, 0x40, 0x00, 0x00, 0x00])),
            Route::Logoff(2)
        );
        assert_eq!(
            route(&report(&[0x10, 0x03, 0x81, 0x0d, 0x40, 0x00, 0x00])),
            Route::Forward(3)
        );
    }

    #[test]
    fn slot_numbers_are_one_based_and_bounded() {
        assert_eq!(slot_index(0), None);
        assert_eq!(slot_index(1), Some(0));
        assert_eq!(slot_index(3), Some(2));
        assert_eq!(slot_index(4), None);
        assert_eq!(slot_index(0xff), None);
    }

    #[test]
    fn new_state_is_unconfigured_and_empty() {
        let state = ReceiverState::new(3);
        assert_eq!(state.phase(), ReceiverPhase::Unconfigured);
        assert_eq!(state.max_devices(), None);
        assert!(state.attached().is_empty());
        assert!(state.slot(1).is_none());
    }
}
