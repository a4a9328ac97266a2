//! Point-in-time status of attached devices.
//!
//! [`Snapshot`] is an **owned**, read-only view produced by
//! [`DeviceManager::snapshot`](crate::manager::DeviceManager::snapshot). Building
//! one never talks to a device: it reports the last values the handlers stored, so
//! fields that were never requested are `None`.
//!
//! # Examples
//! ```no_run
//! use lgmux::{Config, DeviceManager};
//!
//! let manager = DeviceManager::with_pool(Config::default()).unwrap();
//! println!("{}", manager.snapshot().to_json().unwrap());
//! ```

use crate::device::{Device, DeviceKind, DeviceState};
use crate::kinds::keyboard::Clock;
use crate::kinds::mouse::ScrollModeSetting;
use crate::metadata::DeviceMeta;
use crate::queue::ReportQueue;
use crate::receiver::ReceiverPhase;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub dropped: u64,
}

impl QueueStats {
    fn of(queue: &ReportQueue) -> Self {
        Self {
            queued: queue.len(),
            dropped: queue.dropped(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReceiverStatus {
    pub phase: ReceiverPhase,
    pub max_devices: Option<u8>,
    /// Occupied slots keyed by device number.
    pub slots: BTreeMap<u8, DeviceStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub driver: &'static str,
    pub kind: DeviceKind,
    pub device_number: u8,
    pub meta: DeviceMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound: Option<QueueStats>,
    pub outbound: QueueStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lcd_page: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<Clock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_mode: Option<ScrollModeSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ReceiverStatus>,
}

impl DeviceStatus {
    pub fn of(device: &Device) -> Self {
        let mut status = Self {
            name: device.name().to_string(),
            driver: device.driver().name(),
            kind: device.kind(),
            device_number: device.device_number(),
            meta: device.metadata().clone(),
            inbound: device.inbound().map(QueueStats::of),
            outbound: QueueStats::of(device.outbound()),
            battery: None,
            lcd_page: None,
            clock: None,
            scroll_mode: None,
            receiver: None,
        };

        match device.state() {
            DeviceState::Receiver(state) => {
                status.receiver = Some(ReceiverStatus {
                    phase: state.phase(),
                    max_devices: state.max_devices(),
                    slots: state
                        .attached()
                        .into_iter()
                        .map(|(n, slot)| (n, DeviceStatus::of(&slot)))
                        .collect(),
                });
            }
            DeviceState::Keyboard(state) => {
                status.battery = state.battery.get();
                status.lcd_page = Some(state.lcd_page());
                status.clock = state.clock.get();
            }
            DeviceState::Mouse(state) => {
                status.battery = state.battery.get();
                status.scroll_mode = state.scroll_mode.get();
            }
        }
        status
    }
}

/// Owned status of every attached transport (`transport id → status`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(pub BTreeMap<String, DeviceStatus>);

impl Snapshot {
    #[inline]
    pub fn get(&self, transport_id: &str) -> Option<&DeviceStatus> {
        self.0.get(transport_id)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeviceStatus)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
