//! Device metadata snapshot.
//!
//! [`DeviceMeta`] is a lightweight, cloneable description of a transport suitable
//! for logging and status output. Backends populate what they know; unknown fields
//! remain `None`.
//!
//! ## Persistence notes
//! - `vid`/`pid` and `serial_number` (when present) are generally stable.
//! - `path` is platform-specific and may change across ports and reconnects; treat it
//!   as diagnostic first, identity second.

use crate::protocol::Bus;
use serde::{Deserialize, Serialize};

/// Snapshot of metadata describing a single transport.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMeta {
    /// Bus the device is attached through.
    pub bus: Option<Bus>,

    /// Vendor ID, if known.
    pub vid: Option<u16>,

    /// Product ID, if known.
    pub pid: Option<u16>,

    /// Human-readable product name from the firmware.
    pub product_string: Option<String>,

    /// Serial number supplied by firmware/OS, if present.
    pub serial_number: Option<String>,

    /// HID interface index. Some stacks use `-1` for "not applicable".
    pub interface_number: Option<i32>,

    /// HID usage page (`0xFF00` for the vendor-defined collection).
    pub usage_page: Option<u16>,

    /// HID usage within the page.
    pub usage: Option<u16>,

    /// OS path to the device (hidraw node on Linux).
    pub path: Option<String>,
}
