//! Wire format of Logitech extended ("vendor") reports.
//!
//! Every extended report shares one header:
//!
//! | Byte | Meaning |
//! |------|---------|
//! | 0 | report id (`>= 0x10` for extended reports) |
//! | 1 | device number: `0xFF` addresses the receiver, `1..=N` an attached slot |
//! | 2 | action (`0x80` SET, `0x81` GET, `0x83` DO) |
//! | 3 | sub-command |
//! | 4..=6 | payload |
//!
//! Reports below [`EXTENDED_REPORT_MIN_ID`] are plain HID usages (key presses, pointer
//! motion) and never enter this crate's queues.
//!
//! This module is I/O-free: it only names bytes and builds command buffers.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logitech USB/Bluetooth vendor ID.
pub const LOGITECH_VENDOR_ID: u16 = 0x046d;

/// Lowest report id that belongs to the extended protocol.
pub const EXTENDED_REPORT_MIN_ID: u8 = 0x10;

/// Report id used for the short (7 byte) commands this crate emits.
pub const SHORT_REPORT_ID: u8 = 0x10;

/// Length of a short command report.
pub const COMMAND_LEN: usize = 7;

/// Bytes every extended report must carry before it can be routed.
pub const HEADER_LEN: usize = 4;

/// Device number that addresses the receiver itself.
pub const RECEIVER_DEVICE_NUMBER: u8 = 0xff;

/// Largest number of devices a receiver can multiplex.
pub const RECEIVER_MAX_SLOTS: usize = 3;

/// Action byte values.
pub mod actions {
    pub const SET: u8 = 0x80;
    pub const GET: u8 = 0x81;
    pub const DO: u8 = 0x83;
    /// Unsolicited keyboard LCD notification.
    pub const LCD_NOTIFY: u8 = 0x0b;
}

/// Sub-command (register) byte values.
pub mod sub_commands {
    /// Receiver: maximum number of paired devices.
    pub const MAX_DEVICES: u8 = 0x00;
    /// Receiver: writing `0x02` here asks it to announce every reachable device.
    pub const LOGON_BROADCAST: u8 = 0x02;
    /// Battery level in percent (byte 4).
    pub const BATTERY: u8 = 0x0d;
    /// Keyboard clock (bytes 4..=6: hour, minute, second).
    pub const CLOCK: u8 = 0x31;
    /// Receiver notification: device unreachable.
    pub const LOGOFF: u8 = 0x40;
    /// Receiver notification: device reachable, byte 6 carries its device code.
    pub const LOGON: u8 = 0x41;
    /// Mouse scroll wheel mode (bytes 4..=6).
    pub const SCROLL_MODE: u8 = 0x56;
    /// Keyboard LCD page (with [`super::actions::LCD_NOTIFY`]).
    pub const LCD_PAGE: u8 = 0x00;
}

/// Known product ids.
pub mod product_ids {
    /// MX5500 Bluetooth receiver (USB side).
    pub const MX5500_RECEIVER: u16 = 0xc71c;
    /// MX5500 keyboard when paired directly over Bluetooth.
    pub const MX5500_KEYBOARD: u16 = 0xb30b;
    /// MX Revolution mouse when paired directly over Bluetooth.
    pub const MX_REVOLUTION: u16 = 0xb007;
    /// VX Revolution mouse (own USB dongle).
    pub const VX_REVOLUTION: u16 = 0xc521;
}

/// Device codes a receiver reports in byte 6 of a logon notification.
pub mod device_codes {
    pub const MX5500_KEYBOARD: u8 = 0xb3;
    pub const MX_REVOLUTION: u8 = 0xb0;
}

/// Offset of the device code inside a logon notification.
pub const LOGON_DEVICE_CODE_OFFSET: usize = 6;

/// Physical bus a transport is attached through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    Usb,
    Bluetooth,
    Unknown,
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bus::Usb => "usb",
            Bus::Bluetooth => "bluetooth",
            Bus::Unknown => "unknown",
        })
    }
}

/// Identity used to pick a driver for a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    pub bus: Bus,
    pub vendor: u16,
    pub product: u16,
}

impl MatchKey {
    pub const fn new(bus: Bus, vendor: u16, product: u16) -> Self {
        Self {
            bus,
            vendor,
            product,
        }
    }

    /// Logitech device on USB.
    pub const fn usb(product: u16) -> Self {
        Self::new(Bus::Usb, LOGITECH_VENDOR_ID, product)
    }

    /// Logitech device on Bluetooth.
    pub const fn bluetooth(product: u16) -> Self {
        Self::new(Bus::Bluetooth, LOGITECH_VENDOR_ID, product)
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:04x}:{:04x}", self.bus, self.vendor, self.product)
    }
}

/// `(action, sub-command)` pair selecting what a report means.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Opcode {
    pub action: u8,
    pub sub_command: u8,
}

impl Opcode {
    pub const fn new(action: u8, sub_command: u8) -> Self {
        Self {
            action,
            sub_command,
        }
    }
}

/// Logon notification opcode.
pub const LOGON: Opcode = Opcode::new(actions::DO, sub_commands::LOGON);
/// Logoff notification opcode.
pub const LOGOFF: Opcode = Opcode::new(actions::DO, sub_commands::LOGOFF);

/// `true` when `bytes` belongs to the extended protocol.
#[inline]
pub fn is_extended(bytes: &[u8]) -> bool {
    bytes.first().is_some_and(|id| *id >= EXTENDED_REPORT_MIN_ID)
}

/// Borrowed, header-checked view of an inbound extended report.
///
/// Reports may contain `0x00` bytes; the length is always explicit.
#[derive(Clone, Copy)]
pub struct Report<'a> {
    bytes: &'a [u8],
}

impl<'a> Report<'a> {
    /// Wraps `bytes`, failing when the routing header is incomplete.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort {
                needed: HEADER_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    pub fn report_id(&self) -> u8 {
        self.bytes[0]
    }

    pub fn device_number(&self) -> u8 {
        self.bytes[1]
    }

    pub fn action(&self) -> u8 {
        self.bytes[2]
    }

    pub fn sub_command(&self) -> u8 {
        self.bytes[3]
    }

    pub fn opcode(&self) -> Opcode {
        Opcode::new(self.action(), self.sub_command())
    }

    pub fn is_receiver_control(&self) -> bool {
        self.device_number() == RECEIVER_DEVICE_NUMBER
    }

    /// Byte at `index`, if the report is long enough.
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    /// Ensures the report carries at least `len` bytes.
    pub fn require(&self, len: usize) -> Result<(), ProtocolError> {
        if self.bytes.len() < len {
            Err(ProtocolError::TooShort {
                needed: len,
                got: self.bytes.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl fmt::Debug for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Report[{}]", Hex(self.bytes))
    }
}

/// Outbound short command (`COMMAND_LEN` bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command([u8; COMMAND_LEN]);

impl Command {
    pub const fn new(device_number: u8, action: u8, sub_command: u8) -> Self {
        Self([
            SHORT_REPORT_ID,
            device_number,
            action,
            sub_command,
            0x00,
            0x00,
            0x00,
        ])
    }

    /// Overwrites the three payload bytes (4..=6).
    pub const fn with_payload(mut self, payload: [u8; 3]) -> Self {
        self.0[4] = payload[0];
        self.0[5] = payload[1];
        self.0[6] = payload[2];
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Receiver: read the max-device-count register.
pub const fn get_max_devices() -> Command {
    Command::new(RECEIVER_DEVICE_NUMBER, actions::GET, sub_commands::MAX_DEVICES)
}

/// Receiver: write the max-device-count register. The value travels in byte 5.
pub const fn set_max_devices(count: u8) -> Command {
    Command::new(RECEIVER_DEVICE_NUMBER, actions::SET, sub_commands::MAX_DEVICES)
        .with_payload([0x00, count, 0x00])
}

/// Receiver: ask for a logon notification from every reachable device.
pub const fn logon_broadcast() -> Command {
    Command::new(
        RECEIVER_DEVICE_NUMBER,
        actions::SET,
        sub_commands::LOGON_BROADCAST,
    )
    .with_payload([0x02, 0x00, 0x00])
}

/// Any device: read the battery register.
pub const fn get_battery(device_number: u8) -> Command {
    Command::new(device_number, actions::GET, sub_commands::BATTERY)
}

/// Space-separated lowercase hex, for log fields.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_filter_uses_report_id_threshold() {
        assert!(!is_extended(&[]));
        assert!(!is_extended(&[0x02, 0x01, 0x00]));
        assert!(is_extended(&[0x10, 0xff, 0x81, 0x00]));
        assert!(is_extended(&[0x11, 0x01]));
    }

    #[test]
    fn report_requires_routing_header() {
        assert!(matches!(
            Report::parse(&[0x10, 0xff, 0x81]),
            Err(ProtocolError::TooShort { needed: 4, got: 3 })
        ));

        let bytes = [0x10, 0x02, 0x81, 0x0d, 0x4d, 0x00, 0x00];
        let report = Report::parse(&bytes).unwrap();
        assert_eq!(report.device_number(), 2);
        assert_eq!(report.opcode(), Opcode::new(actions::GET, sub_commands::BATTERY));
        assert_eq!(report.byte(4), Some(0x4d));
        assert_eq!(report.byte(7), None);
        assert!(report.require(8).is_err());
        assert!(!report.is_receiver_control());
    }

    #[test]
    fn receiver_commands_match_wire_layout() {
        assert_eq!(
            get_max_devices().as_bytes(),
            &[0x10, 0xff, 0x81, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            set_max_devices(3).as_bytes(),
            &[0x10, 0xff, 0x80, 0x00, 0x00, 0x03, 0x00]
        );
        assert_eq!(
            logon_broadcast().as_bytes(),
            &[0x10, 0xff, 0x80, 0x02, 0x02, 0x00, 0x00]
        );
    }

    #[test]
    fn match_key_display() {
        assert_eq!(
            MatchKey::usb(product_ids::MX5500_RECEIVER).to_string(),
            "usb:046d:c71c"
        );
        assert_eq!(Hex(&[0x10, 0x00, 0xab]).to_string(), "10 00 ab");
    }
}
