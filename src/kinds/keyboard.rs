//! MX5500 keyboard: LCD page notifications, battery and clock.

use crate::device::{Device, DeviceContext, DeviceState};
use crate::dispatch::{self, Handler};
use crate::driver::DeviceDriver;
use crate::error::{DriverError, ProtocolError, RequestError};
use crate::pending::Pending;
use crate::protocol::{actions, device_codes, product_ids, sub_commands, Command, MatchKey, Report};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Time shown on the keyboard display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Clock {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Clock {
    /// `None` unless the fields form a valid 24h time.
    pub fn new(hour: u8, minute: u8, second: u8) -> Option<Self> {
        (hour < 24 && minute < 60 && second < 60).then_some(Self { hour, minute, second })
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

pub fn get_clock(device_number: u8) -> Command {
    Command::new(device_number, actions::GET, sub_commands::CLOCK)
}

pub fn set_clock(device_number: u8, clock: Clock) -> Command {
    Command::new(device_number, actions::SET, sub_commands::CLOCK).with_payload([
        clock.hour,
        clock.minute,
        clock.second,
    ])
}

pub struct KeyboardState {
    lcd_page: AtomicU8,
    pub battery: Pending<u8>,
    pub clock: Pending<Clock>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self {
            lcd_page: AtomicU8::new(0),
            battery: Pending::new(),
            clock: Pending::new(),
        }
    }

    /// Page last reported by the LCD; `0` until the first notification.
    pub fn lcd_page(&self) -> u8 {
        self.lcd_page.load(Ordering::Acquire)
    }

    pub(crate) fn notify_all(&self) {
        self.battery.notify();
        self.clock.notify();
    }

    pub(crate) fn interrupt_all(&self) {
        self.battery.interrupt();
        self.clock.interrupt();
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_lcd_page(device: &Device, state: &KeyboardState, report: Report<'_>) -> Result<(), ProtocolError> {
    report.require(5)?;
    let page = report.byte(4).unwrap_or_default();
    debug!(device = %device.name(), page, "lcd page changed");
    state.lcd_page.store(page, Ordering::Release);
    Ok(())
}

fn handle_battery(device: &Device, state: &KeyboardState, report: Report<'_>) -> Result<(), ProtocolError> {
    report.require(5)?;
    let level = report.byte(4).unwrap_or_default();
    debug!(device = %device.name(), level, "battery level");
    state.battery.fulfill(level);
    Ok(())
}

fn handle_clock(device: &Device, state: &KeyboardState, report: Report<'_>) -> Result<(), ProtocolError> {
    report.require(7)?;
    let bytes = report.as_bytes();
    let clock = Clock {
        hour: bytes[4],
        minute: bytes[5],
        second: bytes[6],
    };
    debug!(device = %device.name(), %clock, "clock");
    state.clock.fulfill(clock);
    Ok(())
}

static KEYBOARD_HANDLERS: &[Handler<KeyboardState>] = &[
    Handler::call(actions::LCD_NOTIFY, sub_commands::LCD_PAGE, handle_lcd_page),
    Handler::call(actions::GET, sub_commands::BATTERY, handle_battery),
    Handler::call(actions::GET, sub_commands::CLOCK, handle_clock),
    Handler::call(actions::SET, sub_commands::CLOCK, handle_clock),
];

pub struct KeyboardDriver;

impl DeviceDriver for KeyboardDriver {
    fn name(&self) -> &'static str {
        "Logitech MX5500 Keyboard"
    }

    fn match_key(&self) -> MatchKey {
        MatchKey::bluetooth(product_ids::MX5500_KEYBOARD)
    }

    fn device_code(&self) -> Option<u8> {
        Some(device_codes::MX5500_KEYBOARD)
    }

    fn new_state(&self, _ctx: &DeviceContext) -> DeviceState {
        DeviceState::Keyboard(KeyboardState::new())
    }

    fn init(&self, device: &Arc<Device>) -> Result<(), DriverError> {
        device
            .as_keyboard()
            .map(|_| ())
            .ok_or(DriverError::StateMismatch(self.name()))
    }

    fn init_on_receiver(&self, device: &Arc<Device>, _logon: Report<'_>) -> Result<(), DriverError> {
        self.init(device)
    }

    fn exit(&self, device: &Device) {
        device.interrupt_requests();
    }

    fn receive(&self, device: &Arc<Device>, report: Report<'_>) {
        if let Some(state) = device.as_keyboard() {
            dispatch::dispatch(KEYBOARD_HANDLERS, device, state, report);
        }
        device.wake();
    }
}

impl Device {
    fn keyboard(&self) -> Result<&KeyboardState, RequestError> {
        self.as_keyboard()
            .ok_or_else(|| RequestError::Unsupported(self.name().to_string()))
    }

    /// Reads the keyboard clock. Blocks until the keyboard replies.
    pub fn clock(&self) -> Result<Clock, RequestError> {
        let state = self.keyboard()?;
        state.clock.request(self.name(), self.request_timeout(), || {
            self.send(&get_clock(self.device_number()))
        })
    }

    /// Sets the keyboard clock. The echo updates the cached value.
    pub fn set_clock(&self, clock: Clock) -> Result<(), RequestError> {
        self.keyboard()?;
        self.send(&set_clock(self.device_number(), clock));
        Ok(())
    }

    pub fn lcd_page(&self) -> Result<u8, RequestError> {
        Ok(self.keyboard()?.lcd_page())
    }
}
