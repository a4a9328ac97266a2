//! Logitech mice: MX Revolution (standalone or behind a receiver) and VX Revolution
//! (USB only).

use crate::device::{Device, DeviceContext, DeviceState};
use crate::dispatch::{self, Handler};
use crate::driver::DeviceDriver;
use crate::error::{DriverError, ProtocolError, RequestError, ScrollModeError};
use crate::pending::Pending;
use crate::protocol::{actions, device_codes, product_ids, sub_commands, Command, MatchKey, Report};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_FLAG: u8 = 0x80;

mod mode_ids {
    pub const FREESPIN_IMMEDIATE: u8 = 0x01;
    pub const CLICK_TO_CLICK_IMMEDIATE: u8 = 0x02;
    pub const FREESPIN_ON_MOVE: u8 = 0x03;
    pub const CLICK_TO_CLICK_ON_MOVE: u8 = 0x04;
    pub const AUTOMATIC: u8 = 0x05;
    pub const BUTTON_SWITCH: u8 = 0x07;
    pub const BUTTON_TOGGLE: u8 = 0x08;
}

/// Scroll wheel behaviour of an MX Revolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ScrollMode {
    FreespinImmediate,
    ClickToClickImmediate,
    FreespinOnMove,
    ClickToClickOnMove,
    /// Freespin above a scroll speed threshold, separately for up and down.
    Automatic { up: u8, down: u8 },
    /// One button switches to freespin, the other back to click-to-click.
    ButtonSwitch { freespin: u8, click: u8 },
    ButtonToggle { button: u8 },
    /// Mode id the mouse reported but this crate does not know.
    Unknown { id: u8 },
}

impl ScrollMode {
    /// Builds a mode from its numeric id and up to two parameters.
    pub fn from_parts(id: u8, first: Option<u8>, second: Option<u8>) -> Result<Self, ScrollModeError> {
        let both = |needed| match (first, second) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(ScrollModeError::MissingParameter { mode: id, needed }),
        };
        let mode = match id {
            mode_ids::FREESPIN_IMMEDIATE => Self::FreespinImmediate,
            mode_ids::CLICK_TO_CLICK_IMMEDIATE => Self::ClickToClickImmediate,
            mode_ids::FREESPIN_ON_MOVE => Self::FreespinOnMove,
            mode_ids::CLICK_TO_CLICK_ON_MOVE => Self::ClickToClickOnMove,
            mode_ids::AUTOMATIC => {
                let (up, down) = both(2)?;
                Self::Automatic { up, down }
            }
            mode_ids::BUTTON_SWITCH => {
                let (freespin, click) = both(2)?;
                Self::ButtonSwitch { freespin, click }
            }
            mode_ids::BUTTON_TOGGLE => Self::ButtonToggle {
                button: first.ok_or(ScrollModeError::MissingParameter { mode: id, needed: 1 })?,
            },
            other => return Err(ScrollModeError::UnknownMode(other)),
        };
        Ok(mode)
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::FreespinImmediate => mode_ids::FREESPIN_IMMEDIATE,
            Self::ClickToClickImmediate => mode_ids::CLICK_TO_CLICK_IMMEDIATE,
            Self::FreespinOnMove => mode_ids::FREESPIN_ON_MOVE,
            Self::ClickToClickOnMove => mode_ids::CLICK_TO_CLICK_ON_MOVE,
            Self::Automatic { .. } => mode_ids::AUTOMATIC,
            Self::ButtonSwitch { .. } => mode_ids::BUTTON_SWITCH,
            Self::ButtonToggle { .. } => mode_ids::BUTTON_TOGGLE,
            Self::Unknown { id } => *id,
        }
    }
}

impl fmt::Display for ScrollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FreespinImmediate => f.write_str("freespin immediate"),
            Self::ClickToClickImmediate => f.write_str("click-to-click immediate"),
            Self::FreespinOnMove => f.write_str("freespin on move"),
            Self::ClickToClickOnMove => f.write_str("click-to-click on move"),
            Self::Automatic { up, down } if up == down => write!(f, "freespin above {up}"),
            Self::Automatic { up, down } => write!(f, "freespin above {up} up and {down} down"),
            Self::ButtonToggle { button } => write!(f, "toggle using button {button}"),
            // Same button for both directions is a toggle.
            Self::ButtonSwitch { freespin, click } if freespin == click => {
                write!(f, "toggle using button {freespin}")
            }
            Self::ButtonSwitch { freespin, click } => write!(
                f,
                "switch to freespin using button {freespin} and to click-to-click using button {click}"
            ),
            Self::Unknown { id } => write!(f, "unknown mode {id}"),
        }
    }
}

/// A scroll mode plus whether it is the stored default or a temporary override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ScrollModeSetting {
    #[serde(flatten)]
    pub mode: ScrollMode,
    pub default: bool,
}

impl ScrollModeSetting {
    pub fn new(mode: ScrollMode, default: bool) -> Self {
        Self { mode, default }
    }

    /// Decodes payload bytes 4..=6 of a scroll mode report.
    pub fn decode(payload: [u8; 3]) -> Self {
        let [raw, first, second] = payload;
        let mode = match raw & 0x0f {
            mode_ids::FREESPIN_IMMEDIATE => ScrollMode::FreespinImmediate,
            mode_ids::CLICK_TO_CLICK_IMMEDIATE => ScrollMode::ClickToClickImmediate,
            mode_ids::FREESPIN_ON_MOVE => ScrollMode::FreespinOnMove,
            mode_ids::CLICK_TO_CLICK_ON_MOVE => ScrollMode::ClickToClickOnMove,
            mode_ids::AUTOMATIC => ScrollMode::Automatic {
                up: first,
                down: second,
            },
            mode_ids::BUTTON_SWITCH => ScrollMode::ButtonSwitch {
                freespin: first >> 4,
                click: first & 0x0f,
            },
            mode_ids::BUTTON_TOGGLE => ScrollMode::ButtonToggle { button: second },
            id => ScrollMode::Unknown { id },
        };
        Self {
            mode,
            default: raw & DEFAULT_FLAG != 0,
        }
    }

    /// Payload bytes 4..=6 of a SET scroll mode command.
    pub fn encode(&self) -> Result<[u8; 3], ScrollModeError> {
        let flag = if self.default { DEFAULT_FLAG } else { 0 };
        let id = self.mode.id() | flag;
        let payload = match self.mode {
            ScrollMode::Automatic { up, down } => [id, up, down],
            ScrollMode::ButtonSwitch { freespin, click } => {
                for button in [freespin, click] {
                    if button > 0x0f {
                        return Err(ScrollModeError::ButtonOutOfRange(button));
                    }
                }
                [id, freespin << 4 | click, 0x00]
            }
            ScrollMode::ButtonToggle { button } => [id, 0x00, button],
            ScrollMode::Unknown { id } => return Err(ScrollModeError::UnknownMode(id)),
            _ => [id, 0x00, 0x00],
        };
        Ok(payload)
    }
}

impl fmt::Display for ScrollModeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = if self.default { "default" } else { "temp" };
        write!(f, "{scope} {}", self.mode)
    }
}

pub fn get_scroll_mode(device_number: u8) -> Command {
    Command::new(device_number, actions::GET, sub_commands::SCROLL_MODE)
}

pub fn set_scroll_mode(device_number: u8, setting: &ScrollModeSetting) -> Result<Command, ScrollModeError> {
    Ok(Command::new(device_number, actions::SET, sub_commands::SCROLL_MODE).with_payload(setting.encode()?))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseModel {
    MxRevolution,
    VxRevolution,
}

impl MouseModel {
    pub fn has_scroll_modes(self) -> bool {
        matches!(self, MouseModel::MxRevolution)
    }
}

pub struct MouseState {
    model: MouseModel,
    pub battery: Pending<u8>,
    pub scroll_mode: Pending<ScrollModeSetting>,
}

impl MouseState {
    pub fn new(model: MouseModel) -> Self {
        Self {
            model,
            battery: Pending::new(),
            scroll_mode: Pending::new(),
        }
    }

    pub fn model(&self) -> MouseModel {
        self.model
    }

    pub(crate) fn notify_all(&self) {
        self.battery.notify();
        self.scroll_mode.notify();
    }

    pub(crate) fn interrupt_all(&self) {
        self.battery.interrupt();
        self.scroll_mode.interrupt();
    }
}

fn handle_battery(device: &Device, state: &MouseState, report: Report<'_>) -> Result<(), ProtocolError> {
    report.require(5)?;
    let level = report.byte(4).unwrap_or_default();
    debug!(device = %device.name(), level, "battery level");
    state.battery.fulfill(level);
    Ok(())
}

fn handle_scroll_mode(device: &Device, state: &MouseState, report: Report<'_>) -> Result<(), ProtocolError> {
    report.require(7)?;
    let bytes = report.as_bytes();
    let setting = ScrollModeSetting::decode([bytes[4], bytes[5], bytes[6]]);
    debug!(device = %device.name(), mode = %setting, "scroll mode");
    state.scroll_mode.fulfill(setting);
    Ok(())
}

static MX_REVOLUTION_HANDLERS: &[Handler<MouseState>] = &[
    Handler::call(actions::GET, sub_commands::BATTERY, handle_battery),
    Handler::call(actions::GET, sub_commands::SCROLL_MODE, handle_scroll_mode),
    Handler::call(actions::SET, sub_commands::SCROLL_MODE, handle_scroll_mode),
];

static VX_REVOLUTION_HANDLERS: &[Handler<MouseState>] =
    &[Handler::call(actions::GET, sub_commands::BATTERY, handle_battery)];

pub struct MouseDriver {
    model: MouseModel,
}

impl MouseDriver {
    pub fn mx_revolution() -> Self {
        Self {
            model: MouseModel::MxRevolution,
        }
    }

    pub fn vx_revolution() -> Self {
        Self {
            model: MouseModel::VxRevolution,
        }
    }

    fn handlers(&self) -> &'static [Handler<MouseState>] {
        match self.model {
            MouseModel::MxRevolution => MX_REVOLUTION_HANDLERS,
            MouseModel::VxRevolution => VX_REVOLUTION_HANDLERS,
        }
    }
}

impl DeviceDriver for MouseDriver {
    fn name(&self) -> &'static str {
        match self.model {
            MouseModel::MxRevolution => "Logitech MX Revolution",
            MouseModel::VxRevolution => "Logitech VX Revolution",
        }
    }

    fn match_key(&self) -> MatchKey {
        match self.model {
            MouseModel::MxRevolution => MatchKey::bluetooth(product_ids::MX_REVOLUTION),
            MouseModel::VxRevolution => MatchKey::usb(product_ids::VX_REVOLUTION),
        }
    }

    fn device_code(&self) -> Option<u8> {
        match self.model {
            MouseModel::MxRevolution => Some(device_codes::MX_REVOLUTION),
            MouseModel::VxRevolution => None,
        }
    }

    fn new_state(&self, _ctx: &DeviceContext) -> DeviceState {
        DeviceState::Mouse(MouseState::new(self.model))
    }

    fn init(&self, device: &Arc<Device>) -> Result<(), DriverError> {
        device
            .as_mouse()
            .map(|_| ())
            .ok_or(DriverError::StateMismatch(self.name()))
    }

    fn init_on_receiver(&self, device: &Arc<Device>, _logon: Report<'_>) -> Result<(), DriverError> {
        if self.device_code().is_none() {
            return Err(DriverError::NoReceiverSupport(self.name()));
        }
        self.init(device)
    }

    fn exit(&self, device: &Device) {
        device.interrupt_requests();
    }

    fn receive(&self, device: &Arc<Device>, report: Report<'_>) {
        if let Some(state) = device.as_mouse() {
            dispatch::dispatch(self.handlers(), device, state, report);
        }
        device.wake();
    }
}

impl Device {
    fn mouse_with_scroll_modes(&self) -> Result<&MouseState, RequestError> {
        self.as_mouse()
            .filter(|state| state.model().has_scroll_modes())
            .ok_or_else(|| RequestError::Unsupported(self.name().to_string()))
    }

    /// Current scroll mode. Asks the mouse only until the mode is known.
    pub fn scroll_mode(&self) -> Result<ScrollModeSetting, RequestError> {
        let state = self.mouse_with_scroll_modes()?;
        state
            .scroll_mode
            .request_cached(self.name(), self.request_timeout(), || {
                self.send(&get_scroll_mode(self.device_number()))
            })
    }

    /// Sends a new scroll mode. The mouse's echo updates the cached mode.
    pub fn set_scroll_mode(&self, setting: &ScrollModeSetting) -> Result<(), RequestError> {
        self.mouse_with_scroll_modes()?;
        self.send(&set_scroll_mode(self.device_number(), setting)?);
        Ok(())
    }
}
