//! Built-in device kinds.

pub mod keyboard;
pub mod mouse;

use crate::driver::DeviceDriver;
use crate::receiver::ReceiverDriver;
use std::sync::Arc;

pub use keyboard::{Clock, KeyboardDriver, KeyboardState};
pub use mouse::{MouseDriver, MouseModel, MouseState, ScrollMode, ScrollModeSetting};

/// Every driver this crate ships, receiver first.
pub fn default_drivers() -> Vec<Arc<dyn DeviceDriver>> {
    vec![
        Arc::new(ReceiverDriver),
        Arc::new(KeyboardDriver),
        Arc::new(MouseDriver::mx_revolution()),
        Arc::new(MouseDriver::vx_revolution()),
    ]
}
