//! Static `(action, sub-command)` handler tables.
//!
//! Each device kind keeps a `&'static [Handler<S>]` over its own state type. The first
//! entry whose opcode equals the report's is used; [`Handler::ignore`] entries mark
//! known noise as handled without doing anything.

use crate::device::Device;
use crate::error::ProtocolError;
use crate::protocol::{Hex, Opcode, Report};
use tracing::error;

/// Handler body. Returns an error when the report is too short for its payload.
pub type HandlerFn<S> = fn(&Device, &S, Report<'_>) -> Result<(), ProtocolError>;

pub struct Handler<S> {
    pub opcode: Opcode,
    func: Option<HandlerFn<S>>,
}

impl<S> Handler<S> {
    pub const fn call(action: u8, sub_command: u8, func: HandlerFn<S>) -> Self {
        Self {
            opcode: Opcode::new(action, sub_command),
            func: Some(func),
        }
    }

    pub const fn ignore(action: u8, sub_command: u8) -> Self {
        Self {
            opcode: Opcode::new(action, sub_command),
            func: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    Ignored,
    Unhandled,
    Malformed,
}

/// Runs the first matching handler. Unknown and malformed reports are logged only.
pub fn dispatch<S>(table: &[Handler<S>], device: &Device, state: &S, report: Report<'_>) -> Outcome {
    let opcode = report.opcode();
    let Some(handler) = table.iter().find(|h| h.opcode == opcode) else {
        error!(
            device = %device.name(),
            action = format_args!("{:02x}", opcode.action),
            sub = format_args!("{:02x}", opcode.sub_command),
            bytes = %Hex(report.as_bytes()),
            "unhandled message"
        );
        return Outcome::Unhandled;
    };

    let Some(func) = handler.func else {
        return Outcome::Ignored;
    };

    match func(device, state, report) {
        Ok(()) => Outcome::Handled,
        Err(e) => {
            error!(
                device = %device.name(),
                bytes = %Hex(report.as_bytes()),
                error = %e,
                "malformed message dropped"
            );
            Outcome::Malformed
        }
    }
}
